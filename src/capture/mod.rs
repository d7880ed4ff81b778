pub mod directory;
pub mod mock;
pub mod types;

pub use directory::DirectorySource;
pub use mock::{MockFramebuffer, MockProvider, Script};
pub use types::{CaptureError, CaptureOutcome, CaptureProvider, CaptureResult};
