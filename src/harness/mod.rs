pub mod aggregator;
pub mod orchestrator;
pub mod types;

pub use aggregator::{Aggregator, CategoryGroup, ReportModel, RunVerdict, default_is_primary};
pub use orchestrator::Orchestrator;
pub use types::{ActorState, RunError, RunOptions, RunProgress, RunResult};
