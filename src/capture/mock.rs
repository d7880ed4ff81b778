//! Synthetic capture sources for tests and fixtures.
//!
//! - `MockFramebuffer` is an RGBA drawing surface (fill, rect, text, pixel ops)
//! - `MockProvider` serves scripted frames, failures and delays per actor

use font8x8::{BASIC_FONTS, UnicodeFonts};
use image::Rgba;
use std::collections::HashMap;
use std::thread;
use std::time::Duration;

use super::types::{CaptureError, CaptureOutcome, CaptureProvider, CaptureResult};
use crate::actor::Actor;
use crate::codec::{self, CodecError, PixelBuffer};

/// A virtual framebuffer for programmatic drawing
///
/// Provides a drawing API for creating test fixtures:
/// - `fill()` - Fill entire buffer with a color
/// - `draw_rect()` - Draw a filled rectangle
/// - `draw_text()` - Draw text using font8x8 glyphs
/// - `get_pixel()` / `set_pixel()` - Direct pixel access
#[derive(Debug, Clone, PartialEq)]
pub struct MockFramebuffer {
    image: PixelBuffer,
}

impl MockFramebuffer {
    /// Create a new framebuffer with the given dimensions, initialized to opaque black
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_color(width, height, [0, 0, 0, 255])
    }

    /// Create a framebuffer initialized to a specific color
    pub fn with_color(width: u32, height: u32, color: [u8; 4]) -> Self {
        Self {
            image: PixelBuffer::from_pixel(width, height, Rgba(color)),
        }
    }

    /// Load a framebuffer from PNG image bytes
    pub fn from_png_bytes(data: &[u8]) -> Result<Self, CodecError> {
        Ok(Self {
            image: codec::decode_png(data)?,
        })
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Fill the entire framebuffer with a color
    pub fn fill(&mut self, color: [u8; 4]) {
        for px in self.image.pixels_mut() {
            *px = Rgba(color);
        }
    }

    /// Draw a filled rectangle, clipped to the framebuffer
    pub fn draw_rect(&mut self, x: u32, y: u32, w: u32, h: u32, color: [u8; 4]) {
        for py in y..y.saturating_add(h).min(self.height()) {
            for px in x..x.saturating_add(w).min(self.width()) {
                self.set_pixel(px, py, color);
            }
        }
    }

    /// Draw text using font8x8 glyphs
    ///
    /// Each character is 8x8 pixels. Text does not wrap.
    pub fn draw_text(&mut self, x: u32, y: u32, text: &str, fg: [u8; 4], bg: [u8; 4]) {
        let mut cursor_x = x;
        for ch in text.chars() {
            if cursor_x >= self.width() {
                break;
            }
            self.draw_char(cursor_x, y, ch, fg, bg);
            cursor_x += 8;
        }
    }

    fn draw_char(&mut self, x: u32, y: u32, ch: char, fg: [u8; 4], bg: [u8; 4]) {
        let glyph = BASIC_FONTS.get(ch).unwrap_or([0u8; 8]);
        for (row_idx, row) in glyph.iter().enumerate() {
            let py = y + row_idx as u32;
            for bit in 0..8 {
                // font8x8 stores LSB as leftmost pixel
                let color = if (row >> bit) & 1 == 1 { fg } else { bg };
                self.set_pixel(x + bit, py, color);
            }
        }
    }

    /// Get the color of a pixel; out-of-bounds reads return transparent black
    pub fn get_pixel(&self, x: u32, y: u32) -> [u8; 4] {
        if x >= self.width() || y >= self.height() {
            return [0, 0, 0, 0];
        }
        self.image.get_pixel(x, y).0
    }

    /// Set the color of a pixel; out-of-bounds writes are ignored
    pub fn set_pixel(&mut self, x: u32, y: u32, color: [u8; 4]) {
        if x < self.width() && y < self.height() {
            self.image.put_pixel(x, y, Rgba(color));
        }
    }

    /// Borrow the underlying buffer
    pub fn image(&self) -> &PixelBuffer {
        &self.image
    }

    /// Take the underlying buffer
    pub fn into_image(self) -> PixelBuffer {
        self.image
    }

    /// Encode the framebuffer as PNG bytes
    pub fn to_png(&self) -> Result<Vec<u8>, CodecError> {
        codec::encode_png(&self.image)
    }
}

/// What a `MockProvider` does when asked for an actor
#[derive(Debug, Clone)]
pub enum Script {
    /// Return this frame
    Frame(MockFramebuffer),
    /// Block for the duration, then return the frame
    Delayed(Duration, MockFramebuffer),
    /// Fail with this message
    Fail(String),
}

/// Capture provider driven by a per-actor script. Unknown actors fail.
#[derive(Debug, Clone, Default)]
pub struct MockProvider {
    scripts: HashMap<String, Script>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `frame` for `actor`
    pub fn frame(mut self, actor: impl Into<String>, frame: MockFramebuffer) -> Self {
        self.scripts.insert(actor.into(), Script::Frame(frame));
        self
    }

    /// Serve `frame` for `actor` after blocking for `delay`
    pub fn delayed(mut self, actor: impl Into<String>, delay: Duration, frame: MockFramebuffer) -> Self {
        self.scripts.insert(actor.into(), Script::Delayed(delay, frame));
        self
    }

    /// Fail every capture of `actor`
    pub fn failing(mut self, actor: impl Into<String>, message: impl Into<String>) -> Self {
        self.scripts.insert(actor.into(), Script::Fail(message.into()));
        self
    }
}

impl CaptureProvider for MockProvider {
    fn capture(&self, actor: &Actor) -> CaptureOutcome<CaptureResult> {
        let frame = match self.scripts.get(&actor.name) {
            Some(Script::Frame(fb)) => fb,
            Some(Script::Delayed(delay, fb)) => {
                thread::sleep(*delay);
                fb
            }
            Some(Script::Fail(msg)) => return Err(CaptureError::Backend(msg.clone())),
            None => {
                return Err(CaptureError::Backend(format!(
                    "no scripted frame for actor '{}'",
                    actor.name
                )));
            }
        };
        let mut result = CaptureResult::new(&actor.name, frame.image().clone());
        result.metadata = Some(serde_json::json!({ "mock": true }));
        Ok(result)
    }

    fn source_type(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: [u8; 4] = [255, 255, 255, 255];
    const RED: [u8; 4] = [255, 0, 0, 255];

    #[test]
    fn test_mock_framebuffer_new() {
        let fb = MockFramebuffer::new(100, 50);
        assert_eq!(fb.width(), 100);
        assert_eq!(fb.height(), 50);
        assert_eq!(fb.get_pixel(0, 0), [0, 0, 0, 255]);
        assert_eq!(fb.get_pixel(99, 49), [0, 0, 0, 255]);
    }

    #[test]
    fn test_mock_framebuffer_draw_rect_clips() {
        let mut fb = MockFramebuffer::with_color(20, 20, WHITE);
        fb.draw_rect(15, 15, 10, 10, RED);

        assert_eq!(fb.get_pixel(14, 14), WHITE);
        assert_eq!(fb.get_pixel(15, 15), RED);
        assert_eq!(fb.get_pixel(19, 19), RED);
        assert_eq!(fb.get_pixel(25, 25), [0, 0, 0, 0]);
    }

    #[test]
    fn test_mock_framebuffer_draw_text() {
        let mut fb = MockFramebuffer::with_color(80, 16, [0, 0, 0, 255]);
        fb.draw_text(0, 0, "Hi", WHITE, [0, 0, 0, 255]);

        let lit = (0..8)
            .flat_map(|y| (0..8).map(move |x| (x, y)))
            .filter(|&(x, y)| fb.get_pixel(x, y) == WHITE)
            .count();
        assert!(lit > 0, "Character 'H' should have some foreground pixels");
    }

    #[test]
    fn test_mock_framebuffer_png_roundtrip() {
        let mut fb = MockFramebuffer::with_color(32, 32, [100, 150, 200, 255]);
        fb.draw_rect(8, 8, 16, 16, RED);

        let fb2 = MockFramebuffer::from_png_bytes(&fb.to_png().unwrap()).unwrap();
        assert_eq!(fb2, fb);
    }

    #[test]
    fn test_mock_provider_scripts() {
        let provider = MockProvider::new()
            .frame("Mobile_Lead", MockFramebuffer::with_color(4, 8, WHITE))
            .failing("Broken", "browser crashed");

        let ok = provider.capture(&Actor::new("Mobile_Lead", "Mobile")).unwrap();
        assert_eq!((ok.width(), ok.height()), (4, 8));
        assert_eq!(ok.actor, "Mobile_Lead");

        let err = provider.capture(&Actor::new("Broken", "x")).unwrap_err();
        assert_eq!(err.to_string(), "Capture error: browser crashed");

        assert!(provider.capture(&Actor::new("Unknown", "x")).is_err());
    }
}
