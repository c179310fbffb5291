//! Screen region capture.
//! A capturer grabs the pixels under a screen rectangle and hands back an RGBA image.
//! Backends acquire and release their OS resources inside each call; nothing is held
//! across ticks.

pub mod screen;

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use screen::{CaptureBackend, CommandCapture};

/// Screen-space rectangle selected by the user. Fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rectangle {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rectangle {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build a rectangle from a raw selection. Selections whose width or height do not
    /// exceed `min_px` are rejected.
    pub fn from_selection(x: i32, y: i32, width: i32, height: i32, min_px: u32) -> Option<Self> {
        if width <= min_px as i32 || height <= min_px as i32 {
            return None;
        }
        Some(Self::new(x, y, width as u32, height as u32))
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for Rectangle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("invalid capture region {0}")]
    InvalidRegion(Rectangle),
    #[error("no screen capture tool available (need grim, maim, scrot or screencapture)")]
    NoBackendAvailable,
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("failed to decode screenshot: {0}")]
    Decode(#[from] image::ImageError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Platform capture adapter.
pub trait ScreenCapturer: Send + Sync {
    /// Capture the pixels inside `rect`. The returned image is `rect.width` x `rect.height`.
    fn capture(&self, rect: &Rectangle) -> Result<RgbaImage, CaptureError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selection_below_threshold_is_rejected() {
        assert!(Rectangle::from_selection(0, 0, 5, 5, 10).is_none());
        assert!(Rectangle::from_selection(0, 0, 10, 200, 10).is_none());
        assert!(Rectangle::from_selection(0, 0, 200, 10, 10).is_none());
    }

    #[test]
    fn selection_above_threshold_is_accepted() {
        let rect = Rectangle::from_selection(-1920, 40, 11, 300, 10).unwrap();
        assert_eq!(rect, Rectangle::new(-1920, 40, 11, 300));
        assert_eq!(rect.to_string(), "11x300+-1920+40");
    }

    #[test]
    fn negative_selection_is_rejected() {
        assert!(Rectangle::from_selection(0, 0, -50, 50, 10).is_none());
    }
}
