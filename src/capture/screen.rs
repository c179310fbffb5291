//! Command-line screen capture.
//! Captures a region using whichever system tool is present (grim, maim, scrot on
//! Linux, screencapture on macOS), writes it to a per-call temp file and decodes it.

use std::path::{Path, PathBuf};
use std::process::Command;

use image::RgbaImage;
use tracing::{debug, info, warn};

use super::{CaptureError, Rectangle, ScreenCapturer};

/// Screen capture backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureBackend {
    Grim,
    Maim,
    Scrot,
    ScreenCapture,
}

impl CaptureBackend {
    fn program(self) -> &'static str {
        match self {
            CaptureBackend::Grim => "grim",
            CaptureBackend::Maim => "maim",
            CaptureBackend::Scrot => "scrot",
            CaptureBackend::ScreenCapture => "screencapture",
        }
    }

    /// Command-line arguments that capture `rect` into `out`.
    pub fn region_args(self, rect: &Rectangle, out: &Path) -> Vec<String> {
        let out = out.display().to_string();
        match self {
            CaptureBackend::Grim => vec![
                "-g".into(),
                format!("{},{} {}x{}", rect.x, rect.y, rect.width, rect.height),
                out,
            ],
            CaptureBackend::Maim => vec![
                "-g".into(),
                format!("{}x{}+{}+{}", rect.width, rect.height, rect.x, rect.y),
                out,
            ],
            CaptureBackend::Scrot => vec![
                "-a".into(),
                format!("{},{},{},{}", rect.x, rect.y, rect.width, rect.height),
                "-o".into(),
                out,
            ],
            CaptureBackend::ScreenCapture => vec![
                "-x".into(),
                "-R".into(),
                format!("{},{},{},{}", rect.x, rect.y, rect.width, rect.height),
                out,
            ],
        }
    }
}

/// Detect available screen capture backend.
pub fn detect_backend() -> Option<CaptureBackend> {
    // Prefer grim (Wayland/WSLg), then maim (X11), then scrot (X11), then macOS
    for backend in [
        CaptureBackend::Grim,
        CaptureBackend::Maim,
        CaptureBackend::Scrot,
        CaptureBackend::ScreenCapture,
    ] {
        if probe_command(backend.program()) {
            info!(backend = backend.program(), "screen capture backend detected");
            return Some(backend);
        }
    }
    warn!("no screen capture backend found");
    None
}

/// Temp file that is removed when dropped, so every exit path of a capture cleans up.
struct TempCaptureFile {
    path: PathBuf,
}

impl TempCaptureFile {
    fn new() -> Self {
        let name = format!("screen-translator-{}.png", uuid::Uuid::new_v4());
        Self {
            path: std::env::temp_dir().join(name),
        }
    }
}

impl Drop for TempCaptureFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!(error = %e, path = %self.path.display(), "temp capture cleanup failed");
            }
        }
    }
}

/// Capture `rect` with `backend` and decode the result.
pub fn capture_region(backend: CaptureBackend, rect: &Rectangle) -> Result<RgbaImage, CaptureError> {
    if rect.is_empty() {
        return Err(CaptureError::InvalidRegion(*rect));
    }

    let tmp = TempCaptureFile::new();
    let output = Command::new(backend.program())
        .args(backend.region_args(rect, &tmp.path))
        .output()
        .map_err(|e| CaptureError::CaptureFailed(format!("failed to run capture tool: {e}")))?;

    if !output.status.success() {
        return Err(CaptureError::CaptureFailed(format!(
            "{} failed: {}",
            backend.program(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let mut image = image::open(&tmp.path)?.to_rgba8();

    // HiDPI displays hand back more pixels than logical points; keep the logical size.
    if image.width() != rect.width || image.height() != rect.height {
        debug!(
            got_w = image.width(),
            got_h = image.height(),
            want_w = rect.width,
            want_h = rect.height,
            "resizing capture to logical region size"
        );
        image = image::imageops::resize(
            &image,
            rect.width,
            rect.height,
            image::imageops::FilterType::Triangle,
        );
    }

    debug!(region = %rect, "screen region captured");
    Ok(image)
}

/// Screen capture via external tools, with backend detection cached at construction.
pub struct CommandCapture {
    backend: Option<CaptureBackend>,
}

impl CommandCapture {
    /// Create a new capturer, probing for available backends.
    pub fn new() -> Self {
        Self {
            backend: detect_backend(),
        }
    }

    /// Use an explicit backend without probing.
    pub fn with_backend(backend: CaptureBackend) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    /// Whether screen capture is available.
    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }
}

impl Default for CommandCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl ScreenCapturer for CommandCapture {
    fn capture(&self, rect: &Rectangle) -> Result<RgbaImage, CaptureError> {
        let backend = self.backend.ok_or(CaptureError::NoBackendAvailable)?;
        capture_region(backend, rect)
    }
}

pub(crate) fn probe_command(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}
