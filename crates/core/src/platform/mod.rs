pub mod hotkey;
pub mod stub;

#[cfg(target_os = "macos")]
pub mod darwin;

#[cfg(target_os = "windows")]
pub mod win32;

use anyhow::Result;

use crate::logger;
use crate::types::{Frame, Point};

/// Supplies the latest screen frame.
pub trait FrameSource: Send {
    /// Best-effort latest frame; `Ok(None)` when nothing is ready yet.
    fn capture(&mut self) -> Result<Option<Frame>>;
    /// Release capture resources.
    fn stop(&mut self) {}
}

/// Performs pointer actions at frame coordinates.
pub trait Injector: Send {
    /// Move the pointer to `at` (relative to the captured display) and left-click once.
    fn click(&mut self, at: Point) -> Result<()>;
}

/// Platform-level factory for the capture and input collaborators.
pub trait Platform {
    fn name(&self) -> &'static str;
    fn open_screen(&self, display: u32) -> Result<Box<dyn FrameSource>>;
    fn input(&self, display: u32) -> Result<Box<dyn Injector>>;
}

/// Create the platform appropriate for the current OS.
pub fn create_platform(force_stub: bool) -> Box<dyn Platform> {
    if force_stub {
        logger::register_prefix("stub", logger::COLOR_GRAY);
        return Box::new(stub::StubPlatform::default());
    }
    #[cfg(target_os = "macos")]
    {
        logger::register_prefix("darwin", logger::COLOR_GRAY);
        return Box::new(darwin::DarwinPlatform);
    }
    #[cfg(target_os = "windows")]
    {
        logger::register_prefix("windows", logger::COLOR_GRAY);
        return Box::new(win32::WindowsPlatform);
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        logger::register_prefix("stub", logger::COLOR_GRAY);
        logger::warn("no native capture on this OS, falling back to stub platform");
        Box::new(stub::StubPlatform::default())
    }
}
