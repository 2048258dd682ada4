use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};

use super::{FrameSource, Injector, Platform};
use crate::logger;
use crate::types::{Frame, Point};

/// Click log shared between a stub injector and whoever inspects it.
pub type ClickLog = Arc<Mutex<Vec<Point>>>;

/// Synthetic screen and input, used by `--stub` and tests.
#[derive(Clone)]
pub struct StubPlatform {
    width: u32,
    height: u32,
    gap_every: u64,
    fail_capture_at: Option<u64>,
    truncate_frames: bool,
    fail_clicks: bool,
    clicks: ClickLog,
}

impl Default for StubPlatform {
    fn default() -> Self {
        Self {
            width: 320,
            height: 180,
            gap_every: 0,
            fail_capture_at: None,
            truncate_frames: false,
            fail_clicks: false,
            clicks: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl StubPlatform {
    /// Every n-th capture returns no frame (0 = never).
    pub fn with_gap_every(mut self, n: u64) -> Self {
        self.gap_every = n;
        self
    }

    /// Capture number (1-based) that fails with an error.
    pub fn failing_capture_at(mut self, n: u64) -> Self {
        self.fail_capture_at = Some(n);
        self
    }

    /// Hand out frames whose buffer is shorter than their dimensions.
    pub fn with_truncated_frames(mut self) -> Self {
        self.truncate_frames = true;
        self
    }

    /// Make every click fail.
    pub fn with_failing_clicks(mut self) -> Self {
        self.fail_clicks = true;
        self
    }

    pub fn clicks(&self) -> ClickLog {
        Arc::clone(&self.clicks)
    }
}

impl Platform for StubPlatform {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn open_screen(&self, display: u32) -> Result<Box<dyn FrameSource>> {
        logger::info_p("stub", &format!("open_screen({}) {}x{}", display, self.width, self.height));
        Ok(Box::new(StubScreen {
            width: self.width,
            height: self.height,
            gap_every: self.gap_every,
            fail_at: self.fail_capture_at,
            truncate: self.truncate_frames,
            captures: 0,
        }))
    }

    fn input(&self, _display: u32) -> Result<Box<dyn Injector>> {
        Ok(Box::new(StubInput {
            clicks: Arc::clone(&self.clicks),
            fail: self.fail_clicks,
        }))
    }
}

pub struct StubScreen {
    width: u32,
    height: u32,
    gap_every: u64,
    fail_at: Option<u64>,
    truncate: bool,
    captures: u64,
}

impl FrameSource for StubScreen {
    fn capture(&mut self) -> Result<Option<Frame>> {
        self.captures += 1;
        if self.fail_at == Some(self.captures) {
            bail!("stub capture device lost at capture {}", self.captures);
        }
        if self.gap_every > 0 && self.captures % self.gap_every == 0 {
            return Ok(None);
        }
        let mut frame = Frame::filled(self.width, self.height, [40, 40, 40, 255]);
        if self.truncate {
            frame.data.truncate(frame.data.len() / 2);
        }
        Ok(Some(frame))
    }

    fn stop(&mut self) {
        logger::info_p("stub", &format!("screen stopped after {} capture(s)", self.captures));
    }
}

pub struct StubInput {
    clicks: ClickLog,
    fail: bool,
}

impl Injector for StubInput {
    fn click(&mut self, at: Point) -> Result<()> {
        if self.fail {
            bail!("stub input rejected click at ({}, {})", at.x, at.y);
        }
        logger::info_p("stub", &format!("click({}, {})", at.x, at.y));
        self.clicks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gaps_and_failure() {
        let platform = StubPlatform::default().with_gap_every(2).failing_capture_at(3);
        let mut screen = platform.open_screen(0).unwrap();
        assert!(screen.capture().unwrap().is_some());
        assert!(screen.capture().unwrap().is_none());
        assert!(screen.capture().is_err());
    }

    #[test]
    fn test_truncated_frames() {
        let platform = StubPlatform::default().with_truncated_frames();
        let frame = platform.open_screen(0).unwrap().capture().unwrap().unwrap();
        assert!(!frame.is_well_formed());
    }

    #[test]
    fn test_clicks_recorded() {
        let platform = StubPlatform::default();
        let log = platform.clicks();
        let mut input = platform.input(0).unwrap();
        input.click(Point { x: 3, y: 4 }).unwrap();
        assert_eq!(*log.lock().unwrap(), vec![Point { x: 3, y: 4 }]);
    }

    #[test]
    fn test_failing_clicks() {
        let platform = StubPlatform::default().with_failing_clicks();
        assert!(platform.input(0).unwrap().click(Point { x: 0, y: 0 }).is_err());
        assert!(platform.clicks().lock().unwrap().is_empty());
    }
}
