use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use core_graphics::display::{CGDirectDisplayID, CGDisplay};
use core_graphics::event::{CGEvent, CGEventTapLocation, CGEventType, CGMouseButton};
use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
use core_graphics::geometry::{CGPoint, CGRect};
use core_graphics::window::{
    create_image, kCGNullWindowID, kCGWindowImageNominalResolution, kCGWindowListOptionOnScreenOnly,
};

use super::{FrameSource, Injector, Platform};
use crate::logger;
use crate::types::{Frame, Point};

pub struct DarwinPlatform;

fn display_bounds(display: u32) -> Result<CGRect> {
    let ids: Vec<CGDirectDisplayID> = CGDisplay::active_displays()
        .map_err(|e| anyhow!("CGGetActiveDisplayList failed: {}", e))?;
    let id = ids
        .get(display as usize)
        .copied()
        .with_context(|| format!("display {} not found ({} active)", display, ids.len()))?;
    Ok(CGDisplay::new(id).bounds())
}

impl Platform for DarwinPlatform {
    fn name(&self) -> &'static str {
        "darwin"
    }

    fn open_screen(&self, display: u32) -> Result<Box<dyn FrameSource>> {
        let bounds = display_bounds(display)?;
        logger::info_p(
            "darwin",
            &format!(
                "capturing display {} at ({}, {}) {}x{}",
                display, bounds.origin.x, bounds.origin.y, bounds.size.width, bounds.size.height
            ),
        );
        Ok(Box::new(DarwinScreen { bounds }))
    }

    fn input(&self, display: u32) -> Result<Box<dyn Injector>> {
        let bounds = display_bounds(display)?;
        Ok(Box::new(DarwinInput { origin: bounds.origin }))
    }
}

struct DarwinScreen {
    bounds: CGRect,
}

impl FrameSource for DarwinScreen {
    fn capture(&mut self) -> Result<Option<Frame>> {
        // Nominal resolution keeps frame pixels equal to event points on Retina panels.
        let Some(image) = create_image(
            self.bounds,
            kCGWindowListOptionOnScreenOnly,
            kCGNullWindowID,
            kCGWindowImageNominalResolution,
        ) else {
            return Ok(None);
        };

        let width = image.width() as u32;
        let height = image.height() as u32;
        let bytes_per_row = image.bytes_per_row() as u32;
        if width == 0 || height == 0 {
            return Ok(None);
        }
        let data = image.data().bytes().to_vec();

        Ok(Some(Frame::new(data, width, height, bytes_per_row)))
    }

    fn stop(&mut self) {
        logger::info_p("darwin", "capture stopped");
    }
}

struct DarwinInput {
    origin: CGPoint,
}

impl DarwinInput {
    fn post(&self, kind: CGEventType, point: CGPoint) -> Result<()> {
        let source = CGEventSource::new(CGEventSourceStateID::HIDSystemState)
            .map_err(|_| anyhow!("cannot create event source (Accessibility permission?)"))?;
        let event = CGEvent::new_mouse_event(source, kind, point, CGMouseButton::Left)
            .map_err(|_| anyhow!("cannot create mouse event"))?;
        event.post(CGEventTapLocation::HID);
        Ok(())
    }
}

impl Injector for DarwinInput {
    fn click(&mut self, at: Point) -> Result<()> {
        let point = CGPoint::new(self.origin.x + at.x as f64, self.origin.y + at.y as f64);

        self.post(CGEventType::MouseMoved, point)?;
        thread::sleep(Duration::from_millis(50));
        self.post(CGEventType::LeftMouseDown, point)?;
        thread::sleep(Duration::from_millis(15));
        self.post(CGEventType::LeftMouseUp, point)?;

        logger::info_p("darwin", &format!("click({}, {})", point.x, point.y));
        Ok(())
    }
}
