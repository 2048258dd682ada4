use std::ffi::c_void;
use std::mem::size_of;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use windows::Win32::Foundation::{BOOL, HWND, LPARAM, RECT, TRUE};
use windows::Win32::Graphics::Gdi::{
    BitBlt, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject, EnumDisplayMonitors,
    GetDC, GetDIBits, GetMonitorInfoW, ReleaseDC, SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB,
    DIB_RGB_COLORS, HDC, HMONITOR, MONITORINFO, SRCCOPY,
};
use windows::Win32::UI::Input::KeyboardAndMouse::{
    SendInput, INPUT, INPUT_0, INPUT_MOUSE, MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP, MOUSEINPUT,
    MOUSE_EVENT_FLAGS,
};
use windows::Win32::UI::WindowsAndMessaging::SetCursorPos;

use super::{FrameSource, Injector, Platform};
use crate::logger;
use crate::types::{Frame, Point};

pub struct WindowsPlatform;

unsafe extern "system" fn collect_monitor(
    monitor: HMONITOR,
    _hdc: HDC,
    _clip: *mut RECT,
    data: LPARAM,
) -> BOOL {
    let rects = &mut *(data.0 as *mut Vec<RECT>);
    let mut info = MONITORINFO {
        cbSize: size_of::<MONITORINFO>() as u32,
        ..Default::default()
    };
    if GetMonitorInfoW(monitor, &mut info).as_bool() {
        rects.push(info.rcMonitor);
    }
    TRUE
}

/// Desktop rectangle of the `display`-th monitor, in enumeration order.
fn monitor_rect(display: u32) -> Result<RECT> {
    let mut rects: Vec<RECT> = Vec::new();
    unsafe {
        let _ = EnumDisplayMonitors(
            HDC::default(),
            None,
            Some(collect_monitor),
            LPARAM(&mut rects as *mut Vec<RECT> as isize),
        );
    }
    rects
        .get(display as usize)
        .copied()
        .with_context(|| format!("display {} not found ({} monitors)", display, rects.len()))
}

impl Platform for WindowsPlatform {
    fn name(&self) -> &'static str {
        "windows"
    }

    fn open_screen(&self, display: u32) -> Result<Box<dyn FrameSource>> {
        let rect = monitor_rect(display)?;
        logger::info_p(
            "windows",
            &format!(
                "capturing display {} at ({}, {}) {}x{}",
                display,
                rect.left,
                rect.top,
                rect.right - rect.left,
                rect.bottom - rect.top
            ),
        );
        Ok(Box::new(GdiScreen { rect }))
    }

    fn input(&self, display: u32) -> Result<Box<dyn Injector>> {
        let rect = monitor_rect(display)?;
        Ok(Box::new(SendInputInjector { left: rect.left, top: rect.top }))
    }
}

struct GdiScreen {
    rect: RECT,
}

impl FrameSource for GdiScreen {
    fn capture(&mut self) -> Result<Option<Frame>> {
        let width = self.rect.right - self.rect.left;
        let height = self.rect.bottom - self.rect.top;
        if width <= 0 || height <= 0 {
            return Ok(None);
        }

        let mut data = vec![0u8; (width * height * 4) as usize];
        unsafe {
            let screen = GetDC(HWND::default());
            if screen.is_invalid() {
                bail!("GetDC failed");
            }
            let mem = CreateCompatibleDC(screen);
            let bitmap = CreateCompatibleBitmap(screen, width, height);
            let previous = SelectObject(mem, bitmap);

            let blit = BitBlt(mem, 0, 0, width, height, screen, self.rect.left, self.rect.top, SRCCOPY);

            let mut info = BITMAPINFO {
                bmiHeader: BITMAPINFOHEADER {
                    biSize: size_of::<BITMAPINFOHEADER>() as u32,
                    biWidth: width,
                    // negative height: top-down rows
                    biHeight: -height,
                    biPlanes: 1,
                    biBitCount: 32,
                    biCompression: BI_RGB.0,
                    ..Default::default()
                },
                ..Default::default()
            };
            let lines = GetDIBits(
                mem,
                bitmap,
                0,
                height as u32,
                Some(data.as_mut_ptr() as *mut c_void),
                &mut info,
                DIB_RGB_COLORS,
            );

            SelectObject(mem, previous);
            let _ = DeleteObject(bitmap);
            let _ = DeleteDC(mem);
            ReleaseDC(HWND::default(), screen);

            blit.map_err(|e| anyhow!("BitBlt failed: {}", e))?;
            if lines == 0 {
                bail!("GetDIBits copied no lines");
            }
        }

        Ok(Some(Frame::new(data, width as u32, height as u32, width as u32 * 4)))
    }

    fn stop(&mut self) {
        logger::info_p("windows", "capture stopped");
    }
}

struct SendInputInjector {
    left: i32,
    top: i32,
}

fn mouse_input(flags: MOUSE_EVENT_FLAGS) -> INPUT {
    INPUT {
        r#type: INPUT_MOUSE,
        Anonymous: INPUT_0 {
            mi: MOUSEINPUT {
                dx: 0,
                dy: 0,
                mouseData: 0,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

impl Injector for SendInputInjector {
    fn click(&mut self, at: Point) -> Result<()> {
        let x = self.left + at.x;
        let y = self.top + at.y;
        unsafe {
            SetCursorPos(x, y).map_err(|e| anyhow!("SetCursorPos failed: {}", e))?;
        }
        thread::sleep(Duration::from_millis(50));

        let inputs = [mouse_input(MOUSEEVENTF_LEFTDOWN), mouse_input(MOUSEEVENTF_LEFTUP)];
        let sent = unsafe { SendInput(&inputs, size_of::<INPUT>() as i32) };
        if sent as usize != inputs.len() {
            bail!("SendInput injected {} of {} events (blocked by UIPI?)", sent, inputs.len());
        }

        logger::info_p("windows", &format!("click({}, {})", x, y));
        Ok(())
    }
}
