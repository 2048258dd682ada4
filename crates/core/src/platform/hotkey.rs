//! Global pause hotkey, usable while the game window has focus.
//!
//! The listener thread only raises a flag; the controller polls and clears it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Human-readable name of the hotkey on this OS.
#[cfg(target_os = "macos")]
pub const HOTKEY_LABEL: &str = "Cmd+Shift+P";
#[cfg(target_os = "windows")]
pub const HOTKEY_LABEL: &str = "Ctrl+Shift+P";
#[cfg(not(any(target_os = "macos", target_os = "windows")))]
pub const HOTKEY_LABEL: &str = "(none)";

/// Consume a pending press.
pub fn take(flag: &AtomicBool) -> bool {
    flag.swap(false, Ordering::AcqRel)
}

#[cfg(target_os = "macos")]
pub fn start_hotkey_listener(flag: Arc<AtomicBool>) {
    use core_foundation::runloop::{kCFRunLoopCommonModes, CFRunLoop};
    use core_graphics::event::{
        CGEventFlags, CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement,
        CGEventType, EventField,
    };

    const KEYCODE_P: i64 = 35;

    std::thread::spawn(move || {
        let tap = CGEventTap::new(
            CGEventTapLocation::HID,
            CGEventTapPlacement::HeadInsertEventTap,
            CGEventTapOptions::ListenOnly,
            vec![CGEventType::KeyDown],
            move |_proxy, _kind, event| {
                let flags = event.get_flags();
                let keycode = event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE);
                if keycode == KEYCODE_P
                    && flags.contains(CGEventFlags::CGEventFlagCommand)
                    && flags.contains(CGEventFlags::CGEventFlagShift)
                    && !flags.contains(CGEventFlags::CGEventFlagAlternate)
                    && !flags.contains(CGEventFlags::CGEventFlagControl)
                {
                    flag.store(true, Ordering::Release);
                }
                None
            },
        );

        let tap = match tap {
            Ok(t) => t,
            Err(()) => {
                crate::logger::error(
                    "failed to create event tap for the pause hotkey, \
                     grant Accessibility permission to your terminal",
                );
                return;
            }
        };

        let Ok(source) = tap.mach_port.create_runloop_source(0) else {
            crate::logger::error("failed to attach pause hotkey to run loop");
            return;
        };
        unsafe {
            CFRunLoop::get_current().add_source(&source, kCFRunLoopCommonModes);
        }
        tap.enable();
        crate::logger::info(&format!("pause hotkey {} registered", HOTKEY_LABEL));
        CFRunLoop::run_current(); // blocks for the process lifetime
    });
}

#[cfg(target_os = "windows")]
pub fn start_hotkey_listener(flag: Arc<AtomicBool>) {
    use windows::Win32::Foundation::HWND;
    use windows::Win32::UI::Input::KeyboardAndMouse::{
        RegisterHotKey, MOD_CONTROL, MOD_NOREPEAT, MOD_SHIFT, VK_P,
    };
    use windows::Win32::UI::WindowsAndMessaging::{GetMessageW, MSG, WM_HOTKEY};

    const HOTKEY_ID: i32 = 0x5053;

    std::thread::spawn(move || unsafe {
        // Registration binds the hotkey to this thread's message queue.
        if let Err(e) = RegisterHotKey(
            HWND::default(),
            HOTKEY_ID,
            MOD_CONTROL | MOD_SHIFT | MOD_NOREPEAT,
            VK_P.0 as u32,
        ) {
            crate::logger::error(&format!(
                "failed to register pause hotkey {}: {}",
                HOTKEY_LABEL, e
            ));
            return;
        }
        crate::logger::info(&format!("pause hotkey {} registered", HOTKEY_LABEL));

        let mut msg = MSG::default();
        while GetMessageW(&mut msg, HWND::default(), 0, 0).0 > 0 {
            if msg.message == WM_HOTKEY && msg.wParam.0 == HOTKEY_ID as usize {
                flag.store(true, Ordering::Release);
            }
        }
    });
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
pub fn start_hotkey_listener(_flag: Arc<AtomicBool>) {
    // Global hotkeys not supported on this platform
}
