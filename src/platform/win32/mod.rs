//! Win32 desktop, hotkey and tray integration

pub mod desktop;
pub mod keyboard_hook;
pub mod list_window;
pub mod tray;
