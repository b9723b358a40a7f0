//! Win32 window primitives for the window hider

use std::ffi::c_void;

use windows::Win32::Foundation::{BOOL, HWND, LPARAM};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetForegroundWindow, GetWindow, GetWindowThreadProcessId, IsWindow,
    IsWindowVisible, SetForegroundWindow, ShowWindow, GW_OWNER, SW_HIDE, SW_SHOWNA,
};

use crate::error::{FreezerError, FreezerResult};
use crate::hider::{WindowHandle, WindowSystem};

fn to_hwnd(window: WindowHandle) -> HWND {
    HWND(window.0 as *mut c_void)
}

fn to_handle(hwnd: HWND) -> WindowHandle {
    WindowHandle(hwnd.0 as isize)
}

fn owning_pid(hwnd: HWND) -> u32 {
    let mut pid = 0u32;
    unsafe { GetWindowThreadProcessId(hwnd, Some(&mut pid)) };
    pid
}

/// Real desktop, via user32
#[derive(Debug, Default)]
pub struct Win32WindowSystem;

impl Win32WindowSystem {
    pub fn new() -> Self {
        Self
    }

    fn check_alive(window: WindowHandle) -> FreezerResult<HWND> {
        let hwnd = to_hwnd(window);
        if unsafe { IsWindow(hwnd) }.as_bool() {
            Ok(hwnd)
        } else {
            Err(FreezerError::WindowOperationFailed(format!(
                "window {:#x} no longer exists",
                window.0
            )))
        }
    }
}

struct PidWindows {
    pid: u32,
    found: Vec<WindowHandle>,
}

unsafe extern "system" fn collect_pid_windows(hwnd: HWND, lparam: LPARAM) -> BOOL {
    // SAFETY: lparam points at the PidWindows owned by `visible_windows`,
    // which outlives the synchronous EnumWindows call.
    let state = &mut *(lparam.0 as *mut PidWindows);
    if IsWindowVisible(hwnd).as_bool() && owning_pid(hwnd) == state.pid {
        state.found.push(to_handle(hwnd));
    }
    BOOL(1)
}

unsafe extern "system" fn collect_app_window_pids(hwnd: HWND, lparam: LPARAM) -> BOOL {
    let pids = &mut *(lparam.0 as *mut Vec<u32>);
    let unowned = GetWindow(hwnd, GW_OWNER).map_or(true, |owner| owner.0.is_null());
    if unowned && IsWindowVisible(hwnd).as_bool() {
        let pid = owning_pid(hwnd);
        if pid != 0 && !pids.contains(&pid) {
            pids.push(pid);
        }
    }
    BOOL(1)
}

impl WindowSystem for Win32WindowSystem {
    fn visible_windows(&self, pid: u32) -> FreezerResult<Vec<WindowHandle>> {
        let mut state = PidWindows {
            pid,
            found: Vec::new(),
        };
        unsafe {
            EnumWindows(
                Some(collect_pid_windows),
                LPARAM(&mut state as *mut _ as isize),
            )?;
        }
        Ok(state.found)
    }

    fn foreground_window(&self) -> Option<WindowHandle> {
        let hwnd = unsafe { GetForegroundWindow() };
        (!hwnd.0.is_null()).then(|| to_handle(hwnd))
    }

    fn hide(&self, window: WindowHandle) -> FreezerResult<()> {
        let hwnd = Self::check_alive(window)?;
        // Return value is the previous visibility, not an error indicator.
        let _ = unsafe { ShowWindow(hwnd, SW_HIDE) };
        Ok(())
    }

    fn show(&self, window: WindowHandle) -> FreezerResult<()> {
        let hwnd = Self::check_alive(window)?;
        let _ = unsafe { ShowWindow(hwnd, SW_SHOWNA) };
        Ok(())
    }

    fn set_foreground(&self, window: WindowHandle) -> FreezerResult<()> {
        let hwnd = Self::check_alive(window)?;
        if unsafe { SetForegroundWindow(hwnd) }.as_bool() {
            Ok(())
        } else {
            Err(FreezerError::WindowOperationFailed(format!(
                "could not focus window {:#x}",
                window.0
            )))
        }
    }
}

/// Pids owning at least one visible application window, excluding this process
pub fn window_owner_pids() -> Vec<u32> {
    let mut pids: Vec<u32> = Vec::new();
    unsafe {
        let _ = EnumWindows(
            Some(collect_app_window_pids),
            LPARAM(&mut pids as *mut _ as isize),
        );
    }
    let me = std::process::id();
    pids.retain(|pid| *pid != me);
    pids
}
