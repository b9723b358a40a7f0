//! Global chord through a low-level keyboard hook
//!
//! The hook lives on its own thread with a message loop, as low-level hooks
//! require. The chord key is swallowed on press and the callback fires on
//! release. Only one hook exists per process.

use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use log::{debug, info, warn};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use windows::Win32::Foundation::{LPARAM, LRESULT, WPARAM};
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::Input::KeyboardAndMouse::{
    GetAsyncKeyState, VIRTUAL_KEY, VK_CONTROL, VK_LWIN, VK_MENU, VK_RWIN, VK_SHIFT,
};
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, GetMessageW, PostThreadMessageW, SetWindowsHookExW, UnhookWindowsHookEx,
    KBDLLHOOKSTRUCT, MSG, WH_KEYBOARD_LL, WM_KEYDOWN, WM_KEYUP, WM_QUIT, WM_SYSKEYDOWN,
    WM_SYSKEYUP,
};

use crate::error::{FreezerError, FreezerResult};
use crate::hotkey::{Chord, HotkeyBackend, HotkeyCallback, Modifiers};

struct ActiveChord {
    chord: Chord,
    callback: HotkeyCallback,
    pressed: bool,
}

static ACTIVE: Lazy<Mutex<Option<ActiveChord>>> = Lazy::new(|| Mutex::new(None));
// Hook handle as raw isize; zero when no hook is installed
static HOOK_HANDLE_RAW: AtomicIsize = AtomicIsize::new(0);

/// `HotkeyBackend` backed by `WH_KEYBOARD_LL`
#[derive(Default)]
pub struct KeyboardHookBackend {
    thread_id: u32,
    thread: Option<JoinHandle<()>>,
}

impl KeyboardHookBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HotkeyBackend for KeyboardHookBackend {
    fn install(&mut self, chord: &Chord, callback: HotkeyCallback) -> FreezerResult<()> {
        self.uninstall();

        *ACTIVE.lock() = Some(ActiveChord {
            chord: chord.clone(),
            callback,
            pressed: false,
        });

        let (ready_tx, ready_rx) = mpsc::channel();
        let thread = thread::Builder::new()
            .name("keyboard-hook".into())
            .spawn(move || hook_thread(ready_tx))?;

        match ready_rx.recv() {
            Ok(Ok(thread_id)) => {
                info!("Keyboard hook installed for {}", chord);
                self.thread_id = thread_id;
                self.thread = Some(thread);
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                *ACTIVE.lock() = None;
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                *ACTIVE.lock() = None;
                Err(FreezerError::HotkeyRegistrationFailed(
                    "keyboard hook thread exited early".into(),
                ))
            }
        }
    }

    fn uninstall(&mut self) {
        if let Some(thread) = self.thread.take() {
            unsafe {
                if let Err(e) = PostThreadMessageW(self.thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) {
                    warn!("Could not stop keyboard hook thread: {}", e);
                }
            }
            let _ = thread.join();
            debug!("Keyboard hook removed");
        }
        *ACTIVE.lock() = None;
    }

    fn is_installed(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
            && HOOK_HANDLE_RAW.load(Ordering::SeqCst) != 0
    }
}

impl Drop for KeyboardHookBackend {
    fn drop(&mut self) {
        self.uninstall();
    }
}

fn hook_thread(ready: mpsc::Sender<FreezerResult<u32>>) {
    let installed = unsafe { SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_hook_proc), None, 0) };
    let hook = match installed {
        Ok(hook) => hook,
        Err(e) => {
            let _ = ready.send(Err(FreezerError::HotkeyRegistrationFailed(e.to_string())));
            return;
        }
    };
    HOOK_HANDLE_RAW.store(hook.0 as isize, Ordering::SeqCst);
    let _ = ready.send(Ok(unsafe { GetCurrentThreadId() }));

    unsafe {
        let mut msg = MSG::default();
        // 0 on WM_QUIT, -1 on error
        while GetMessageW(&mut msg, None, 0, 0).0 > 0 {}
    }

    HOOK_HANDLE_RAW.store(0, Ordering::SeqCst);
    unsafe {
        let _ = UnhookWindowsHookEx(hook);
    }
}

fn key_held(vk: VIRTUAL_KEY) -> bool {
    // High bit set means the key is down.
    unsafe { GetAsyncKeyState(vk.0 as i32) < 0 }
}

fn modifiers_match(expected: &Modifiers) -> bool {
    key_held(VK_CONTROL) == expected.ctrl
        && key_held(VK_MENU) == expected.alt
        && key_held(VK_SHIFT) == expected.shift
        && (key_held(VK_LWIN) || key_held(VK_RWIN)) == expected.win
}

/// Low-level keyboard hook procedure
unsafe extern "system" fn keyboard_hook_proc(code: i32, wparam: WPARAM, lparam: LPARAM) -> LRESULT {
    if code >= 0 {
        let kb_struct = &*(lparam.0 as *const KBDLLHOOKSTRUCT);
        let message = wparam.0 as u32;
        let is_down = message == WM_KEYDOWN || message == WM_SYSKEYDOWN;
        let is_up = message == WM_KEYUP || message == WM_SYSKEYUP;

        let mut swallow = false;
        let mut fire = None;
        if let Some(active) = ACTIVE.lock().as_mut() {
            if kb_struct.vkCode == active.chord.key {
                if is_down && (active.pressed || modifiers_match(&active.chord.modifiers)) {
                    active.pressed = true;
                    swallow = true;
                } else if is_up && active.pressed {
                    active.pressed = false;
                    swallow = true;
                    fire = Some(active.callback.clone());
                }
            }
        }

        // Called outside the lock; the callback only queues an event.
        if let Some(callback) = fire {
            callback();
        }
        if swallow {
            return LRESULT(1);
        }
    }

    CallNextHookEx(None, code, wparam, lparam)
}
