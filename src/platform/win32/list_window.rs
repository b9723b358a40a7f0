//! Process list window
//!
//! A plain window with one LISTBOX child. It starts hidden and is shown from
//! the tray or the hotkey; closing it only hides it. The window procedure
//! also receives tray callbacks and the notifications posted by the
//! dispatcher, so all UI work happens on the thread that created it.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::ffi::c_void;
use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use anyhow::Result;
use log::{debug, info, warn};
use parking_lot::Mutex;
use windows::core::{w, PCWSTR};
use windows::Win32::Foundation::{HWND, LPARAM, LRESULT, RECT, WPARAM};
use windows::Win32::Graphics::Gdi::{GetStockObject, DEFAULT_GUI_FONT, HBRUSH};
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::UI::WindowsAndMessaging::*;

use crate::config::SharedConfig;
use crate::events::{AppEvent, Notification, Observer};
use crate::process_table::SysinfoProcessTable;
use crate::registry::{ProcessRecord, SharedStore};
use crate::utils::{to_pcwstr, to_wide_string};

use super::desktop::window_owner_pids;
use super::tray::{MenuCommand, TrayIcon, TrayMenu};

const WINDOW_CLASS: &str = "ProcessFreezerListClass";
const WINDOW_TITLE: &str = "Process Freezer";
const LISTBOX_ID: usize = 100;
const EDIT_ID: usize = 101;
const ADD_BUTTON_ID: usize = 102;
const ENTRY_HEIGHT: i32 = 24;
const BUTTON_WIDTH: i32 = 72;

/// Custom window messages
pub const WM_APP_TRAY: u32 = WM_APP + 1;
pub const WM_APP_REFRESH: u32 = WM_APP + 2;
pub const WM_APP_TOGGLE: u32 = WM_APP + 3;
pub const WM_APP_ERROR: u32 = WM_APP + 4;

/// State used by the window procedure; lives on the UI thread only
pub struct UiState {
    pub store: SharedStore,
    pub settings: SharedConfig,
    pub events: Sender<AppEvent>,
    pub errors: Arc<Mutex<VecDeque<String>>>,
    pub processes: Arc<SysinfoProcessTable>,
    pub tray: Option<TrayIcon>,
    controls: Controls,
    rows: Vec<String>,
}

impl UiState {
    pub fn new(
        store: SharedStore,
        settings: SharedConfig,
        events: Sender<AppEvent>,
        errors: Arc<Mutex<VecDeque<String>>>,
        processes: Arc<SysinfoProcessTable>,
        tray: Option<TrayIcon>,
        controls: Controls,
    ) -> Self {
        Self {
            store,
            settings,
            events,
            errors,
            processes,
            tray,
            controls,
            rows: Vec::new(),
        }
    }

    fn send(&self, event: AppEvent) {
        if self.events.send(event).is_err() {
            warn!("Dispatcher is gone; dropping UI event");
        }
    }
}

thread_local! {
    static UI_STATE: RefCell<Option<UiState>> = const { RefCell::new(None) };
}

pub fn set_ui_state(state: UiState) {
    UI_STATE.with(|s| *s.borrow_mut() = Some(state));
}

/// Drop the UI state, removing the tray icon
pub fn clear_ui_state() {
    UI_STATE.with(|s| s.borrow_mut().take());
}

fn with_ui_state<R>(f: impl FnOnce(&mut UiState) -> R) -> Option<R> {
    UI_STATE.with(|s| s.borrow_mut().as_mut().map(f))
}

fn row_label(record: &ProcessRecord) -> String {
    let state = if record.desired_frozen { "[frozen]" } else { "[running]" };
    format!("{} {} ({})", state, record.display_name, record.identifier)
}

/// Parse the add field: `identifier` or `identifier, Display name`
fn parse_add_entry(text: &str) -> Option<(String, String)> {
    let (identifier, name) = match text.split_once(',') {
        Some((identifier, name)) => (identifier.trim(), name.trim()),
        None => (text.trim(), ""),
    };
    if identifier.is_empty() {
        return None;
    }
    let display_name = if name.is_empty() {
        crate::process_table::display_name_for(identifier)
    } else {
        name.to_string()
    };
    Some((identifier.to_string(), display_name))
}

/// Child controls of the list window
#[derive(Debug, Clone, Copy)]
pub struct Controls {
    listbox: HWND,
    edit: HWND,
    button: HWND,
}

impl Controls {
    /// Add field and button on top, list below
    fn layout(&self, width: i32, height: i32, repaint: bool) {
        let entry_width = (width - BUTTON_WIDTH).max(0);
        unsafe {
            let _ = MoveWindow(self.edit, 0, 0, entry_width, ENTRY_HEIGHT, repaint);
            let _ = MoveWindow(self.button, entry_width, 0, BUTTON_WIDTH, ENTRY_HEIGHT, repaint);
            let _ = MoveWindow(
                self.listbox,
                0,
                ENTRY_HEIGHT,
                width,
                (height - ENTRY_HEIGHT).max(0),
                repaint,
            );
        }
    }
}

/// The list window, its add field and its LISTBOX
pub struct ListWindow {
    hwnd: HWND,
    controls: Controls,
}

impl ListWindow {
    pub fn create() -> Result<Self> {
        let class_name = to_wide_string(WINDOW_CLASS);
        Self::register_window_class(&class_name)?;
        let title = to_wide_string(WINDOW_TITLE);

        unsafe {
            let hinstance = GetModuleHandleW(None)?;

            let hwnd = CreateWindowExW(
                WINDOW_EX_STYLE::default(),
                to_pcwstr(&class_name),
                to_pcwstr(&title),
                WS_OVERLAPPEDWINDOW,
                CW_USEDEFAULT,
                CW_USEDEFAULT,
                420,
                360,
                None,
                None,
                hinstance,
                None,
            )?;

            let listbox = CreateWindowExW(
                WS_EX_CLIENTEDGE,
                w!("LISTBOX"),
                PCWSTR::null(),
                WS_CHILD | WS_VISIBLE | WS_VSCROLL | WINDOW_STYLE(LBS_NOTIFY as u32),
                0,
                0,
                0,
                0,
                hwnd,
                HMENU(LISTBOX_ID as *mut c_void),
                hinstance,
                None,
            )?;

            let edit = CreateWindowExW(
                WS_EX_CLIENTEDGE,
                w!("EDIT"),
                PCWSTR::null(),
                WS_CHILD | WS_VISIBLE | WS_TABSTOP | WINDOW_STYLE(ES_AUTOHSCROLL as u32),
                0,
                0,
                0,
                0,
                hwnd,
                HMENU(EDIT_ID as *mut c_void),
                hinstance,
                None,
            )?;

            let button = CreateWindowExW(
                WINDOW_EX_STYLE::default(),
                w!("BUTTON"),
                w!("Add"),
                WS_CHILD | WS_VISIBLE | WS_TABSTOP | WINDOW_STYLE(BS_PUSHBUTTON as u32),
                0,
                0,
                0,
                0,
                hwnd,
                HMENU(ADD_BUTTON_ID as *mut c_void),
                hinstance,
                None,
            )?;

            let font = GetStockObject(DEFAULT_GUI_FONT);
            for control in [listbox, edit, button] {
                SendMessageW(control, WM_SETFONT, WPARAM(font.0 as usize), LPARAM(1));
            }

            // WM_SIZE from creation arrives before the UI state exists.
            let controls = Controls {
                listbox,
                edit,
                button,
            };
            let mut client = RECT::default();
            GetClientRect(hwnd, &mut client)?;
            controls.layout(client.right, client.bottom, false);

            info!("List window created");
            Ok(Self { hwnd, controls })
        }
    }

    fn register_window_class(class_name: &[u16]) -> Result<()> {
        unsafe {
            let hinstance = GetModuleHandleW(None)?;

            let wc = WNDCLASSEXW {
                cbSize: std::mem::size_of::<WNDCLASSEXW>() as u32,
                style: CS_HREDRAW | CS_VREDRAW,
                lpfnWndProc: Some(window_proc),
                hInstance: hinstance.into(),
                hCursor: LoadCursorW(None, IDC_ARROW)?,
                lpszClassName: to_pcwstr(class_name),
                hbrBackground: HBRUSH::default(),
                ..Default::default()
            };

            if RegisterClassExW(&wc) == 0 {
                return Err(anyhow::anyhow!("Failed to register window class"));
            }
        }
        Ok(())
    }

    pub fn hwnd(&self) -> HWND {
        self.hwnd
    }

    pub fn controls(&self) -> Controls {
        self.controls
    }

    pub fn run_message_loop(&self) -> Result<()> {
        unsafe {
            let mut msg = MSG::default();
            while GetMessageW(&mut msg, None, 0, 0).into() {
                let _ = TranslateMessage(&msg);
                DispatchMessageW(&msg);
            }
        }
        Ok(())
    }
}

impl Drop for ListWindow {
    fn drop(&mut self) {
        unsafe {
            if IsWindow(self.hwnd).as_bool() {
                let _ = DestroyWindow(self.hwnd);
            }
        }
    }
}

/// Observer that forwards notifications to the list window's thread
pub struct WindowNotifier {
    // HWND as isize so the notifier is Send + Sync
    hwnd: AtomicIsize,
    errors: Arc<Mutex<VecDeque<String>>>,
}

impl WindowNotifier {
    pub fn new(hwnd: HWND, errors: Arc<Mutex<VecDeque<String>>>) -> Self {
        Self {
            hwnd: AtomicIsize::new(hwnd.0 as isize),
            errors,
        }
    }

    fn post(&self, message: u32) {
        let hwnd = HWND(self.hwnd.load(Ordering::SeqCst) as *mut c_void);
        unsafe {
            if let Err(e) = PostMessageW(hwnd, message, WPARAM(0), LPARAM(0)) {
                debug!("Could not post message {:#x}: {}", message, e);
            }
        }
    }
}

impl Observer for WindowNotifier {
    fn notify(&self, notification: Notification) {
        match notification {
            Notification::Refresh => self.post(WM_APP_REFRESH),
            Notification::ToggleVisibility => self.post(WM_APP_TOGGLE),
            Notification::ActionFailed {
                identifier,
                message,
            } => {
                let text = match identifier {
                    Some(id) => format!("{}:\n{}", id, message),
                    None => message,
                };
                self.errors.lock().push_back(text);
                self.post(WM_APP_ERROR);
            }
            Notification::HotkeyUnavailable(message) => {
                self.errors
                    .lock()
                    .push_back(format!("The global hotkey is unavailable.\n{}", message));
                self.post(WM_APP_ERROR);
            }
        }
    }
}

fn refresh(ui: &mut UiState) {
    let (records, frozen) = {
        let store = ui.store.lock();
        (store.records().to_vec(), store.frozen_count())
    };

    unsafe {
        SendMessageW(ui.controls.listbox, LB_RESETCONTENT, WPARAM(0), LPARAM(0));
        for record in &records {
            let label = to_wide_string(&row_label(record));
            SendMessageW(
                ui.controls.listbox,
                LB_ADDSTRING,
                WPARAM(0),
                LPARAM(label.as_ptr() as isize),
            );
        }
    }
    ui.rows = records.iter().map(|r| r.identifier.clone()).collect();

    let tooltip = format!("{} - {} of {} frozen", WINDOW_TITLE, frozen, records.len());
    if let Some(tray) = ui.tray.as_mut() {
        if let Err(e) = tray.set_tooltip(&tooltip) {
            debug!("{}", e);
        }
    }
}

fn toggle_visibility(hwnd: HWND) {
    unsafe {
        if IsWindowVisible(hwnd).as_bool() {
            let _ = ShowWindow(hwnd, SW_HIDE);
        } else {
            let _ = ShowWindow(hwnd, SW_SHOW);
            let _ = SetForegroundWindow(hwnd);
        }
    }
}

fn show_errors(hwnd: HWND) {
    let pending: Vec<String> = with_ui_state(|ui| ui.errors.lock().drain(..).collect())
        .unwrap_or_default();
    for message in pending {
        let text = to_wide_string(&message);
        let caption = to_wide_string(WINDOW_TITLE);
        unsafe {
            MessageBoxW(
                hwnd,
                to_pcwstr(&text),
                to_pcwstr(&caption),
                MB_OK | MB_ICONWARNING,
            );
        }
    }
}

fn show_tray_menu(hwnd: HWND) {
    let Some((records, hide_on_freeze, processes)) = with_ui_state(|ui| {
        (
            ui.store.lock().records().to_vec(),
            ui.settings.read().hide_window_on_freeze,
            ui.processes.clone(),
        )
    }) else {
        return;
    };

    let running = processes.image_names(&window_owner_pids());
    let menu = TrayMenu::build(&records, &running, hide_on_freeze);
    let Some(id) = menu.show(hwnd) else {
        return;
    };

    match menu.command(id).cloned() {
        Some(MenuCommand::ShowList) => unsafe {
            let _ = ShowWindow(hwnd, SW_SHOW);
            let _ = SetForegroundWindow(hwnd);
        },
        Some(MenuCommand::Exit) => unsafe {
            info!("Exit requested from tray");
            let _ = DestroyWindow(hwnd);
        },
        Some(MenuCommand::SetHideOnFreeze(enabled)) => {
            with_ui_state(|ui| ui.send(AppEvent::SetHideOnFreeze(enabled)));
        }
        Some(MenuCommand::Toggle(id)) => {
            with_ui_state(|ui| ui.send(AppEvent::Toggle(id)));
        }
        Some(MenuCommand::Remove(id)) => {
            with_ui_state(|ui| ui.send(AppEvent::Remove(id)));
        }
        Some(MenuCommand::Add(image)) => {
            let display_name = crate::process_table::display_name_for(&image);
            with_ui_state(|ui| {
                ui.send(AppEvent::Add {
                    identifier: image,
                    display_name,
                })
            });
        }
        None => {}
    }
}

fn on_add_clicked() {
    with_ui_state(|ui| {
        let mut buffer = [0u16; 512];
        let len = unsafe { GetWindowTextW(ui.controls.edit, &mut buffer) };
        let text = String::from_utf16_lossy(&buffer[..len.max(0) as usize]);
        let Some((identifier, display_name)) = parse_add_entry(&text) else {
            debug!("Add field is empty");
            return;
        };
        ui.send(AppEvent::Add {
            identifier,
            display_name,
        });
        unsafe {
            let _ = SetWindowTextW(ui.controls.edit, w!(""));
        }
    });
}

fn on_list_double_click() {
    with_ui_state(|ui| {
        let selected =
            unsafe { SendMessageW(ui.controls.listbox, LB_GETCURSEL, WPARAM(0), LPARAM(0)) };
        let index = selected.0;
        if index < 0 {
            return;
        }
        if let Some(identifier) = ui.rows.get(index as usize).cloned() {
            debug!("List double-click on {:?}", identifier);
            ui.send(AppEvent::Toggle(identifier));
        }
    });
}

/// Window procedure for the list window
unsafe extern "system" fn window_proc(
    hwnd: HWND,
    msg: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    match msg {
        WM_SIZE => {
            let width = (lparam.0 & 0xFFFF) as i32;
            let height = ((lparam.0 >> 16) & 0xFFFF) as i32;
            with_ui_state(|ui| ui.controls.layout(width, height, true));
            LRESULT(0)
        }

        WM_COMMAND => {
            let control_id = wparam.0 & 0xFFFF;
            let notification = ((wparam.0 >> 16) & 0xFFFF) as u32;
            match control_id {
                LISTBOX_ID if notification == LBN_DBLCLK => on_list_double_click(),
                ADD_BUTTON_ID if notification == BN_CLICKED => on_add_clicked(),
                _ => {}
            }
            LRESULT(0)
        }

        WM_CLOSE => {
            // Closing hides to the tray.
            let _ = ShowWindow(hwnd, SW_HIDE);
            LRESULT(0)
        }

        WM_DESTROY => {
            PostQuitMessage(0);
            LRESULT(0)
        }

        WM_APP_TRAY => {
            match (lparam.0 & 0xFFFF) as u32 {
                WM_LBUTTONUP => toggle_visibility(hwnd),
                WM_RBUTTONUP => show_tray_menu(hwnd),
                _ => {}
            }
            LRESULT(0)
        }

        WM_APP_REFRESH => {
            with_ui_state(refresh);
            LRESULT(0)
        }

        WM_APP_TOGGLE => {
            toggle_visibility(hwnd);
            LRESULT(0)
        }

        WM_APP_ERROR => {
            show_errors(hwnd);
            LRESULT(0)
        }

        _ => DefWindowProcW(hwnd, msg, wparam, lparam),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_show_state_name_and_identifier() {
        let record = ProcessRecord {
            identifier: "notepad.exe".into(),
            display_name: "Notepad".into(),
            desired_frozen: true,
        };
        assert_eq!(row_label(&record), "[frozen] Notepad (notepad.exe)");
    }

    #[test]
    fn add_field_accepts_identifier_and_optional_name() {
        assert_eq!(
            parse_add_entry(" game.exe , My Game "),
            Some(("game.exe".to_string(), "My Game".to_string()))
        );
        assert_eq!(
            parse_add_entry("notepad.exe"),
            Some(("notepad.exe".to_string(), "Notepad".to_string()))
        );
        assert_eq!(
            parse_add_entry("1234,"),
            Some(("1234".to_string(), "1234".to_string()))
        );
        assert_eq!(parse_add_entry("  "), None);
        assert_eq!(parse_add_entry(", name only"), None);
    }
}
