//! System tray icon and its context menu

use std::collections::HashMap;

use anyhow::Result;
use log::{debug, info};
use windows::core::PCWSTR;
use windows::Win32::Foundation::{HWND, LPARAM, POINT, WPARAM};
use windows::Win32::UI::Shell::{
    Shell_NotifyIconW, NIF_ICON, NIF_MESSAGE, NIF_TIP, NIM_ADD, NIM_DELETE, NIM_MODIFY,
    NOTIFYICONDATAW,
};
use windows::Win32::UI::WindowsAndMessaging::{
    AppendMenuW, CreatePopupMenu, DestroyMenu, GetCursorPos, LoadImageW, PostMessageW,
    SetForegroundWindow, TrackPopupMenu, HICON, HMENU, IDI_APPLICATION, IMAGE_ICON,
    LR_DEFAULTSIZE, LR_SHARED, MENU_ITEM_FLAGS, MF_CHECKED, MF_GRAYED, MF_POPUP, MF_SEPARATOR,
    MF_STRING, TPM_RETURNCMD, TPM_RIGHTBUTTON, WM_NULL,
};

use crate::registry::ProcessRecord;
use crate::utils::{to_wide_string, truncate_string};

use super::list_window::WM_APP_TRAY;

/// Tray icon identifier
const TRAY_ICON_ID: u32 = 1;

/// `szTip` holds 128 UTF-16 units including the terminator
const TOOLTIP_MAX_CHARS: usize = 127;

fn copy_tooltip(dst: &mut [u16; 128], text: &str) {
    let tooltip = to_wide_string(&truncate_string(text, TOOLTIP_MAX_CHARS));
    let len = tooltip.len().min(dst.len());
    dst[..len].copy_from_slice(&tooltip[..len]);
    dst[dst.len() - 1] = 0;
}

/// System tray icon bound to the list window
pub struct TrayIcon {
    hwnd: HWND,
    icon: HICON,
    is_added: bool,
}

impl TrayIcon {
    pub fn new(hwnd: HWND, tooltip: &str) -> Result<Self> {
        let icon = Self::load_default_icon()?;
        let mut tray = Self {
            hwnd,
            icon,
            is_added: false,
        };
        tray.add(tooltip)?;
        Ok(tray)
    }

    fn load_default_icon() -> Result<HICON> {
        unsafe {
            let icon = LoadImageW(
                None,
                IDI_APPLICATION,
                IMAGE_ICON,
                0,
                0,
                LR_DEFAULTSIZE | LR_SHARED,
            )?;
            Ok(HICON(icon.0))
        }
    }

    fn add(&mut self, tooltip: &str) -> Result<()> {
        let mut nid = NOTIFYICONDATAW {
            cbSize: std::mem::size_of::<NOTIFYICONDATAW>() as u32,
            hWnd: self.hwnd,
            uID: TRAY_ICON_ID,
            uFlags: NIF_ICON | NIF_MESSAGE | NIF_TIP,
            uCallbackMessage: WM_APP_TRAY,
            hIcon: self.icon,
            ..Default::default()
        };
        copy_tooltip(&mut nid.szTip, tooltip);

        unsafe {
            if !Shell_NotifyIconW(NIM_ADD, &nid).as_bool() {
                return Err(anyhow::anyhow!("Failed to add tray icon"));
            }
        }

        self.is_added = true;
        info!("Tray icon added");
        Ok(())
    }

    fn remove(&mut self) {
        if !self.is_added {
            return;
        }

        let nid = NOTIFYICONDATAW {
            cbSize: std::mem::size_of::<NOTIFYICONDATAW>() as u32,
            hWnd: self.hwnd,
            uID: TRAY_ICON_ID,
            ..Default::default()
        };

        unsafe {
            let _ = Shell_NotifyIconW(NIM_DELETE, &nid);
        }
        self.is_added = false;
        info!("Tray icon removed");
    }

    pub fn set_tooltip(&mut self, text: &str) -> Result<()> {
        if !self.is_added {
            return Ok(());
        }

        let mut nid = NOTIFYICONDATAW {
            cbSize: std::mem::size_of::<NOTIFYICONDATAW>() as u32,
            hWnd: self.hwnd,
            uID: TRAY_ICON_ID,
            uFlags: NIF_TIP,
            ..Default::default()
        };
        copy_tooltip(&mut nid.szTip, text);

        unsafe {
            if !Shell_NotifyIconW(NIM_MODIFY, &nid).as_bool() {
                return Err(anyhow::anyhow!("Failed to update tray tooltip"));
            }
        }
        Ok(())
    }
}

impl Drop for TrayIcon {
    fn drop(&mut self) {
        // The icon is shared (LR_SHARED) and must not be destroyed.
        self.remove();
    }
}

/// What a tray menu item does
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuCommand {
    ShowList,
    SetHideOnFreeze(bool),
    Toggle(String),
    Remove(String),
    Add(String),
    Exit,
}

enum MenuEntry {
    Item {
        id: u32,
        label: String,
        checked: bool,
        disabled: bool,
    },
    Separator,
    Submenu {
        label: String,
        entries: Vec<MenuEntry>,
    },
}

const ID_SHOW_LIST: u32 = 1;
const ID_HIDE_ON_FREEZE: u32 = 2;
const ID_EXIT: u32 = 100;
const ID_PROCESS_BASE: u32 = 1000;
const ID_ADD_BASE: u32 = 5000;
// Each process takes two ids below ID_ADD_BASE.
const MAX_MENU_PROCESSES: usize = ((ID_ADD_BASE - ID_PROCESS_BASE) / 2) as usize;
const MAX_ADD_ENTRIES: usize = 500;

fn overflow_entry(hidden: usize) -> MenuEntry {
    MenuEntry::Item {
        id: 0,
        label: format!("({} more in the list window)", hidden),
        checked: false,
        disabled: true,
    }
}

/// Tray context menu built from the current registry
pub struct TrayMenu {
    entries: Vec<MenuEntry>,
    commands: HashMap<u32, MenuCommand>,
}

impl TrayMenu {
    /// `running` lists image names offered under "Add running process"
    pub fn build(records: &[ProcessRecord], running: &[String], hide_on_freeze: bool) -> Self {
        let mut entries = Vec::new();
        let mut commands = HashMap::new();

        for (i, record) in records.iter().take(MAX_MENU_PROCESSES).enumerate() {
            let toggle_id = ID_PROCESS_BASE + (i as u32) * 2;
            let remove_id = toggle_id + 1;
            commands.insert(toggle_id, MenuCommand::Toggle(record.identifier.clone()));
            commands.insert(remove_id, MenuCommand::Remove(record.identifier.clone()));

            entries.push(MenuEntry::Submenu {
                label: format!("{} ({})", record.display_name, record.identifier),
                entries: vec![
                    MenuEntry::Item {
                        id: toggle_id,
                        label: "Frozen".to_string(),
                        checked: record.desired_frozen,
                        disabled: false,
                    },
                    MenuEntry::Item {
                        id: remove_id,
                        label: "Remove".to_string(),
                        checked: false,
                        disabled: false,
                    },
                ],
            });
        }

        if records.len() > MAX_MENU_PROCESSES {
            entries.push(overflow_entry(records.len() - MAX_MENU_PROCESSES));
        }

        let candidates: Vec<&String> = running
            .iter()
            .filter(|name| {
                !records
                    .iter()
                    .any(|r| r.identifier.eq_ignore_ascii_case(name))
            })
            .collect();
        let mut add_entries = Vec::new();
        for (i, name) in candidates.iter().take(MAX_ADD_ENTRIES).enumerate() {
            let id = ID_ADD_BASE + i as u32;
            commands.insert(id, MenuCommand::Add(name.to_string()));
            add_entries.push(MenuEntry::Item {
                id,
                label: name.to_string(),
                checked: false,
                disabled: false,
            });
        }
        if candidates.len() > MAX_ADD_ENTRIES {
            add_entries.push(overflow_entry(candidates.len() - MAX_ADD_ENTRIES));
        }
        if add_entries.is_empty() {
            add_entries.push(MenuEntry::Item {
                id: 0,
                label: "(no windowed processes)".to_string(),
                checked: false,
                disabled: true,
            });
        }

        if !records.is_empty() {
            entries.push(MenuEntry::Separator);
        }
        entries.push(MenuEntry::Submenu {
            label: "Add running process".to_string(),
            entries: add_entries,
        });
        entries.push(MenuEntry::Item {
            id: ID_HIDE_ON_FREEZE,
            label: "Hide windows on freeze".to_string(),
            checked: hide_on_freeze,
            disabled: false,
        });
        commands.insert(ID_HIDE_ON_FREEZE, MenuCommand::SetHideOnFreeze(!hide_on_freeze));
        entries.push(MenuEntry::Separator);
        entries.push(MenuEntry::Item {
            id: ID_SHOW_LIST,
            label: "Show list".to_string(),
            checked: false,
            disabled: false,
        });
        commands.insert(ID_SHOW_LIST, MenuCommand::ShowList);
        entries.push(MenuEntry::Item {
            id: ID_EXIT,
            label: "Exit".to_string(),
            checked: false,
            disabled: false,
        });
        commands.insert(ID_EXIT, MenuCommand::Exit);

        Self { entries, commands }
    }

    pub fn command(&self, id: u32) -> Option<&MenuCommand> {
        self.commands.get(&id)
    }

    fn append(menu: HMENU, entries: &[MenuEntry], submenus: &mut Vec<HMENU>) -> Result<()> {
        for entry in entries {
            unsafe {
                match entry {
                    MenuEntry::Separator => AppendMenuW(menu, MF_SEPARATOR, 0, PCWSTR::null())?,
                    MenuEntry::Item {
                        id,
                        label,
                        checked,
                        disabled,
                    } => {
                        let mut flags: MENU_ITEM_FLAGS = MF_STRING;
                        if *checked {
                            flags |= MF_CHECKED;
                        }
                        if *disabled {
                            flags |= MF_GRAYED;
                        }
                        let wide = to_wide_string(label);
                        AppendMenuW(menu, flags, *id as usize, PCWSTR(wide.as_ptr()))?;
                    }
                    MenuEntry::Submenu { label, entries } => {
                        let submenu = CreatePopupMenu()?;
                        submenus.push(submenu);
                        Self::append(submenu, entries, submenus)?;
                        let wide = to_wide_string(label);
                        AppendMenuW(
                            menu,
                            MF_STRING | MF_POPUP,
                            submenu.0 as usize,
                            PCWSTR(wide.as_ptr()),
                        )?;
                    }
                }
            }
        }
        Ok(())
    }

    /// Show at the cursor and return the chosen command id
    pub fn show(&self, hwnd: HWND) -> Option<u32> {
        unsafe {
            let menu = CreatePopupMenu().ok()?;
            let mut submenus = Vec::new();
            let built = Self::append(menu, &self.entries, &mut submenus);
            if let Err(e) = built {
                debug!("Failed to build tray menu: {}", e);
                // Destroying the root also destroys attached submenus.
                let _ = DestroyMenu(menu);
                return None;
            }

            let mut pt = POINT::default();
            GetCursorPos(&mut pt).ok()?;

            // Required so the menu closes when the user clicks elsewhere.
            let _ = SetForegroundWindow(hwnd);

            let cmd = TrackPopupMenu(
                menu,
                TPM_RIGHTBUTTON | TPM_RETURNCMD,
                pt.x,
                pt.y,
                0,
                hwnd,
                None,
            );
            let _ = PostMessageW(hwnd, WM_NULL, WPARAM(0), LPARAM(0));

            let _ = DestroyMenu(menu);

            if cmd.as_bool() {
                Some(cmd.0 as u32)
            } else {
                None
            }
        }
    }
}
