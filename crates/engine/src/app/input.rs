use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use winit::event::MouseButton;
use winit::keyboard::KeyCode;

use crate::geometry::Vec2;
use crate::signal::{ListenerResult, ReceiverKey, Signal};

/// Priority of the built-in binding that tracks [`InputKey::is_down`], so regular listeners
/// already observe the new state.
pub const KEY_STATE_PRIORITY: i32 = 100;

/// Every button name the manager knows about.
pub const BUTTON_NAMES: &[&str] = &[
    "Alt", "Control", "Shift", "CapsLock", "NumLock", "ScrollLock", "Enter", "Tab", " ",
    "ArrowDown", "ArrowLeft", "ArrowUp", "ArrowRight", "End", "Home", "PageDown", "PageUp",
    "Backspace", "Delete", "Insert", "F1", "F2", "F3", "F4", "F5", "F6", "F7", "F8", "F9", "F10",
    "F11", "F12", "F13", "F14", "F15", "F16", "F17", "F18", "F19", "F20", "0", "1", "2", "3", "4",
    "5", "6", "7", "8", "9", "-", "=", "[", "]", ";", "'", ",", ".", "/", "\\", "`", "A", "B", "C",
    "D", "E", "F", "G", "H", "I", "J", "K", "L", "M", "N", "O", "P", "Q", "R", "S", "T", "U", "V",
    "W", "X", "Y", "Z", "Numpad0", "Numpad1", "Numpad2", "Numpad3", "Numpad4", "Numpad5",
    "Numpad6", "Numpad7", "Numpad8", "Numpad9", "NumpadDelete", "NumpadEnter", "NumpadAdd",
    "NumpadSubtract", "NumpadMultiply", "NumpadDivide", "Mouse1", "Mouse2", "Mouse3", "Mouse4",
    "Mouse5",
];

pub struct InputKey {
    down: Rc<Cell<bool>>,
    pub on_press: Signal<()>,
    pub on_release: Signal<()>,
}

impl fmt::Debug for InputKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputKey")
            .field("down", &self.down.get())
            .finish()
    }
}

impl Default for InputKey {
    fn default() -> Self {
        Self::new()
    }
}

impl InputKey {
    pub fn new() -> Self {
        let key = Self {
            down: Rc::new(Cell::new(false)),
            on_press: Signal::new(),
            on_release: Signal::new(),
        };
        let down = Rc::clone(&key.down);
        key.on_press.add_with(
            Rc::new(move |_: &()| {
                down.set(true);
                Ok(())
            }),
            ReceiverKey::of(&key.down),
            None,
            KEY_STATE_PRIORITY,
        );
        let down = Rc::clone(&key.down);
        key.on_release.add_with(
            Rc::new(move |_: &()| {
                down.set(false);
                Ok(())
            }),
            ReceiverKey::of(&key.down),
            None,
            KEY_STATE_PRIORITY,
        );
        key
    }

    pub fn is_down(&self) -> bool {
        self.down.get()
    }
}

/// Named buttons plus the last pointer position.
///
/// `screen` is the raw window position; `game` the same point in virtual-resolution coordinates.
pub struct InputManager {
    buttons: HashMap<&'static str, InputKey>,
    pointer_screen: Cell<Vec2>,
    pointer_game: Cell<Vec2>,
}

impl fmt::Debug for InputManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut held: Vec<&str> = self
            .buttons
            .iter()
            .filter(|(_, key)| key.is_down())
            .map(|(name, _)| *name)
            .collect();
        held.sort_unstable();
        f.debug_struct("InputManager")
            .field("held", &held)
            .field("pointer_game", &self.pointer_game.get())
            .finish()
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new()
    }
}

impl InputManager {
    pub fn new() -> Self {
        Self {
            buttons: BUTTON_NAMES
                .iter()
                .map(|name| (*name, InputKey::new()))
                .collect(),
            pointer_screen: Cell::new(Vec2::ZERO),
            pointer_game: Cell::new(Vec2::ZERO),
        }
    }

    pub fn button(&self, name: &str) -> Option<&InputKey> {
        self.buttons.get(name)
    }

    pub fn is_down(&self, name: &str) -> bool {
        self.button(name).is_some_and(InputKey::is_down)
    }

    /// Fires `on_press` for a known button that is not already held. Repeats are dropped.
    pub fn press(&self, name: &str) -> ListenerResult {
        match self.button(name) {
            Some(key) if !key.is_down() => key.on_press.dispatch(),
            _ => Ok(()),
        }
    }

    pub fn release(&self, name: &str) -> ListenerResult {
        match self.button(name) {
            Some(key) => key.on_release.dispatch(),
            None => Ok(()),
        }
    }

    pub fn set_pointer(&self, screen: Vec2, game: Vec2) {
        self.pointer_screen.set(screen);
        self.pointer_game.set(game);
    }

    pub fn pointer_screen(&self) -> Vec2 {
        self.pointer_screen.get()
    }

    pub fn pointer_game(&self) -> Vec2 {
        self.pointer_game.get()
    }
}

/// `MouseN` where N is the conventional button number plus one.
pub fn mouse_button_name(button: MouseButton) -> Option<&'static str> {
    match button {
        MouseButton::Left => Some("Mouse1"),
        MouseButton::Middle => Some("Mouse2"),
        MouseButton::Right => Some("Mouse3"),
        MouseButton::Back => Some("Mouse4"),
        MouseButton::Forward => Some("Mouse5"),
        _ => None,
    }
}

pub fn key_code_name(code: KeyCode) -> Option<&'static str> {
    use KeyCode::*;

    let name = match code {
        AltLeft | AltRight => "Alt",
        ControlLeft | ControlRight => "Control",
        ShiftLeft | ShiftRight => "Shift",
        CapsLock => "CapsLock",
        NumLock => "NumLock",
        ScrollLock => "ScrollLock",
        Enter => "Enter",
        Tab => "Tab",
        Space => " ",
        ArrowDown => "ArrowDown",
        ArrowLeft => "ArrowLeft",
        ArrowUp => "ArrowUp",
        ArrowRight => "ArrowRight",
        End => "End",
        Home => "Home",
        PageDown => "PageDown",
        PageUp => "PageUp",
        Backspace => "Backspace",
        Delete => "Delete",
        Insert => "Insert",
        F1 => "F1",
        F2 => "F2",
        F3 => "F3",
        F4 => "F4",
        F5 => "F5",
        F6 => "F6",
        F7 => "F7",
        F8 => "F8",
        F9 => "F9",
        F10 => "F10",
        F11 => "F11",
        F12 => "F12",
        F13 => "F13",
        F14 => "F14",
        F15 => "F15",
        F16 => "F16",
        F17 => "F17",
        F18 => "F18",
        F19 => "F19",
        F20 => "F20",
        Digit0 => "0",
        Digit1 => "1",
        Digit2 => "2",
        Digit3 => "3",
        Digit4 => "4",
        Digit5 => "5",
        Digit6 => "6",
        Digit7 => "7",
        Digit8 => "8",
        Digit9 => "9",
        Minus => "-",
        Equal => "=",
        BracketLeft => "[",
        BracketRight => "]",
        Semicolon => ";",
        Quote => "'",
        Comma => ",",
        Period => ".",
        Slash => "/",
        Backslash => "\\",
        Backquote => "`",
        KeyA => "A",
        KeyB => "B",
        KeyC => "C",
        KeyD => "D",
        KeyE => "E",
        KeyF => "F",
        KeyG => "G",
        KeyH => "H",
        KeyI => "I",
        KeyJ => "J",
        KeyK => "K",
        KeyL => "L",
        KeyM => "M",
        KeyN => "N",
        KeyO => "O",
        KeyP => "P",
        KeyQ => "Q",
        KeyR => "R",
        KeyS => "S",
        KeyT => "T",
        KeyU => "U",
        KeyV => "V",
        KeyW => "W",
        KeyX => "X",
        KeyY => "Y",
        KeyZ => "Z",
        Numpad0 => "Numpad0",
        Numpad1 => "Numpad1",
        Numpad2 => "Numpad2",
        Numpad3 => "Numpad3",
        Numpad4 => "Numpad4",
        Numpad5 => "Numpad5",
        Numpad6 => "Numpad6",
        Numpad7 => "Numpad7",
        Numpad8 => "Numpad8",
        Numpad9 => "Numpad9",
        NumpadDecimal => "NumpadDelete",
        NumpadEnter => "NumpadEnter",
        NumpadAdd => "NumpadAdd",
        NumpadSubtract => "NumpadSubtract",
        NumpadMultiply => "NumpadMultiply",
        NumpadDivide => "NumpadDivide",
        _ => return None,
    };
    Some(name)
}
