//! PS/2 keyboard driver: set-1 scancode decoder feeding a key ring buffer.
//!
//! The IRQ1 handler is the only producer; any task may consume through
//! `try_pop`/`peek`, which briefly disable IRQs around the buffer
//! mutation. Overrun drops the oldest entry so the newest keystroke
//! always lands.

use bitflags::bitflags;
use log::info;
use spin::Mutex;

use crate::internal::cpu;
use crate::internal::interrupts::{self, InterruptFrame};

const DATA_PORT: u16 = 0x60;
const STATUS_PORT: u16 = 0x64;

const EXTENDED_PREFIX: u8 = 0xE0;
const RELEASE_BIT: u8 = 0x80;

const SC_ESCAPE: u8 = 0x01;
const SC_BACKSPACE: u8 = 0x0E;
const SC_TAB: u8 = 0x0F;
const SC_ENTER: u8 = 0x1C;
const SC_CTRL: u8 = 0x1D;
const SC_LSHIFT: u8 = 0x2A;
const SC_RSHIFT: u8 = 0x36;
const SC_ALT: u8 = 0x38;
const SC_SPACE: u8 = 0x39;
const SC_CAPSLOCK: u8 = 0x3A;

bitflags! {
    /// Modifier and decoder state.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Modifiers: u8 {
        /// Either shift key held.
        const SHIFT = 1 << 0;
        /// Ctrl held.
        const CTRL = 1 << 1;
        /// Alt held.
        const ALT = 1 << 2;
        /// Caps lock latched (toggles on press).
        const CAPS = 1 << 3;
        /// 0xE0 prefix seen; the next byte is an extended key.
        const EXTENDED = 1 << 4;
    }
}

/// A decoded keystroke. This enum is the closed set of values the ring
/// buffer may carry: a printable character or one of the named keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// Printable character, modifiers already applied.
    Char(char),
    #[allow(missing_docs)]
    Enter,
    #[allow(missing_docs)]
    Backspace,
    #[allow(missing_docs)]
    Tab,
    #[allow(missing_docs)]
    Escape,
    #[allow(missing_docs)]
    Up,
    #[allow(missing_docs)]
    Down,
    #[allow(missing_docs)]
    Left,
    #[allow(missing_docs)]
    Right,
    #[allow(missing_docs)]
    Home,
    #[allow(missing_docs)]
    End,
    #[allow(missing_docs)]
    PageUp,
    #[allow(missing_docs)]
    PageDown,
    #[allow(missing_docs)]
    Insert,
    #[allow(missing_docs)]
    Delete,
    /// Function key F1–F12.
    Function(u8),
}

impl Key {
    /// The character this key contributes to a text stream, if any.
    pub fn to_char(self) -> Option<char> {
        match self {
            Key::Char(c) => Some(c),
            Key::Enter => Some('\n'),
            Key::Tab => Some('\t'),
            _ => None,
        }
    }
}

/// Ring capacity; a power of two so indices wrap by masking.
pub const BUFFER_CAPACITY: usize = 128;

struct KeyQueue {
    buf: [Key; BUFFER_CAPACITY],
    head: usize,
    tail: usize,
}

impl KeyQueue {
    const fn new() -> KeyQueue {
        KeyQueue {
            buf: [Key::Char('\0'); BUFFER_CAPACITY],
            head: 0,
            tail: 0,
        }
    }

    fn len(&self) -> usize {
        self.head.wrapping_sub(self.tail)
    }

    fn push(&mut self, key: Key) {
        if self.len() == BUFFER_CAPACITY {
            // full: drop the oldest entry so this one fits
            self.tail = self.tail.wrapping_add(1);
        }
        self.buf[self.head & (BUFFER_CAPACITY - 1)] = key;
        self.head = self.head.wrapping_add(1);
    }

    fn pop(&mut self) -> Option<Key> {
        if self.head == self.tail {
            return None;
        }
        let key = self.buf[self.tail & (BUFFER_CAPACITY - 1)];
        self.tail = self.tail.wrapping_add(1);
        Some(key)
    }

    fn peek(&self) -> Option<Key> {
        if self.head == self.tail {
            None
        } else {
            Some(self.buf[self.tail & (BUFFER_CAPACITY - 1)])
        }
    }
}

struct KeyboardState {
    mods: Modifiers,
    queue: KeyQueue,
}

static STATE: Mutex<KeyboardState> = Mutex::new(KeyboardState {
    mods: Modifiers::empty(),
    queue: KeyQueue::new(),
});

// Base and shifted character layers, indexed by scancode. Zero means the
// scancode does not produce a character through these tables.
#[rustfmt::skip]
static BASE_MAP: [u8; 58] = [
    0, 0, b'1', b'2', b'3', b'4', b'5', b'6', b'7', b'8', b'9', b'0', b'-', b'=', 0,
    0, b'q', b'w', b'e', b'r', b't', b'y', b'u', b'i', b'o', b'p', b'[', b']', 0,
    0, b'a', b's', b'd', b'f', b'g', b'h', b'j', b'k', b'l', b';', b'\'', b'`',
    0, b'\\', b'z', b'x', b'c', b'v', b'b', b'n', b'm', b',', b'.', b'/', 0, b'*',
    0, b' ',
];

#[rustfmt::skip]
static SHIFT_MAP: [u8; 58] = [
    0, 0, b'!', b'@', b'#', b'$', b'%', b'^', b'&', b'*', b'(', b')', b'_', b'+', 0,
    0, b'Q', b'W', b'E', b'R', b'T', b'Y', b'U', b'I', b'O', b'P', b'{', b'}', 0,
    0, b'A', b'S', b'D', b'F', b'G', b'H', b'J', b'K', b'L', b':', b'"', b'~',
    0, b'|', b'Z', b'X', b'C', b'V', b'B', b'N', b'M', b'<', b'>', b'?', 0, b'*',
    0, b' ',
];

fn decode(code: u8, mods: Modifiers) -> Option<Key> {
    match code {
        SC_ESCAPE => return Some(Key::Escape),
        SC_BACKSPACE => return Some(Key::Backspace),
        SC_TAB => return Some(Key::Tab),
        SC_ENTER => return Some(Key::Enter),
        SC_SPACE => return Some(Key::Char(' ')),
        0x3B..=0x44 => return Some(Key::Function(code - 0x3A)),
        0x57 => return Some(Key::Function(11)),
        0x58 => return Some(Key::Function(12)),
        _ => {}
    }

    let base = *BASE_MAP.get(code as usize)?;
    if base == 0 {
        return None;
    }

    let shift = mods.contains(Modifiers::SHIFT);
    let byte = if base.is_ascii_lowercase() {
        // letters: shift XOR caps selects the upper layer
        if shift != mods.contains(Modifiers::CAPS) {
            base.to_ascii_uppercase()
        } else {
            base
        }
    } else if shift {
        // symbols and digits: shift alone; caps has no effect
        SHIFT_MAP[code as usize]
    } else {
        base
    };

    Some(Key::Char(byte as char))
}

fn decode_extended(code: u8) -> Option<Key> {
    match code {
        0x48 => Some(Key::Up),
        0x50 => Some(Key::Down),
        0x4B => Some(Key::Left),
        0x4D => Some(Key::Right),
        0x47 => Some(Key::Home),
        0x4F => Some(Key::End),
        0x49 => Some(Key::PageUp),
        0x51 => Some(Key::PageDown),
        0x52 => Some(Key::Insert),
        0x53 => Some(Key::Delete),
        0x1C => Some(Key::Enter),
        _ => None,
    }
}

/// Feed one raw scancode through the state machine. Called from the IRQ1
/// handler; exposed within the crate so tests can inject scancodes.
pub(crate) fn handle_scancode(scancode: u8) {
    cpu::without_interrupts(|| handle_scancode_locked(scancode));
}

fn handle_scancode_locked(scancode: u8) {
    let mut state = STATE.lock();

    if scancode == EXTENDED_PREFIX {
        state.mods.insert(Modifiers::EXTENDED);
        return;
    }

    let extended = state.mods.contains(Modifiers::EXTENDED);
    state.mods.remove(Modifiers::EXTENDED);

    let release = scancode & RELEASE_BIT != 0;
    let code = scancode & !RELEASE_BIT;

    if extended {
        if code == SC_ALT || code == SC_CTRL {
            // right-hand modifier variants track the same flags
            let flag = if code == SC_ALT { Modifiers::ALT } else { Modifiers::CTRL };
            state.mods.set(flag, !release);
        } else if !release {
            if let Some(key) = decode_extended(code) {
                state.queue.push(key);
            }
        }
        return;
    }

    match code {
        SC_LSHIFT | SC_RSHIFT => state.mods.set(Modifiers::SHIFT, !release),
        SC_CTRL => state.mods.set(Modifiers::CTRL, !release),
        SC_ALT => state.mods.set(Modifiers::ALT, !release),
        SC_CAPSLOCK => {
            if !release {
                state.mods.toggle(Modifiers::CAPS);
            }
        }
        _ if !release => {
            let mods = state.mods;
            if let Some(key) = decode(code, mods) {
                state.queue.push(key);
            }
        }
        _ => {}
    }
}

fn keyboard_irq_handler(_frame: &mut InterruptFrame, _ctx: usize) {
    let scancode = unsafe { cpu::in_u8(DATA_PORT) };
    handle_scancode(scancode);
}

/// Drain the controller's pending output and hook IRQ1.
pub fn init() {
    unsafe {
        while cpu::in_u8(STATUS_PORT) & 1 != 0 {
            cpu::in_u8(DATA_PORT);
        }
    }
    interrupts::register_handler(interrupts::KEYBOARD_VECTOR, keyboard_irq_handler, 0)
        .expect("keyboard vector out of range");
    info!("PS/2 keyboard on IRQ1");
}

/// Pop the oldest buffered key, if any. Non-blocking.
pub fn try_pop() -> Option<Key> {
    cpu::without_interrupts(|| STATE.lock().queue.pop())
}

/// Look at the oldest buffered key without consuming it.
pub fn peek() -> Option<Key> {
    cpu::without_interrupts(|| STATE.lock().queue.peek())
}

/// Number of keys currently buffered.
pub fn buffered() -> usize {
    cpu::without_interrupts(|| STATE.lock().queue.len())
}

#[cfg(test)]
fn drain() {
    while try_pop().is_some() {}
}

#[test_case]
fn test_press_release_sequence() {
    drain();
    // press+release of A then S
    for sc in [0x1Eu8, 0x9E, 0x1F, 0x9F] {
        handle_scancode(sc);
    }
    assert_eq!(try_pop(), Some(Key::Char('a')));
    assert_eq!(try_pop(), Some(Key::Char('s')));
    assert_eq!(try_pop(), None);
}

#[test_case]
fn test_shift_modifier() {
    drain();
    for sc in [SC_LSHIFT, 0x1E, 0x9E, SC_LSHIFT | RELEASE_BIT] {
        handle_scancode(sc);
    }
    assert_eq!(try_pop(), Some(Key::Char('A')));
    assert_eq!(try_pop(), None);
}

#[test_case]
fn test_caps_affects_letters_only() {
    drain();
    handle_scancode(SC_CAPSLOCK);
    handle_scancode(SC_CAPSLOCK | RELEASE_BIT);
    handle_scancode(0x1E); // a -> 'A'
    handle_scancode(0x9E);
    handle_scancode(0x02); // 1 stays '1'
    handle_scancode(0x82);
    // shift under caps flips letters back to lowercase
    handle_scancode(SC_LSHIFT);
    handle_scancode(0x1E);
    handle_scancode(0x9E);
    handle_scancode(SC_LSHIFT | RELEASE_BIT);
    // caps off again
    handle_scancode(SC_CAPSLOCK);
    handle_scancode(SC_CAPSLOCK | RELEASE_BIT);

    assert_eq!(try_pop(), Some(Key::Char('A')));
    assert_eq!(try_pop(), Some(Key::Char('1')));
    assert_eq!(try_pop(), Some(Key::Char('a')));
    assert_eq!(try_pop(), None);
}

#[test_case]
fn test_extended_arrow_keys() {
    drain();
    for sc in [EXTENDED_PREFIX, 0x48, EXTENDED_PREFIX, 0xC8, EXTENDED_PREFIX, 0x4B] {
        handle_scancode(sc);
    }
    assert_eq!(try_pop(), Some(Key::Up));
    assert_eq!(try_pop(), Some(Key::Left));
    assert_eq!(try_pop(), None);
}

#[test_case]
fn test_overrun_drops_oldest() {
    drain();
    // '1' once, then fill the rest of the ring with '2'..: the first
    // push must be the one that falls out.
    handle_scancode(0x02);
    handle_scancode(0x82);
    for _ in 0..BUFFER_CAPACITY {
        handle_scancode(0x03);
        handle_scancode(0x83);
    }
    assert_eq!(buffered(), BUFFER_CAPACITY);
    assert_eq!(try_pop(), Some(Key::Char('2')));
    drain();
}

#[test_case]
fn test_peek_is_idempotent() {
    drain();
    handle_scancode(0x10); // q
    handle_scancode(0x90);
    assert_eq!(peek(), Some(Key::Char('q')));
    assert_eq!(peek(), Some(Key::Char('q')));
    assert_eq!(try_pop(), Some(Key::Char('q')));
    assert_eq!(peek(), None);
}
