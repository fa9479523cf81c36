//! USB HID to ADB wire scancode translation.
//!
//! The main table maps USB HID Usage Page 0x07 usages to the 7-bit scancodes
//! an Apple Extended Keyboard puts on the wire. Unmapped usages return
//! [`ADB_KEY_NONE`].
//!
//! A word of caution when cross-checking these values against Apple
//! documentation: most published tables list the *virtual* scancodes seen by
//! the Toolbox, which swap the arrow block and the right-hand modifier block
//! relative to what the keyboard actually transmits. The wire codes are
//! 0x3B..=0x3E for Left/Right/Down/Up and 0x7B/0x7C/0x7D for right
//! Shift/Option/Control. Transmitting the virtual Up Arrow code (0x7E)
//! instead is interpreted by the host as the Power key and pops the
//! shutdown dialog.

/// Sentinel for a USB usage with no ADB equivalent.
pub const ADB_KEY_NONE: u8 = 0xFF;

/// ADB wire scancodes for the modifier keys.
pub const ADB_KEY_LEFT_CTRL: u8 = 0x36;
pub const ADB_KEY_LEFT_SHIFT: u8 = 0x38;
pub const ADB_KEY_LEFT_OPTION: u8 = 0x3A;
pub const ADB_KEY_COMMAND: u8 = 0x37;
pub const ADB_KEY_RIGHT_CTRL: u8 = 0x7D;
pub const ADB_KEY_RIGHT_SHIFT: u8 = 0x7B;
pub const ADB_KEY_RIGHT_OPTION: u8 = 0x7C;

/// USB HID modifier byte bits (boot protocol keyboard report, byte 0).
pub const USB_MOD_LEFT_CTRL: u8 = 0x01;
pub const USB_MOD_LEFT_SHIFT: u8 = 0x02;
pub const USB_MOD_LEFT_ALT: u8 = 0x04;
pub const USB_MOD_LEFT_GUI: u8 = 0x08;
pub const USB_MOD_RIGHT_CTRL: u8 = 0x10;
pub const USB_MOD_RIGHT_SHIFT: u8 = 0x20;
pub const USB_MOD_RIGHT_ALT: u8 = 0x40;
pub const USB_MOD_RIGHT_GUI: u8 = 0x80;

/// USB modifier bit to ADB scancode, one entry per bit of the modifier byte.
///
/// Classic Macs have no distinct right Command key, so Right GUI folds onto
/// the single Command scancode.
pub const MODIFIER_MAP: [(u8, u8); 8] = [
    (USB_MOD_LEFT_CTRL, ADB_KEY_LEFT_CTRL),
    (USB_MOD_LEFT_SHIFT, ADB_KEY_LEFT_SHIFT),
    (USB_MOD_LEFT_ALT, ADB_KEY_LEFT_OPTION),
    (USB_MOD_LEFT_GUI, ADB_KEY_COMMAND),
    (USB_MOD_RIGHT_CTRL, ADB_KEY_RIGHT_CTRL),
    (USB_MOD_RIGHT_SHIFT, ADB_KEY_RIGHT_SHIFT),
    (USB_MOD_RIGHT_ALT, ADB_KEY_RIGHT_OPTION),
    (USB_MOD_RIGHT_GUI, ADB_KEY_COMMAND),
];

/// Translate a USB HID Usage Page 0x07 usage to an ADB wire scancode.
pub const fn usb_to_adb(usb: u8) -> u8 {
    USB_TO_ADB[usb as usize]
}

/// USB HID Usage Page 0x07 -> ADB wire scancode, total on 0..=255.
#[rustfmt::skip]
pub const USB_TO_ADB: [u8; 256] = [
    // 0x00..=0x03: no event, error roll-over, POST fail, undefined
    0xFF, 0xFF, 0xFF, 0xFF,
    // 0x04..=0x1D: A..Z
    0x00, 0x0B, 0x08, 0x02, 0x0E, 0x03, 0x05, 0x04, // A B C D E F G H
    0x22, 0x26, 0x28, 0x25, 0x2E, 0x2D, 0x1F, 0x23, // I J K L M N O P
    0x0C, 0x0F, 0x01, 0x11, 0x20, 0x09, 0x0D, 0x07, // Q R S T U V W X
    0x10, 0x06,                                     // Y Z
    // 0x1E..=0x27: 1..9, 0
    0x12, 0x13, 0x14, 0x15, 0x17, 0x16, 0x1A, 0x1C, // 1 2 3 4 5 6 7 8
    0x19, 0x1D,                                     // 9 0
    // 0x28..=0x38: Return, Escape, Delete, Tab, Space, punctuation
    0x24, 0x35, 0x33, 0x30, 0x31, 0x1B, 0x18, 0x21, // Ret Esc Del Tab Spc - = [
    0x1E, 0x2A, 0x2A, 0x29, 0x27, 0x32, 0x2B, 0x2F, // ] \ NonUS# ; ' ` , .
    0x2C,                                           // /
    // 0x39: Caps Lock
    0x39,
    // 0x3A..=0x45: F1..F12
    0x7A, 0x78, 0x63, 0x76, 0x60, 0x61, 0x62, 0x64, // F1..F8
    0x65, 0x6D, 0x67, 0x6F,                         // F9..F12
    // 0x46..=0x48: PrintScreen, ScrollLock, Pause -> F13, F14, F15
    0x69, 0x6B, 0x71,
    // 0x49..=0x4E: Insert (Help), Home, PageUp, Delete Forward, End, PageDown
    0x72, 0x73, 0x74, 0x75, 0x77, 0x79,
    // 0x4F..=0x52: Right, Left, Down, Up -- wire codes, not virtual ones
    0x3C, 0x3B, 0x3D, 0x3E,
    // 0x53..=0x63: keypad. NumLock maps to Clear.
    0x47, 0x4B, 0x43, 0x4E, 0x45, 0x4C,             // NumLock / * - + Enter
    0x53, 0x54, 0x55, 0x56, 0x57, 0x58,             // KP1..KP6
    0x59, 0x5B, 0x5C, 0x52, 0x41,                   // KP7 KP8 KP9 KP0 KP.
    // 0x64: Non-US backslash
    0x0A,
    // 0x65..=0x66: Application, Power
    0xFF, 0xFF,
    // 0x67: keypad =
    0x51,
    // 0x68..=0x6F: F13..F20
    0x69, 0x6B, 0x71, 0x6A, 0x40, 0x4F, 0x50, 0x5A,
    // 0x70..=0x73: F21..F24
    0xFF, 0xFF, 0xFF, 0xFF,
    // 0x74: Execute
    0xFF,
    // 0x75: Help
    0x72,
    // 0x76..=0x7E: Menu, Select, Stop, Again, Undo, Cut, Copy, Paste, Find
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    // 0x7F..=0x81: Mute, Volume Up, Volume Down
    0x4A, 0x48, 0x49,
    // 0x82..=0x84: locking Caps/Num/Scroll
    0xFF, 0xFF, 0xFF,
    // 0x85: keypad comma (JIS)
    0x5F,
    // 0x86: keypad equal sign (AS/400)
    0xFF,
    // 0x87..=0x8F: International1..9 (Ro, Kana, Yen mapped for JIS boards)
    0x5E, 0x68, 0x5D, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    // 0x90..=0x91: Lang1 (Kana), Lang2 (Eisu)
    0x68, 0x66,
    // 0x92..=0x97: Lang3..Lang8
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    // 0x98..=0x9F
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    // 0xA0..=0xAF
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    // 0xB0..=0xBF
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    // 0xC0..=0xCF
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    // 0xD0..=0xDF
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    // 0xE0..=0xE7: modifiers as array usages (some keyboards report them here)
    0x36, 0x38, 0x3A, 0x37, 0x7D, 0x7B, 0x7C, 0x37,
    // 0xE8..=0xFF
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
];
