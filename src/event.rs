//! Events carried between the BLE side and the ADB side of the bridge.
//!
//! These are produced on the BLE core after USB HID semantics have been
//! translated to ADB wire semantics, and consumed on the ADB core at the
//! next host poll. They are deliberately tiny `Copy` types.

/// A single key press or release, already translated to an ADB scancode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct KeyEvent {
    /// 7-bit ADB wire scancode (0x00..=0x7F).
    pub scancode: u8,
    /// true = key released, false = key pressed.
    pub released: bool,
}

/// Pointer motion and button state from a single BLE report.
///
/// Deltas keep the full 16-bit range from Report Protocol devices. Clamping
/// to the 7-bit ADB range happens at consumption time with carry-forward,
/// so fast swipes are never truncated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PointerEvent {
    pub dx: i16,
    pub dy: i16,
    /// Primary button state (USB polarity: true = pressed).
    pub button: bool,
}
