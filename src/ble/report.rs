//! HID input report parsing and diffing.
//!
//! Notifications arrive as raw bytes; these routines turn them into the
//! bridge's events. Keyboard reports are diffed against the previous
//! snapshot so each key produces exactly one press and one release;
//! pointer reports are translated report-by-report.

use heapless::Vec;

use crate::event::{KeyEvent, PointerEvent};
use crate::keycode::{self, ADB_KEY_NONE, MODIFIER_MAP};

/// Minimum length of a boot-style keyboard input report:
/// `[modifiers][reserved][key1..key6]`. Shorter notifications on the same
/// device are consumer/vendor reports and are discarded.
pub const MIN_KEYBOARD_REPORT_LEN: usize = 8;

/// Upper bound of events one keyboard report can produce:
/// 8 modifier edges plus 6 releases plus 6 presses.
pub const MAX_EVENTS_PER_REPORT: usize = 20;

/// Snapshot of the previous keyboard report.
#[derive(Default)]
pub struct KeyboardReportState {
    prev_modifiers: u8,
    prev_keys: [u8; 6],
}

impl KeyboardReportState {
    pub const fn new() -> Self {
        Self {
            prev_modifiers: 0,
            prev_keys: [0; 6],
        }
    }

    /// Diff a keyboard input report against the previous snapshot.
    ///
    /// Returns `None` for reports shorter than
    /// [`MIN_KEYBOARD_REPORT_LEN`]; the caller counts those as filtered.
    pub fn diff(&mut self, data: &[u8]) -> Option<Vec<KeyEvent, MAX_EVENTS_PER_REPORT>> {
        if data.len() < MIN_KEYBOARD_REPORT_LEN {
            return None;
        }

        let mut events = Vec::new();
        let modifiers = data[0];
        let keys = &data[2..8];

        // Modifier edges first, in bit order.
        let changed = modifiers ^ self.prev_modifiers;
        if changed != 0 {
            for (usb_mask, adb_scancode) in MODIFIER_MAP {
                if changed & usb_mask != 0 {
                    let _ = events.push(KeyEvent {
                        scancode: adb_scancode,
                        released: modifiers & usb_mask == 0,
                    });
                }
            }
        }

        // Releases: keys present before, absent now.
        for &prev in self.prev_keys.iter().filter(|&&k| k != 0) {
            if !keys.contains(&prev) {
                let scancode = keycode::usb_to_adb(prev);
                if scancode != ADB_KEY_NONE {
                    let _ = events.push(KeyEvent {
                        scancode,
                        released: true,
                    });
                }
            }
        }

        // Presses: keys present now, absent before.
        for &key in keys.iter().filter(|&&k| k != 0) {
            if !self.prev_keys.contains(&key) {
                let scancode = keycode::usb_to_adb(key);
                if scancode != ADB_KEY_NONE {
                    let _ = events.push(KeyEvent {
                        scancode,
                        released: false,
                    });
                }
            }
        }

        self.prev_modifiers = modifiers;
        self.prev_keys.copy_from_slice(keys);

        Some(events)
    }
}

/// Translate a pointer input report.
///
/// Length >= 5 is the Report Protocol layout
/// `[buttons][X_lo][X_hi][Y_lo][Y_hi]...` with 16-bit little-endian
/// deltas; length 3 or 4 is the Boot Protocol layout
/// `[buttons][dx_i8][dy_i8]`. Scroll bytes past the Y axis are ignored.
/// Deltas are passed through at full width; the ADB consumer clamps with
/// carry-forward.
pub fn translate_pointer(data: &[u8]) -> Option<PointerEvent> {
    if data.len() < 3 {
        return None;
    }

    let button = data[0] & 0x01 != 0;

    let (dx, dy) = if data.len() >= 5 {
        (
            i16::from_le_bytes([data[1], data[2]]),
            i16::from_le_bytes([data[3], data[4]]),
        )
    } else {
        (data[1] as i8 as i16, data[2] as i8 as i16)
    };

    Some(PointerEvent { dx, dy, button })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(modifiers: u8, keys: [u8; 6]) -> [u8; 8] {
        let mut r = [0u8; 8];
        r[0] = modifiers;
        r[2..8].copy_from_slice(&keys);
        r
    }

    #[test]
    fn short_reports_are_filtered() {
        let mut state = KeyboardReportState::new();
        assert!(state.diff(&[0x01, 0x00]).is_none());
        assert!(state.diff(&[0xE9, 0x00, 0x00]).is_none()); // consumer report
    }

    #[test]
    fn press_and_release_roundtrip() {
        let mut state = KeyboardReportState::new();

        let events = state.diff(&report(0, [0x04, 0, 0, 0, 0, 0])).unwrap();
        assert_eq!(
            &events[..],
            &[KeyEvent {
                scancode: 0x00,
                released: false
            }]
        );

        let events = state.diff(&report(0, [0, 0, 0, 0, 0, 0])).unwrap();
        assert_eq!(
            &events[..],
            &[KeyEvent {
                scancode: 0x00,
                released: true
            }]
        );
    }

    #[test]
    fn held_keys_produce_no_repeat_events() {
        let mut state = KeyboardReportState::new();
        state.diff(&report(0, [0x04, 0, 0, 0, 0, 0])).unwrap();
        let events = state.diff(&report(0, [0x04, 0x0D, 0, 0, 0, 0])).unwrap();
        assert_eq!(
            &events[..],
            &[KeyEvent {
                scancode: 0x26,
                released: false
            }]
        );
    }

    #[test]
    fn modifier_edges_use_modifier_map() {
        let mut state = KeyboardReportState::new();

        let events = state.diff(&report(0x22, [0; 6])).unwrap();
        assert_eq!(
            &events[..],
            &[
                KeyEvent {
                    scancode: 0x38,
                    released: false
                },
                KeyEvent {
                    scancode: 0x7B,
                    released: false
                },
            ]
        );

        let events = state.diff(&report(0x20, [0; 6])).unwrap();
        assert_eq!(
            &events[..],
            &[KeyEvent {
                scancode: 0x38,
                released: true
            }]
        );
    }

    #[test]
    fn unmapped_usages_are_skipped() {
        let mut state = KeyboardReportState::new();
        // 0x65 (Application) has no ADB equivalent
        let events = state.diff(&report(0, [0x65, 0x04, 0, 0, 0, 0])).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].scancode, 0x00);
    }

    #[test]
    fn up_arrow_maps_to_wire_code() {
        let mut state = KeyboardReportState::new();
        let events = state.diff(&report(0, [0x52, 0, 0, 0, 0, 0])).unwrap();
        assert_eq!(events[0].scancode, 0x3E);
    }

    #[test]
    fn pointer_report_protocol() {
        let event = translate_pointer(&[0x01, 0x2C, 0x01, 0xD4, 0xFE]).unwrap();
        assert_eq!(
            event,
            PointerEvent {
                dx: 300,
                dy: -300,
                button: true
            }
        );
    }

    #[test]
    fn pointer_report_protocol_ignores_scroll_bytes() {
        let event = translate_pointer(&[0x00, 0x05, 0x00, 0xFB, 0xFF, 0x7F, 0x01]).unwrap();
        assert_eq!(
            event,
            PointerEvent {
                dx: 5,
                dy: -5,
                button: false
            }
        );
    }

    #[test]
    fn pointer_boot_protocol() {
        let event = translate_pointer(&[0x01, 0xF6, 0x0A]).unwrap();
        assert_eq!(
            event,
            PointerEvent {
                dx: -10,
                dy: 10,
                button: true
            }
        );

        // Secondary buttons do not count as the primary
        let event = translate_pointer(&[0x02, 0x00, 0x00]).unwrap();
        assert!(!event.button);
    }

    #[test]
    fn pointer_runt_reports_rejected() {
        assert!(translate_pointer(&[0x01, 0x05]).is_none());
        assert!(translate_pointer(&[]).is_none());
    }
}
