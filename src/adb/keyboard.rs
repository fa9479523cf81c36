//! The emulated ADB keyboard (default address 2, handler 2 — Apple
//! Extended Keyboard).
//!
//! Key events arrive from the BLE core through the keyboard channel and
//! are buffered here as packed wire bytes until the host polls register 0.

use bitfield_struct::bitfield;
use heapless::Deque;

use crate::adb::Register3;
use crate::channel;

pub const DEFAULT_ADDRESS: u8 = 2;
pub const DEFAULT_HANDLER_ID: u8 = 2;

/// Filler byte for a Talk R0 word carrying only one event.
pub const KEY_NONE: u8 = 0xFF;

const KEY_RING_SIZE: usize = 32;

/// One key event as it appears on the wire: release flag over a 7-bit
/// scancode.
#[bitfield(u8, order = Lsb)]
#[derive(PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PackedKey {
    #[bits(7)]
    pub scancode: u8,
    pub released: bool,
}

pub struct Keyboard {
    address: u8,
    handler_id: u8,
    ring: Deque<u8, KEY_RING_SIZE>,
    /// Register 2 shadow: LED and modifier bitmap, active low.
    register2: u16,
}

impl Default for Keyboard {
    fn default() -> Self {
        Self::new()
    }
}

impl Keyboard {
    pub const fn new() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            handler_id: DEFAULT_HANDLER_ID,
            ring: Deque::new(),
            register2: 0xFFFF,
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Handle a Talk for `register`. `None` means no response: the bus
    /// stays idle, which the host reads as "nothing to report".
    pub fn handle_talk(&mut self, register: u8) -> Option<u16> {
        match register {
            0 => {
                self.drain_incoming();

                let key1 = self.ring.pop_front()?;
                let key2 = self.ring.pop_front().unwrap_or(KEY_NONE);
                Some(u16::from_be_bytes([key1, key2]))
            }
            2 => Some(self.register2),
            3 => Some(Register3::device_info(self.address, self.handler_id)),
            _ => None,
        }
    }

    pub fn handle_listen(&mut self, register: u8, data: u16) {
        match register {
            2 => {
                // Host pushing LED state
                self.register2 = data;
            }
            3 => {
                let [new_address, new_handler] = data.to_be_bytes();
                if Register3::accepts_assignment(new_address) {
                    self.address = new_address & 0x0F;
                    debug!("keyboard address changed to {}", self.address);
                }
                if Register3::accepts_assignment(new_handler) {
                    self.handler_id = new_handler;
                    debug!("keyboard handler changed to {}", self.handler_id);
                }
            }
            _ => {}
        }
    }

    pub fn handle_flush(&mut self) {
        self.ring.clear();
    }

    pub fn handle_reset(&mut self) {
        self.address = DEFAULT_ADDRESS;
        self.handler_id = DEFAULT_HANDLER_ID;
        self.ring.clear();
        self.register2 = 0xFFFF;
    }

    /// True if this device would answer a Talk R0 right now.
    pub fn has_pending(&self) -> bool {
        !self.ring.is_empty() || channel::key_events_pending()
    }

    /// Move queued events from the cross-core channel into the wire ring.
    /// Events beyond the ring capacity are dropped.
    fn drain_incoming(&mut self) {
        while let Some(event) = channel::receive_key_event() {
            let packed = PackedKey::new()
                .with_scancode(event.scancode & 0x7F)
                .with_released(event.released);
            if self.ring.push_back(packed.into_bits()).is_err() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_key_layout() {
        let down = PackedKey::new().with_scancode(0x26).with_released(false);
        assert_eq!(down.into_bits(), 0x26);
        let up = PackedKey::new().with_scancode(0x26).with_released(true);
        assert_eq!(up.into_bits(), 0xA6);
    }

    #[test]
    fn talk_r3_reports_address_and_handler() {
        let mut kbd = Keyboard::new();
        assert_eq!(kbd.handle_talk(3), Some(0x6202));
    }

    #[test]
    fn listen_r3_address_assignment_rules() {
        let mut kbd = Keyboard::new();

        kbd.handle_listen(3, 0x0702);
        assert_eq!(kbd.address(), 7);

        // 0 and 0xFE are reserved for address-conflict resolution
        kbd.handle_listen(3, 0x0002);
        assert_eq!(kbd.address(), 7);
        kbd.handle_listen(3, 0xFE02);
        assert_eq!(kbd.address(), 7);

        // High nibble of a wider byte is masked off
        kbd.handle_listen(3, 0x1502);
        assert_eq!(kbd.address(), 5);
    }

    #[test]
    fn listen_r2_updates_led_shadow() {
        let mut kbd = Keyboard::new();
        assert_eq!(kbd.handle_talk(2), Some(0xFFFF));
        kbd.handle_listen(2, 0xFFFB);
        assert_eq!(kbd.handle_talk(2), Some(0xFFFB));
    }

    #[test]
    fn reset_restores_defaults() {
        let mut kbd = Keyboard::new();
        kbd.handle_listen(3, 0x0803);
        kbd.handle_listen(2, 0x1234);
        kbd.handle_reset();
        assert_eq!(kbd.address(), DEFAULT_ADDRESS);
        assert_eq!(kbd.handle_talk(3), Some(0x6202));
        assert_eq!(kbd.handle_talk(2), Some(0xFFFF));
    }
}
