//! The emulated ADB pointer (default address 3, handler 2 — standard
//! 100 cpi mouse).
//!
//! Motion accumulates between host polls. A Talk R0 clamps the
//! accumulated deltas to the 7-bit wire range and subtracts what it
//! reported, so motion beyond ±63 counts per poll carries forward instead
//! of being lost. Button polarity is inverted on the wire: 1 = released.

use bitfield_struct::bitfield;

use crate::adb::Register3;
use crate::channel;

pub const DEFAULT_ADDRESS: u8 = 3;
pub const DEFAULT_HANDLER_ID: u8 = 2;

/// Talk R0 payload: `[btn_released:1 | dy:7][1 | dx:7]`. The second
/// button bit is constant-released on a one-button pointer.
#[bitfield(u16, order = Lsb)]
#[derive(PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PointerReport {
    #[bits(7)]
    pub dx: u8,
    pub button2_released: bool,
    #[bits(7)]
    pub dy: u8,
    pub button_released: bool,
}

pub struct Pointer {
    address: u8,
    handler_id: u8,
    accum_dx: i16,
    accum_dy: i16,
    button_pressed: bool,
    /// A button transition happened since the last reported poll.
    button_dirty: bool,
}

impl Default for Pointer {
    fn default() -> Self {
        Self::new()
    }
}

impl Pointer {
    pub const fn new() -> Self {
        Self {
            address: DEFAULT_ADDRESS,
            handler_id: DEFAULT_HANDLER_ID,
            accum_dx: 0,
            accum_dy: 0,
            button_pressed: false,
            button_dirty: false,
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn handle_talk(&mut self, register: u8) -> Option<u16> {
        match register {
            0 => {
                self.drain_incoming();

                if self.accum_dx == 0 && self.accum_dy == 0 && !self.button_dirty {
                    return None;
                }

                let dx = self.accum_dx.clamp(-64, 63) as i8;
                let dy = self.accum_dy.clamp(-64, 63) as i8;
                self.accum_dx -= dx as i16;
                self.accum_dy -= dy as i16;
                self.button_dirty = false;

                let word = PointerReport::new()
                    .with_dx(dx as u8 & 0x7F)
                    .with_button2_released(true)
                    .with_dy(dy as u8 & 0x7F)
                    .with_button_released(!self.button_pressed);
                Some(word.into_bits())
            }
            3 => Some(Register3::device_info(self.address, self.handler_id)),
            _ => None,
        }
    }

    pub fn handle_listen(&mut self, register: u8, data: u16) {
        if register == 3 {
            let [new_address, new_handler] = data.to_be_bytes();
            if Register3::accepts_assignment(new_address) {
                self.address = new_address & 0x0F;
                debug!("pointer address changed to {}", self.address);
            }
            if Register3::accepts_assignment(new_handler) {
                self.handler_id = new_handler;
                debug!("pointer handler changed to {}", self.handler_id);
            }
        }
    }

    pub fn handle_flush(&mut self) {
        self.accum_dx = 0;
        self.accum_dy = 0;
        self.button_dirty = false;
    }

    pub fn handle_reset(&mut self) {
        *self = Self::new();
    }

    /// True if this device would answer a Talk R0 right now.
    pub fn has_pending(&self) -> bool {
        self.accum_dx != 0
            || self.accum_dy != 0
            || self.button_dirty
            || channel::pointer_events_pending()
    }

    fn drain_incoming(&mut self) {
        while let Some(event) = channel::receive_pointer_event() {
            self.accum_dx = self.accum_dx.saturating_add(event.dx);
            self.accum_dy = self.accum_dy.saturating_add(event.dy);

            if event.button != self.button_pressed {
                self.button_pressed = event.button;
                self.button_dirty = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_word_layout() {
        // Button pressed, dy = -64, dx = +63
        let word = PointerReport::new()
            .with_dx(63 & 0x7F)
            .with_button2_released(true)
            .with_dy((-64i8) as u8 & 0x7F)
            .with_button_released(false);
        assert_eq!(word.into_bits(), 0x40BF);

        // Idle deltas, button released
        let word = PointerReport::new()
            .with_dx(0)
            .with_button2_released(true)
            .with_dy(0)
            .with_button_released(true);
        assert_eq!(word.into_bits(), 0x8080);
    }

    #[test]
    fn talk_r3_reports_address_and_handler() {
        let mut pointer = Pointer::new();
        assert_eq!(pointer.handle_talk(3), Some(0x6302));
    }

    #[test]
    fn listen_r3_assignment_rules() {
        let mut pointer = Pointer::new();
        pointer.handle_listen(3, 0x0902);
        assert_eq!(pointer.address(), 9);
        pointer.handle_listen(3, 0xFE02);
        assert_eq!(pointer.address(), 9);
        pointer.handle_listen(3, 0x0004);
        assert_eq!(pointer.address(), 9);
    }

    #[test]
    fn unknown_register_has_no_response() {
        let mut pointer = Pointer::new();
        assert_eq!(pointer.handle_talk(1), None);
        assert_eq!(pointer.handle_talk(2), None);
    }
}
