//! ADB bit cells over the open-drain wire.
//!
//! Every cell is 100 µs: a `1` is 35 µs low then 65 µs high, a `0` is
//! 65 µs low then 35 µs high. Reception measures the low phase and decodes
//! against the 50 µs threshold. A framed data word is a start bit (`1`),
//! 16 data bits MSB first, and a stop bit (`0`).
//!
//! Everything here runs inside the bus loop's timing-critical windows and
//! must stay free of awaits, allocation, and logging.

use crate::adb::timing;
use crate::driver::{AdbWire, Level};

/// Receive-path failures. Both are transient wire noise: the caller
/// discards the frame and goes back to waiting for bus idle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BitError {
    /// No edge arrived within the per-bit budget.
    Timeout,
    /// A start bit decoded as `0`.
    Framing,
}

pub fn send_bit<W: AdbWire>(wire: &mut W, bit: bool) {
    if bit {
        wire.drive_low();
        wire.delay_us(timing::BIT_1_LOW_US);
        wire.release();
        wire.delay_us(timing::BIT_1_HIGH_US);
    } else {
        wire.drive_low();
        wire.delay_us(timing::BIT_0_LOW_US);
        wire.release();
        wire.delay_us(timing::BIT_0_HIGH_US);
    }
}

pub fn send_byte<W: AdbWire>(wire: &mut W, byte: u8) {
    for i in (0..8).rev() {
        send_bit(wire, (byte >> i) & 1 != 0);
    }
}

/// Send a framed 16-bit data word: start(1), data MSB first, stop(0).
pub fn send_word<W: AdbWire>(wire: &mut W, word: u16) {
    send_bit(wire, true);
    for i in (0..16).rev() {
        send_bit(wire, (word >> i) & 1 != 0);
    }
    send_bit(wire, false);
}

/// Receive one bit: wait for the falling edge, measure the low phase,
/// then let the cell's high phase pass.
pub fn receive_bit<W: AdbWire>(wire: &mut W) -> Result<bool, BitError> {
    if wire.wait_for(Level::Low, timing::BIT_CELL_US * 2) == 0 {
        return Err(BitError::Timeout);
    }

    let low = wire.measure_pulse(Level::Low, timing::BIT_CELL_US + timing::BIT_TOLERANCE_US);
    if low == 0 {
        return Err(BitError::Timeout);
    }

    // The second half of the cell needs no measurement, only consumption.
    wire.wait_for(Level::High, timing::BIT_CELL_US);

    Ok(low < timing::BIT_THRESHOLD_US)
}

pub fn receive_byte<W: AdbWire>(wire: &mut W) -> Result<u8, BitError> {
    let mut byte = 0u8;
    for _ in 0..8 {
        byte = (byte << 1) | receive_bit(wire)? as u8;
    }
    Ok(byte)
}

/// Receive a framed data word. The start bit must decode as `1`; the stop
/// bit is consumed without strict validation, as real devices vary.
pub fn receive_word<W: AdbWire>(wire: &mut W) -> Result<u16, BitError> {
    if !receive_bit(wire)? {
        return Err(BitError::Framing);
    }

    let mut word = 0u16;
    for _ in 0..16 {
        word = (word << 1) | receive_bit(wire)? as u16;
    }

    let _ = receive_bit(wire);

    Ok(word)
}

/// Receive the 8-bit command byte.
///
/// The stop bit is deliberately NOT consumed here: the caller owns it so a
/// Service Request can be asserted during its low phase.
pub fn receive_command_byte<W: AdbWire>(wire: &mut W) -> Result<u8, BitError> {
    receive_byte(wire)
}

/// Stretch the stop bit's low phase to the full SRQ duration, then release.
///
/// The host has already begun the stop bit low when this is called; taking
/// over the line and holding for the SRQ time is indistinguishable from a
/// single extended stop to the host.
pub fn assert_srq<W: AdbWire>(wire: &mut W) {
    wire.drive_low();
    wire.delay_us(timing::SRQ_LOW_US);
    wire.release();
}

/// Consume the host's stop bit, optionally asserting a Service Request
/// inside it.
pub fn consume_stop<W: AdbWire>(wire: &mut W, srq: bool) {
    wire.wait_for(Level::Low, timing::BIT_CELL_US * 2);

    if srq {
        assert_srq(wire);
    } else {
        wire.wait_for(Level::High, timing::BIT_CELL_US * 2);
    }
}
