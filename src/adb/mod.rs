//! Apple Desktop Bus device-side protocol engine.
//!
//! ADB is a single-wire, open-collector, host-polled bus. The host opens
//! every transaction with an Attention low pulse, a short Sync high, then
//! an 8-bit command `[addr:4][op:2][reg:2]` and a stop bit. A device
//! answering a Talk waits Tlt after the stop bit and drives a framed
//! 16-bit word. A device with pending data for a *different* address may
//! stretch the command's stop-bit low phase to 300 µs total — a Service
//! Request — to ask the host to poll it next.
//!
//! This module tree emulates two devices on one wire: a keyboard at
//! address 2 and a pointer at address 3, fed by the cross-core event
//! channels.

pub mod bitbang;
pub mod bus;
pub mod keyboard;
pub mod pointer;

use bitfield_struct::bitfield;
use num_enum::FromPrimitive;

/// Protocol timing in microseconds. These are wire facts, not tunables.
pub mod timing {
    /// Attention low pulse window.
    pub const ATTENTION_MIN_US: u32 = 560;
    pub const ATTENTION_MAX_US: u32 = 1040;

    /// Sync high after Attention, nominal, plus accepted slack.
    pub const SYNC_NOMINAL_US: u32 = 65;
    pub const SYNC_SLACK_US: u32 = 30;

    /// A bit cell is 100 µs; polarity decides the low/high split.
    pub const BIT_CELL_US: u32 = 100;
    pub const BIT_1_LOW_US: u32 = 35;
    pub const BIT_1_HIGH_US: u32 = 65;
    pub const BIT_0_LOW_US: u32 = 65;
    pub const BIT_0_HIGH_US: u32 = 35;
    /// Low phase below this decodes as `1`, at or above as `0`.
    pub const BIT_THRESHOLD_US: u32 = 50;
    /// Accepted skew when measuring a received low phase.
    pub const BIT_TOLERANCE_US: u32 = 15;

    /// Stop-to-start time before a Talk response.
    pub const TLT_US: u32 = 200;
    /// Latest the host may start driving Listen data after its stop bit.
    pub const TLT_MAX_US: u32 = 260;

    /// Total low time of a stretched stop bit signalling Service Request.
    pub const SRQ_LOW_US: u32 = 300;

    /// A low pulse at least this long is a global bus reset.
    pub const RESET_MIN_US: u32 = 2800;
}

/// The four ADB operations, encoded in command bits 3:2.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum AdbOp {
    #[num_enum(default)]
    Reset = 0b00,
    Flush = 0b01,
    Listen = 0b10,
    Talk = 0b11,
}

/// A decoded host command byte: `[addr:4][op:2][reg:2]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AdbCommand {
    pub address: u8,
    pub op: AdbOp,
    pub register: u8,
}

impl AdbCommand {
    pub fn parse(byte: u8) -> Self {
        Self {
            address: (byte >> 4) & 0x0F,
            op: AdbOp::from((byte >> 2) & 0b11),
            register: byte & 0b11,
        }
    }
}

/// Register 3 as transmitted on a Talk: handler ID in the low byte,
/// device address and status flags in the high byte. Both emulated
/// devices report SRQ enabled and no exceptional event, which makes the
/// high byte `0x60 | address`.
#[bitfield(u16, order = Lsb)]
#[derive(PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Register3 {
    pub handler_id: u8,
    #[bits(4)]
    pub address: u8,
    #[bits(1)]
    _reserved0: u8,
    pub srq_enable: bool,
    /// Active low on the wire: set means "no exceptional event pending".
    pub no_exceptional_event: bool,
    #[bits(1)]
    _reserved1: u8,
}

impl Register3 {
    /// The Talk R3 word both emulated devices report.
    pub fn device_info(address: u8, handler_id: u8) -> u16 {
        Register3::new()
            .with_handler_id(handler_id)
            .with_address(address & 0x0F)
            .with_srq_enable(true)
            .with_no_exceptional_event(true)
            .into_bits()
    }

    /// Listen R3 carries the proposed address in the high byte and the
    /// proposed handler in the low byte. Values 0 and 0xFE are reserved by
    /// the host's address-conflict resolution and must be ignored.
    pub fn accepts_assignment(byte: u8) -> bool {
        byte != 0x00 && byte != 0xFE
    }
}
