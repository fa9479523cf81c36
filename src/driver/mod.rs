//! Hardware seams for the bit-banged ADB data line.
//!
//! The ADB line is a single open-drain wire with an external pull-up:
//! a device either pulls it low or releases it, never drives it high.
//! Implementations live in board crates; everything here is the contract
//! the bit layer is written against.

/// Logic level of the ADB data line. The line idles [`High`] via its
/// pull-up; any participant asserts by pulling it [`Low`].
///
/// [`High`]: Level::High
/// [`Low`]: Level::Low
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub const fn is_high(self) -> bool {
        matches!(self, Level::High)
    }
}

/// Open-drain access plus microsecond timing for the ADB data pin.
///
/// Timing contract: [`delay_us`](AdbWire::delay_us) is a tight busy-wait on
/// a monotonic clock, accurate to about ±2 µs over a 100 µs cell on a
/// 240 MHz core. Bit cells are decoded from sub-100 µs pulse widths, so on
/// cached-flash parts every method here must execute from instruction RAM;
/// a single cache miss inside an interrupt-disabled window stretches a bit
/// cell past the host's tolerance. Board implementations are expected to
/// carry the platform's RAM-function attribute and avoid inlining
/// flash-resident helpers.
pub trait AdbWire {
    /// Actively pull the line low.
    fn drive_low(&mut self);

    /// Release the line to high-Z; the external pull-up restores high.
    /// Never drives a hard high.
    fn release(&mut self);

    /// Sample the line.
    fn read(&mut self) -> Level;

    /// Monotonic microsecond clock. Wraps at `u32::MAX`; all comparisons
    /// in the bit layer are wrapping-difference based.
    fn micros(&mut self) -> u32;

    /// Busy-wait for `us` microseconds. No yielding, no sleeping.
    fn delay_us(&mut self, us: u32);

    /// Wait until the line reaches `level`.
    ///
    /// Returns the elapsed time in µs, or 0 on timeout.
    fn wait_for(&mut self, level: Level, timeout_us: u32) -> u32 {
        let start = self.micros();
        while self.read() != level {
            let elapsed = self.micros().wrapping_sub(start);
            if elapsed >= timeout_us {
                return 0;
            }
        }
        self.micros().wrapping_sub(start)
    }

    /// Measure how long the line stays at `level` from now.
    ///
    /// Returns 0 if the line is not already at `level`; returns the elapsed
    /// time (>= `timeout_us`) if the line is still at `level` at timeout.
    fn measure_pulse(&mut self, level: Level, timeout_us: u32) -> u32 {
        if self.read() != level {
            return 0;
        }
        let start = self.micros();
        while self.read() == level {
            let elapsed = self.micros().wrapping_sub(start);
            if elapsed >= timeout_us {
                return elapsed;
            }
        }
        self.micros().wrapping_sub(start)
    }

    /// Enter a per-core critical section for the duration of a frame.
    fn interrupts_disable(&mut self);

    /// Leave the critical section opened by
    /// [`interrupts_disable`](AdbWire::interrupts_disable).
    fn interrupts_enable(&mut self);
}
