//! ADB framing and the host-facing bus loop.
//!
//! The loop runs pinned to its own core at top priority. Its only
//! cooperative yields are a one-tick release after a 10 ms idle timeout
//! and a one-tick release every 256 commands to feed the task watchdog.
//! The host issues back-to-back keyboard and pointer polls with only
//! ~200 µs between them; any millisecond-scale sleep between commands
//! consistently misses the second device.

use core::sync::atomic::Ordering;

use embassy_time::Timer;

use crate::adb::bitbang::{self, BitError};
use crate::adb::keyboard::Keyboard;
use crate::adb::pointer::Pointer;
use crate::adb::{timing, AdbCommand, AdbOp};
use crate::diag;
use crate::driver::{AdbWire, Level};

/// What a single pass over the bus produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PollOutcome {
    /// No bus activity within the idle window.
    Idle,
    /// A malformed pulse or framing failure; discarded.
    Noise,
    /// Global reset pulse; both devices restored to defaults.
    Reset,
    /// A complete host command was received and dispatched.
    Command(AdbCommand),
}

/// Both emulated devices and the wire they answer on.
pub struct AdbBus<W: AdbWire> {
    wire: W,
    pub keyboard: Keyboard,
    pub pointer: Pointer,
}

impl<W: AdbWire> AdbBus<W> {
    pub fn new(wire: W) -> Self {
        Self {
            wire,
            keyboard: Keyboard::new(),
            pointer: Pointer::new(),
        }
    }

    pub fn wire(&self) -> &W {
        &self.wire
    }

    /// Run the bus loop forever. Must be the only task on its core; the
    /// waits in here are busy-waits by design.
    pub async fn run(&mut self) -> ! {
        info!("ADB bus loop started");

        let mut yield_counter: u32 = 0;
        loop {
            if let PollOutcome::Idle = self.poll_once() {
                // Quiet bus, safe to feed the watchdog.
                Timer::after_ticks(1).await;
            }

            yield_counter += 1;
            if yield_counter >= 256 {
                yield_counter = 0;
                Timer::after_ticks(1).await;
            }
        }
    }

    /// One pass: wait for an Attention pulse, receive the command,
    /// dispatch it. Separated from [`run`](Self::run) so the protocol is
    /// drivable without an executor.
    pub fn poll_once(&mut self) -> PollOutcome {
        // Require idle (high) first so a full Attention pulse is measured,
        // never the tail of one already in progress.
        if !self.wire.read().is_high() {
            self.wire
                .wait_for(Level::High, timing::RESET_MIN_US + 500);
            return PollOutcome::Noise;
        }

        if self.wire.wait_for(Level::Low, 10_000) == 0 {
            return PollOutcome::Idle;
        }

        // Falling edge seen; measure the whole low pulse.
        let low = self
            .wire
            .measure_pulse(Level::Low, timing::RESET_MIN_US + 500);

        if low >= timing::RESET_MIN_US {
            warn!("ADB global reset ({}us low)", low);
            self.keyboard.handle_reset();
            self.pointer.handle_reset();
            diag::ADB_RESETS.fetch_add(1, Ordering::Relaxed);
            return PollOutcome::Reset;
        }

        if low < timing::ATTENTION_MIN_US || low > timing::ATTENTION_MAX_US {
            return PollOutcome::Noise;
        }

        // Valid Attention; the line is high for the Sync period now.
        let sync = self
            .wire
            .measure_pulse(Level::High, timing::SYNC_NOMINAL_US + timing::SYNC_SLACK_US);
        if sync == 0 {
            return PollOutcome::Noise;
        }

        // Interrupts stay off through command receive and stop-bit
        // handling; dispatch re-enables them.
        self.wire.interrupts_disable();
        match bitbang::receive_command_byte(&mut self.wire) {
            Ok(byte) => {
                let cmd = AdbCommand::parse(byte);
                self.dispatch(cmd);
                PollOutcome::Command(cmd)
            }
            Err(_) => {
                self.wire.interrupts_enable();
                PollOutcome::Noise
            }
        }
    }

    /// Handle a received command. Entered with interrupts disabled and the
    /// host's stop bit still on the wire.
    fn dispatch(&mut self, cmd: AdbCommand) {
        diag::ADB_POLLS.fetch_add(1, Ordering::Relaxed);

        let is_keyboard = cmd.address == self.keyboard.address();
        let is_pointer = !is_keyboard && cmd.address == self.pointer.address();

        if !is_keyboard && !is_pointer {
            // Someone else's poll: ask to be serviced if either device has
            // data waiting.
            let want_srq = self.keyboard.has_pending() || self.pointer.has_pending();
            bitbang::consume_stop(&mut self.wire, want_srq);
            self.wire.interrupts_enable();
            return;
        }

        // Addressed to one of ours: assert SRQ for the OTHER device so it
        // is not starved under fast interleaved polling.
        let other_pending = if is_keyboard {
            self.pointer.has_pending()
        } else {
            self.keyboard.has_pending()
        };
        bitbang::consume_stop(&mut self.wire, other_pending);
        self.wire.interrupts_enable();

        match cmd.op {
            AdbOp::Talk => {
                let response = if is_keyboard {
                    self.keyboard.handle_talk(cmd.register)
                } else {
                    self.pointer.handle_talk(cmd.register)
                };

                if let Some(word) = response {
                    self.wire.delay_us(timing::TLT_US);

                    self.wire.interrupts_disable();
                    bitbang::send_word(&mut self.wire, word);
                    self.wire.interrupts_enable();

                    diag::ADB_TALK_RESPONSES.fetch_add(1, Ordering::Relaxed);
                    trace!("talk A{} R{} -> {:04x}", cmd.address, cmd.register, word);
                }
                // No data: the bus stays idle and the host moves on.
            }
            AdbOp::Listen => {
                // The host controls Tlt here; wait for its start bit
                // rather than using a fixed delay.
                if self
                    .wire
                    .wait_for(Level::Low, timing::TLT_MAX_US + 100)
                    != 0
                {
                    self.wire.interrupts_disable();
                    let data = bitbang::receive_word(&mut self.wire);
                    self.wire.interrupts_enable();

                    match data {
                        Ok(word) => {
                            if is_keyboard {
                                self.keyboard.handle_listen(cmd.register, word);
                            } else {
                                self.pointer.handle_listen(cmd.register, word);
                            }
                            debug!("listen A{} R{} <- {:04x}", cmd.address, cmd.register, word);
                        }
                        Err(BitError::Timeout) | Err(BitError::Framing) => {}
                    }
                }
            }
            AdbOp::Flush => {
                if is_keyboard {
                    self.keyboard.handle_flush();
                } else {
                    self.pointer.handle_flush();
                }
                debug!("flush A{}", cmd.address);
            }
            AdbOp::Reset => {
                if is_keyboard {
                    self.keyboard.handle_reset();
                } else {
                    self.pointer.handle_reset();
                }
                debug!("reset A{}", cmd.address);
            }
        }
    }

    /// Boot-time timing self test: drives bit cells on the wire and logs
    /// the measured phases. Useful with a scope or loopback pull-up to
    /// verify the HAL meets the ±2 µs budget before the Mac is attached.
    pub fn self_test(&mut self) {
        info!("ADB timing self test");

        for (name, low_us, high_us) in [
            ("'1' cell", timing::BIT_1_LOW_US, timing::BIT_1_HIGH_US),
            ("'0' cell", timing::BIT_0_LOW_US, timing::BIT_0_HIGH_US),
        ] {
            for _ in 0..10 {
                self.wire.interrupts_disable();
                let start = self.wire.micros();
                self.wire.drive_low();
                self.wire.delay_us(low_us);
                let mid = self.wire.micros();
                self.wire.release();
                self.wire.delay_us(high_us);
                let end = self.wire.micros();
                self.wire.interrupts_enable();

                info!(
                    "{}: low={}us high={}us",
                    name,
                    mid.wrapping_sub(start),
                    end.wrapping_sub(mid)
                );
            }
        }

        self.wire.release();
        self.wire.delay_us(100);
        let idle_high = self.wire.read().is_high();
        self.wire.drive_low();
        self.wire.delay_us(50);
        let driven_low = !self.wire.read().is_high();
        self.wire.release();
        self.wire.delay_us(50);
        let released_high = self.wire.read().is_high();
        info!(
            "line: idle high={} driven low={} released high={}",
            idle_high, driven_low, released_high
        );
    }

    /// Passive bus monitor: decodes and logs host traffic without
    /// emulating any device. Diagnostic mode, selected instead of
    /// [`run`](Self::run).
    pub async fn monitor(&mut self) -> ! {
        info!("ADB bus monitor started");

        loop {
            if self.wire.read().is_high() {
                Timer::after_ticks(1).await;
                continue;
            }

            let low = self
                .wire
                .measure_pulse(Level::Low, timing::RESET_MIN_US + 500);

            if low >= timing::RESET_MIN_US {
                info!("[mon] global reset ({}us)", low);
                self.wire.wait_for(Level::High, 5_000);
                continue;
            }

            if low < timing::ATTENTION_MIN_US || low > timing::ATTENTION_MAX_US {
                continue;
            }

            let sync = self.wire.measure_pulse(Level::High, 200);
            let Ok(byte) = bitbang::receive_command_byte(&mut self.wire) else {
                continue;
            };
            let cmd = AdbCommand::parse(byte);
            let _ = bitbang::receive_bit(&mut self.wire);

            info!(
                "[mon] attn={}us sync={}us addr={} op={:?} reg={}",
                low, sync, cmd.address, cmd.op, cmd.register
            );

            match cmd.op {
                AdbOp::Talk => {
                    // Watch for a device response within Tlt + margin.
                    if self.wire.wait_for(Level::Low, 500) != 0 {
                        if let Ok(word) = bitbang::receive_word(&mut self.wire) {
                            info!("[mon]   -> {:04x}", word);
                        }
                    } else {
                        info!("[mon]   (no response)");
                    }
                }
                AdbOp::Listen => {
                    if self.wire.wait_for(Level::Low, timing::TLT_MAX_US + 100) != 0 {
                        if let Ok(word) = bitbang::receive_word(&mut self.wire) {
                            info!("[mon]   <- {:04x}", word);
                        }
                    }
                }
                _ => {}
            }
        }
    }
}
