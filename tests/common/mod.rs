//! Shared test fixtures: a deterministic mock of the ADB wire.

use ble2adb::{AdbWire, Level};

// Init logger for tests
#[ctor::ctor]
pub fn init_log() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

/// A simulated open-drain ADB line with a virtual microsecond clock.
///
/// The host side is a pre-scripted list of edges; the device side is
/// driven live by the code under test. The line is low whenever either
/// side pulls it low. Every device transition is recorded with its
/// timestamp so tests can decode what the device put on the wire.
pub struct MockWire {
    /// Virtual clock, microseconds.
    now: u32,
    /// `(time, host_pulls_low)` — host level changes, sorted by time.
    host_edges: Vec<(u32, bool)>,
    /// Device currently pulling the line low.
    device_low: bool,
    /// Recorded `(time, pulls_low)` device transitions.
    pub device_log: Vec<(u32, bool)>,
    /// Critical-section depth, for assertions.
    pub irq_depth: i32,
}

impl MockWire {
    pub fn new() -> Self {
        Self {
            now: 0,
            host_edges: Vec::new(),
            device_low: false,
            device_log: Vec::new(),
            irq_depth: 0,
        }
    }

    pub fn now(&self) -> u32 {
        self.now
    }

    fn host_low_at(&self, t: u32) -> bool {
        let mut low = false;
        for &(time, pulls_low) in &self.host_edges {
            if time > t {
                break;
            }
            low = pulls_low;
        }
        low
    }

    fn line_high_at(&self, t: u32) -> bool {
        !self.host_low_at(t) && !self.device_low
    }

    /// Next host edge strictly after `t` that flips the line level.
    fn next_line_change(&self, t: u32) -> Option<u32> {
        if self.device_low {
            // Device holds the line low regardless of the host.
            return None;
        }
        let current = self.line_high_at(t);
        self.host_edges
            .iter()
            .map(|&(time, _)| time)
            .find(|&time| time > t && self.line_high_at(time) != current)
    }

    /// Decode the device's recorded transmission into low-pulse widths.
    pub fn device_pulses(&self) -> Vec<u32> {
        let mut pulses = Vec::new();
        let mut drive_start = None;
        for &(t, low) in &self.device_log {
            match (low, drive_start) {
                (true, None) => drive_start = Some(t),
                (false, Some(start)) => {
                    pulses.push(t - start);
                    drive_start = None;
                }
                _ => {}
            }
        }
        pulses
    }

    /// Decode a framed data word the device sent: start bit, 16 data
    /// bits, stop bit. Panics if the pulse train is malformed.
    pub fn device_word(&self) -> u16 {
        let pulses = self.device_pulses();
        assert_eq!(pulses.len(), 18, "expected start + 16 data + stop pulses");
        assert!(pulses[0] < 50, "start bit must decode as 1");
        assert!(pulses[17] >= 50, "stop bit must decode as 0");
        let mut word = 0u16;
        for &low in &pulses[1..17] {
            word = (word << 1) | (low < 50) as u16;
        }
        word
    }

    // ── Host script builders ───────────────────────────────────────────

    /// Append a host-driven low pulse of `us` at the current end of the
    /// script, followed by release.
    pub fn script_low(&mut self, us: u32) -> &mut Self {
        let t = self.script_end();
        self.host_edges.push((t, true));
        self.host_edges.push((t + us, false));
        self
    }

    /// Extend the scripted idle (high) time by `us`.
    pub fn script_high(&mut self, us: u32) -> &mut Self {
        let t = self.script_end() + us;
        self.host_edges.push((t, false));
        self
    }

    fn script_end(&self) -> u32 {
        self.host_edges.last().map(|&(t, _)| t).unwrap_or(0)
    }

    /// One host-driven bit cell (100 us total).
    pub fn script_bit(&mut self, bit: bool) -> &mut Self {
        if bit {
            self.script_low(35).script_high(65)
        } else {
            self.script_low(65).script_high(35)
        }
    }

    /// Attention + sync + command byte + stop bit.
    pub fn script_command(&mut self, byte: u8) -> &mut Self {
        self.script_high(100); // idle lead-in
        self.script_low(800); // attention
        self.script_high(65); // sync
        for i in (0..8).rev() {
            self.script_bit((byte >> i) & 1 != 0);
        }
        self.script_bit(false) // stop
    }

    /// A framed host data word (Listen payload): Tlt gap, start bit,
    /// 16 data bits, stop bit.
    pub fn script_data_word(&mut self, word: u16) -> &mut Self {
        self.script_high(200); // host-side Tlt
        self.script_bit(true); // start
        for i in (0..16).rev() {
            self.script_bit((word >> i) & 1 != 0);
        }
        self.script_bit(false) // stop
    }
}

impl AdbWire for MockWire {
    fn drive_low(&mut self) {
        self.device_low = true;
        self.device_log.push((self.now, true));
    }

    fn release(&mut self) {
        self.device_low = false;
        self.device_log.push((self.now, false));
    }

    fn read(&mut self) -> Level {
        if self.line_high_at(self.now) {
            Level::High
        } else {
            Level::Low
        }
    }

    fn micros(&mut self) -> u32 {
        self.now
    }

    fn delay_us(&mut self, us: u32) {
        self.now += us;
    }

    fn wait_for(&mut self, level: Level, timeout_us: u32) -> u32 {
        let want_high = level == Level::High;
        if self.line_high_at(self.now) == want_high {
            // Already satisfied; a real HAL reports the >=1 us of call
            // overhead rather than 0 (0 means timeout).
            return 1;
        }

        let start = self.now;
        let mut t = self.now;
        while let Some(change) = self.next_line_change(t) {
            if change - start >= timeout_us {
                break;
            }
            if self.line_high_at(change) == want_high {
                self.now = change;
                return change - start;
            }
            t = change;
        }
        self.now = start + timeout_us;
        0
    }

    fn measure_pulse(&mut self, level: Level, timeout_us: u32) -> u32 {
        let want_high = level == Level::High;
        if self.line_high_at(self.now) != want_high {
            return 0;
        }

        let start = self.now;
        match self.next_line_change(start) {
            Some(change) if change - start < timeout_us => {
                self.now = change;
                change - start
            }
            _ => {
                self.now = start + timeout_us;
                timeout_us
            }
        }
    }

    fn interrupts_disable(&mut self) {
        self.irq_depth += 1;
    }

    fn interrupts_enable(&mut self) {
        self.irq_depth -= 1;
    }
}
