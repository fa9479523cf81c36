//! Tunable bridge configuration.
//!
//! Wire-protocol timing lives with the ADB modules as constants; everything
//! here is policy a board crate may want to adjust.

use embassy_time::Duration;

/// Top-level configuration, assembled by the board crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct BridgeConfig {
    pub adb: AdbConfig,
    pub scan: ScanParams,
    pub connect: ConnectionParams,
    pub reconnect: ReconnectConfig,
    /// How long the bond-clear pin must be held at boot to erase all bonds.
    pub bond_clear_hold: BondClearConfig,
    /// Period of the background diagnostics report.
    pub diagnostics: DiagnosticsConfig,
}

/// ADB-side boot checks and operating mode.
#[derive(Clone, Copy, Debug, Default)]
pub struct AdbConfig {
    /// Run the timing self test once before entering the bus loop.
    pub self_test: bool,
    pub mode: AdbMode,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AdbMode {
    /// Emulate the keyboard and pointer devices.
    #[default]
    Bridge,
    /// Passively decode and log host traffic; no device emulation.
    Monitor,
}

/// BLE scan parameters. Active scanning, indefinite duration.
#[derive(Clone, Copy, Debug)]
pub struct ScanParams {
    pub interval: Duration,
    pub window: Duration,
}

impl Default for ScanParams {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            window: Duration::from_millis(80),
        }
    }
}

/// Connection parameters negotiated with HID peripherals.
#[derive(Clone, Copy, Debug)]
pub struct ConnectionParams {
    pub min_interval: Duration,
    pub max_interval: Duration,
    pub latency: u16,
    pub supervision_timeout: Duration,
    /// Hard per-attempt budget for establishing a connection.
    pub connect_timeout: Duration,
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self {
            // 12..40 in 1.25 ms units
            min_interval: Duration::from_micros(15_000),
            max_interval: Duration::from_millis(50),
            latency: 0,
            // 400 in 10 ms units
            supervision_timeout: Duration::from_secs(4),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// Exponential backoff policy for reconnecting to a bonded peer.
#[derive(Clone, Copy, Debug)]
pub struct ReconnectConfig {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Attempts before the slot gives up and returns to scanning.
    pub max_attempts: u8,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            max_attempts: 10,
        }
    }
}

impl ReconnectConfig {
    /// Next delay after a failed attempt: doubled, capped.
    pub fn next_backoff(&self, current: Duration) -> Duration {
        let doubled = Duration::from_ticks(current.as_ticks().saturating_mul(2));
        if doubled > self.max_backoff { self.max_backoff } else { doubled }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct BondClearConfig {
    pub hold: Duration,
}

impl Default for BondClearConfig {
    fn default() -> Self {
        Self {
            hold: Duration::from_secs(3),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DiagnosticsConfig {
    pub period: Duration,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_and_caps() {
        let cfg = ReconnectConfig::default();
        let mut backoff = cfg.initial_backoff;
        let mut seen = heapless::Vec::<u64, 10>::new();
        for _ in 0..10 {
            seen.push(backoff.as_millis()).unwrap();
            backoff = cfg.next_backoff(backoff);
        }
        assert_eq!(
            &seen[..],
            &[1000, 2000, 4000, 8000, 16000, 30000, 30000, 30000, 30000, 30000]
        );
    }
}
