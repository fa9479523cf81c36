//! Diagnostic counters shared across the bridge.
//!
//! All counters are plain relaxed atomics. Readers on the other core may
//! observe slightly stale values; that is fine, the numbers are purely
//! advisory and feed a status renderer or the periodic serial report.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::channel::{KEY_EVENT_CHANNEL, POINTER_EVENT_CHANNEL};

/// Valid host commands observed on the ADB bus.
pub static ADB_POLLS: AtomicU32 = AtomicU32::new(0);
/// Talk commands answered with a data word.
pub static ADB_TALK_RESPONSES: AtomicU32 = AtomicU32::new(0);
/// Global resets observed on the bus.
pub static ADB_RESETS: AtomicU32 = AtomicU32::new(0);

/// Keyboard notification callbacks, total.
pub static KBD_REPORTS: AtomicU32 = AtomicU32::new(0);
/// Keyboard reports that passed the length filter.
pub static KBD_REPORTS_KEPT: AtomicU32 = AtomicU32::new(0);
/// Keyboard reports rejected by the length filter (consumer/vendor noise).
pub static KBD_REPORTS_DROPPED: AtomicU32 = AtomicU32::new(0);
/// Pointer notification callbacks, total.
pub static POINTER_REPORTS: AtomicU32 = AtomicU32::new(0);

/// Events dropped because the keyboard queue was full.
pub static KEY_QUEUE_DROPS: AtomicU32 = AtomicU32::new(0);
/// Events dropped because the pointer queue was full.
pub static POINTER_QUEUE_DROPS: AtomicU32 = AtomicU32::new(0);

/// Milliseconds-since-boot of the last keyboard notification (0 = never).
pub static KBD_LAST_REPORT_MS: AtomicU32 = AtomicU32::new(0);
/// Milliseconds-since-boot of the last pointer notification (0 = never).
pub static POINTER_LAST_REPORT_MS: AtomicU32 = AtomicU32::new(0);

/// Reconnect sequences abandoned after exhausting all attempts.
pub static RECONNECT_GIVE_UPS: AtomicU32 = AtomicU32::new(0);

/// A coherent-enough copy of every counter, for external presentation.
#[derive(Clone, Copy, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DiagSnapshot {
    pub adb_polls: u32,
    pub adb_talk_responses: u32,
    pub adb_resets: u32,
    pub kbd_reports: u32,
    pub kbd_reports_kept: u32,
    pub kbd_reports_dropped: u32,
    pub pointer_reports: u32,
    pub key_queue_drops: u32,
    pub pointer_queue_drops: u32,
    pub kbd_last_report_ms: u32,
    pub pointer_last_report_ms: u32,
    pub reconnect_give_ups: u32,
    pub key_queue_depth: usize,
    pub pointer_queue_depth: usize,
}

impl DiagSnapshot {
    pub fn capture() -> Self {
        Self {
            adb_polls: ADB_POLLS.load(Ordering::Relaxed),
            adb_talk_responses: ADB_TALK_RESPONSES.load(Ordering::Relaxed),
            adb_resets: ADB_RESETS.load(Ordering::Relaxed),
            kbd_reports: KBD_REPORTS.load(Ordering::Relaxed),
            kbd_reports_kept: KBD_REPORTS_KEPT.load(Ordering::Relaxed),
            kbd_reports_dropped: KBD_REPORTS_DROPPED.load(Ordering::Relaxed),
            pointer_reports: POINTER_REPORTS.load(Ordering::Relaxed),
            key_queue_drops: KEY_QUEUE_DROPS.load(Ordering::Relaxed),
            pointer_queue_drops: POINTER_QUEUE_DROPS.load(Ordering::Relaxed),
            kbd_last_report_ms: KBD_LAST_REPORT_MS.load(Ordering::Relaxed),
            pointer_last_report_ms: POINTER_LAST_REPORT_MS.load(Ordering::Relaxed),
            reconnect_give_ups: RECONNECT_GIVE_UPS.load(Ordering::Relaxed),
            key_queue_depth: KEY_EVENT_CHANNEL.len(),
            pointer_queue_depth: POINTER_EVENT_CHANNEL.len(),
        }
    }
}

/// Log the counter snapshot at a fixed period. Intended for the lowest
/// priority slot on the non-realtime core.
pub async fn run_diagnostics(period: embassy_time::Duration) -> ! {
    loop {
        embassy_time::Timer::after(period).await;
        let s = DiagSnapshot::capture();
        info!(
            "adb polls:{} resp:{} resets:{} | kbd cb:{} kept:{} drop:{} | ptr cb:{} | q kbd:{}(-{}) ptr:{}(-{})",
            s.adb_polls,
            s.adb_talk_responses,
            s.adb_resets,
            s.kbd_reports,
            s.kbd_reports_kept,
            s.kbd_reports_dropped,
            s.pointer_reports,
            s.key_queue_depth,
            s.key_queue_drops,
            s.pointer_queue_depth,
            s.pointer_queue_drops,
        );
    }
}
