//! Bounded event channels between the BLE core and the ADB core.
//!
//! One channel per emulated device, single producer (the BLE task) and
//! single consumer (the bus loop) by construction. Both ends are
//! non-blocking: a full channel drops the event and bumps a diagnostic
//! counter instead of ever stalling the producer.
//!
//! The pointer channel is deliberately deeper than the keyboard channel: a
//! high-DPI pointer reports far faster than the host's ~91 Hz poll cadence,
//! and motion must survive a fast swipe until the next Talk R0.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

use crate::diag;
use crate::event::{KeyEvent, PointerEvent};

pub const KEY_QUEUE_SIZE: usize = 32;
pub const POINTER_QUEUE_SIZE: usize = 64;

/// Key events from the BLE keyboard slot to the ADB keyboard device.
pub static KEY_EVENT_CHANNEL: Channel<CriticalSectionRawMutex, KeyEvent, KEY_QUEUE_SIZE> = Channel::new();
/// Pointer events from the BLE pointer slot to the ADB pointer device.
pub static POINTER_EVENT_CHANNEL: Channel<CriticalSectionRawMutex, PointerEvent, POINTER_QUEUE_SIZE> = Channel::new();

/// Push a key event without blocking. Overflow drops the event.
pub fn send_key_event(event: KeyEvent) {
    if KEY_EVENT_CHANNEL.try_send(event).is_err() {
        diag::KEY_QUEUE_DROPS.fetch_add(1, core::sync::atomic::Ordering::Relaxed);
    }
}

/// Push a pointer event without blocking. Overflow drops the event.
pub fn send_pointer_event(event: PointerEvent) {
    if POINTER_EVENT_CHANNEL.try_send(event).is_err() {
        diag::POINTER_QUEUE_DROPS.fetch_add(1, core::sync::atomic::Ordering::Relaxed);
    }
}

/// Pop a key event without blocking.
pub fn receive_key_event() -> Option<KeyEvent> {
    KEY_EVENT_CHANNEL.try_receive().ok()
}

/// Pop a pointer event without blocking.
pub fn receive_pointer_event() -> Option<PointerEvent> {
    POINTER_EVENT_CHANNEL.try_receive().ok()
}

/// True if key events are waiting to be reported.
pub fn key_events_pending() -> bool {
    !KEY_EVENT_CHANNEL.is_empty()
}

/// True if pointer events are waiting to be reported.
pub fn pointer_events_pending() -> bool {
    !POINTER_EVENT_CHANNEL.is_empty()
}
