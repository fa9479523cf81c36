//! Device-state tests: events flow from the cross-core channels through
//! the keyboard ring and pointer accumulators to Talk R0 words.
//!
//! These touch the global event channels, so each test runs in its own
//! forked process.

mod common;
pub(crate) use crate::common::*;

mod device_state {
    use ble2adb::adb::keyboard::Keyboard;
    use ble2adb::adb::pointer::Pointer;
    use ble2adb::ble::report::KeyboardReportState;
    use ble2adb::channel::{send_key_event, send_pointer_event, KEY_EVENT_CHANNEL};
    use ble2adb::diag;
    use ble2adb::event::{KeyEvent, PointerEvent};
    use core::sync::atomic::Ordering;
    use rusty_fork::rusty_fork_test;

    fn key(scancode: u8, released: bool) -> KeyEvent {
        KeyEvent { scancode, released }
    }

    fn motion(dx: i16, dy: i16, button: bool) -> PointerEvent {
        PointerEvent { dx, dy, button }
    }

    rusty_fork_test! {

    #[test]
    fn single_key_roundtrip() {
        let mut kbd = Keyboard::new();

        // Press and release separated by a host poll, as the ~91 Hz poll
        // cadence would see them.
        send_key_event(key(0x00, false));
        assert_eq!(kbd.handle_talk(0), Some(0x00FF));

        send_key_event(key(0x00, true));
        assert_eq!(kbd.handle_talk(0), Some(0x80FF));

        assert_eq!(kbd.handle_talk(0), None);
    }

    #[test]
    fn press_and_release_queued_together_combine_into_one_poll() {
        let mut kbd = Keyboard::new();

        send_key_event(key(0x00, false));
        send_key_event(key(0x00, true));

        assert_eq!(kbd.handle_talk(0), Some(0x0080));
        assert_eq!(kbd.handle_talk(0), None);
    }

    #[test]
    fn two_keys_in_one_poll() {
        let mut kbd = Keyboard::new();

        send_key_event(key(0x00, false));
        send_key_event(key(0x26, false));

        assert_eq!(kbd.handle_talk(0), Some(0x0026));
        assert_eq!(kbd.handle_talk(0), None);
    }

    #[test]
    fn key_order_is_preserved() {
        let mut kbd = Keyboard::new();

        for scancode in [0x00, 0x01, 0x02, 0x03, 0x04] {
            send_key_event(key(scancode, false));
        }

        assert_eq!(kbd.handle_talk(0), Some(0x0001));
        assert_eq!(kbd.handle_talk(0), Some(0x0203));
        assert_eq!(kbd.handle_talk(0), Some(0x04FF));
        assert_eq!(kbd.handle_talk(0), None);
    }

    #[test]
    fn flush_empties_pending_keys() {
        let mut kbd = Keyboard::new();

        for scancode in [0x10, 0x11, 0x12, 0x13] {
            send_key_event(key(scancode, false));
        }
        assert!(kbd.has_pending());

        // One poll reports two events and leaves two in the ring.
        assert_eq!(kbd.handle_talk(0), Some(0x1011));
        assert!(kbd.has_pending());

        kbd.handle_flush();
        assert_eq!(kbd.handle_talk(0), None);
        assert!(!kbd.has_pending());
    }

    #[test]
    fn pointer_clamp_with_carry() {
        let mut pointer = Pointer::new();

        send_pointer_event(motion(100, -100, false));

        // First poll clamps to +63/-64 and carries the remainder.
        assert_eq!(pointer.handle_talk(0), Some(0xC0BF));

        // Remainder: dx = 37, dy = -36.
        assert_eq!(pointer.handle_talk(0), Some(0xDCA5));

        assert_eq!(pointer.handle_talk(0), None);
    }

    #[test]
    fn pointer_motion_sums_across_events() {
        let mut pointer = Pointer::new();

        for _ in 0..4 {
            send_pointer_event(motion(10, -5, false));
        }

        // 40 right, 20 up, button released.
        assert_eq!(pointer.handle_talk(0), Some(0xECA8));
        assert_eq!(pointer.handle_talk(0), None);
    }

    #[test]
    fn button_edge_without_motion() {
        let mut pointer = Pointer::new();

        send_pointer_event(motion(0, 0, true));
        assert_eq!(pointer.handle_talk(0), Some(0x0080));

        // No new events: idle poll yields no response.
        assert_eq!(pointer.handle_talk(0), None);

        send_pointer_event(motion(0, 0, false));
        assert_eq!(pointer.handle_talk(0), Some(0x8080));
    }

    #[test]
    fn button_held_across_motion_polls() {
        let mut pointer = Pointer::new();

        send_pointer_event(motion(3, 0, true));
        assert_eq!(pointer.handle_talk(0), Some(0x0083));

        // Button still down, more motion: button bit stays asserted and
        // the unchanged state alone does not trigger a report.
        send_pointer_event(motion(2, 0, true));
        assert_eq!(pointer.handle_talk(0), Some(0x0082));
        assert_eq!(pointer.handle_talk(0), None);
    }

    #[test]
    fn up_arrow_never_reports_power_code() {
        let mut kbd = Keyboard::new();
        let mut reports = KeyboardReportState::new();

        // USB Up Arrow pressed in a boot keyboard report.
        let mut report = [0u8; 8];
        report[2] = 0x52;
        for event in reports.diff(&report).unwrap() {
            send_key_event(event);
        }

        assert_eq!(kbd.handle_talk(0), Some(0x3EFF));
    }

    #[test]
    fn queue_overflow_drops_and_counts() {
        let mut kbd = Keyboard::new();

        for i in 0..35u16 {
            send_key_event(key((i & 0x7F) as u8, false));
        }

        assert_eq!(diag::KEY_QUEUE_DROPS.load(Ordering::Relaxed), 3);
        assert_eq!(KEY_EVENT_CHANNEL.len(), 32);

        // The 32 that fit are all delivered, in order.
        let mut delivered = 0;
        while let Some(word) = kbd.handle_talk(0) {
            delivered += if word & 0x00FF == 0x00FF { 1 } else { 2 };
        }
        assert_eq!(delivered, 32);
    }

    #[test]
    fn pointer_queue_is_deeper_than_keyboard_queue() {
        for i in 0..70i16 {
            send_pointer_event(motion(i, 0, false));
        }
        assert_eq!(
            diag::POINTER_QUEUE_DROPS.load(Ordering::Relaxed),
            6
        );

        let mut pointer = Pointer::new();
        // Sum of 0..=63 = 2016, clamped out 63 at a time.
        let mut total = 0i32;
        while let Some(word) = pointer.handle_talk(0) {
            let dx = ((word & 0x7F) as u8) << 1;
            total += (dx as i8 >> 1) as i32;
        }
        assert_eq!(total, (0..64).sum::<i32>());
    }

    }
}
