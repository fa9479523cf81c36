//! `ble2adb` — a BLE HID to Apple Desktop Bus bridge.
//!
//! The bridge lets a vintage Macintosh poll two emulated ADB devices — a
//! keyboard at address 2 and a pointer at address 3 — while a BLE Central
//! pairs with modern wireless keyboards and pointing devices and feeds
//! their input across cores through bounded channels.
//!
//! The crate is chip-agnostic. A board crate provides:
//!
//! * an [`driver::AdbWire`] implementation for the open-drain data pin
//!   (RAM-resident, microsecond-accurate — see the trait docs),
//! * a `trouble-host` [`Controller`](trouble_host::prelude::Controller)
//!   for the radio,
//! * one executor per core.
//!
//! Task placement is load-bearing: the ADB bus loop must be the only task
//! on its core (top priority, ~4 KiB stack) because it busy-waits on the
//! wire between host polls; the BLE host and diagnostics run on the other
//! core (~8 KiB and lowest priority respectively). The event channels are
//! `const`-initialized statics, so there is no init-order hazard between
//! producers and queues.
//!
//! ```ignore
//! // Core A (realtime):
//! spawner_a.must_spawn(adb_task(MyWire::new(p.GPIO48), config.adb));
//! // Core B:
//! let mut resources = BridgeHostResources::new();
//! let stack = build_ble_stack(controller, address, &mut rng, &mut resources).await;
//! clear_bonds_if_held(&mut boot_button, &stack, config.bond_clear).await;
//! let host = HidHost::new(config);
//! run_bridge_host(&stack, &host, config.diagnostics).await;
//! ```

#![cfg_attr(not(test), no_std)]
#![allow(async_fn_in_trait)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod adb;
pub mod ble;
pub mod channel;
pub mod config;
pub mod diag;
pub mod driver;
pub mod event;
pub mod keycode;

use embassy_futures::join::join3;
use embassy_time::{Instant, Timer};
use embedded_hal::digital::InputPin;
use trouble_host::prelude::*;

pub use crate::adb::bus::AdbBus;
pub use crate::ble::central::HidHost;
pub use crate::ble::{build_ble_stack, clear_bonds, BridgeHostResources};
pub use crate::config::BridgeConfig;
pub use crate::diag::{run_diagnostics, DiagSnapshot};
pub use crate::driver::{AdbWire, Level};

static ADV_HANDLER: ble::AdvertisementHandler = ble::AdvertisementHandler;

/// Run the ADB side forever: optional boot-time timing self test, then
/// either the device engine or the passive bus monitor. Pin this to the
/// realtime core.
pub async fn run_adb_bus<W: AdbWire>(wire: W, config: config::AdbConfig) -> ! {
    let mut bus = AdbBus::new(wire);

    if config.self_test {
        bus.self_test();
    }

    match config.mode {
        config::AdbMode::Bridge => bus.run().await,
        config::AdbMode::Monitor => bus.monitor().await,
    }
}

/// Run everything BLE-side: the stack runner (with the advertisement
/// handler installed), the HID host, and the periodic diagnostics report.
/// Pin this to the non-realtime core.
pub async fn run_bridge_host<'a, C: Controller + bt_hci::controller::ControllerCmdSync<bt_hci::cmd::le::LeSetScanParams>>(
    stack: &'a Stack<'a, C>,
    hid_host: &'a HidHost,
    diagnostics: config::DiagnosticsConfig,
) -> ! {
    let Host {
        central,
        mut runner,
        ..
    } = stack.build();

    join3(
        async {
            loop {
                if runner.run_with_handler(&ADV_HANDLER).await.is_err() {
                    error!("BLE stack runner error, restarting");
                    Timer::after_millis(100).await;
                }
            }
        },
        hid_host.run(stack, central),
        diag::run_diagnostics(diagnostics.period),
    )
    .await;

    unreachable!("bridge host tasks ended");
}

/// Boot-time bond-clear gesture: if the (input-pullup) pin is low at
/// startup and stays low for the configured hold time, every stored bond
/// is erased. Call before spawning the BLE host.
pub async fn clear_bonds_if_held<C: Controller, P: InputPin>(
    pin: &mut P,
    stack: &Stack<'_, C>,
    config: config::BondClearConfig,
) {
    if pin.is_high().unwrap_or(true) {
        return;
    }

    info!(
        "bond clear pin held, keep holding {}ms to erase bonds",
        config.hold.as_millis()
    );

    let deadline = Instant::now() + config.hold;
    while Instant::now() < deadline {
        if pin.is_high().unwrap_or(true) {
            info!("bond clear pin released early, bonds kept");
            return;
        }
        Timer::after_millis(100).await;
    }

    clear_bonds(stack);
}
