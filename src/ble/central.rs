//! Acquisition, session, and reconnection logic for the two HID slots.
//!
//! Three cooperating tasks share one `Central`:
//!
//! * the **acquisition loop** owns the `Central`, runs scan bursts,
//!   connects to candidates and due reconnects, performs discovery and
//!   device-type detection, then hands the connection to a slot;
//! * two **session tasks** (one per slot) hold the GATT client, set the
//!   protocol mode, subscribe, and pump notifications into the event
//!   channels until the link dies.
//!
//! The advertisement handler in [`crate::ble`] feeds the acquisition loop
//! through [`SCAN_SHARED`]; it never connects on its own.

use core::cell::RefCell;
use core::sync::atomic::Ordering;

use embassy_futures::join::join3;
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::{with_timeout, Duration, Instant, Timer};
use trouble_host::prelude::*;

use crate::ble::report::{translate_pointer, KeyboardReportState};
use crate::ble::{
    Candidate, HidHostError, Slot, SlotIndex, SlotState, BOOT_KEYBOARD_INPUT, BOOT_MOUSE_INPUT,
    HID_REPORT, HID_SERVICE, L2CAP_MTU, MAX_SERVICES, PROTOCOL_MODE, REPORT_MAP, SCAN_SHARED,
    SLOT_STATES,
};
use crate::channel as events;
use crate::config::BridgeConfig;
use crate::diag;

/// A typed connection handed from the acquisition loop to a slot session.
struct SessionTicket<'d> {
    conn: Connection<'d>,
    as_keyboard: bool,
    /// Re-established link to a bonded peer: skip type detection.
    reconnect: bool,
}

type SessionChannel<'d> = Channel<NoopRawMutex, SessionTicket<'d>, 1>;

/// The BLE HID host: one keyboard slot, one pointer slot.
pub struct HidHost {
    config: BridgeConfig,
    slots: RefCell<[Slot; 2]>,
}

impl HidHost {
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            slots: RefCell::new([Slot::new(), Slot::new()]),
        }
    }

    /// Drive the HID host forever. Runs on the non-realtime core alongside
    /// the stack runner.
    pub async fn run<'d, C: Controller + bt_hci::controller::ControllerCmdSync<bt_hci::cmd::le::LeSetScanParams>>(
        &'d self,
        stack: &'d Stack<'d, C>,
        central: Central<'d, C>,
    ) -> ! {
        info!("BLE HID host started");

        let sessions: [SessionChannel<'d>; 2] = [Channel::new(), Channel::new()];

        join3(
            self.acquisition_loop(stack, central, &sessions),
            self.session_loop(SlotIndex::Keyboard, stack, &sessions[0]),
            self.session_loop(SlotIndex::Pointer, stack, &sessions[1]),
        )
        .await;

        unreachable!("BLE HID host tasks ended");
    }

    // ─── Slot bookkeeping ──────────────────────────────────────────────

    fn with_slot<R>(&self, index: SlotIndex, f: impl FnOnce(&mut Slot) -> R) -> R {
        f(&mut self.slots.borrow_mut()[index as usize])
    }

    fn set_state(&self, index: SlotIndex, state: SlotState) {
        self.with_slot(index, |slot| slot.state = state);
        SLOT_STATES[index as usize].store(state as u8, Ordering::Relaxed);
    }

    fn state_of(&self, index: SlotIndex) -> SlotState {
        self.with_slot(index, |slot| slot.state)
    }

    fn needs_device(&self) -> bool {
        self.state_of(SlotIndex::Keyboard) == SlotState::Disconnected
            || self.state_of(SlotIndex::Pointer) == SlotState::Disconnected
    }

    /// Scanning is wanted both to acquire fresh devices and to spot a
    /// bonded peer we are reconnecting to (the sighting bypasses the
    /// backoff timer).
    fn wants_scan(&self) -> bool {
        [SlotIndex::Keyboard, SlotIndex::Pointer].iter().any(|&index| {
            matches!(
                self.state_of(index),
                SlotState::Disconnected | SlotState::Reconnecting
            )
        })
    }

    /// Return a slot to `Disconnected` so scan acquisition resumes.
    fn release_slot(&self, index: SlotIndex) {
        self.with_slot(index, |slot| {
            slot.peer = None;
            slot.name.clear();
            slot.was_keyboard = false;
            slot.was_pointer = false;
            slot.attempts = 0;
        });
        SCAN_SHARED.watch_peer(index, None);
        self.set_state(index, SlotState::Disconnected);
    }

    /// Begin the reconnect schedule for a slot whose link just dropped.
    fn enter_reconnecting(&self, index: SlotIndex) {
        let initial = self.config.reconnect.initial_backoff;
        let peer = self.with_slot(index, |slot| {
            slot.backoff = initial;
            slot.next_attempt = Instant::now() + initial;
            slot.attempts = 0;
            slot.peer
        });

        match peer {
            Some((_, addr)) => {
                SCAN_SHARED.watch_peer(index, Some(addr));
                self.set_state(index, SlotState::Reconnecting);
                info!(
                    "[{}] link lost, reconnecting (backoff {}ms)",
                    index.label(),
                    initial.as_millis()
                );
            }
            None => self.release_slot(index),
        }
    }

    /// Account a failed reconnect attempt; give up after the configured
    /// budget so scan-based acquisition can take over.
    fn note_reconnect_failure(&self, index: SlotIndex) {
        let reconnect = self.config.reconnect;
        let give_up = self.with_slot(index, |slot| {
            slot.attempts += 1;
            if slot.attempts >= reconnect.max_attempts {
                true
            } else {
                slot.backoff = reconnect.next_backoff(slot.backoff);
                slot.next_attempt = Instant::now() + slot.backoff;
                debug!(
                    "[{}] reconnect attempt {} failed, next in {}ms",
                    index.label(),
                    slot.attempts,
                    slot.backoff.as_millis()
                );
                false
            }
        });

        if give_up {
            warn!(
                "[{}] giving up after {} reconnect attempts",
                index.label(),
                reconnect.max_attempts
            );
            diag::RECONNECT_GIVE_UPS.fetch_add(1, Ordering::Relaxed);
            self.release_slot(index);
        }
    }

    fn reconnect_due(&self, index: SlotIndex) -> bool {
        if self.state_of(index) != SlotState::Reconnecting {
            return false;
        }
        if SCAN_SHARED.kick[index as usize].swap(false, Ordering::Relaxed) {
            info!("[{}] bonded peer seen in scan, reconnecting now", index.label());
            self.with_slot(index, |slot| slot.next_attempt = Instant::now());
            return true;
        }
        self.with_slot(index, |slot| Instant::now() >= slot.next_attempt)
    }

    // ─── Acquisition ───────────────────────────────────────────────────

    async fn acquisition_loop<'d, C: Controller + bt_hci::controller::ControllerCmdSync<bt_hci::cmd::le::LeSetScanParams>>(
        &'d self,
        stack: &'d Stack<'d, C>,
        central: Central<'d, C>,
        sessions: &[SessionChannel<'d>; 2],
    ) -> ! {
        let mut central = central;
        loop {
            central = self.acquisition_step(stack, central, sessions).await;
            Timer::after_millis(100).await;
        }
    }

    async fn acquisition_step<'d, C: Controller + bt_hci::controller::ControllerCmdSync<bt_hci::cmd::le::LeSetScanParams>>(
        &'d self,
        stack: &'d Stack<'d, C>,
        mut central: Central<'d, C>,
        sessions: &[SessionChannel<'d>; 2],
    ) -> Central<'d, C> {
        for index in [SlotIndex::Keyboard, SlotIndex::Pointer] {
            if self.reconnect_due(index) {
                self.attempt_reconnect(index, &mut central, sessions).await;
            }
        }

        if let Ok(candidate) = SCAN_SHARED.candidates.try_receive() {
            self.connect_candidate(candidate, stack, &mut central, sessions).await;
            return central;
        }

        // Candidates are only recorded while a slot actually wants a
        // fresh device; sightings of watched peers are matched always.
        SCAN_SHARED
            .acquiring
            .store(self.needs_device(), Ordering::Relaxed);
        if self.wants_scan() {
            central = self.scan_burst(central).await;
        }

        central
    }

    /// Scan actively for about a second, or less if the handler records a
    /// candidate or sights a watched peer. The scanner borrows the
    /// `Central` for the duration.
    async fn scan_burst<'d, C: Controller + bt_hci::controller::ControllerCmdSync<bt_hci::cmd::le::LeSetScanParams>>(&self, central: Central<'d, C>) -> Central<'d, C> {
        for index in [SlotIndex::Keyboard, SlotIndex::Pointer] {
            if self.state_of(index) == SlotState::Disconnected {
                self.set_state(index, SlotState::Scanning);
            }
        }

        let mut scanner = Scanner::new(central);
        let config = ScanConfig {
            active: true,
            interval: self.config.scan.interval,
            window: self.config.scan.window,
            ..Default::default()
        };

        match scanner.scan(&config).await {
            Ok(session) => {
                for _ in 0..10 {
                    if !SCAN_SHARED.candidates.is_empty()
                        || SCAN_SHARED
                            .kick
                            .iter()
                            .any(|kick| kick.load(Ordering::Relaxed))
                    {
                        break;
                    }
                    Timer::after_millis(100).await;
                }
                drop(session);
            }
            Err(e) => {
                #[cfg(feature = "defmt")]
                let e = defmt::Debug2Format(&e);
                error!("scan failed: {:?}", e);
                Timer::after_millis(500).await;
            }
        }

        for index in [SlotIndex::Keyboard, SlotIndex::Pointer] {
            if self.state_of(index) == SlotState::Scanning {
                self.set_state(index, SlotState::Disconnected);
            }
        }

        scanner.into_inner()
    }

    /// Connect with the per-attempt timeout, then request encryption.
    ///
    /// Encryption must come before any subscription: HID peripherals
    /// silently withhold notifications on unencrypted links even though
    /// the CCCD writes appear to succeed. A security failure is logged
    /// and tolerated; the session watchdog recycles the slot if the peer
    /// never talks.
    async fn establish<'d, C: Controller>(
        &self,
        central: &mut Central<'d, C>,
        addr_kind: AddrKind,
        addr: BdAddr,
    ) -> Result<Connection<'d>, HidHostError> {
        let connect = self.config.connect;
        let config = ConnectConfig {
            connect_params: ConnectParams {
                min_connection_interval: connect.min_interval,
                max_connection_interval: connect.max_interval,
                max_latency: connect.latency,
                supervision_timeout: connect.supervision_timeout,
                ..Default::default()
            },
            scan_config: ScanConfig {
                filter_accept_list: &[(addr_kind, &addr)],
                ..Default::default()
            },
        };

        let conn = match with_timeout(connect.connect_timeout, central.connect(&config)).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                #[cfg(feature = "defmt")]
                let e = defmt::Debug2Format(&e);
                warn!("connect failed: {:?}", e);
                return Err(HidHostError::ConnectFailed);
            }
            Err(_) => {
                warn!("connect timed out");
                return Err(HidHostError::ConnectFailed);
            }
        };

        if let Err(e) = conn.request_security().await {
            #[cfg(feature = "defmt")]
            let e = defmt::Debug2Format(&e);
            warn!("security request failed, continuing unencrypted: {:?}", e);
        }

        Ok(conn)
    }

    /// Handle a scanner candidate: connect with neutral state (no slot is
    /// touched until the device type is known), detect what it is, then
    /// assign it to the matching slot. A device whose slot is already
    /// filled is disconnected rather than cross-assigned.
    async fn connect_candidate<'d, C: Controller>(
        &'d self,
        candidate: Candidate,
        stack: &'d Stack<'d, C>,
        central: &mut Central<'d, C>,
        sessions: &[SessionChannel<'d>; 2],
    ) {
        let need_keyboard = self.state_of(SlotIndex::Keyboard) == SlotState::Disconnected;
        let need_pointer = self.state_of(SlotIndex::Pointer) == SlotState::Disconnected;
        if !need_keyboard && !need_pointer {
            return;
        }

        info!("connecting to HID device '{}'", candidate.name.as_str());

        let Ok(conn) = self
            .establish(central, candidate.addr_kind, candidate.addr)
            .await
        else {
            return;
        };

        let detected = match self.detect_device_type(stack, &conn).await {
            Ok(detected) => detected,
            Err(e) => {
                warn!("device type detection failed: {:?}", e);
                let _ = conn.disconnect();
                return;
            }
        };

        let index = if detected.keyboard && need_keyboard {
            SlotIndex::Keyboard
        } else if detected.pointer && need_pointer {
            SlotIndex::Pointer
        } else if detected.keyboard && !need_keyboard {
            info!("already have a keyboard, skipping");
            let _ = conn.disconnect();
            return;
        } else if detected.pointer && !need_pointer {
            info!("already have a pointer, skipping");
            let _ = conn.disconnect();
            return;
        } else if need_keyboard {
            SlotIndex::Keyboard
        } else {
            SlotIndex::Pointer
        };

        let as_keyboard = index == SlotIndex::Keyboard;
        self.with_slot(index, |slot| {
            slot.peer = Some((candidate.addr_kind, candidate.addr));
            slot.name = candidate.name.clone();
            slot.attempts = 0;
        });
        self.set_state(index, SlotState::Connecting);

        sessions[index as usize]
            .send(SessionTicket {
                conn,
                as_keyboard,
                reconnect: false,
            })
            .await;
    }

    async fn attempt_reconnect<'d, C: Controller>(
        &'d self,
        index: SlotIndex,
        central: &mut Central<'d, C>,
        sessions: &[SessionChannel<'d>; 2],
    ) {
        let Some(((addr_kind, addr), was_keyboard, attempts)) = self.with_slot(index, |slot| {
            slot.peer.map(|peer| (peer, slot.was_keyboard, slot.attempts))
        }) else {
            self.release_slot(index);
            return;
        };

        info!(
            "[{}] reconnect attempt {}/{}",
            index.label(),
            attempts + 1,
            self.config.reconnect.max_attempts
        );

        match self.establish(central, addr_kind, addr).await {
            Ok(conn) => {
                // Encryption reused the stored bond; the session skips
                // type detection and resubscribes by remembered role.
                sessions[index as usize]
                    .send(SessionTicket {
                        conn,
                        as_keyboard: was_keyboard,
                        reconnect: true,
                    })
                    .await;
            }
            Err(_) => self.note_reconnect_failure(index),
        }
    }

    // ─── Discovery ─────────────────────────────────────────────────────

    /// Probe the HID service for Boot input characteristics; fall back to
    /// scanning the Report Map, and finally default to keyboard.
    async fn detect_device_type<'d, C: Controller>(
        &self,
        stack: &'d Stack<'d, C>,
        conn: &Connection<'d>,
    ) -> Result<DetectedType, HidHostError> {
        let client = GattClient::<C, MAX_SERVICES, L2CAP_MTU>::new(stack, conn)
            .await
            .map_err(|_| HidHostError::ClientClosed)?;

        match select(client.task(), detect_with_client(&client)).await {
            Either::First(_) => Err(HidHostError::Disconnected),
            Either::Second(result) => result,
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
struct DetectedType {
    keyboard: bool,
    pointer: bool,
}

async fn detect_with_client<'a, C: Controller>(
    client: &GattClient<'a, C, MAX_SERVICES, L2CAP_MTU>,
) -> Result<DetectedType, HidHostError> {
    let services = client
        .services_by_uuid(&HID_SERVICE)
        .await
        .map_err(|_| HidHostError::NoHidService)?;
    let service = services.first().ok_or(HidHostError::NoHidService)?.clone();

    let mut detected = DetectedType::default();
    if client
        .characteristic_by_uuid::<[u8; 8]>(&service, &BOOT_KEYBOARD_INPUT)
        .await
        .is_ok()
    {
        detected.keyboard = true;
        info!("detected keyboard (Boot Keyboard Input present)");
    }
    if client
        .characteristic_by_uuid::<[u8; 4]>(&service, &BOOT_MOUSE_INPUT)
        .await
        .is_ok()
    {
        detected.pointer = true;
        info!("detected pointer (Boot Mouse Input present)");
    }

    if detected.keyboard || detected.pointer {
        return Ok(detected);
    }

    // No boot characteristics: read the Report Map and look for top-level
    // Generic Desktop usages.
    if let Ok(report_map) = client
        .characteristic_by_uuid::<[u8; 0]>(&service, &REPORT_MAP)
        .await
    {
        let mut buf = [0u8; 256];
        if let Ok(len) = client.read_characteristic(&report_map, &mut buf).await {
            let (keyboard, pointer) = scan_report_map(&buf[..len]);
            detected.keyboard = keyboard;
            detected.pointer = pointer;
            if keyboard {
                info!("detected keyboard (Report Map usage)");
            }
            if pointer {
                info!("detected pointer (Report Map usage)");
            }
        }
    }

    if !detected.keyboard && !detected.pointer {
        info!("could not determine device type, defaulting to keyboard");
        detected.keyboard = true;
    }

    Ok(detected)
}

/// Scan a HID report descriptor for `Usage Page (Generic Desktop)`
/// immediately followed by `Usage (Keyboard)` or `Usage (Mouse)`.
fn scan_report_map(map: &[u8]) -> (bool, bool) {
    let mut keyboard = false;
    let mut pointer = false;

    let mut i = 0;
    while i + 3 < map.len() {
        if map[i] == 0x05 && map[i + 1] == 0x01 && map[i + 2] == 0x09 {
            match map[i + 3] {
                0x06 => keyboard = true,
                0x02 => pointer = true,
                _ => {}
            }
        }
        i += 1;
    }

    (keyboard, pointer)
}

// ─── Sessions ──────────────────────────────────────────────────────────

impl HidHost {
    async fn session_loop<'d, C: Controller>(
        &'d self,
        index: SlotIndex,
        stack: &'d Stack<'d, C>,
        tickets: &SessionChannel<'d>,
    ) -> ! {
        loop {
            let ticket = tickets.receive().await;
            let reconnect = ticket.reconnect;

            let result = self.run_session(index, stack, ticket).await;
            let was_connected = self.state_of(index) == SlotState::Connected;

            match result {
                Err(HidHostError::Disconnected) if was_connected => {
                    self.enter_reconnecting(index);
                }
                Err(e) => {
                    warn!("[{}] session ended during setup: {:?}", index.label(), e);
                    if reconnect {
                        // Count against the reconnect budget; stay on the
                        // bonded peer until it is exhausted.
                        self.set_state(index, SlotState::Reconnecting);
                        self.note_reconnect_failure(index);
                    } else {
                        self.release_slot(index);
                    }
                }
                Ok(()) => {
                    // Sessions only end by error; treat like a disconnect.
                    if was_connected {
                        self.enter_reconnecting(index);
                    } else {
                        self.release_slot(index);
                    }
                }
            }
        }
    }

    async fn run_session<'d, C: Controller>(
        &'d self,
        index: SlotIndex,
        stack: &'d Stack<'d, C>,
        ticket: SessionTicket<'d>,
    ) -> Result<(), HidHostError> {
        let SessionTicket {
            conn,
            as_keyboard,
            reconnect,
        } = ticket;

        self.set_state(index, SlotState::Discovering);

        let client = GattClient::<C, MAX_SERVICES, L2CAP_MTU>::new(stack, &conn)
            .await
            .map_err(|_| HidHostError::ClientClosed)?;

        match select(
            client.task(),
            self.subscribe_and_pump(index, &client, &conn, as_keyboard, reconnect),
        )
        .await
        {
            Either::First(_) => Err(HidHostError::Disconnected),
            Either::Second(result) => result,
        }
    }

    async fn subscribe_and_pump<'a, 'd, C: Controller>(
        &'d self,
        index: SlotIndex,
        client: &'a GattClient<'d, C, MAX_SERVICES, L2CAP_MTU>,
        conn: &Connection<'d>,
        as_keyboard: bool,
        reconnect: bool,
    ) -> Result<(), HidHostError> {
        let services = client
            .services_by_uuid(&HID_SERVICE)
            .await
            .map_err(|_| HidHostError::NoHidService)?;
        let service = services.first().ok_or(HidHostError::NoHidService)?.clone();

        // HID Protocol Mode. Keyboards get a Boot Protocol request for the
        // fixed 8-byte report layout; many devices expose the
        // characteristic read-only and the write is a silent no-op.
        // Pointers are NEVER switched to Boot Protocol: many trackpads
        // then silence all notifications.
        let mut boot_mode = false;
        if as_keyboard {
            if let Ok(protocol_mode) = client
                .characteristic_by_uuid::<u8>(&service, &PROTOCOL_MODE)
                .await
            {
                match client
                    .write_characteristic_without_response(&protocol_mode, &[0])
                    .await
                {
                    Ok(_) => {
                        boot_mode = true;
                        debug!("[{}] boot protocol set", index.label());
                    }
                    Err(_) => {
                        debug!("[{}] protocol mode not writable, staying in report protocol", index.label());
                    }
                }
            }
        }

        let mut listener = if as_keyboard {
            subscribe_keyboard(client, &service, boot_mode || reconnect).await?
        } else {
            subscribe_pointer(client, &service).await?
        };

        // Some peers drop the link during CCCD writes; verify before
        // declaring the slot live.
        if !conn.is_connected() {
            return Err(HidHostError::Disconnected);
        }

        let name = self.with_slot(index, |slot| {
            slot.was_keyboard = as_keyboard;
            slot.was_pointer = !as_keyboard;
            slot.attempts = 0;
            slot.name.clone()
        });
        SCAN_SHARED.watch_peer(index, None);
        self.set_state(index, SlotState::Connected);
        info!("[{}] ready: '{}'", index.label(), name.as_str());

        // Pump notifications until the link dies. The one-second timeout
        // doubles as the silent-disconnect watchdog: some peripherals
        // vanish without a disconnect event.
        let mut keyboard_state = KeyboardReportState::new();
        loop {
            match with_timeout(Duration::from_secs(1), listener.next()).await {
                Ok(notification) => {
                    let data = notification.as_ref();
                    let now_ms = Instant::now().as_millis() as u32;

                    if as_keyboard {
                        diag::KBD_REPORTS.fetch_add(1, Ordering::Relaxed);
                        diag::KBD_LAST_REPORT_MS.store(now_ms, Ordering::Relaxed);
                        match keyboard_state.diff(data) {
                            Some(events) => {
                                diag::KBD_REPORTS_KEPT.fetch_add(1, Ordering::Relaxed);
                                for event in events {
                                    events::send_key_event(event);
                                }
                            }
                            None => {
                                diag::KBD_REPORTS_DROPPED.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                    } else {
                        diag::POINTER_REPORTS.fetch_add(1, Ordering::Relaxed);
                        diag::POINTER_LAST_REPORT_MS.store(now_ms, Ordering::Relaxed);
                        if let Some(event) = translate_pointer(data) {
                            events::send_pointer_event(event);
                        }
                    }
                }
                Err(_) => {
                    if !conn.is_connected() {
                        warn!("[{}] silent disconnect detected", index.label());
                        return Err(HidHostError::Disconnected);
                    }
                }
            }
        }
    }
}

/// Keyboard subscription strategy: Boot Keyboard Input when Boot Protocol
/// is active (or when resubscribing after a reconnect), otherwise the HID
/// Report characteristic with length filtering in the pump. Falls back
/// across both before giving up.
async fn subscribe_keyboard<'a, 'd, C: Controller>(
    client: &'a GattClient<'d, C, MAX_SERVICES, L2CAP_MTU>,
    service: &ServiceHandle,
    prefer_boot: bool,
) -> Result<NotificationListener<'a, L2CAP_MTU>, HidHostError> {
    if prefer_boot {
        if let Ok(boot_input) = client
            .characteristic_by_uuid::<[u8; 8]>(service, &BOOT_KEYBOARD_INPUT)
            .await
        {
            if let Ok(listener) = client.subscribe(&boot_input, false).await {
                info!("subscribed keyboard to Boot Keyboard Input");
                return Ok(listener);
            }
        }
    }

    if let Ok(report) = client
        .characteristic_by_uuid::<[u8; 8]>(service, &HID_REPORT)
        .await
    {
        if let Ok(listener) = client.subscribe(&report, false).await {
            info!("subscribed keyboard to HID Report");
            return Ok(listener);
        }
    }

    if !prefer_boot {
        if let Ok(boot_input) = client
            .characteristic_by_uuid::<[u8; 8]>(service, &BOOT_KEYBOARD_INPUT)
            .await
        {
            if let Ok(listener) = client.subscribe(&boot_input, false).await {
                info!("subscribed keyboard to Boot Keyboard Input (fallback)");
                return Ok(listener);
            }
        }
    }

    Err(HidHostError::NoSubscribableReport)
}

/// Pointer subscription strategy: a single HID Report subscription
/// (Report Protocol carries full 16-bit deltas; one subscription avoids
/// duplicate reports), with Boot Mouse Input as the fallback.
async fn subscribe_pointer<'a, 'd, C: Controller>(
    client: &'a GattClient<'d, C, MAX_SERVICES, L2CAP_MTU>,
    service: &ServiceHandle,
) -> Result<NotificationListener<'a, L2CAP_MTU>, HidHostError> {
    if let Ok(report) = client
        .characteristic_by_uuid::<[u8; 8]>(service, &HID_REPORT)
        .await
    {
        if let Ok(listener) = client.subscribe(&report, false).await {
            info!("subscribed pointer to HID Report");
            return Ok(listener);
        }
    }

    if let Ok(boot_input) = client
        .characteristic_by_uuid::<[u8; 4]>(service, &BOOT_MOUSE_INPUT)
        .await
    {
        if let Ok(listener) = client.subscribe(&boot_input, false).await {
            info!("subscribed pointer to Boot Mouse Input");
            return Ok(listener);
        }
    }

    Err(HidHostError::NoSubscribableReport)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::SCAN_SHARED;

    fn host_with_peer(index: SlotIndex) -> HidHost {
        let host = HidHost::new(BridgeConfig::default());
        host.with_slot(index, |slot| {
            slot.peer = Some((AddrKind::RANDOM, BdAddr::new([1, 2, 3, 4, 5, 6])));
        });
        host
    }

    #[test]
    fn disconnect_enters_reconnecting_with_initial_backoff() {
        let host = host_with_peer(SlotIndex::Keyboard);
        host.set_state(SlotIndex::Keyboard, SlotState::Connected);

        host.enter_reconnecting(SlotIndex::Keyboard);

        assert_eq!(host.state_of(SlotIndex::Keyboard), SlotState::Reconnecting);
        host.with_slot(SlotIndex::Keyboard, |slot| {
            assert_eq!(slot.backoff, Duration::from_secs(1));
            assert_eq!(slot.attempts, 0);
            assert!(slot.next_attempt > Instant::now());
        });

        // A scan sighting of the stored peer bypasses the backoff timer.
        assert!(!host.reconnect_due(SlotIndex::Keyboard));
        SCAN_SHARED.kick[SlotIndex::Keyboard as usize].store(true, Ordering::Relaxed);
        assert!(host.reconnect_due(SlotIndex::Keyboard));
        host.with_slot(SlotIndex::Keyboard, |slot| {
            assert!(slot.next_attempt <= Instant::now());
        });
    }

    #[test]
    fn reconnect_exhaustion_releases_the_slot() {
        let host = host_with_peer(SlotIndex::Pointer);
        host.set_state(SlotIndex::Pointer, SlotState::Connected);
        host.enter_reconnecting(SlotIndex::Pointer);

        for _ in 0..host.config.reconnect.max_attempts {
            host.note_reconnect_failure(SlotIndex::Pointer);
        }

        assert_eq!(host.state_of(SlotIndex::Pointer), SlotState::Disconnected);
        host.with_slot(SlotIndex::Pointer, |slot| {
            assert!(slot.peer.is_none());
            assert!(!slot.was_keyboard && !slot.was_pointer);
        });
    }

    #[test]
    fn failed_attempts_double_the_backoff() {
        let host = host_with_peer(SlotIndex::Pointer);
        host.set_state(SlotIndex::Pointer, SlotState::Connected);
        host.enter_reconnecting(SlotIndex::Pointer);

        host.note_reconnect_failure(SlotIndex::Pointer);
        host.with_slot(SlotIndex::Pointer, |slot| {
            assert_eq!(slot.backoff, Duration::from_secs(2));
            assert_eq!(slot.attempts, 1);
        });
        host.note_reconnect_failure(SlotIndex::Pointer);
        host.with_slot(SlotIndex::Pointer, |slot| {
            assert_eq!(slot.backoff, Duration::from_secs(4));
        });
    }

    #[test]
    fn disconnect_without_known_peer_releases_the_slot() {
        let host = HidHost::new(BridgeConfig::default());
        host.set_state(SlotIndex::Pointer, SlotState::Connected);
        host.enter_reconnecting(SlotIndex::Pointer);
        assert_eq!(host.state_of(SlotIndex::Pointer), SlotState::Disconnected);
    }

    #[test]
    fn report_map_keyboard_usage() {
        // Usage Page (Generic Desktop), Usage (Keyboard), Collection...
        let map = [0x05, 0x01, 0x09, 0x06, 0xA1, 0x01, 0xC0];
        assert_eq!(scan_report_map(&map), (true, false));
    }

    #[test]
    fn report_map_mouse_usage() {
        let map = [0x05, 0x01, 0x09, 0x02, 0xA1, 0x01, 0xC0];
        assert_eq!(scan_report_map(&map), (false, true));
    }

    #[test]
    fn report_map_combo_device() {
        let map = [
            0x05, 0x01, 0x09, 0x06, 0xA1, 0x01, 0xC0, // keyboard collection
            0x05, 0x0C, 0x09, 0x01, 0xA1, 0x01, 0xC0, // consumer collection
            0x05, 0x01, 0x09, 0x02, 0xA1, 0x01, 0xC0, // mouse collection
        ];
        assert_eq!(scan_report_map(&map), (true, true));
    }

    #[test]
    fn report_map_without_generic_desktop() {
        // Consumer-page-only descriptor
        let map = [0x05, 0x0C, 0x09, 0x01, 0xA1, 0x01, 0xC0];
        assert_eq!(scan_report_map(&map), (false, false));
    }

    #[test]
    fn report_map_truncated() {
        assert_eq!(scan_report_map(&[0x05, 0x01, 0x09]), (false, false));
        assert_eq!(scan_report_map(&[]), (false, false));
    }
}
