//! BLE HID Central: discovers, bonds with, and stays connected to one
//! keyboard and one pointing device, translating their input reports into
//! events for the ADB side.
//!
//! Built on `trouble-host`. The runner's event handler watches
//! advertisements; the acquisition loop owns the `Central` and performs
//! every connect; per-slot session tasks hold the GATT client and pump
//! notifications. Nothing here ever blocks the producer side of the event
//! channels.

pub mod central;
pub mod report;

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::channel::Channel;
use embassy_time::{Duration, Instant};
use heapless::String;
use num_enum::FromPrimitive;
use rand_core::{CryptoRng, RngCore};
use trouble_host::prelude::*;

/// The radio stack supports at most three concurrent connections; the
/// bridge needs two plus one in flight during acquisition.
pub const CONNECTIONS_MAX: usize = 3;
pub const L2CAP_CHANNELS_MAX: usize = 8;
pub const L2CAP_MTU: usize = 255;
/// GATT services discovered per peer.
pub(crate) const MAX_SERVICES: usize = 10;

pub type BridgeHostResources = HostResources<CONNECTIONS_MAX, L2CAP_CHANNELS_MAX, L2CAP_MTU>;

/// HID over GATT service and the characteristics the bridge consumes.
pub(crate) const HID_SERVICE_UUID16: u16 = 0x1812;
pub(crate) const HID_SERVICE: Uuid = Uuid::Uuid16(HID_SERVICE_UUID16.to_le_bytes());
pub(crate) const HID_REPORT: Uuid = Uuid::Uuid16(0x2A4Du16.to_le_bytes());
pub(crate) const BOOT_KEYBOARD_INPUT: Uuid = Uuid::Uuid16(0x2A22u16.to_le_bytes());
pub(crate) const BOOT_MOUSE_INPUT: Uuid = Uuid::Uuid16(0x2A33u16.to_le_bytes());
pub(crate) const REPORT_MAP: Uuid = Uuid::Uuid16(0x2A4Bu16.to_le_bytes());
pub(crate) const PROTOCOL_MODE: Uuid = Uuid::Uuid16(0x2A4Eu16.to_le_bytes());

/// Build the BLE stack in the Central role.
///
/// Pairing policy: bonding on, MITM off, Secure Connections on. MITM must
/// stay off — pointing devices have no display for passkey entry, and
/// requiring it yields pairing failures with no user-facing feedback.
pub async fn build_ble_stack<'a, C: Controller, RNG: RngCore + CryptoRng>(
    controller: C,
    host_address: [u8; 6],
    random_generator: &mut RNG,
    resources: &'a mut BridgeHostResources,
) -> Stack<'a, C> {
    let address: Address = Address::random(host_address);

    trouble_host::new(controller, resources)
        .set_random_address(address)
        .set_random_generator_seed(random_generator)
}

/// Erase every bond the stack holds. Wired to the boot-time gesture.
pub fn clear_bonds<C: Controller>(stack: &Stack<'_, C>) {
    let bonds = stack.get_bond_information();
    let count = bonds.len();
    for bond in bonds {
        if let Err(e) = stack.remove_bond_information(bond.address) {
            #[cfg(feature = "defmt")]
            let e = defmt::Debug2Format(&e);
            error!("failed to remove bond: {:?}", e);
        }
    }
    info!("cleared {} bond(s)", count);
}

/// Connection state of one device slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, FromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum SlotState {
    #[num_enum(default)]
    Disconnected = 0,
    Scanning,
    Connecting,
    Discovering,
    Connected,
    Reconnecting,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SlotIndex {
    Keyboard = 0,
    Pointer = 1,
}

impl SlotIndex {
    pub(crate) const fn label(self) -> &'static str {
        match self {
            SlotIndex::Keyboard => "KBD",
            SlotIndex::Pointer => "PTR",
        }
    }
}

/// Slot states mirrored as atomics for tearing-tolerant reads from the
/// other core (status display, serial report).
pub(crate) static SLOT_STATES: [AtomicU8; 2] = [AtomicU8::new(0), AtomicU8::new(0)];

/// Current state of a slot, readable from any core.
pub fn slot_state(index: SlotIndex) -> SlotState {
    SlotState::from(SLOT_STATES[index as usize].load(Ordering::Relaxed))
}

/// Per-slot bookkeeping owned by the BLE task.
pub(crate) struct Slot {
    pub state: SlotState,
    pub peer: Option<(AddrKind, BdAddr)>,
    pub name: String<32>,
    /// Role memory for re-subscription after a disconnect.
    pub was_keyboard: bool,
    pub was_pointer: bool,
    pub next_attempt: Instant,
    pub backoff: Duration,
    pub attempts: u8,
}

impl Slot {
    pub const fn new() -> Self {
        Self {
            state: SlotState::Disconnected,
            peer: None,
            name: String::new(),
            was_keyboard: false,
            was_pointer: false,
            next_attempt: Instant::MIN,
            backoff: Duration::from_ticks(0),
            attempts: 0,
        }
    }
}

/// A peer spotted by the scanner, handed from the advertisement handler
/// to the acquisition loop. Connecting from inside the report handler is
/// forbidden by the stack, so the handler only records the sighting.
#[derive(Clone)]
pub(crate) struct Candidate {
    pub addr_kind: AddrKind,
    pub addr: BdAddr,
    pub name: String<32>,
}

/// State shared between the advertisement handler (runner context) and
/// the acquisition loop.
pub(crate) struct ScanShared {
    /// Single-entry: at most one connection attempt is in flight.
    pub candidates: Channel<CriticalSectionRawMutex, Candidate, 1>,
    /// Peer addresses of slots in `Reconnecting`; a sighting of one
    /// bypasses the backoff timer.
    pub watch: BlockingMutex<CriticalSectionRawMutex, RefCell<[Option<BdAddr>; 2]>>,
    /// Sighting flags, one per slot.
    pub kick: [AtomicBool; 2],
    /// True while some slot wants a fresh device from scanning.
    pub acquiring: AtomicBool,
}

pub(crate) static SCAN_SHARED: ScanShared = ScanShared {
    candidates: Channel::new(),
    watch: BlockingMutex::new(RefCell::new([None, None])),
    kick: [AtomicBool::new(false), AtomicBool::new(false)],
    acquiring: AtomicBool::new(false),
};

impl ScanShared {
    pub(crate) fn watch_peer(&self, index: SlotIndex, addr: Option<BdAddr>) {
        self.watch.lock(|w| w.borrow_mut()[index as usize] = addr);
        self.kick[index as usize].store(false, Ordering::Relaxed);
    }

    fn watched_slot(&self, addr: &BdAddr) -> Option<usize> {
        self.watch.lock(|w| {
            w.borrow()
                .iter()
                .position(|entry| entry.as_ref() == Some(addr))
        })
    }
}

/// Advertisement handler installed on the stack runner.
pub(crate) struct AdvertisementHandler;

impl EventHandler for AdvertisementHandler {
    fn on_adv_reports(&self, mut reports: trouble_host::scan::LeAdvReportsIter<'_>) {
        while let Some(Ok(report)) = reports.next() {
            on_adv_report(report.addr_kind, report.addr, report.event_kind, report.data);
        }
    }
}

fn on_adv_report(
    addr_kind: AddrKind,
    addr: BdAddr,
    event_kind: bt_hci::param::LeAdvEventKind,
    data: &[u8],
) {
    use bt_hci::param::LeAdvEventKind;

    // A sighting of a peer we are reconnecting to fires the fast path,
    // whatever the advertisement kind. This is what catches directed
    // advertisements from bonded devices waking up under a rotated RPA.
    if let Some(slot) = SCAN_SHARED.watched_slot(&addr) {
        SCAN_SHARED.kick[slot].store(true, Ordering::Relaxed);
        return;
    }

    if !SCAN_SHARED.acquiring.load(Ordering::Relaxed) {
        return;
    }

    // Fresh devices must be connectable and advertise the HID service.
    match event_kind {
        LeAdvEventKind::AdvInd | LeAdvEventKind::AdvDirectInd => {}
        _ => return,
    }

    let mut advertises_hid = false;
    let mut name: String<32> = String::new();
    for ad in AdStructure::decode(data).flatten() {
        match ad {
            AdStructure::ServiceUuids16(uuids) => {
                if uuids.iter().any(|u| *u == HID_SERVICE_UUID16.to_le_bytes()) {
                    advertises_hid = true;
                }
            }
            AdStructure::CompleteLocalName(n) | AdStructure::ShortenedLocalName(n) => {
                name.clear();
                for c in core::str::from_utf8(n).unwrap_or("").chars() {
                    if name.push(c).is_err() {
                        break;
                    }
                }
            }
            _ => {}
        }
    }

    if !advertises_hid {
        return;
    }

    // Full channel means an attempt is already pending; drop the sighting.
    let _ = SCAN_SHARED.candidates.try_send(Candidate {
        addr_kind,
        addr,
        name,
    });
}

/// Failures inside the HID host. All are recoverable: the slot is
/// released and acquisition resumes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub(crate) enum HidHostError {
    /// Connection attempt timed out or was rejected.
    ConnectFailed,
    /// GATT discovery failed or the peer has no HID service.
    NoHidService,
    /// No subscribable input report characteristic was found.
    NoSubscribableReport,
    /// The link dropped mid-setup or mid-session.
    Disconnected,
    /// The GATT client task ended unexpectedly.
    ClientClosed,
}
