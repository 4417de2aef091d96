//! The inbound receiver: decodes link traffic and dispatches it, honoring
//! bundle time tags.
//!
//! With `ignore_timetags` set, everything dispatches synchronously inside
//! the link's receive callback. Otherwise inbound bundles are flattened,
//! past-due bundles dispatch immediately, and future ones are parked in a
//! holding list sorted by time tag until the delay scheduler finds them
//! due.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error};

use crate::clock;
use crate::decoder;
use crate::dialect::{flatten_bundle, Dialect, Osc10};
use crate::errors::OscError;
use crate::event::{Event, Subscription};
use crate::link::UdpLink;
use crate::types::{OscBundle, OscMessage, OscPacket, ReceivedPacket, Result};

type DecodeFn = fn(&[u8]) -> Result<OscPacket>;

/// The receiver's event surface.
#[derive(Default)]
pub struct ReceiverEvents {
    /// A message was dispatched, along with its source endpoint.
    pub message_received: Event<(OscMessage, SocketAddr)>,
    /// A bundle reached its due time (or arrived, when time tags are
    /// ignored), along with its source endpoint.
    pub bundle_received: Event<(OscBundle, SocketAddr)>,
    /// A decode failure or a panicking subscriber.
    pub task_error: Event<OscError>,
}

struct Pending {
    due_ticks: u64,
    bundle: OscBundle,
    from: SocketAddr,
}

struct ReceiverShared {
    /// Sorted by due tick, descending: the nearest-due entry is at the
    /// tail.
    holding: Mutex<Vec<Pending>>,
    ignore_timetags: AtomicBool,
    active: AtomicBool,
    events: ReceiverEvents,
    decode: DecodeFn,
}

/// The inbound half of an OSC pipeline.
pub struct OscReceiver {
    shared: Arc<ReceiverShared>,
    cycle_wait: Duration,
    link: Option<(UdpLink, Subscription)>,
    worker: Option<JoinHandle<()>>,
}

impl Default for OscReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl OscReceiver {
    /// A receiver decoding with the [`Osc10`] dialect.
    pub fn new() -> OscReceiver {
        Self::with_dialect::<Osc10>()
    }

    /// A receiver decoding with dialect `D`.
    pub fn with_dialect<D: Dialect>() -> OscReceiver {
        OscReceiver {
            shared: Arc::new(ReceiverShared {
                holding: Mutex::new(Vec::new()),
                ignore_timetags: AtomicBool::new(false),
                active: AtomicBool::new(false),
                events: ReceiverEvents::default(),
                decode: decoder::decode_udp::<D>,
            }),
            cycle_wait: Duration::from_millis(10),
            link: None,
            worker: None,
        }
    }

    pub fn events(&self) -> &ReceiverEvents {
        &self.shared.events
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }

    pub fn ignore_timetags(&self) -> bool {
        self.shared.ignore_timetags.load(Ordering::SeqCst)
    }

    /// Toggle time-tag handling. Takes effect for packets arriving after
    /// the call; already-parked bundles stay scheduled.
    pub fn set_ignore_timetags(&self, ignore: bool) {
        self.shared.ignore_timetags.store(ignore, Ordering::SeqCst);
    }

    /// Delay scheduler period; values below 1 ms are raised to 1 ms.
    /// Takes effect on the next connect.
    pub fn set_cycle_wait(&mut self, cycle_wait: Duration) {
        self.cycle_wait = cycle_wait.max(Duration::from_millis(1));
    }

    /// Subscribe to the link's inbound packets and start the delay
    /// scheduler task.
    pub fn connect(&mut self, link: UdpLink) -> Result<()> {
        if self.is_active() {
            return Err(OscError::WrongMode("receiver is already connected"));
        }
        self.shared.active.store(true, Ordering::SeqCst);

        let subscription = {
            let shared = Arc::clone(&self.shared);
            link.events()
                .packet_received
                .subscribe(move |received| on_packet(&shared, received))
        };

        let worker = {
            let shared = Arc::clone(&self.shared);
            let cycle = self.cycle_wait.max(Duration::from_millis(1));
            thread::Builder::new()
                .name("osc-recv-delay".into())
                .spawn(move || delay_loop(shared, cycle))
                .map_err(OscError::Io)?
        };

        self.link = Some((link, subscription));
        self.worker = Some(worker);
        Ok(())
    }

    /// Unsubscribe from the link, stop and join the delay scheduler, and
    /// drop any still-parked bundles. A second disconnect is a no-op.
    pub fn disconnect(&mut self) {
        if !self.is_active() {
            return;
        }
        if let Some((link, subscription)) = self.link.take() {
            link.events().packet_received.unsubscribe(subscription);
        }
        self.shared.active.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("receiver delay scheduler terminated by panic");
            }
        }
        self.shared.holding.lock().unwrap().clear();
    }
}

impl Drop for OscReceiver {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn on_packet(shared: &Arc<ReceiverShared>, received: &ReceivedPacket) {
    let packet = match (shared.decode)(received.packet.as_bytes()) {
        Ok(packet) => packet,
        Err(err) => {
            debug!("dropping undecodable packet from {}", received.from);
            shared.events.task_error.emit(&err);
            return;
        }
    };

    match packet {
        OscPacket::Message(message) => dispatch_message(shared, message, received.from),
        OscPacket::Bundle(bundle) => {
            if shared.ignore_timetags.load(Ordering::SeqCst) {
                dispatch_bundle(shared, bundle, received.from);
                return;
            }
            let now = clock::tick_now();
            for flat in flatten_bundle(bundle) {
                let due_ticks = flat.timetag.as_ticks();
                if due_ticks < now {
                    dispatch_bundle(shared, flat, received.from);
                } else {
                    park(shared, due_ticks, flat, received.from);
                }
            }
        }
    }
}

fn park(shared: &ReceiverShared, due_ticks: u64, bundle: OscBundle, from: SocketAddr) {
    let mut holding = shared.holding.lock().unwrap();
    // Descending by due tick; equal tags keep arrival order toward the
    // tail so the earlier arrival dispatches first.
    let at = holding.partition_point(|p| p.due_ticks > due_ticks);
    holding.insert(
        at,
        Pending {
            due_ticks,
            bundle,
            from,
        },
    );
}

fn delay_loop(shared: Arc<ReceiverShared>, cycle: Duration) {
    while shared.active.load(Ordering::SeqCst) {
        let mut due = Vec::new();
        {
            let mut holding = shared.holding.lock().unwrap();
            let now = clock::tick_now();
            while holding.last().is_some_and(|p| p.due_ticks <= now) {
                due.push(holding.pop().expect("tail exists"));
            }
        }
        for pending in due {
            dispatch_bundle(&shared, pending.bundle, pending.from);
        }
        thread::sleep(cycle);
    }
    debug!("receiver delay scheduler stopped");
}

fn dispatch_message(shared: &ReceiverShared, message: OscMessage, from: SocketAddr) {
    for panic in shared.events.message_received.emit(&(message, from)) {
        shared.events.task_error.emit(&panic);
    }
}

fn dispatch_bundle(shared: &ReceiverShared, bundle: OscBundle, from: SocketAddr) {
    for panic in shared.events.bundle_received.emit(&(bundle, from)) {
        shared.events.task_error.emit(&panic);
    }
}
