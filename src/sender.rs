//! The outbound sender: a multi-priority packet heap drained by a
//! periodic scheduler.
//!
//! Encoded packets are enqueued into one of `layer_count` FIFO layers
//! (layer 0 is the most urgent). Every cycle the scheduler walks the
//! layers in priority order and either packs eligible packets into OSC
//! bundles under the size budget or sends them one datagram each,
//! depending on `bundle_before_sending`. Two pluggable predicates decide
//! per packet whether it is dropped or deferred; a pluggable time tag
//! source stamps the emitted bundles.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use byteorder::{BigEndian, ByteOrder};
use log::{debug, error};

use crate::decoder::MTU;
use crate::errors::OscError;
use crate::event::{panic_message, Event};
use crate::link::{LinkMode, UdpLink};
use crate::types::{OscTime, RawPacket, Result};

/// `#bundle\0` plus the 8-byte time tag.
const BUNDLE_HEADER_LEN: usize = 16;

/// Anything the sender can queue and put on the wire.
pub trait OutboundPacket: Send + 'static {
    fn bytes(&self) -> &[u8];
}

impl OutboundPacket for RawPacket {
    fn bytes(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl OutboundPacket for Vec<u8> {
    fn bytes(&self) -> &[u8] {
        self
    }
}

pub type PacketPredicate<P> = Box<dyn Fn(&P) -> bool + Send + Sync>;
pub type TimetagSource = Box<dyn Fn() -> OscTime + Send + Sync>;

#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Number of priority layers.
    pub layer_count: usize,
    /// Upper bound for any packet or emitted bundle, in bytes.
    pub max_packet_size: usize,
    /// Scheduler period; values below 1 ms are raised to 1 ms.
    pub cycle_wait: Duration,
    /// Pack eligible packets into bundles instead of sending them
    /// individually.
    pub bundle_before_sending: bool,
}

impl Default for SenderConfig {
    fn default() -> Self {
        SenderConfig {
            layer_count: 4,
            max_packet_size: MTU,
            cycle_wait: Duration::from_millis(10),
            bundle_before_sending: true,
        }
    }
}

struct Predicates<P> {
    should_drop: PacketPredicate<P>,
    should_send: PacketPredicate<P>,
    timetag_source: TimetagSource,
}

impl<P> Default for Predicates<P> {
    fn default() -> Self {
        Predicates {
            should_drop: Box::new(|_| false),
            should_send: Box::new(|_| true),
            timetag_source: Box::new(|| OscTime::IMMEDIATE),
        }
    }
}

struct SenderShared<P> {
    heap: Mutex<Vec<VecDeque<P>>>,
    predicates: Mutex<Predicates<P>>,
    active: AtomicBool,
    /// A scheduler cycle failed; the offending layer was cleared.
    heap_error: Event<OscError>,
}

/// The outbound half of an OSC pipeline.
pub struct PacketSender<P: OutboundPacket = RawPacket> {
    shared: Arc<SenderShared<P>>,
    config: SenderConfig,
    link: Option<UdpLink>,
    worker: Option<JoinHandle<()>>,
}

impl<P: OutboundPacket> Default for PacketSender<P> {
    fn default() -> Self {
        Self::new(SenderConfig::default())
    }
}

impl<P: OutboundPacket> PacketSender<P> {
    pub fn new(config: SenderConfig) -> PacketSender<P> {
        PacketSender {
            shared: Arc::new(SenderShared {
                heap: Mutex::new(Vec::new()),
                predicates: Mutex::new(Predicates::default()),
                active: AtomicBool::new(false),
                heap_error: Event::default(),
            }),
            config,
            link: None,
            worker: None,
        }
    }

    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    /// The error event of the scheduler task.
    pub fn heap_error(&self) -> &Event<OscError> {
        &self.shared.heap_error
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }

    /// Replace the drop predicate: packets it accepts are removed from
    /// the heap without being sent.
    pub fn set_should_drop<F>(&self, predicate: F)
    where
        F: Fn(&P) -> bool + Send + Sync + 'static,
    {
        self.shared.predicates.lock().unwrap().should_drop = Box::new(predicate);
    }

    /// Replace the send predicate: packets it rejects stay queued for a
    /// later cycle.
    pub fn set_should_send<F>(&self, predicate: F)
    where
        F: Fn(&P) -> bool + Send + Sync + 'static,
    {
        self.shared.predicates.lock().unwrap().should_send = Box::new(predicate);
    }

    /// Replace the time tag source used for emitted bundles. The default
    /// stamps every bundle "immediately".
    pub fn set_timetag_source<F>(&self, source: F)
    where
        F: Fn() -> OscTime + Send + Sync + 'static,
    {
        self.shared.predicates.lock().unwrap().timetag_source = Box::new(source);
    }

    /// Allocate a fresh heap, start the scheduler task and become active.
    pub fn connect(&mut self, link: UdpLink) -> Result<()> {
        if self.is_active() {
            return Err(OscError::WrongMode("sender is already connected"));
        }

        {
            let mut heap = self.shared.heap.lock().unwrap();
            heap.clear();
            heap.extend((0..self.config.layer_count.max(1)).map(|_| VecDeque::new()));
        }
        self.shared.active.store(true, Ordering::SeqCst);

        let worker = {
            let shared = Arc::clone(&self.shared);
            let link = link.clone();
            let config = self.config.clone();
            thread::Builder::new()
                .name("osc-sender".into())
                .spawn(move || scheduler_loop(shared, link, config))
                .map_err(OscError::Io)?
        };

        self.link = Some(link);
        self.worker = Some(worker);
        Ok(())
    }

    /// Deactivate, join the scheduler task, drop the heap and release the
    /// link. A second disconnect is a no-op.
    pub fn disconnect(&mut self) {
        if !self.is_active() {
            return;
        }
        self.shared.active.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("sender scheduler terminated by panic");
            }
        }
        self.shared.heap.lock().unwrap().clear();
        self.link = None;
    }

    /// Append at the line end of `priority`'s layer; drained in arrival
    /// order.
    pub fn enqueue_tail(&self, packet: P, priority: usize) -> Result<()> {
        let (layer, packet) = self.admit(packet, priority)?;
        self.shared.heap.lock().unwrap()[layer].push_back(packet);
        Ok(())
    }

    /// Insert at the line front of `priority`'s layer; drained before
    /// packets already queued there.
    pub fn enqueue_head(&self, packet: P, priority: usize) -> Result<()> {
        let (layer, packet) = self.admit(packet, priority)?;
        self.shared.heap.lock().unwrap()[layer].push_front(packet);
        Ok(())
    }

    fn admit(&self, packet: P, priority: usize) -> Result<(usize, P)> {
        if !self.is_active() {
            return Err(OscError::WrongMode("sender is not connected"));
        }
        let size = packet.bytes().len();
        if size > self.config.max_packet_size {
            return Err(OscError::Oversize {
                size,
                max: self.config.max_packet_size,
            });
        }
        Ok((priority.min(self.config.layer_count.max(1) - 1), packet))
    }

    /// Bypass the heap: hand the packet to the link right now if the link
    /// is open to a target, else drop it silently.
    pub fn send_immediately(&self, packet: &P) -> Result<()> {
        match &self.link {
            Some(link) if link.mode() == LinkMode::ToTarget => {
                link.send_to_target(packet.bytes())
            }
            _ => Ok(()),
        }
    }
}

impl<P: OutboundPacket> Drop for PacketSender<P> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn scheduler_loop<P: OutboundPacket>(
    shared: Arc<SenderShared<P>>,
    link: UdpLink,
    config: SenderConfig,
) {
    let cycle = config.cycle_wait.max(Duration::from_millis(1));

    while shared.active.load(Ordering::SeqCst) {
        if link.mode() != LinkMode::ToTarget {
            thread::sleep(cycle);
            continue;
        }

        let mut errors = Vec::new();
        {
            let predicates = shared.predicates.lock().unwrap();
            let mut heap = shared.heap.lock().unwrap();
            let last_busy = heap.iter().rposition(|layer| !layer.is_empty());

            if let Some(last_busy) = last_busy {
                // Strict priority: layer 0 first, down to the last busy one.
                for layer in heap.iter_mut().take(last_busy + 1) {
                    let outcome = catch_unwind(AssertUnwindSafe(|| {
                        process_layer(layer, &predicates, &config, &link)
                    }));
                    match outcome {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => {
                            layer.clear();
                            errors.push(err);
                        }
                        Err(payload) => {
                            layer.clear();
                            errors.push(OscError::HandlerPanic(panic_message(payload)));
                        }
                    }
                }
            }
        }
        for err in errors {
            shared.heap_error.emit(&err);
        }

        thread::sleep(cycle);
    }
    debug!("sender scheduler stopped");
}

fn process_layer<P: OutboundPacket>(
    layer: &mut VecDeque<P>,
    predicates: &Predicates<P>,
    config: &SenderConfig,
    link: &UdpLink,
) -> Result<()> {
    if !config.bundle_before_sending {
        let mut idx = 0;
        while idx < layer.len() {
            if (predicates.should_drop)(&layer[idx]) {
                layer.remove(idx);
                continue;
            }
            if !(predicates.should_send)(&layer[idx]) {
                idx += 1;
                continue;
            }
            let packet = layer.remove(idx).expect("index is in bounds");
            link.send_to_target(packet.bytes())?;
        }
        return Ok(());
    }

    // Cycle scratch buffer: bundle header placeholder, then
    // [size | bytes] per packed packet.
    let mut scratch = vec![0u8; BUNDLE_HEADER_LEN];
    let mut counter = BUNDLE_HEADER_LEN;

    let mut idx = 0;
    while idx < layer.len() {
        if (predicates.should_drop)(&layer[idx]) {
            layer.remove(idx);
            continue;
        }
        if !(predicates.should_send)(&layer[idx]) {
            idx += 1;
            continue;
        }
        let size = layer[idx].bytes().len();
        if counter + 4 + size > config.max_packet_size {
            if counter == BUNDLE_HEADER_LEN {
                // Too big to ever fit in a bundle, but within the packet
                // budget by admission: send it bare and keep packing.
                let packet = layer.remove(idx).expect("index is in bounds");
                link.send_to_target(packet.bytes())?;
                continue;
            }
            break;
        }
        let packet = layer.remove(idx).expect("index is in bounds");
        scratch.extend_from_slice(&(size as u32).to_be_bytes());
        scratch.extend_from_slice(packet.bytes());
        counter += 4 + size;
    }

    if counter > BUNDLE_HEADER_LEN {
        scratch[..8].copy_from_slice(b"#bundle\0");
        let timetag = (predicates.timetag_source)();
        BigEndian::write_u32(&mut scratch[8..12], timetag.seconds);
        BigEndian::write_u32(&mut scratch[12..16], timetag.fractional);
        link.send_to_target(&scratch[..counter])?;
    }
    Ok(())
}
