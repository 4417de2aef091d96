//! The UDP transport link.
//!
//! A [`UdpLink`] owns one UDP socket and a background receive loop. It
//! operates in one of two modes: connected to a single peer
//! ([`LinkMode::ToTarget`]) or open to any peer ([`LinkMode::ToAny`]).
//! Inbound datagrams are classified by their first byte and fanned out
//! through the link's events; the loop never dies on a socket error or a
//! panicking subscriber.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error};

use crate::errors::OscError;
use crate::event::Event;
use crate::types::{PacketKind, RawPacket, ReceivedPacket, Result};

/// The link state machine: `Closed` ⇄ `ToTarget` / `ToAny`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMode {
    Closed,
    ToTarget,
    ToAny,
}

/// Runtime-adjustable link settings. Changes are picked up on the next
/// open.
#[derive(Debug, Clone)]
pub struct LinkSettings {
    /// Receive buffer size in kibibytes.
    pub recv_buffer_kib: usize,
    /// How long one receive poll blocks before rechecking cancellation.
    pub poll_interval: Duration,
    /// Whether successful sends also raise [`LinkEvents::packet_sent`].
    pub emit_packet_sent: bool,
}

impl Default for LinkSettings {
    fn default() -> Self {
        LinkSettings {
            recv_buffer_kib: 64,
            poll_interval: Duration::from_millis(10),
            emit_packet_sent: false,
        }
    }
}

/// The link's event surface.
#[derive(Default)]
pub struct LinkEvents {
    /// A datagram starting with `/` or `#` arrived.
    pub packet_received: Event<ReceivedPacket>,
    /// A packet left the socket (only when `emit_packet_sent` is set).
    pub packet_sent: Event<RawPacket>,
    /// A datagram that is neither message nor bundle arrived.
    pub bad_data: Event<ReceivedPacket>,
    /// A socket failure or subscriber panic inside the receive loop.
    pub receive_error: Event<OscError>,
}

struct OpenState {
    socket: Arc<UdpSocket>,
    mode: LinkMode,
    peer: Option<SocketAddr>,
    cancel: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

struct LinkInner {
    state: Mutex<Option<OpenState>>,
    settings: Mutex<LinkSettings>,
    events: Arc<LinkEvents>,
}

/// A cheaply cloneable handle to one UDP endpoint. All clones share the
/// socket, mode and events.
#[derive(Clone)]
pub struct UdpLink {
    inner: Arc<LinkInner>,
}

impl Default for UdpLink {
    fn default() -> Self {
        Self::new()
    }
}

impl UdpLink {
    pub fn new() -> UdpLink {
        UdpLink {
            inner: Arc::new(LinkInner {
                state: Mutex::new(None),
                settings: Mutex::new(LinkSettings::default()),
                events: Arc::new(LinkEvents::default()),
            }),
        }
    }

    pub fn events(&self) -> &LinkEvents {
        &self.inner.events
    }

    pub fn mode(&self) -> LinkMode {
        match self.inner.state.lock().unwrap().as_ref() {
            Some(open) => open.mode,
            None => LinkMode::Closed,
        }
    }

    /// The locally bound address, if the link is open.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner
            .state
            .lock()
            .unwrap()
            .as_ref()
            .and_then(|open| open.socket.local_addr().ok())
    }

    pub fn settings(&self) -> LinkSettings {
        self.inner.settings.lock().unwrap().clone()
    }

    pub fn set_settings(&self, settings: LinkSettings) {
        *self.inner.settings.lock().unwrap() = settings;
    }

    /// Open towards a single peer. The local socket binds to
    /// `bound_port` (OS-chosen when `None`); all
    /// [`send_to_target`](UdpLink::send_to_target) calls go to `target`.
    pub fn open_to_target(&self, target: SocketAddr, bound_port: Option<u16>) -> Result<()> {
        self.open(
            (Ipv4Addr::UNSPECIFIED, bound_port.unwrap_or(0)).into(),
            LinkMode::ToTarget,
            Some(target),
        )
    }

    /// Open without a fixed peer, bound to the loopback interface.
    pub fn open_to_any(&self, bound_port: Option<u16>) -> Result<()> {
        self.open(
            (Ipv4Addr::LOCALHOST, bound_port.unwrap_or(0)).into(),
            LinkMode::ToAny,
            None,
        )
    }

    fn open(&self, bind: SocketAddr, mode: LinkMode, peer: Option<SocketAddr>) -> Result<()> {
        let mut state = self.inner.state.lock().unwrap();
        if state.is_some() {
            return Err(OscError::WrongMode("link is already open"));
        }

        let settings = self.settings();
        let socket = UdpSocket::bind(bind)?;
        socket.set_read_timeout(Some(settings.poll_interval.max(Duration::from_millis(1))))?;
        let socket = Arc::new(socket);

        let cancel = Arc::new(AtomicBool::new(false));
        let worker = {
            let socket = Arc::clone(&socket);
            let cancel = Arc::clone(&cancel);
            let events = Arc::clone(&self.inner.events);
            thread::Builder::new()
                .name("osc-link-recv".into())
                .spawn(move || receive_loop(socket, cancel, events, settings))
                .map_err(OscError::Io)?
        };

        *state = Some(OpenState {
            socket,
            mode,
            peer,
            cancel,
            worker: Some(worker),
        });
        Ok(())
    }

    /// Stop the receive loop, join it, and release the socket. A second
    /// close is a no-op.
    pub fn close(&self) {
        let open = self.inner.state.lock().unwrap().take();
        if let Some(mut open) = open {
            open.cancel.store(true, Ordering::SeqCst);
            if let Some(worker) = open.worker.take() {
                if worker.join().is_err() {
                    error!("link receive loop terminated by panic");
                }
            }
        }
    }

    /// Send `bytes` to the configured peer. Requires
    /// [`LinkMode::ToTarget`].
    pub fn send_to_target(&self, bytes: &[u8]) -> Result<()> {
        let (socket, peer) = {
            let state = self.inner.state.lock().unwrap();
            match state.as_ref() {
                Some(open) if open.mode == LinkMode::ToTarget => (
                    Arc::clone(&open.socket),
                    open.peer.expect("target links always carry a peer"),
                ),
                _ => return Err(OscError::WrongMode("link is not open to a target")),
            }
        };
        self.send_datagram(&socket, bytes, peer)
    }

    /// Send `bytes` to an explicit peer. Requires [`LinkMode::ToAny`].
    pub fn send_to_endpoint(&self, bytes: &[u8], endpoint: SocketAddr) -> Result<()> {
        let socket = {
            let state = self.inner.state.lock().unwrap();
            match state.as_ref() {
                Some(open) if open.mode == LinkMode::ToAny => Arc::clone(&open.socket),
                _ => return Err(OscError::WrongMode("link is not open to any peer")),
            }
        };
        self.send_datagram(&socket, bytes, endpoint)
    }

    fn send_datagram(&self, socket: &UdpSocket, bytes: &[u8], to: SocketAddr) -> Result<()> {
        socket.send_to(bytes, to)?;
        if self.settings().emit_packet_sent {
            self.inner
                .events
                .packet_sent
                .emit(&RawPacket::new(bytes.to_vec()));
        }
        Ok(())
    }
}

impl Drop for LinkInner {
    fn drop(&mut self) {
        // Last handle gone: stop the worker so the thread does not leak.
        if let Some(mut open) = self.state.lock().unwrap().take() {
            open.cancel.store(true, Ordering::SeqCst);
            if let Some(worker) = open.worker.take() {
                let _ = worker.join();
            }
        }
    }
}

fn receive_loop(
    socket: Arc<UdpSocket>,
    cancel: Arc<AtomicBool>,
    events: Arc<LinkEvents>,
    settings: LinkSettings,
) {
    let mut buf = vec![0u8; settings.recv_buffer_kib.max(1) * 1024];

    while !cancel.load(Ordering::SeqCst) {
        let (len, from) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(err)
                if err.kind() == io::ErrorKind::WouldBlock
                    || err.kind() == io::ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(err) => {
                // Surface and keep polling; only cancellation ends the loop.
                events.receive_error.emit(&OscError::Io(err));
                thread::sleep(settings.poll_interval);
                continue;
            }
        };

        let received = ReceivedPacket {
            packet: RawPacket::new(buf[..len].to_vec()),
            from,
        };
        let panics = match received.packet.kind() {
            PacketKind::Message | PacketKind::Bundle => events.packet_received.emit(&received),
            PacketKind::Invalid => {
                debug!("datagram from {} is not an OSC packet", from);
                events.bad_data.emit(&received)
            }
        };
        for panic in panics {
            events.receive_error.emit(&panic);
        }
    }
}
