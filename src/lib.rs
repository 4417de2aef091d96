//! **osckit** is an [OSC 1.0](http://opensoundcontrol.org/spec-1_0)
//! runtime for Rust: a wire codec that speaks several OSC dialects, a UDP
//! transport link, a prioritized outbound sender that packs traffic into
//! bundles, and a time-tag-aware receiver dispatching into a hierarchical
//! address space.
//!
//! The codec can be used on its own:
//!
//! ```
//! use osckit::{decoder, encoder, Osc10, OscMessage, OscPacket};
//!
//! let packet = OscPacket::Message(OscMessage::new("/mixer/1/gain", (0.5f32,)));
//! let bytes = encoder::encode::<Osc10>(&packet).unwrap();
//! assert_eq!(packet, decoder::decode_udp::<Osc10>(&bytes).unwrap());
//! ```
//!
//! A full pipeline wires a [`UdpLink`] to an [`OscReceiver`] and an
//! [`AddressSpace`], and sends through a [`PacketSender`].

/// Crate specific error types.
mod errors;
/// OSC data types, see the [OSC 1.0 specification](https://opensoundcontrol.stanford.edu/spec-1_0.html) for details.
mod types;

pub use crate::errors::OscError;
pub use crate::types::*;

/// Address checking, splitting and pattern matching.
pub mod address;
/// The process-wide monotonic clock behind time tags.
pub mod clock;
/// Decodes OSC packets from bytes.
pub mod decoder;
/// OSC dialect profiles and bundle flattening.
pub mod dialect;
/// Encodes OSC packets to bytes.
pub mod encoder;
/// Subscriber lists used by the transport events.
pub mod event;
/// The UDP transport link.
pub mod link;
/// The inbound receiver and its delay scheduler.
pub mod receiver;
/// The outbound sender and its packet heap.
pub mod sender;
/// The address space tree.
pub mod space;

pub use crate::dialect::{Dialect, Minimal, Osc10, Sclang, Scsynth};
pub use crate::link::{LinkMode, LinkSettings, UdpLink};
pub use crate::receiver::OscReceiver;
pub use crate::sender::{OutboundPacket, PacketSender, SenderConfig};
pub use crate::space::{AddressSpace, ElementId, ElementKind};
