use std::convert::TryFrom;
use std::fmt::{self, Display};
use std::net::SocketAddr;
use std::result;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use time::format_description::well_known::Iso8601;
use time::OffsetDateTime;

use crate::errors::OscError;

pub type Result<T> = result::Result<T, OscError>;

/// An OSC time tag: two 32-bit integers, seconds since 1900-01-01 UTC and
/// binary fractions of a second. See
/// <http://opensoundcontrol.org/node/3/#timetags> for the semantics.
///
/// The reserved value `(0, 1)` ([`OscTime::IMMEDIATE`]) instructs a
/// receiver to act on a bundle as soon as it arrives.
///
/// `OscTime` converts to and from [`SystemTime`] (fallible in the
/// `SystemTime → OscTime` direction, since times before the Unix epoch are
/// not representable here) and to and from the process-wide 100-ns tick
/// counter of [`crate::clock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct OscTime {
    pub seconds: u32,
    pub fractional: u32,
}

/// 100-ns intervals per second.
const TICKS_PER_SECOND: u64 = 10_000_000;

impl OscTime {
    /// The reserved "immediately" tag: seconds 0, fraction 1.
    pub const IMMEDIATE: OscTime = OscTime {
        seconds: 0,
        fractional: 1,
    };

    const UNIX_OFFSET: u64 = 2_208_988_800; // seconds from 1900 to 1970, RFC 5905
    const TWO_POW_32: f64 = (u32::MAX as f64) + 1.0;
    const NANOS_PER_SECOND: f64 = 1.0e9;

    pub fn is_immediate(&self) -> bool {
        *self == OscTime::IMMEDIATE
    }

    /// The tag as a count of 100-ns intervals since 1900-01-01 UTC.
    pub fn as_ticks(&self) -> u64 {
        let whole = self.seconds as u64 * TICKS_PER_SECOND;
        let frac = (self.fractional as u64 * TICKS_PER_SECOND) >> 32;
        whole + frac
    }

    /// Build a tag from a count of 100-ns intervals since 1900-01-01 UTC.
    pub fn from_ticks(ticks: u64) -> OscTime {
        let seconds = (ticks / TICKS_PER_SECOND) as u32;
        let fractional = (((ticks % TICKS_PER_SECOND) << 32) / TICKS_PER_SECOND) as u32;
        OscTime {
            seconds,
            fractional,
        }
    }
}

impl TryFrom<SystemTime> for OscTime {
    type Error = OscError;

    fn try_from(time: SystemTime) -> Result<OscTime> {
        let since_1900 = time
            .duration_since(UNIX_EPOCH)
            .map_err(|_| OscError::BadArg("time is before the unix epoch".into()))?
            + Duration::new(OscTime::UNIX_OFFSET, 0);
        let seconds = u32::try_from(since_1900.as_secs())
            .map_err(|_| OscError::BadArg("time overflows the OSC time range".into()))?;
        let nanos = since_1900.subsec_nanos() as f64;
        let fractional = (nanos / OscTime::NANOS_PER_SECOND * OscTime::TWO_POW_32).round() as u32;
        Ok(OscTime {
            seconds,
            fractional,
        })
    }
}

impl From<OscTime> for SystemTime {
    fn from(time: OscTime) -> SystemTime {
        let nanos =
            (time.fractional as f64) / OscTime::TWO_POW_32 * OscTime::NANOS_PER_SECOND;
        let since_1900 = Duration::new(time.seconds as u64, nanos.round() as u32);
        // Saturates at the Unix epoch for tags from the 1900..1970 range.
        let since_unix = since_1900
            .checked_sub(Duration::new(OscTime::UNIX_OFFSET, 0))
            .unwrap_or_default();
        UNIX_EPOCH + since_unix
    }
}

impl From<(u32, u32)> for OscTime {
    fn from(time: (u32, u32)) -> OscTime {
        let (seconds, fractional) = time;
        OscTime {
            seconds,
            fractional,
        }
    }
}

impl From<OscTime> for (u32, u32) {
    fn from(time: OscTime) -> (u32, u32) {
        (time.seconds, time.fractional)
    }
}

impl Display for OscTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_immediate() {
            return f.write_str("immediately");
        }
        if (self.seconds as u64) < OscTime::UNIX_OFFSET {
            // Pre-1970 tags have no ISO rendering worth the trouble.
            return write!(f, "{}+{}/2^32s", self.seconds, self.fractional);
        }
        let unix_secs = self.seconds as u64 - OscTime::UNIX_OFFSET;
        let time = OffsetDateTime::from_unix_timestamp(unix_secs as i64).map_err(|_| fmt::Error)?;
        let formatted = time.format(&Iso8601::DEFAULT).map_err(|_| fmt::Error)?;
        f.write_str(&formatted)
    }
}

/// One OSC argument. The tag universe a peer actually understands is
/// dialect-dependent; see [`crate::dialect`].
#[derive(Clone, Debug, PartialEq)]
pub enum OscType {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Blob(Vec<u8>),
    Time(OscTime),
    Char(char),
    Color(OscColor),
    Midi(OscMidiMessage),
    Bool(bool),
    Nil,
    Inf,
    Array(OscArray),
}

macro_rules! arg_conversions {
    ($(($accessor:ident, $variant:ident, $ty:ty)),* $(,)?) => {
        $(
        impl OscType {
            /// Consume the value if it carries this variant.
            pub fn $accessor(self) -> Option<$ty> {
                match self {
                    OscType::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
        impl From<$ty> for OscType {
            fn from(v: $ty) -> Self {
                OscType::$variant(v)
            }
        }
        )*
    }
}

arg_conversions! {
    (int, Int, i32),
    (long, Long, i64),
    (float, Float, f32),
    (double, Double, f64),
    (string, String, String),
    (blob, Blob, Vec<u8>),
    (time, Time, OscTime),
    (char, Char, char),
    (color, Color, OscColor),
    (midi, Midi, OscMidiMessage),
    (bool, Bool, bool),
    (array, Array, OscArray),
}

impl From<(u32, u32)> for OscType {
    fn from(time: (u32, u32)) -> Self {
        OscType::Time(time.into())
    }
}

impl<'a> From<&'a str> for OscType {
    fn from(string: &'a str) -> Self {
        OscType::String(string.to_string())
    }
}

impl Display for OscType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OscType::Int(v) => write!(f, "(i) {v}"),
            OscType::Long(v) => write!(f, "(h) {v}"),
            OscType::Float(v) => write!(f, "(f) {v}"),
            OscType::Double(v) => write!(f, "(d) {v}"),
            OscType::String(v) => write!(f, "(s) {v}"),
            OscType::Blob(v) => {
                f.write_str("(b)")?;
                if v.is_empty() {
                    return Ok(());
                }
                f.write_str(" 0x")?;
                for octet in v {
                    write!(f, "{:02X}", octet)?;
                }
                Ok(())
            }
            OscType::Time(v) => write!(f, "(t) {v}"),
            OscType::Char(v) => write!(f, "(c) {v}"),
            OscType::Color(v) => write!(f, "(r) {v}"),
            OscType::Midi(v) => write!(f, "(m) {v}"),
            OscType::Bool(v) => f.write_str(if *v { "(T)" } else { "(F)" }),
            OscType::Nil => f.write_str("(N)"),
            OscType::Inf => f.write_str("(I)"),
            OscType::Array(v) => v.fmt(f),
        }
    }
}

/// The parts of a MIDI message, for tunneling MIDI over OSC.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OscMidiMessage {
    pub port: u8,
    pub status: u8,
    pub data1: u8,
    pub data2: u8,
}

impl Display for OscMidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{port:{}, status:0x{:02X}, data:0x{:02X}{:02X}}}",
            self.port, self.status, self.data1, self.data2,
        )
    }
}

/// An RGBA color.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OscColor {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub alpha: u8,
}

impl Display for OscColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{{},{},{},{}}}",
            self.red, self.green, self.blue, self.alpha
        )
    }
}

/// An argument array. Dialects without array support flatten the content
/// into the surrounding argument sequence on both encode and decode.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct OscArray {
    pub content: Vec<OscType>,
}

impl<T: Into<OscType>> FromIterator<T> for OscArray {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> OscArray {
        OscArray {
            content: iter.into_iter().map(T::into).collect(),
        }
    }
}

impl Display for OscArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, item) in self.content.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            item.fmt(f)?;
        }
        f.write_str("]")
    }
}

/// An OSC message: an address pattern plus zero or more arguments.
#[derive(Clone, Debug, PartialEq)]
pub struct OscMessage {
    pub addr: String,
    pub args: Vec<OscType>,
}

impl OscMessage {
    /// Build a message from an address and anything convertible to an
    /// argument list: a `Vec<OscType>`, a single value, or a tuple of
    /// plain Rust values.
    pub fn new<A: IntoOscArgs>(addr: impl Into<String>, args: A) -> OscMessage {
        OscMessage {
            addr: addr.into(),
            args: args.into_osc_args(),
        }
    }

    /// Borrow the message as `(address, arguments)` for pattern matching.
    pub fn as_tuple(&self) -> (&str, &[OscType]) {
        (self.addr.as_str(), &self.args[..])
    }
}

impl From<String> for OscMessage {
    fn from(addr: String) -> OscMessage {
        OscMessage { addr, args: vec![] }
    }
}

impl<'a> From<&'a str> for OscMessage {
    fn from(addr: &str) -> OscMessage {
        OscMessage {
            addr: addr.to_string(),
            args: vec![],
        }
    }
}

impl Display for OscMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.addr)?;
        for arg in &self.args {
            write!(f, ", {arg}")?;
        }
        Ok(())
    }
}

/// An OSC bundle: a time tag plus child packets that *should* take effect
/// at that time.
#[derive(Clone, Debug, PartialEq)]
pub struct OscBundle {
    pub timetag: OscTime,
    pub content: Vec<OscPacket>,
}

impl Display for OscBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#bundle {} {{ ", self.timetag)?;
        for (i, child) in self.content.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            child.fmt(f)?;
        }
        f.write_str(" }")
    }
}

/// A decoded OSC packet: either a message or a bundle.
#[derive(Clone, Debug, PartialEq)]
pub enum OscPacket {
    Message(OscMessage),
    Bundle(OscBundle),
}

impl OscPacket {
    pub fn message(&self) -> Option<&OscMessage> {
        match self {
            OscPacket::Message(message) => Some(message),
            _ => None,
        }
    }

    pub fn bundle(&self) -> Option<&OscBundle> {
        match self {
            OscPacket::Bundle(bundle) => Some(bundle),
            _ => None,
        }
    }
}

impl From<OscMessage> for OscPacket {
    fn from(message: OscMessage) -> OscPacket {
        OscPacket::Message(message)
    }
}

impl From<OscBundle> for OscPacket {
    fn from(bundle: OscBundle) -> OscPacket {
        OscPacket::Bundle(bundle)
    }
}

impl Display for OscPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OscPacket::Message(m) => m.fmt(f),
            OscPacket::Bundle(b) => b.fmt(f),
        }
    }
}

/// What the first byte of a wire packet says it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Message,
    Bundle,
    Invalid,
}

/// An encoded OSC packet: an opaque byte window as it travels through the
/// sender heap and over the wire. The first byte discriminates the
/// content: `/` for a message, `#` for a bundle.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct RawPacket {
    bytes: Vec<u8>,
}

impl RawPacket {
    pub fn new(bytes: Vec<u8>) -> RawPacket {
        RawPacket { bytes }
    }

    pub fn kind(&self) -> PacketKind {
        match self.bytes.first() {
            Some(b'/') => PacketKind::Message,
            Some(b'#') => PacketKind::Bundle,
            _ => PacketKind::Invalid,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl From<Vec<u8>> for RawPacket {
    fn from(bytes: Vec<u8>) -> RawPacket {
        RawPacket { bytes }
    }
}

impl AsRef<[u8]> for RawPacket {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// A wire packet paired with the peer it came from.
#[derive(Clone, Debug)]
pub struct ReceivedPacket {
    pub packet: RawPacket,
    pub from: SocketAddr,
}

/// Anything convertible into an OSC argument list.
pub trait IntoOscArgs {
    fn into_osc_args(self) -> Vec<OscType>;
}

impl<T: Into<OscType>> IntoOscArgs for Vec<T> {
    fn into_osc_args(self) -> Vec<OscType> {
        self.into_iter().map(Into::into).collect()
    }
}

impl IntoOscArgs for () {
    fn into_osc_args(self) -> Vec<OscType> {
        vec![]
    }
}

macro_rules! args_tuple_impl {
    ($($idx:tt : $ty:ident),+) => {
        impl<$($ty: Into<OscType>),+> IntoOscArgs for ($($ty,)+) {
            fn into_osc_args(self) -> Vec<OscType> {
                vec![$(self.$idx.into()),+]
            }
        }
    }
}

args_tuple_impl!(0: A);
args_tuple_impl!(0: A, 1: B);
args_tuple_impl!(0: A, 1: B, 2: C);
args_tuple_impl!(0: A, 1: B, 2: C, 3: D);
args_tuple_impl!(0: A, 1: B, 2: C, 3: D, 4: E);
args_tuple_impl!(0: A, 1: B, 2: C, 3: D, 4: E, 5: F);
