//! OSC dialects.
//!
//! Target applications diverge on which corners of the OSC type system
//! they understand: 64-bit variants, booleans, arrays, the empty type-tag
//! string. A [`Dialect`] captures one such profile as a compile-time
//! plug-in for the [`crate::encoder`] and [`crate::decoder`]. Arguments a
//! dialect cannot express natively are either coerced (documented per
//! dialect) or rejected with `UnsupportedTag`.

use log::debug;
use nom::IResult;

use crate::decoder::{read_blob, read_char, read_color, read_midi, read_osc_string, read_time_tag};
use crate::encoder::{encode_blob_into, encode_string_into, encode_time_tag_into, pad};
use crate::errors::OscError;
use crate::types::{OscBundle, OscPacket, OscType, Result};

/// An argument-level codec profile.
///
/// `encode_arg` appends the tag byte(s) of `arg` to `tags` and its payload
/// bytes to `values`; `decode_arg` parses the payload of one tag.
/// [`OscType::Array`] never reaches either function: the message codec
/// handles array nesting (or flattening, when [`Dialect::ARRAYS`] is
/// false) itself.
pub trait Dialect: 'static {
    /// Whether a zero-argument message carries the 4-byte `,\0\0\0` type
    /// tag string. Decoding requires the string when this is set.
    const EMPTY_TYPE_TAGS: bool = true;

    /// Whether `[`/`]` type-tag nesting is honored. When false, nested
    /// argument arrays are flattened in both directions.
    const ARRAYS: bool = false;

    fn encode_arg(arg: &OscType, tags: &mut Vec<u8>, values: &mut Vec<u8>) -> Result<()>;

    fn decode_arg(input: &[u8], tag: char) -> IResult<&[u8], OscType, OscError>;

    /// Payload bytes `arg` will occupy on the wire, excluding its tag.
    fn arg_size(arg: &OscType) -> usize;
}

/// The strict OSC 1.0 profile: every tag of the specification including
/// arrays. Float and double NaN encode as `N`, infinities as `I`.
pub struct Osc10;

/// The smallest useful profile: `i f s b` only. 64-bit values are
/// narrowed, everything else falls back to its string rendering (`Nil`
/// becomes `"NULL"`).
pub struct Minimal;

/// The profile the SuperCollider language client speaks: no time tags, no
/// colors, 64-bit integers narrowed, booleans as `T`/`F`.
pub struct Sclang;

/// The profile the SuperCollider server speaks: `i f s b d`, booleans as
/// integers, `Nil` as the string `"NULL"`.
pub struct Scsynth;

fn clamp_long(value: i64) -> i32 {
    value.clamp(i32::MIN as i64, i32::MAX as i64) as i32
}

fn push_i32(value: i32, tags: &mut Vec<u8>, values: &mut Vec<u8>) {
    tags.push(b'i');
    values.extend_from_slice(&value.to_be_bytes());
}

fn push_f32(value: f32, tags: &mut Vec<u8>, values: &mut Vec<u8>) {
    tags.push(b'f');
    values.extend_from_slice(&value.to_be_bytes());
}

fn push_str(value: &str, tags: &mut Vec<u8>, values: &mut Vec<u8>) {
    tags.push(b's');
    encode_string_into(value, values);
}

fn string_size(s: &str) -> usize {
    pad(s.len() as u64 + 1) as usize
}

fn blob_size(b: &[u8]) -> usize {
    4 + pad(b.len() as u64) as usize
}

/// The string rendering used by [`Minimal`] for arguments outside its tag
/// universe.
fn display_fallback(arg: &OscType) -> String {
    match arg {
        OscType::Nil => "NULL".to_string(),
        OscType::Bool(v) => v.to_string(),
        OscType::Char(v) => v.to_string(),
        OscType::Time(v) => v.to_string(),
        OscType::Color(v) => v.to_string(),
        OscType::Midi(v) => v.to_string(),
        OscType::Inf => "inf".to_string(),
        // Natively encoded variants never reach this.
        other => other.to_string(),
    }
}

impl Dialect for Osc10 {
    const ARRAYS: bool = true;

    fn encode_arg(arg: &OscType, tags: &mut Vec<u8>, values: &mut Vec<u8>) -> Result<()> {
        match arg {
            OscType::Int(v) => push_i32(*v, tags, values),
            OscType::Long(v) => {
                tags.push(b'h');
                values.extend_from_slice(&v.to_be_bytes());
            }
            OscType::Float(v) if v.is_nan() => tags.push(b'N'),
            OscType::Float(v) if v.is_infinite() => tags.push(b'I'),
            OscType::Float(v) => push_f32(*v, tags, values),
            OscType::Double(v) if v.is_nan() => tags.push(b'N'),
            OscType::Double(v) if v.is_infinite() => tags.push(b'I'),
            OscType::Double(v) => {
                tags.push(b'd');
                values.extend_from_slice(&v.to_be_bytes());
            }
            OscType::String(v) => push_str(v, tags, values),
            OscType::Blob(v) => {
                tags.push(b'b');
                encode_blob_into(v, values);
            }
            OscType::Time(v) => {
                tags.push(b't');
                encode_time_tag_into(v, values);
            }
            OscType::Char(v) => {
                tags.push(b'c');
                values.extend_from_slice(&(*v as u32).to_be_bytes());
            }
            OscType::Color(v) => {
                tags.push(b'r');
                values.extend_from_slice(&[v.red, v.green, v.blue, v.alpha]);
            }
            OscType::Midi(v) => {
                tags.push(b'm');
                values.extend_from_slice(&[v.port, v.status, v.data1, v.data2]);
            }
            OscType::Bool(v) => tags.push(if *v { b'T' } else { b'F' }),
            OscType::Nil => tags.push(b'N'),
            OscType::Inf => tags.push(b'I'),
            OscType::Array(_) => unreachable!("arrays are handled by the message codec"),
        }
        Ok(())
    }

    fn decode_arg(input: &[u8], tag: char) -> IResult<&[u8], OscType, OscError> {
        use nom::number::complete::{be_f32, be_f64, be_i32, be_i64};
        match tag {
            'i' => be_i32(input).map(|(rest, v)| (rest, OscType::Int(v))),
            'h' => be_i64(input).map(|(rest, v)| (rest, OscType::Long(v))),
            'f' => be_f32(input).map(|(rest, v)| (rest, OscType::Float(v))),
            'd' => be_f64(input).map(|(rest, v)| (rest, OscType::Double(v))),
            's' => read_osc_string(input).map(|(rest, v)| (rest, OscType::String(v))),
            'b' => read_blob(input),
            't' => read_time_tag(input).map(|(rest, v)| (rest, OscType::Time(v))),
            'c' => read_char(input),
            'r' => read_color(input),
            'm' => read_midi(input),
            'T' => Ok((input, OscType::Bool(true))),
            'F' => Ok((input, OscType::Bool(false))),
            'N' => Ok((input, OscType::Nil)),
            'I' => Ok((input, OscType::Inf)),
            tag => Err(nom::Err::Error(OscError::UnsupportedTag(tag))),
        }
    }

    fn arg_size(arg: &OscType) -> usize {
        match arg {
            OscType::Int(_) | OscType::Char(_) | OscType::Color(_) | OscType::Midi(_) => 4,
            OscType::Float(v) => {
                if v.is_finite() {
                    4
                } else {
                    0
                }
            }
            OscType::Double(v) => {
                if v.is_finite() {
                    8
                } else {
                    0
                }
            }
            OscType::Long(_) | OscType::Time(_) => 8,
            OscType::String(v) => string_size(v),
            OscType::Blob(v) => blob_size(v),
            OscType::Bool(_) | OscType::Nil | OscType::Inf => 0,
            OscType::Array(v) => v.content.iter().map(Self::arg_size).sum(),
        }
    }
}

impl Dialect for Minimal {
    fn encode_arg(arg: &OscType, tags: &mut Vec<u8>, values: &mut Vec<u8>) -> Result<()> {
        match arg {
            OscType::Int(v) => push_i32(*v, tags, values),
            OscType::Long(v) => push_i32(clamp_long(*v), tags, values),
            OscType::Float(v) => push_f32(*v, tags, values),
            OscType::Double(v) => push_f32(*v as f32, tags, values),
            OscType::String(v) => push_str(v, tags, values),
            OscType::Blob(v) => {
                tags.push(b'b');
                encode_blob_into(v, values);
            }
            OscType::Array(_) => unreachable!("arrays are handled by the message codec"),
            other => push_str(&display_fallback(other), tags, values),
        }
        Ok(())
    }

    fn decode_arg(input: &[u8], tag: char) -> IResult<&[u8], OscType, OscError> {
        use nom::number::complete::{be_f32, be_i32};
        match tag {
            'i' => be_i32(input).map(|(rest, v)| (rest, OscType::Int(v))),
            'f' => be_f32(input).map(|(rest, v)| (rest, OscType::Float(v))),
            's' => read_osc_string(input).map(|(rest, v)| (rest, OscType::String(v))),
            'b' => read_blob(input),
            tag => Err(nom::Err::Error(OscError::UnsupportedTag(tag))),
        }
    }

    fn arg_size(arg: &OscType) -> usize {
        match arg {
            OscType::Int(_) | OscType::Long(_) | OscType::Float(_) | OscType::Double(_) => 4,
            OscType::String(v) => string_size(v),
            OscType::Blob(v) => blob_size(v),
            OscType::Array(v) => v.content.iter().map(Self::arg_size).sum(),
            other => string_size(&display_fallback(other)),
        }
    }
}

impl Dialect for Sclang {
    fn encode_arg(arg: &OscType, tags: &mut Vec<u8>, values: &mut Vec<u8>) -> Result<()> {
        match arg {
            OscType::Int(v) => push_i32(*v, tags, values),
            OscType::Long(v) => push_i32(clamp_long(*v), tags, values),
            OscType::Float(v) if v.is_nan() => tags.push(b'N'),
            OscType::Float(v) if v.is_infinite() => tags.push(b'I'),
            OscType::Float(v) => push_f32(*v, tags, values),
            OscType::Double(v) if v.is_nan() => tags.push(b'N'),
            OscType::Double(v) if v.is_infinite() => tags.push(b'I'),
            OscType::Double(v) => {
                tags.push(b'd');
                values.extend_from_slice(&v.to_be_bytes());
            }
            OscType::String(v) => push_str(v, tags, values),
            OscType::Blob(v) => {
                tags.push(b'b');
                encode_blob_into(v, values);
            }
            OscType::Char(v) => {
                tags.push(b'c');
                values.extend_from_slice(&(*v as u32).to_be_bytes());
            }
            OscType::Midi(v) => {
                tags.push(b'm');
                values.extend_from_slice(&[v.port, v.status, v.data1, v.data2]);
            }
            OscType::Bool(v) => tags.push(if *v { b'T' } else { b'F' }),
            OscType::Nil => tags.push(b'N'),
            OscType::Inf => tags.push(b'I'),
            OscType::Time(_) => return Err(OscError::UnsupportedTag('t')),
            OscType::Color(_) => return Err(OscError::UnsupportedTag('r')),
            OscType::Array(_) => unreachable!("arrays are handled by the message codec"),
        }
        Ok(())
    }

    fn decode_arg(input: &[u8], tag: char) -> IResult<&[u8], OscType, OscError> {
        use nom::number::complete::{be_f32, be_f64, be_i32};
        match tag {
            'i' => be_i32(input).map(|(rest, v)| (rest, OscType::Int(v))),
            'f' => be_f32(input).map(|(rest, v)| (rest, OscType::Float(v))),
            'd' => be_f64(input).map(|(rest, v)| (rest, OscType::Double(v))),
            's' => read_osc_string(input).map(|(rest, v)| (rest, OscType::String(v))),
            'b' => read_blob(input),
            'c' => read_char(input),
            'm' => read_midi(input),
            'T' => Ok((input, OscType::Bool(true))),
            'F' => Ok((input, OscType::Bool(false))),
            'N' => Ok((input, OscType::Nil)),
            'I' => Ok((input, OscType::Inf)),
            tag => Err(nom::Err::Error(OscError::UnsupportedTag(tag))),
        }
    }

    fn arg_size(arg: &OscType) -> usize {
        match arg {
            OscType::Int(_) | OscType::Long(_) | OscType::Char(_) | OscType::Midi(_) => 4,
            OscType::Float(v) => {
                if v.is_finite() {
                    4
                } else {
                    0
                }
            }
            OscType::Double(v) => {
                if v.is_finite() {
                    8
                } else {
                    0
                }
            }
            OscType::String(v) => string_size(v),
            OscType::Blob(v) => blob_size(v),
            OscType::Bool(_) | OscType::Nil | OscType::Inf => 0,
            OscType::Time(_) | OscType::Color(_) => 0,
            OscType::Array(v) => v.content.iter().map(Self::arg_size).sum(),
        }
    }
}

impl Dialect for Scsynth {
    fn encode_arg(arg: &OscType, tags: &mut Vec<u8>, values: &mut Vec<u8>) -> Result<()> {
        match arg {
            OscType::Int(v) => push_i32(*v, tags, values),
            OscType::Long(v) => push_i32(clamp_long(*v), tags, values),
            OscType::Float(v) => push_f32(*v, tags, values),
            OscType::Double(v) => {
                tags.push(b'd');
                values.extend_from_slice(&v.to_be_bytes());
            }
            OscType::String(v) => push_str(v, tags, values),
            OscType::Blob(v) => {
                tags.push(b'b');
                encode_blob_into(v, values);
            }
            OscType::Bool(v) => push_i32(i32::from(*v), tags, values),
            OscType::Nil => push_str("NULL", tags, values),
            OscType::Time(_) => return Err(OscError::UnsupportedTag('t')),
            OscType::Char(_) => return Err(OscError::UnsupportedTag('c')),
            OscType::Color(_) => return Err(OscError::UnsupportedTag('r')),
            OscType::Midi(_) => return Err(OscError::UnsupportedTag('m')),
            OscType::Inf => return Err(OscError::UnsupportedTag('I')),
            OscType::Array(_) => unreachable!("arrays are handled by the message codec"),
        }
        Ok(())
    }

    fn decode_arg(input: &[u8], tag: char) -> IResult<&[u8], OscType, OscError> {
        use nom::number::complete::{be_f32, be_f64, be_i32};
        match tag {
            'i' => be_i32(input).map(|(rest, v)| (rest, OscType::Int(v))),
            'f' => be_f32(input).map(|(rest, v)| (rest, OscType::Float(v))),
            'd' => be_f64(input).map(|(rest, v)| (rest, OscType::Double(v))),
            's' => read_osc_string(input).map(|(rest, v)| (rest, OscType::String(v))),
            'b' => read_blob(input),
            tag => Err(nom::Err::Error(OscError::UnsupportedTag(tag))),
        }
    }

    fn arg_size(arg: &OscType) -> usize {
        match arg {
            OscType::Int(_) | OscType::Long(_) | OscType::Float(_) | OscType::Bool(_) => 4,
            OscType::Double(_) => 8,
            OscType::String(v) => string_size(v),
            OscType::Blob(v) => blob_size(v),
            OscType::Nil => string_size("NULL"),
            OscType::Array(v) => v.content.iter().map(Self::arg_size).sum(),
            _ => 0,
        }
    }
}

/// Unwrap a bundle-of-bundles into the flat sequence of leaf bundles, in
/// discovery order. Each entry keeps its own messages; nested bundles
/// become entries of their own. A nested bundle whose time tag is earlier
/// than its enclosing bundle's is dropped, as the OSC specification
/// requires.
pub fn flatten_bundle(bundle: OscBundle) -> Vec<OscBundle> {
    let mut flat = Vec::new();
    let mut stack = vec![bundle];

    while let Some(bundle) = stack.pop() {
        let mut leaf = OscBundle {
            timetag: bundle.timetag,
            content: Vec::new(),
        };
        let mut nested = Vec::new();
        for packet in bundle.content {
            match packet {
                OscPacket::Bundle(child) => {
                    if child.timetag < leaf.timetag {
                        debug!(
                            "dropping nested bundle scheduled at {} before its parent at {}",
                            child.timetag, leaf.timetag
                        );
                        continue;
                    }
                    nested.push(child);
                }
                message => leaf.content.push(message),
            }
        }
        flat.push(leaf);
        // Reverse push keeps sibling bundles in discovery order.
        while let Some(child) = nested.pop() {
            stack.push(child);
        }
    }

    flat
}
