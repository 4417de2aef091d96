//! Encodes OSC packets to their wire form.
//!
//! All entry points are generic over a [`Dialect`], which decides the
//! argument tag universe, coercion rules, array support and the empty
//! type-tag string convention.

use byteorder::{BigEndian, ByteOrder};

use crate::dialect::Dialect;
use crate::types::{OscBundle, OscMessage, OscPacket, OscTime, OscType, Result};

/// Encode a packet to a freshly allocated byte vector.
///
/// # Example
///
/// ```
/// use osckit::{encoder, Osc10, OscMessage, OscPacket};
///
/// let packet = OscPacket::Message(OscMessage::new("/greet/me", ("hi!",)));
/// assert!(encoder::encode::<Osc10>(&packet).is_ok());
/// ```
pub fn encode<D: Dialect>(packet: &OscPacket) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    encode_into::<D>(packet, &mut bytes)?;
    Ok(bytes)
}

/// Encode a packet, appending to `out`.
pub fn encode_into<D: Dialect>(packet: &OscPacket, out: &mut Vec<u8>) -> Result<()> {
    match packet {
        OscPacket::Message(msg) => encode_message_into::<D>(msg, out),
        OscPacket::Bundle(bundle) => encode_bundle_into::<D>(bundle, out),
    }
}

/// Encode a single message to a freshly allocated byte vector.
pub fn encode_message<D: Dialect>(msg: &OscMessage) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    encode_message_into::<D>(msg, &mut bytes)?;
    Ok(bytes)
}

fn encode_message_into<D: Dialect>(msg: &OscMessage, out: &mut Vec<u8>) -> Result<()> {
    encode_string_into(&msg.addr, out);

    // Tag and value bytes accumulate on separate cursors and are joined
    // once the argument walk is complete.
    let mut tags = vec![b','];
    let mut values = Vec::new();
    encode_args::<D>(&msg.args, &mut tags, &mut values)?;

    if tags.len() == 1 {
        if D::EMPTY_TYPE_TAGS {
            out.extend_from_slice(&[b',', 0, 0, 0]);
        }
        return Ok(());
    }

    let padded = pad(tags.len() as u64 + 1) as usize;
    tags.resize(padded, 0);
    out.extend_from_slice(&tags);
    out.extend_from_slice(&values);
    Ok(())
}

fn encode_args<D: Dialect>(
    args: &[OscType],
    tags: &mut Vec<u8>,
    values: &mut Vec<u8>,
) -> Result<()> {
    for arg in args {
        match arg {
            OscType::Array(array) => {
                if D::ARRAYS {
                    tags.push(b'[');
                    encode_args::<D>(&array.content, tags, values)?;
                    tags.push(b']');
                } else {
                    encode_args::<D>(&array.content, tags, values)?;
                }
            }
            other => D::encode_arg(other, tags, values)?,
        }
    }
    Ok(())
}

fn encode_bundle_into<D: Dialect>(bundle: &OscBundle, out: &mut Vec<u8>) -> Result<()> {
    encode_string_into("#bundle", out);
    encode_time_tag_into(&bundle.timetag, out);

    for child in &bundle.content {
        // Reserve the size prefix, encode the child behind it, then patch
        // the actual length in.
        let mark = out.len();
        out.extend_from_slice(&[0u8; 4]);
        encode_into::<D>(child, out)?;
        let size = (out.len() - mark - 4) as u32;
        BigEndian::write_u32(&mut out[mark..mark + 4], size);
    }

    Ok(())
}

/// Append the OSC wire form of a string: payload bytes, at least one NUL,
/// NUL padding to the next multiple of four.
pub fn encode_string_into<S: AsRef<str>>(s: S, out: &mut Vec<u8>) {
    let bytes = s.as_ref().as_bytes();
    out.extend_from_slice(bytes);
    let padding = pad(bytes.len() as u64 + 1) as usize - bytes.len();
    out.extend_from_slice(&[0u8; 4][..padding]);
}

/// Append the OSC wire form of a blob: 32-bit big-endian length, payload,
/// NUL padding to the next multiple of four.
pub fn encode_blob_into(blob: &[u8], out: &mut Vec<u8>) {
    out.extend_from_slice(&(blob.len() as u32).to_be_bytes());
    out.extend_from_slice(blob);
    let padding = pad(blob.len() as u64) as usize - blob.len();
    if padding > 0 {
        out.extend_from_slice(&[0u8; 3][..padding]);
    }
}

pub fn encode_time_tag_into(time: &OscTime, out: &mut Vec<u8>) {
    out.extend_from_slice(&time.seconds.to_be_bytes());
    out.extend_from_slice(&time.fractional.to_be_bytes());
}

/// Returns the position padded to 4 bytes.
///
/// # Example
///
/// ```
/// use osckit::encoder;
///
/// let pos: u64 = 10;
/// assert_eq!(12u64, encoder::pad(pos))
/// ```
pub fn pad(pos: u64) -> u64 {
    match pos % 4 {
        0 => pos,
        d => pos + (4 - d),
    }
}
