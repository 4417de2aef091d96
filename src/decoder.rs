//! Decodes OSC packets from their wire form.
//!
//! The parsers are written with nom over byte slices; the remaining input
//! of each parser is the advanced read cursor. Like the encoder, every
//! entry point is generic over a [`Dialect`].

use nom::number::complete::{be_u32, be_u8};
use nom::IResult;

use crate::dialect::Dialect;
use crate::encoder::pad;
use crate::errors::OscError;
use crate::types::{
    OscArray, OscBundle, OscColor, OscMessage, OscMidiMessage, OscPacket, OscTime, OscType, Result,
};

/// Common MTU size for ethernet.
pub const MTU: usize = 1536;

/// Decode one datagram into an OSC packet.
///
/// The first byte classifies the datagram: `/` starts a message, `#` a
/// bundle, anything else fails with `BadPacket`.
pub fn decode_udp<D: Dialect>(msg: &[u8]) -> Result<OscPacket> {
    decode_packet::<D>(msg)
        .map(|(_, packet)| packet)
        .map_err(OscError::from_nom)
}

fn decode_packet<D: Dialect>(input: &[u8]) -> IResult<&[u8], OscPacket, OscError> {
    match input.first() {
        None => Err(nom::Err::Error(OscError::BadPacket("empty packet"))),
        Some(b'/') => decode_message::<D>(input),
        Some(b'#') => decode_bundle::<D>(input),
        Some(_) => Err(nom::Err::Error(OscError::BadPacket(
            "unknown packet format",
        ))),
    }
}

fn decode_message<D: Dialect>(input: &[u8]) -> IResult<&[u8], OscPacket, OscError> {
    let (input, addr) = read_osc_string(input)?;

    if input.is_empty() {
        if D::EMPTY_TYPE_TAGS {
            return Err(nom::Err::Error(OscError::BadMessage(
                "missing type tag string",
            )));
        }
        return Ok((input, OscPacket::Message(OscMessage { addr, args: vec![] })));
    }

    let (input, type_tags) = read_osc_string(input)?;
    if !type_tags.starts_with(',') {
        return Err(nom::Err::Error(OscError::BadMessage(
            "type tag string does not start with ','",
        )));
    }

    let (input, args) = read_osc_args::<D>(input, &type_tags[1..])?;
    Ok((input, OscPacket::Message(OscMessage { addr, args })))
}

fn read_osc_args<'a, D: Dialect>(
    mut input: &'a [u8],
    tags: &str,
) -> IResult<&'a [u8], Vec<OscType>, OscError> {
    let mut args: Vec<OscType> = Vec::with_capacity(tags.len());
    // Stashed outer frames while inside `[...]` groups.
    let mut stack: Vec<Vec<OscType>> = Vec::new();

    for tag in tags.chars() {
        match tag {
            '[' => {
                // Dialects without array support flatten: the brackets are
                // dropped and the content stays in the outer sequence.
                if D::ARRAYS {
                    stack.push(std::mem::take(&mut args));
                }
            }
            ']' => {
                if D::ARRAYS {
                    let outer = match stack.pop() {
                        Some(outer) => outer,
                        None => {
                            return Err(nom::Err::Error(OscError::BadMessage(
                                "']' outside an array",
                            )))
                        }
                    };
                    let array = OscType::Array(OscArray {
                        content: std::mem::replace(&mut args, outer),
                    });
                    args.push(array);
                }
            }
            tag => {
                let (rest, arg) = D::decode_arg(input, tag)?;
                input = rest;
                args.push(arg);
            }
        }
    }

    if !stack.is_empty() {
        return Err(nom::Err::Error(OscError::BadMessage(
            "unbalanced array brackets",
        )));
    }
    Ok((input, args))
}

fn decode_bundle<D: Dialect>(input: &[u8]) -> IResult<&[u8], OscPacket, OscError> {
    let (input, specifier) = read_osc_string(input)?;
    if specifier != "#bundle" {
        return Err(nom::Err::Error(OscError::BadBundle(format!(
            "wrong bundle specifier: {}",
            specifier
        ))));
    }

    let (mut input, timetag) = read_time_tag(input)?;

    let mut content = Vec::new();
    while !input.is_empty() {
        let (rest, size) = be_u32(input)?;
        if rest.len() < size as usize {
            return Err(nom::Err::Error(OscError::BadBundle(
                "bundle shorter than expected".to_string(),
            )));
        }
        let (child, rest) = rest.split_at(size as usize);
        let (_, packet) = decode_packet::<D>(child)?;
        content.push(packet);
        input = rest;
    }

    Ok((input, OscPacket::Bundle(OscBundle { timetag, content })))
}

/// Read an OSC string: bytes up to the first NUL, then advance past the
/// whole 4-aligned span. Fails when the span is not wholly present.
pub(crate) fn read_osc_string(input: &[u8]) -> IResult<&[u8], String, OscError> {
    let end = match input.iter().position(|&b| b == 0) {
        Some(end) => end,
        None => {
            return Err(nom::Err::Error(OscError::BadString(
                "missing null terminator",
            )))
        }
    };
    let span = pad(end as u64 + 1) as usize;
    if input.len() < span {
        return Err(nom::Err::Error(OscError::BadString(
            "string padding is truncated",
        )));
    }
    let payload = String::from_utf8(input[..end].to_vec())
        .map_err(|err| nom::Err::Error(OscError::StringError(err)))?;
    Ok((&input[span..], payload))
}

pub(crate) fn read_blob(input: &[u8]) -> IResult<&[u8], OscType, OscError> {
    let (input, size) = be_u32(input)?;
    let span = pad(size as u64) as usize;
    if input.len() < span {
        return Err(nom::Err::Error(OscError::BadMessage("blob is truncated")));
    }
    let blob = input[..size as usize].to_vec();
    Ok((&input[span..], OscType::Blob(blob)))
}

pub(crate) fn read_time_tag(input: &[u8]) -> IResult<&[u8], OscTime, OscError> {
    let (input, seconds) = be_u32(input)?;
    let (input, fractional) = be_u32(input)?;
    Ok((
        input,
        OscTime {
            seconds,
            fractional,
        },
    ))
}

pub(crate) fn read_char(input: &[u8]) -> IResult<&[u8], OscType, OscError> {
    let (input, code) = be_u32(input)?;
    match char::from_u32(code) {
        Some(c) => Ok((input, OscType::Char(c))),
        None => Err(nom::Err::Error(OscError::BadArg(format!(
            "{:#x} is not a char",
            code
        )))),
    }
}

pub(crate) fn read_color(input: &[u8]) -> IResult<&[u8], OscType, OscError> {
    let (input, red) = be_u8(input)?;
    let (input, green) = be_u8(input)?;
    let (input, blue) = be_u8(input)?;
    let (input, alpha) = be_u8(input)?;
    Ok((
        input,
        OscType::Color(OscColor {
            red,
            green,
            blue,
            alpha,
        }),
    ))
}

pub(crate) fn read_midi(input: &[u8]) -> IResult<&[u8], OscType, OscError> {
    let (input, port) = be_u8(input)?;
    let (input, status) = be_u8(input)?;
    let (input, data1) = be_u8(input)?;
    let (input, data2) = be_u8(input)?;
    Ok((
        input,
        OscType::Midi(OscMidiMessage {
            port,
            status,
            data1,
            data2,
        }),
    ))
}
