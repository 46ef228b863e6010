use nom::bytes::complete::{take, take_till};
use nom::number::complete::{be_f32, be_i32, be_u32};
use nom::IResult;

use crate::encoder::pad;
use crate::errors::OscError;
use crate::types::{OscBundle, OscMessage, OscPacket, OscTime, OscValue};

/// Bundles may nest, and a hostile packet can nest them deeply enough
/// to blow the stack during recursive decoding. Decoding stops at this
/// depth with `OscError::BundleTooDeep`.
pub const MAX_BUNDLE_DEPTH: usize = 16;

/// Decodes one complete frame into an OSC packet. The frame must
/// contain exactly one packet; trailing bytes are an error, since both
/// datagrams and SLIP frames delimit packets precisely.
pub fn decode(frame: &[u8]) -> crate::types::Result<OscPacket> {
    let (rest, packet) = decode_packet(frame, 0).map_err(flatten_nom)?;
    if !rest.is_empty() {
        return Err(OscError::MalformedValue(format!(
            "{} trailing bytes after packet",
            rest.len()
        )));
    }
    Ok(packet)
}

fn flatten_nom(e: nom::Err<OscError>) -> OscError {
    match e {
        nom::Err::Incomplete(_) => OscError::MalformedValue("truncated packet".into()),
        nom::Err::Error(e) | nom::Err::Failure(e) => e,
    }
}

fn decode_packet(input: &[u8], depth: usize) -> IResult<&[u8], OscPacket, OscError> {
    match input.first() {
        None => Err(nom::Err::Error(OscError::UnknownPacket("empty packet"))),
        Some(b'/') => decode_message(input),
        Some(b'#') => decode_bundle(input, depth),
        Some(_) => Err(nom::Err::Error(OscError::UnknownPacket(
            "packet starts with neither '/' nor '#bundle'",
        ))),
    }
}

fn decode_message(input: &[u8]) -> IResult<&[u8], OscPacket, OscError> {
    let (input, addr) = read_osc_string(input)?;
    let (input, type_tags) = read_osc_string(input)?;

    if !type_tags.starts_with(',') {
        return Err(nom::Err::Error(OscError::MalformedValue(
            "type-tag string does not start with ','".into(),
        )));
    }

    let mut args = Vec::with_capacity(type_tags.len() - 1);
    let mut input = input;
    for tag in type_tags.chars().skip(1) {
        let (rest, arg) = read_osc_arg(input, tag)?;
        input = rest;
        args.push(arg);
    }

    Ok((input, OscPacket::Message(OscMessage { addr, args })))
}

fn decode_bundle(input: &[u8], depth: usize) -> IResult<&[u8], OscPacket, OscError> {
    if depth >= MAX_BUNDLE_DEPTH {
        return Err(nom::Err::Failure(OscError::BundleTooDeep));
    }

    let (input, bundle_tag) = read_osc_string(input)?;
    if bundle_tag != "#bundle" {
        return Err(nom::Err::Error(OscError::UnknownPacket(
            "packet starts with neither '/' nor '#bundle'",
        )));
    }

    let (mut input, timetag) = read_time_tag(input)?;

    let mut content = Vec::new();
    while !input.is_empty() {
        let (rest, packet) = read_bundle_element(input, depth)?;
        input = rest;
        content.push(packet);
    }

    Ok((input, OscPacket::Bundle(OscBundle { timetag, content })))
}

fn read_bundle_element(input: &[u8], depth: usize) -> IResult<&[u8], OscPacket, OscError> {
    let (input, elem_size) = be_u32(input)?;

    if elem_size == 0 || elem_size % 4 != 0 {
        return Err(nom::Err::Error(OscError::MalformedValue(format!(
            "bundle element length {elem_size} is not a positive multiple of 4"
        ))));
    }
    if elem_size as usize > input.len() {
        return Err(nom::Err::Error(OscError::MalformedValue(
            "bundle element length exceeds remaining buffer".into(),
        )));
    }

    let (input, element) = take(elem_size)(input)?;
    let (leftover, packet) = decode_packet(element, depth + 1)?;
    if !leftover.is_empty() {
        return Err(nom::Err::Error(OscError::MalformedValue(
            "bundle element shorter than its declared length".into(),
        )));
    }

    Ok((input, packet))
}

fn read_osc_arg(input: &[u8], tag: char) -> IResult<&[u8], OscValue, OscError> {
    match tag {
        'i' => {
            let (input, x) = be_i32(input)?;
            Ok((input, OscValue::Int(x)))
        }
        'f' => {
            let (input, x) = be_f32(input)?;
            Ok((input, OscValue::Float(x)))
        }
        's' => {
            let (input, s) = read_osc_string(input)?;
            Ok((input, OscValue::String(s)))
        }
        'b' => read_blob(input),
        't' => {
            let (input, time) = read_time_tag(input)?;
            Ok((input, OscValue::Time(time)))
        }
        'T' => Ok((input, OscValue::Bool(true))),
        'F' => Ok((input, OscValue::Bool(false))),
        'N' => Ok((input, OscValue::Nil)),
        'I' => Ok((input, OscValue::Impulse)),
        other => Err(nom::Err::Error(OscError::UnknownTypeTag(other))),
    }
}

fn read_osc_string(input: &[u8]) -> IResult<&[u8], String, OscError> {
    let (rest, str_buf) = take_till::<_, _, OscError>(|b| b == 0u8)(input)?;
    if rest.is_empty() {
        // take_till consumed everything, so the terminator never came
        return Err(nom::Err::Error(OscError::MalformedValue(
            "string is missing its NUL terminator".into(),
        )));
    }

    // Consume the terminator plus padding out to the 4-byte boundary.
    let padded = pad(str_buf.len() as u64 + 1) as usize - str_buf.len();
    let (rest, _) = take(padded)(rest).map_err(|_: nom::Err<OscError>| {
        nom::Err::Error(OscError::MalformedValue(
            "string padding is missing".into(),
        ))
    })?;

    let s = String::from_utf8(str_buf.to_vec()).map_err(|e| nom::Err::Error(e.into()))?;
    Ok((rest, s))
}

fn read_blob(input: &[u8]) -> IResult<&[u8], OscValue, OscError> {
    let (input, size) = be_u32(input)?;
    if size as usize > input.len() {
        return Err(nom::Err::Error(OscError::MalformedValue(
            "blob length exceeds remaining buffer".into(),
        )));
    }

    let (input, blob) = take(size)(input)?;
    let padded = pad(size as u64) as usize - size as usize;
    let (input, _) = take(padded)(input).map_err(|_: nom::Err<OscError>| {
        nom::Err::Error(OscError::MalformedValue("blob padding is missing".into()))
    })?;

    Ok((input, OscValue::Blob(blob.to_vec())))
}

fn read_time_tag(input: &[u8]) -> IResult<&[u8], OscTime, OscError> {
    let (input, seconds) = be_u32(input)?;
    let (input, fraction) = be_u32(input)?;
    Ok((input, OscTime { seconds, fraction }))
}
