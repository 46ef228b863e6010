//! QSC, the textual notation for describing OSC packets in diagnostics
//! and test fixtures. A message is written as its address followed by
//! space-separated argument tokens:
//!
//! - `12`: a decimal integer, becomes `Int`
//! - `2.5` or `1e-3`: a decimal with a point or exponent, becomes `Float`
//! - `'hello there'`: single-quoted text, becomes `String`
//! - `#blob0a0b0c`: `#blob` followed by hex digits, becomes `Blob`
//! - `#time3849719296:0`: seconds and fraction, becomes `Time`
//! - `\T` `\F` `\N` `\I`: the singleton values
//!
//! This is a convenience notation, not a wire format.

use std::str::FromStr;

use nom::branch::alt;
use nom::bytes::complete::{tag, take_till, take_till1, take_while1};
use nom::character::complete::{char, multispace0, multispace1};
use nom::combinator::{map, map_res};
use nom::multi::many0;
use nom::sequence::{delimited, preceded, separated_pair};
use nom::IResult;

use crate::errors::OscError;
use crate::types::{OscBundle, OscMessage, OscPacket, OscTime, OscValue};

/// Parses a QSC message string like `/mixer/gain 1 0.5 'label' \T`.
pub fn parse_message(input: &str) -> crate::types::Result<OscMessage> {
    let input = input.trim();
    let (rest, msg) = message(input)
        .map_err(|_| OscError::MalformedValue(format!("unparseable QSC message: {input}")))?;
    if !rest.is_empty() {
        return Err(OscError::MalformedValue(format!(
            "unparseable QSC token: {rest}"
        )));
    }
    if !msg.addr.starts_with('/') {
        return Err(OscError::MalformedValue(format!(
            "QSC address must start with '/': {}",
            msg.addr
        )));
    }
    Ok(msg)
}

impl FromStr for OscMessage {
    type Err = OscError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_message(s)
    }
}

/// Renders a message back into QSC notation. Inverse of
/// [`parse_message`] for every representable message.
pub fn render_message(msg: &OscMessage) -> String {
    let mut out = msg.addr.clone();
    for arg in &msg.args {
        out.push(' ');
        out.push_str(&render_value(arg));
    }
    out
}

/// Renders any packet for logs and error reports. Bundles have no QSC
/// input form; their rendering is one-way.
pub fn render_packet(packet: &OscPacket) -> String {
    match packet {
        OscPacket::Message(msg) => render_message(msg),
        OscPacket::Bundle(bundle) => render_bundle(bundle),
    }
}

fn render_bundle(bundle: &OscBundle) -> String {
    let elements = bundle
        .content
        .iter()
        .map(render_packet)
        .collect::<Vec<String>>()
        .join("; ");
    format!(
        "#bundle {} {{ {} }}",
        render_time(&bundle.timetag),
        elements
    )
}

fn render_value(value: &OscValue) -> String {
    match value {
        OscValue::Int(v) => v.to_string(),
        // Debug formatting keeps the decimal point on round numbers, so
        // the token parses back as a float.
        OscValue::Float(v) => format!("{v:?}"),
        OscValue::String(v) => format!("'{v}'"),
        OscValue::Blob(v) => format!("#blob{}", hex::encode(v)),
        OscValue::Time(v) => render_time(v),
        OscValue::Bool(true) => "\\T".to_string(),
        OscValue::Bool(false) => "\\F".to_string(),
        OscValue::Nil => "\\N".to_string(),
        OscValue::Impulse => "\\I".to_string(),
    }
}

fn render_time(time: &OscTime) -> String {
    format!("#time{}:{}", time.seconds, time.fraction)
}

fn message(input: &str) -> IResult<&str, OscMessage> {
    let (input, addr) = take_till1(char::is_whitespace)(input)?;
    let (input, args) = many0(preceded(multispace1, token))(input)?;
    let (input, _) = multispace0(input)?;
    Ok((
        input,
        OscMessage {
            addr: addr.to_string(),
            args,
        },
    ))
}

fn token(input: &str) -> IResult<&str, OscValue> {
    alt((singleton, blob, timetag, quoted, number))(input)
}

fn singleton(input: &str) -> IResult<&str, OscValue> {
    preceded(
        char('\\'),
        alt((
            map(char('T'), |_| OscValue::Bool(true)),
            map(char('F'), |_| OscValue::Bool(false)),
            map(char('N'), |_| OscValue::Nil),
            map(char('I'), |_| OscValue::Impulse),
        )),
    )(input)
}

fn blob(input: &str) -> IResult<&str, OscValue> {
    map_res(
        preceded(
            tag("#blob"),
            take_while1(|c: char| c.is_ascii_hexdigit()),
        ),
        |digits: &str| hex::decode(digits).map(OscValue::Blob),
    )(input)
}

fn timetag(input: &str) -> IResult<&str, OscValue> {
    map(
        preceded(
            tag("#time"),
            separated_pair(decimal_u32, char(':'), decimal_u32),
        ),
        |(seconds, fraction)| OscValue::Time(OscTime { seconds, fraction }),
    )(input)
}

fn decimal_u32(input: &str) -> IResult<&str, u32> {
    map_res(
        take_while1(|c: char| c.is_ascii_digit()),
        |digits: &str| digits.parse::<u32>(),
    )(input)
}

fn quoted(input: &str) -> IResult<&str, OscValue> {
    map(
        delimited(char('\''), take_till(|c| c == '\''), char('\'')),
        |text: &str| OscValue::String(text.to_string()),
    )(input)
}

fn number(input: &str) -> IResult<&str, OscValue> {
    map_res(
        take_till1(char::is_whitespace),
        |text: &str| -> Result<OscValue, ()> {
            if text.contains(&['.', 'e', 'E'][..]) {
                text.parse::<f32>().map(OscValue::Float).map_err(|_| ())
            } else {
                text.parse::<i32>().map(OscValue::Int).map_err(|_| ())
            }
        },
    )(input)
}
