use core::fmt::{self, Display};
use core::result;
use std::convert::{TryFrom, TryInto};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use time::{format_description::well_known::Iso8601, OffsetDateTime};

use crate::errors;

/// A time tag in an OSC bundle or message consists of two 32-bit integers
/// where the first one denotes the number of seconds since 1900-01-01 UTC
/// and the second the fraction of a second.
/// For details on its semantics see <http://opensoundcontrol.org/node/3/#timetags>
///
/// The value `{seconds: 0, fraction: 1}` is reserved to mean "immediately";
/// the all-ones value has no defined meaning.
///
/// # Conversions with [`std::time::SystemTime`]
///
/// An `OscTime` converts into a `SystemTime` with [`From`]/[`Into`]; the
/// reverse direction uses [`TryFrom`]/[`TryInto`] because times before the
/// UNIX epoch cannot be represented (keeping the conversion math valid on
/// 32-bit systems). These conversions are lossy, but round-trip within a
/// few nanoseconds in either direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OscTime {
    pub seconds: u32,
    pub fraction: u32,
}

impl OscTime {
    /// The reserved tag meaning "execute immediately".
    pub const IMMEDIATE: OscTime = OscTime {
        seconds: 0,
        fraction: 1,
    };

    const UNIX_OFFSET: u64 = 2_208_988_800; // From RFC 5905
    const TWO_POW_32: f64 = (u32::MAX as f64) + 1.0;
    const ONE_OVER_TWO_POW_32: f64 = 1.0 / OscTime::TWO_POW_32;
    const NANOS_PER_SECOND: f64 = 1.0e9;
    const SECONDS_PER_NANO: f64 = 1.0 / OscTime::NANOS_PER_SECOND;

    pub fn is_immediate(&self) -> bool {
        *self == OscTime::IMMEDIATE
    }
}

impl TryFrom<SystemTime> for OscTime {
    type Error = OscTimeError;

    fn try_from(time: SystemTime) -> result::Result<OscTime, OscTimeError> {
        let duration_since_epoch = time
            .duration_since(UNIX_EPOCH)
            .map_err(|_| OscTimeError(OscTimeErrorKind::BeforeEpoch))?
            + Duration::new(OscTime::UNIX_OFFSET, 0);
        let seconds = u32::try_from(duration_since_epoch.as_secs())
            .map_err(|_| OscTimeError(OscTimeErrorKind::Overflow))?;
        let nanos = duration_since_epoch.subsec_nanos() as f64;
        let fraction = (nanos * OscTime::SECONDS_PER_NANO * OscTime::TWO_POW_32).round() as u32;
        Ok(OscTime { seconds, fraction })
    }
}

impl From<OscTime> for SystemTime {
    fn from(time: OscTime) -> SystemTime {
        let nanos =
            (time.fraction as f64) * OscTime::ONE_OVER_TWO_POW_32 * OscTime::NANOS_PER_SECOND;
        let duration_since_osc_epoch = Duration::new(time.seconds as u64, nanos.round() as u32);
        let duration_since_unix_epoch =
            duration_since_osc_epoch - Duration::new(OscTime::UNIX_OFFSET, 0);
        UNIX_EPOCH + duration_since_unix_epoch
    }
}

impl Display for OscTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_immediate() {
            return f.write_str("immediate");
        }
        // Tags between the OSC epoch and 1970 have no SystemTime
        // representation; show them as raw parts.
        if (self.seconds as u64) < OscTime::UNIX_OFFSET {
            return write!(f, "{}:{}", self.seconds, self.fraction);
        }
        let time: OffsetDateTime = SystemTime::from(*self).into();
        let formatted = time.format(&Iso8601::DEFAULT).map_err(|_| fmt::Error)?;
        f.write_str(&formatted)
    }
}

impl From<(u32, u32)> for OscTime {
    fn from(time: (u32, u32)) -> OscTime {
        let (seconds, fraction) = time;
        OscTime { seconds, fraction }
    }
}

impl From<OscTime> for (u32, u32) {
    fn from(time: OscTime) -> (u32, u32) {
        (time.seconds, time.fraction)
    }
}

/// An error returned by conversions involving [`OscTime`].
#[derive(Debug)]
pub struct OscTimeError(OscTimeErrorKind);

#[derive(Debug)]
enum OscTimeErrorKind {
    BeforeEpoch,
    Overflow,
}

impl Display for OscTimeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0 {
            OscTimeErrorKind::BeforeEpoch => {
                write!(f, "time is before the unix epoch and cannot be stored")
            }
            OscTimeErrorKind::Overflow => {
                write!(f, "time overflows what OSC time can store")
            }
        }
    }
}

impl std::error::Error for OscTimeError {}

/// Longest encodable string payload in bytes, excluding the NUL
/// terminator: the terminated, padded form must still fit a u32 length.
pub const MAX_STRING_LEN: usize = (u32::MAX - 4) as usize;

/// An OSC argument. The type-tag character for each variant is listed
/// next to it; `Bool`, `Nil` and `Impulse` occupy no bytes in the
/// argument section and are carried by their tag character alone.
#[derive(Clone, Debug, PartialEq)]
pub enum OscValue {
    /// `i`
    Int(i32),
    /// `f`
    Float(f32),
    /// `s`
    String(String),
    /// `b`
    Blob(Vec<u8>),
    /// `t`
    Time(OscTime),
    /// `T` or `F`
    Bool(bool),
    /// `N`
    Nil,
    /// `I`
    Impulse,
}

macro_rules! value_impl {
    ($(($name:ident, $variant:ident, $ty:ty)),*) => {
        $(
        impl OscValue {
            #[allow(dead_code)]
            pub fn $name(self) -> Option<$ty> {
                match self {
                    OscValue::$variant(v) => Some(v),
                    _ => None
                }
            }
        }
        impl From<$ty> for OscValue {
            fn from(v: $ty) -> Self {
                OscValue::$variant(v)
            }
        }
        )*
    }
}

value_impl! {
    (int, Int, i32),
    (float, Float, f32),
    (string, String, String),
    (blob, Blob, Vec<u8>),
    (bool, Bool, bool)
}

impl From<(u32, u32)> for OscValue {
    fn from(time: (u32, u32)) -> Self {
        OscValue::Time(time.into())
    }
}

impl From<OscTime> for OscValue {
    fn from(time: OscTime) -> Self {
        OscValue::Time(time)
    }
}

impl<'a> From<&'a str> for OscValue {
    fn from(string: &'a str) -> Self {
        OscValue::String(string.to_string())
    }
}

impl TryFrom<SystemTime> for OscValue {
    type Error = OscTimeError;

    fn try_from(time: SystemTime) -> result::Result<OscValue, OscTimeError> {
        time.try_into().map(OscValue::Time)
    }
}

impl OscValue {
    pub fn time(self) -> Option<OscTime> {
        match self {
            OscValue::Time(time) => Some(time),
            _ => None,
        }
    }

    /// The character this value contributes to a type-tag string.
    pub fn type_tag(&self) -> char {
        match self {
            OscValue::Int(_) => 'i',
            OscValue::Float(_) => 'f',
            OscValue::String(_) => 's',
            OscValue::Blob(_) => 'b',
            OscValue::Time(_) => 't',
            OscValue::Bool(true) => 'T',
            OscValue::Bool(false) => 'F',
            OscValue::Nil => 'N',
            OscValue::Impulse => 'I',
        }
    }
}

impl Display for OscValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OscValue::Int(v) => write!(f, "(i) {v}"),
            OscValue::Float(v) => write!(f, "(f) {v}"),
            OscValue::String(v) => write!(f, "(s) {v}"),
            OscValue::Blob(v) => {
                f.write_str("(b)")?;
                if v.is_empty() {
                    return Ok(());
                }
                write!(f, " 0x{}", hex::encode_upper(v))
            }
            OscValue::Time(v) => write!(f, "(t) {v}"),
            OscValue::Bool(v) => f.write_str(if *v { "(T)" } else { "(F)" }),
            OscValue::Nil => f.write_str("(N)"),
            OscValue::Impulse => f.write_str("(I)"),
        }
    }
}

/// An *OSC packet* carries either a single *OSC message* or a bundle of
/// nested packets, the *OSC bundle*.
#[derive(Clone, Debug, PartialEq)]
pub enum OscPacket {
    Message(OscMessage),
    Bundle(OscBundle),
}

impl Display for OscPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OscPacket::Message(m) => m.fmt(f),
            OscPacket::Bundle(b) => b.fmt(f),
        }
    }
}

impl From<OscMessage> for OscPacket {
    fn from(msg: OscMessage) -> OscPacket {
        OscPacket::Message(msg)
    }
}

impl From<OscBundle> for OscPacket {
    fn from(bundle: OscBundle) -> OscPacket {
        OscPacket::Bundle(bundle)
    }
}

/// An OSC message consists of an address pattern and zero or more
/// arguments. The address names an element of whatever you are
/// controlling, the arguments set its properties. The type-tag string
/// is always derived from the arguments when encoding, never stored.
#[derive(Clone, Debug, PartialEq)]
pub struct OscMessage {
    pub addr: String,
    pub args: Vec<OscValue>,
}

impl OscMessage {
    pub fn new(addr: impl Into<String>, args: Vec<OscValue>) -> Self {
        OscMessage {
            addr: addr.into(),
            args,
        }
    }

    /// The type-tag string for this message: a leading comma, then one
    /// character per argument.
    pub fn type_tag_string(&self) -> String {
        let mut tags = String::with_capacity(self.args.len() + 1);
        tags.push(',');
        for arg in &self.args {
            tags.push(arg.type_tag());
        }
        tags
    }
}

impl Display for OscMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let args = self
            .args
            .iter()
            .map(OscValue::to_string)
            .collect::<Vec<String>>()
            .join(", ");
        write!(f, "{}, {}", self.addr, args)
    }
}

impl From<String> for OscMessage {
    fn from(s: String) -> OscMessage {
        OscMessage {
            addr: s,
            args: vec![],
        }
    }
}

impl<'a> From<&'a str> for OscMessage {
    fn from(s: &str) -> OscMessage {
        OscMessage {
            addr: s.to_string(),
            args: vec![],
        }
    }
}

/// An OSC bundle groups zero or more packets under a time tag. The
/// contained packets *should* be applied at the given time.
#[derive(Clone, Debug, PartialEq)]
pub struct OscBundle {
    pub timetag: OscTime,
    pub content: Vec<OscPacket>,
}

impl OscBundle {
    /// A bundle marked for immediate execution.
    pub fn immediate(content: Vec<OscPacket>) -> Self {
        OscBundle {
            timetag: OscTime::IMMEDIATE,
            content,
        }
    }
}

impl Display for OscBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let content = self
            .content
            .iter()
            .map(OscPacket::to_string)
            .collect::<Vec<String>>()
            .join("; ");
        write!(f, "#bundle {} {{ {} }}", self.timetag, content)
    }
}

pub type Result<T> = result::Result<T, errors::OscError>;
