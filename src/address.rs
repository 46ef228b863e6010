use nom::branch::alt;
use nom::bytes::complete::take_while1;
use nom::character::complete::{char, satisfy};
use nom::combinator::{all_consuming, map, opt};
use nom::multi::{many1, separated_list1};
use nom::sequence::{delimited, separated_pair};
use nom::IResult;

use crate::errors::OscError;

/// A `Matcher` tests OSC method addresses against a compiled OSC
/// address pattern.
/// Refer to the OSC specification for details about OSC address spaces:
/// <http://opensoundcontrol.org/spec-1_0.html#osc-address-spaces-and-osc-addresses>
///
/// Pattern syntax, per path segment:
///
/// - `?` matches any single character
/// - `*` matches zero or more characters; it never crosses a `/`
/// - `[a-z]` is a character class, `[!a-z]` its negation
/// - `{foo,bar}` matches either of the listed literals
/// - everything else is matched literally
///
/// Pattern segments pair up one-to-one with the segments of the tested
/// address, so `/foo/*` matches `/foo/bar` but not `/foo/bar/baz`.
#[derive(Debug)]
pub struct Matcher {
    pub pattern: String,
    segments: Vec<Vec<Component>>,
}

impl Matcher {
    /// Compiles an address pattern. Compilation is the expensive half of
    /// matching, so build a `Matcher` once per pattern and reuse it.
    ///
    /// A valid pattern begins with `/` and has at least one non-empty
    /// segment; anything else is `OscError::IllegalPattern`.
    ///
    /// # Examples
    ///
    /// ```
    /// use osckit::address::Matcher;
    ///
    /// Matcher::new("/tempo").expect("valid address");
    /// Matcher::new("").expect_err("address does not start with a slash");
    /// ```
    pub fn new(pattern: &str) -> Result<Self, OscError> {
        let illegal = || OscError::IllegalPattern(pattern.to_string());

        let body = pattern.strip_prefix('/').ok_or_else(illegal)?;
        if body.is_empty() {
            return Err(illegal());
        }

        let mut segments = Vec::new();
        for part in body.split('/') {
            let (_, components) =
                all_consuming(many1(component))(part).map_err(|_| illegal())?;
            segments.push(components);
        }

        Ok(Matcher {
            pattern: pattern.to_string(),
            segments,
        })
    }

    /// Tests a concrete method address against this pattern. Matching
    /// fails closed: an address that is not a legal method address, or
    /// that only partially matches, yields `false`.
    ///
    /// # Examples
    ///
    /// ```
    /// use osckit::address::Matcher;
    ///
    /// let matcher = Matcher::new("/oscillator/[0-9]/{frequency,phase}").unwrap();
    /// assert!(matcher.matches("/oscillator/1/frequency"));
    /// assert!(matcher.matches("/oscillator/8/phase"));
    /// assert!(!matcher.matches("/oscillator/4/detune"));
    /// ```
    pub fn matches(&self, address: &str) -> bool {
        if !legal_address(address) {
            return false;
        }
        let target: Vec<&str> = address[1..].split('/').collect();
        if target.len() != self.segments.len() {
            return false;
        }
        self.segments
            .iter()
            .zip(target)
            .all(|(components, segment)| match_components(components, segment))
    }
}

/// One-shot form of [`Matcher::matches`] for callers that do not reuse
/// the pattern.
pub fn matches(pattern: &str, method: &str) -> Result<bool, OscError> {
    Ok(Matcher::new(pattern)?.matches(method))
}

/// The characters allowed in one segment of a method address: printable
/// ASCII minus space and the reserved set `#*,/?[]{}`.
pub fn valid_method_chars() -> &'static str {
    "!\"$%&'()+-.0123456789:;<=>@ABCDEFGHIJKLMNOPQRSTUVWXYZ\\^_`abcdefghijklmnopqrstuvwxyz|~"
}

/// Check whether a character is allowed in a method address segment.
pub fn is_address_character(x: char) -> bool {
    match x {
        ' ' | '#' | '*' | ',' | '/' | '?' | '[' | ']' | '{' | '}' => false,
        c => c > '\x20' && c < '\x7F',
    }
}

/// Whether `part` is usable as one segment of a method address.
pub fn legal_address_component(part: &str) -> bool {
    !part.is_empty() && part.chars().all(is_address_character)
}

/// Whether `address` is a legal concrete method address: `/`-rooted,
/// non-empty segments, no pattern metacharacters anywhere.
pub fn legal_address(address: &str) -> bool {
    match address.strip_prefix('/') {
        Some(body) if !body.is_empty() => body.split('/').all(legal_address_component),
        _ => false,
    }
}

#[derive(Debug)]
enum Component {
    Literal(String),
    AnyChar,
    AnyRun,
    Class { negated: bool, chars: String },
    Alternatives(Vec<String>),
}

fn component(input: &str) -> IResult<&str, Component> {
    alt((
        map(take_while1(is_address_character), |s: &str| {
            Component::Literal(s.to_string())
        }),
        map(char('?'), |_| Component::AnyChar),
        // Runs of '*' collapse into a single wildcard.
        map(take_while1(|c| c == '*'), |_| Component::AnyRun),
        character_class,
        alternatives,
    ))(input)
}

fn alternatives(input: &str) -> IResult<&str, Component> {
    map(
        delimited(
            char('{'),
            separated_list1(char(','), take_while1(is_address_character)),
            char('}'),
        ),
        |choices: Vec<&str>| {
            Component::Alternatives(choices.iter().map(|c| c.to_string()).collect())
        },
    )(input)
}

fn character_class(input: &str) -> IResult<&str, Component> {
    let (input, _) = char('[')(input)?;
    let (input, negated) = opt(char('!'))(input)?;
    let (input, pieces) = many1(class_item)(input)?;
    let (input, _) = char(']')(input)?;

    Ok((
        input,
        Component::Class {
            negated: negated.is_some(),
            chars: dedup_chars(pieces.concat()),
        },
    ))
}

fn class_item(input: &str) -> IResult<&str, String> {
    alt((
        map(
            separated_pair(
                satisfy(is_address_character),
                char('-'),
                satisfy(is_address_character),
            ),
            |(first, second)| expand_range(first, second),
        ),
        map(satisfy(is_address_character), |c| c.to_string()),
        // A trailing dash has no range meaning and matches literally.
        map(char('-'), |_| "-".to_string()),
    ))(input)
}

/// Expand a range like 'a-d' into the characters it covers, in either
/// order. Characters in the range that are not legal address characters
/// (possible with spans like `[0-a]`) are skipped.
fn expand_range(first: char, second: char) -> String {
    let (start, end) = if first <= second {
        (first as u8, second as u8)
    } else {
        (second as u8, first as u8)
    };
    (start..=end)
        .map(|b| b as char)
        .filter(|c| is_address_character(*c))
        .collect()
}

fn dedup_chars(input: String) -> String {
    let mut out = String::new();
    for c in input.chars() {
        if !out.contains(c) {
            out.push(c);
        }
    }
    out
}

fn match_components(components: &[Component], segment: &str) -> bool {
    let Some((first, rest)) = components.split_first() else {
        return segment.is_empty();
    };
    match first {
        Component::Literal(lit) => segment
            .strip_prefix(lit.as_str())
            .is_some_and(|tail| match_components(rest, tail)),
        Component::AnyChar => {
            let mut chars = segment.chars();
            chars.next().is_some() && match_components(rest, chars.as_str())
        }
        Component::Class { negated, chars } => match segment.chars().next() {
            Some(c) => {
                chars.contains(c) != *negated
                    && match_components(rest, &segment[c.len_utf8()..])
            }
            None => false,
        },
        Component::Alternatives(choices) => choices.iter().any(|choice| {
            segment
                .strip_prefix(choice.as_str())
                .is_some_and(|tail| match_components(rest, tail))
        }),
        Component::AnyRun => (0..=segment.len())
            .filter(|i| segment.is_char_boundary(*i))
            .any(|i| match_components(rest, &segment[i..])),
    }
}
