//! OSC address handling: validity checks, splitting, and pattern
//! matching.
//!
//! An address names a method in the address space, e.g. `/mixer/1/gain`.
//! An address *pattern* may additionally use the OSC metasymbols:
//!
//! - `?` matches exactly one character
//! - `*` matches zero or more characters (greedy, with backtracking)
//! - `[a-z]`, `[abc]`, `[!…]` match (or exclude) one character of a set
//! - `{foo,bar}` matches one of the listed literals
//!
//! Classes and alternatives do not nest. Matching is per address element:
//! no metasymbol crosses a `/` boundary.

use nom::branch::alt;
use nom::bytes::complete::{tag, take_while1};
use nom::character::complete::{char, satisfy};
use nom::combinator::{all_consuming, opt};
use nom::multi::{many1, separated_list1};
use nom::sequence::{delimited, pair, separated_pair};
use nom::{IResult, Parser};

use crate::errors::OscError;
use crate::types::Result;

/// The pattern metasymbols of the OSC address grammar.
const METASYMBOLS: &[char] = &['?', '*', '[', ']', '{', '}'];

/// Symbols that must not appear literally in container or method names:
/// the metasymbols plus the address separator, the bundle sigil, space and
/// comma.
const RESERVED: &[char] = &['?', '*', '[', ']', '{', '}', '/', '#', ' ', ','];

/// True if `s` uses any pattern metasymbol.
pub fn contains_pattern_metasymbols(s: &str) -> bool {
    s.contains(METASYMBOLS)
}

/// True if `s` contains a symbol that is reserved in element names.
pub fn contains_reserved_symbols(s: &str) -> bool {
    s.contains(RESERVED)
}

/// Split an address (or address pattern) on `/` into its ordered element
/// names. The empty element before the mandatory leading `/` is
/// discarded; a missing leading slash, a trailing slash, or an empty
/// element is an error.
pub fn split_address(addr: &str) -> Result<Vec<&str>> {
    let rest = addr
        .strip_prefix('/')
        .ok_or_else(|| OscError::BadAddress(format!("{:?} does not start with '/'", addr)))?;
    if rest.is_empty() {
        return Err(OscError::BadAddress("address has no elements".to_string()));
    }
    let parts: Vec<&str> = rest.split('/').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(OscError::BadAddress(format!(
            "{:?} contains an empty element",
            addr
        )));
    }
    Ok(parts)
}

/// Check that `addr` is a plain literal address: a leading `/`, non-empty
/// elements, and no reserved symbols anywhere.
pub fn verify_address(addr: &str) -> Result<()> {
    for part in split_address(addr)? {
        if !part.chars().all(is_name_character) {
            return Err(OscError::BadAddress(format!(
                "element {:?} contains reserved or non-printable characters",
                part
            )));
        }
    }
    Ok(())
}

/// All printable ASCII except the reserved symbols.
fn is_name_character(c: char) -> bool {
    c > '\x20' && c < '\x7F' && !RESERVED.contains(&c)
}

/// One compiled pattern element.
#[derive(Debug, Clone)]
enum PatternToken {
    Literal(String),
    AnyChar,
    AnyRun,
    Class { negated: bool, chars: String },
    Alternates(Vec<String>),
}

/// A compiled pattern for a single address element, matched against
/// literal element names.
#[derive(Debug, Clone)]
pub struct SegmentPattern {
    tokens: Vec<PatternToken>,
}

impl SegmentPattern {
    /// Compile one pattern element. Fails on stray brackets, empty
    /// classes, or reserved characters used literally.
    pub fn new(pattern: &str) -> Result<SegmentPattern> {
        match all_consuming(many1(pattern_token))(pattern) {
            Ok((_, tokens)) => Ok(SegmentPattern { tokens }),
            Err(_) => Err(OscError::BadAddressPattern(format!(
                "cannot compile {:?}",
                pattern
            ))),
        }
    }

    /// Whether the pattern matches the whole of `name`.
    pub fn matches(&self, name: &str) -> bool {
        match_tokens(&self.tokens, name.as_bytes())
    }

    /// Whether the pattern is a plain literal, and if so which.
    pub(crate) fn as_literal(&self) -> Option<&str> {
        match self.tokens.as_slice() {
            [PatternToken::Literal(lit)] => Some(lit),
            _ => None,
        }
    }
}

/// Match `pattern` against a whole element name.
pub fn match_segment(pattern: &str, name: &str) -> Result<bool> {
    Ok(SegmentPattern::new(pattern)?.matches(name))
}

fn match_tokens(tokens: &[PatternToken], name: &[u8]) -> bool {
    let (token, rest) = match tokens.split_first() {
        Some(split) => split,
        None => return name.is_empty(),
    };
    match token {
        PatternToken::Literal(lit) => {
            name.starts_with(lit.as_bytes()) && match_tokens(rest, &name[lit.len()..])
        }
        PatternToken::AnyChar => !name.is_empty() && match_tokens(rest, &name[1..]),
        PatternToken::AnyRun => {
            // Greedy: try the longest swallow first, then back off.
            (0..=name.len())
                .rev()
                .any(|taken| match_tokens(rest, &name[taken..]))
        }
        PatternToken::Class { negated, chars } => {
            if name.is_empty() {
                return false;
            }
            let hit = chars.contains(name[0] as char);
            hit != *negated && match_tokens(rest, &name[1..])
        }
        PatternToken::Alternates(alternates) => alternates.iter().any(|alternate| {
            name.starts_with(alternate.as_bytes()) && match_tokens(rest, &name[alternate.len()..])
        }),
    }
}

fn pattern_token(input: &str) -> IResult<&str, PatternToken> {
    alt((
        take_while1(is_name_character)
            .map(|s: &str| PatternToken::Literal(s.to_string())),
        char('?').map(|_| PatternToken::AnyChar),
        char('*').map(|_| PatternToken::AnyRun),
        pattern_class,
        pattern_alternates,
    ))(input)
}

/// Parse `{foo,bar}` into its literal alternatives.
fn pattern_alternates(input: &str) -> IResult<&str, PatternToken> {
    delimited(
        char('{'),
        separated_list1(tag(","), take_while1(is_name_character)),
        char('}'),
    )
    .map(|alternates: Vec<&str>| {
        PatternToken::Alternates(alternates.iter().map(|s| s.to_string()).collect())
    })
    .parse(input)
}

/// Parse `[a-z0!]` or `[!…]` into an expanded character set.
fn pattern_class(input: &str) -> IResult<&str, PatternToken> {
    let body = pair(
        // A leading '!' negates; it must be followed by a non-empty set.
        opt(char('!')),
        many1(alt((
            // A range like a-z expands to every character in between.
            separated_pair(
                satisfy(is_name_character),
                char('-'),
                satisfy(is_name_character),
            )
            .map(|(first, second)| expand_range(first, second)),
            // '!' past the first position carries no meaning.
            char('!').map(|_| String::new()),
            satisfy(is_name_character).map(|c| c.to_string()),
            // A trailing dash is literal.
            char('-').map(|_| "-".to_string()),
        ))),
    );

    delimited(char('['), body, char(']'))
        .map(|(negation, pieces)| {
            let mut chars = String::new();
            for piece in pieces.concat().chars() {
                if !chars.contains(piece) {
                    chars.push(piece);
                }
            }
            PatternToken::Class {
                negated: negation.is_some(),
                chars,
            }
        })
        .parse(input)
}

/// Expand `a-d` to `abcd`; reversed bounds are accepted, characters that
/// are not legal in names are skipped.
fn expand_range(first: char, second: char) -> String {
    let (lo, hi) = if first <= second {
        (first as u8, second as u8)
    } else {
        (second as u8, first as u8)
    };
    (lo..=hi)
        .map(|b| b as char)
        .filter(|c| is_name_character(*c))
        .collect()
}

/// A compiled full address pattern, one [`SegmentPattern`] per element.
///
/// Compile once and reuse: construction parses the pattern, matching is
/// allocation-free.
///
/// # Examples
///
/// ```
/// use osckit::address::Matcher;
///
/// let matcher = Matcher::new("/oscillator/[0-9]/{frequency,phase}").unwrap();
/// assert!(matcher.match_address("/oscillator/1/frequency").unwrap());
/// assert!(matcher.match_address("/oscillator/8/phase").unwrap());
/// assert!(!matcher.match_address("/oscillator/4/detune").unwrap());
/// ```
#[derive(Debug, Clone)]
pub struct Matcher {
    pub pattern: String,
    segments: Vec<SegmentPattern>,
}

impl Matcher {
    /// Compile an address pattern. The pattern must start with `/` and
    /// contain at least one element.
    pub fn new(pattern: &str) -> Result<Matcher> {
        let segments = split_address(pattern)
            .map_err(|_| OscError::BadAddressPattern("bad address pattern".to_string()))?
            .iter()
            .map(|part| SegmentPattern::new(part))
            .collect::<Result<Vec<_>>>()
            .map_err(|_| OscError::BadAddressPattern("bad address pattern".to_string()))?;
        Ok(Matcher {
            pattern: pattern.to_string(),
            segments,
        })
    }

    /// Match a literal OSC address against this pattern. Fails if
    /// `address` is not a valid plain address.
    pub fn match_address(&self, address: &str) -> Result<bool> {
        verify_address(address).map_err(|_| OscError::BadAddress("bad address".to_string()))?;
        let parts = split_address(address)?;
        if parts.len() != self.segments.len() {
            return Ok(false);
        }
        Ok(self
            .segments
            .iter()
            .zip(parts)
            .all(|(segment, part)| segment.matches(part)))
    }
}
