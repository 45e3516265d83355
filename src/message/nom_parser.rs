//! Nom-based IRC line parser.
//!
//! This module splits a raw line into borrowed components; building the
//! owned [`Message`](super::Message) happens in `parse.rs`.

use nom::{
    bytes::complete::{take_till, take_till1, take_while1},
    character::complete::{char, space0},
    combinator::{cut, opt},
    error::{context, ErrorKind, VerboseError, VerboseErrorKind},
    sequence::{preceded, terminated},
    IResult,
};

use crate::error::MessageParseError;

type ParseResult<I, O> = IResult<I, O, VerboseError<I>>;

const CTX_TAGS: &str = "parsing message tags";
const CTX_PREFIX: &str = "parsing message prefix";
const CTX_COMMAND: &str = "parsing command";
const CTX_END: &str = "expecting end of line";

/// Parse IRCv3 message tags: `@` up to the next space, which is required.
fn parse_tags(input: &str) -> ParseResult<&str, &str> {
    context(
        CTX_TAGS,
        preceded(
            char('@'),
            cut(terminated(take_till(|c: char| c == ' '), char(' '))),
        ),
    )(input)
}

/// Parse the message prefix: `:` up to the next space, which is required.
fn parse_prefix(input: &str) -> ParseResult<&str, &str> {
    context(
        CTX_PREFIX,
        preceded(
            char(':'),
            cut(terminated(take_till1(|c: char| c == ' '), char(' '))),
        ),
    )(input)
}

/// Parse the command token (alphabetic or numeric).
fn parse_command(input: &str) -> ParseResult<&str, &str> {
    context(CTX_COMMAND, take_while1(|c: char| c.is_ascii_alphanumeric()))(input)
}

/// Parse a complete IRC line into its components.
///
/// ```text
/// [@tags SP] [:prefix SP] <command> [SP param]* [SP :trailing]
/// ```
pub fn parse_message(input: &str) -> ParseResult<&str, ParsedMessage<'_>> {
    let (input, tags) = opt(parse_tags)(input)?;
    let (input, _) = space0(input)?;

    let (input, prefix) = opt(parse_prefix)(input)?;
    let (input, _) = space0(input)?;

    let (input, command) = parse_command(input)?;

    let mut params: Vec<&str> = Vec::new();
    let mut rest = input;

    while let Some(b' ') = rest.as_bytes().first().copied() {
        rest = &rest[1..];

        if let Some(b':') = rest.as_bytes().first().copied() {
            // Trailing parameter: verbatim to end of line
            let after_colon = &rest[1..];
            let end = after_colon
                .find(['\r', '\n'])
                .unwrap_or(after_colon.len());
            params.push(&after_colon[..end]);
            rest = &after_colon[end..];
            break;
        }

        let end = rest.find([' ', '\r', '\n']).unwrap_or(rest.len());
        let param = &rest[..end];
        if param.is_empty() {
            continue;
        }
        params.push(param);
        rest = &rest[end..];
    }

    Ok((
        rest,
        ParsedMessage {
            tags,
            prefix,
            command,
            params,
        },
    ))
}

/// A parsed IRC line with borrowed string slices.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMessage<'a> {
    /// Raw tags string (without the leading `@`), if present.
    pub tags: Option<&'a str>,
    /// Raw prefix string (without the leading `:`), if present.
    pub prefix: Option<&'a str>,
    /// The command name.
    pub command: &'a str,
    /// Command parameters, including trailing.
    pub params: Vec<&'a str>,
}

impl<'a> ParsedMessage<'a> {
    /// Parse an IRC line into a `ParsedMessage`.
    pub fn parse(input: &'a str) -> Result<Self, DetailedParseError> {
        match parse_message(input) {
            Ok((remaining, msg)) if remaining.trim_end_matches(['\r', '\n']).is_empty() => {
                Ok(msg)
            }
            Ok((remaining, _)) => Err(DetailedParseError {
                input: input.to_string(),
                position: input.len() - remaining.len(),
                context: Some(CTX_END),
                kind: ErrorKind::Eof,
            }),
            Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
                let mut context_info = None;
                let mut position = input.len();
                let mut kind = ErrorKind::Tag;

                for (error_input, error_kind) in &e.errors {
                    match error_kind {
                        VerboseErrorKind::Context(ctx) => {
                            // Outermost context wins; it names the component
                            context_info = Some(*ctx);
                        }
                        VerboseErrorKind::Nom(ek) => {
                            position = input.len() - error_input.len();
                            kind = *ek;
                        }
                        VerboseErrorKind::Char(_) => {
                            position = input.len() - error_input.len();
                            kind = ErrorKind::Char;
                        }
                    }
                }

                Err(DetailedParseError {
                    input: input.to_string(),
                    position,
                    context: context_info,
                    kind,
                })
            }
            Err(nom::Err::Incomplete(_)) => Err(DetailedParseError {
                input: input.to_string(),
                position: input.len(),
                context: Some("incomplete input"),
                kind: ErrorKind::Eof,
            }),
        }
    }
}

/// Detailed parse error with position and context information.
#[derive(Debug, Clone)]
pub struct DetailedParseError {
    /// The original input string that failed to parse.
    pub input: String,
    /// Character position where parsing failed.
    pub position: usize,
    /// Context about what was being parsed when the error occurred.
    pub context: Option<&'static str>,
    /// The nom error kind.
    pub kind: ErrorKind,
}

impl DetailedParseError {
    /// Classify this failure as a [`MessageParseError`].
    pub fn cause(&self) -> MessageParseError {
        match self.context {
            Some(CTX_TAGS) => MessageParseError::MissingSeparator("tags"),
            Some(CTX_PREFIX) => MessageParseError::MissingSeparator("prefix"),
            Some(CTX_COMMAND) => MessageParseError::InvalidCommand,
            Some(CTX_END) => MessageParseError::UnexpectedData(self.position),
            Some(ctx) => MessageParseError::ParseContext {
                position: self.position,
                context: ctx.to_owned(),
            },
            None => MessageParseError::ParseContext {
                position: self.position,
                context: format!("{:?}", self.kind),
            },
        }
    }
}

impl std::fmt::Display for DetailedParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Parse error at position {}", self.position)?;
        if let Some(ctx) = self.context {
            write!(f, " while {}", ctx)?;
        }
        write!(f, ": {:?}", self.kind)
    }
}

impl std::error::Error for DetailedParseError {}
