//! Message parsing implementation.
//!
//! This module implements `FromStr` for `Message` using the nom-based parser.

use std::collections::HashMap;
use std::str::FromStr;

use crate::error::{MessageParseError, ProtocolError};
use crate::prefix::Prefix;

use super::nom_parser::ParsedMessage;
use super::tags::parse_tags;
use super::types::Message;

impl FromStr for Message {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Message, Self::Err> {
        let line = s.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Err(ProtocolError::invalid(s, MessageParseError::EmptyMessage));
        }

        let parsed =
            ParsedMessage::parse(line).map_err(|e| ProtocolError::invalid(s, e.cause()))?;

        let tags = parsed.tags.map(parse_tags).unwrap_or_else(HashMap::new);
        let prefix = match parsed.prefix {
            Some(raw) => Some(
                raw.parse::<Prefix>()
                    .map_err(|e| ProtocolError::invalid(s, e))?,
            ),
            None => None,
        };

        Ok(Message {
            tags,
            prefix,
            command: parsed.command.to_owned(),
            params: parsed.params.into_iter().map(str::to_owned).collect(),
        })
    }
}
