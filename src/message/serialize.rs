//! Message serialization to wire format.

use std::fmt;

use super::tags::format_tags;
use super::types::Message;

impl Message {
    /// Whether parameter `param` must be sent as a `:`-prefixed trailing.
    fn needs_colon(param: &str) -> bool {
        param.is_empty() || param.starts_with(':') || param.contains(' ')
    }
}

/// Formats the message as a CRLF-terminated wire line.
///
/// The last parameter is emitted with a leading `:` whenever there is more
/// than one parameter, or when it is empty, starts with `:` or contains a
/// space. Middle parameters are emitted verbatim.
impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.tags.is_empty() {
            write!(f, "@{} ", format_tags(&self.tags))?;
        }
        if let Some(prefix) = &self.prefix {
            write!(f, ":{} ", prefix)?;
        }
        f.write_str(&self.command)?;

        if let Some((last, middle)) = self.params.split_last() {
            for param in middle {
                write!(f, " {}", param)?;
            }
            if self.params.len() > 1 || Self::needs_colon(last) {
                write!(f, " :{}", last)?;
            } else {
                write!(f, " {}", last)?;
            }
        }
        f.write_str("\r\n")
    }
}
