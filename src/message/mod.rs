mod membership;
mod nom_parser;
mod parse;
mod serialize;
pub mod tags;
mod types;

pub use self::membership::{parse_membership, STD_MEMBERSHIPS};
pub use self::nom_parser::{DetailedParseError, ParsedMessage};
pub use self::types::Message;
