//! IRCv3 extension helpers.

pub mod batch;
pub mod server_time;

pub use self::batch::{Batch, BatchTracker};
pub use self::server_time::{
    format_datetime, format_server_time, format_timestamp, parse_server_time,
};
