pub mod config;
pub mod filter;
pub mod records;
pub mod row;
pub mod runtime;

use thiserror::Error;

pub use config::SkypConfig;
pub use filter::MessageFilter;
pub use records::{
    Account, Call, Chat, ChatStats, ChatType, Contact, ContactGroup, FileElement, Message,
    Participant, Sms, Transfer, Video,
};
pub use row::{Row, SqlValue};
pub use runtime::{plural, try_until, NoopOsHandler, OsHandler, StatusSink, TracingSink};

/// Message types yielded by message retrieval; anything else is skipped.
pub const MESSAGE_TYPES_SUPPORTED: [i64; 11] = [2, 10, 12, 13, 30, 39, 51, 61, 63, 64, 68];

/// Message types counted in conversation statistics.
pub const MESSAGE_TYPES_STATS: [i64; 10] = [2, 10, 13, 30, 39, 51, 61, 63, 64, 68];

pub const MESSAGE_TYPE_TOPIC: i64 = 2;
pub const MESSAGE_TYPE_GROUP: i64 = 4;
pub const MESSAGE_TYPE_PARTICIPANTS: i64 = 10;
pub const MESSAGE_TYPE_REMOVE: i64 = 12;
pub const MESSAGE_TYPE_LEAVE: i64 = 13;
pub const MESSAGE_TYPE_CALL: i64 = 30;
pub const MESSAGE_TYPE_CALL_END: i64 = 39;
pub const MESSAGE_TYPE_SHARE_DETAIL: i64 = 51;
pub const MESSAGE_TYPE_MESSAGE: i64 = 61;
pub const MESSAGE_TYPE_CONTACTS: i64 = 63;
pub const MESSAGE_TYPE_SMS: i64 = 64;
pub const MESSAGE_TYPE_FILE: i64 = 68;
pub const MESSAGE_TYPE_BIRTHDAY: i64 = 110;

pub const TRANSFER_TYPE_OUTBOUND: i64 = 1;
pub const TRANSFER_TYPE_INBOUND: i64 = 2;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("config encode error: {0}")]
    ConfigEncode(#[from] toml::ser::Error),
    #[error("invalid date range: {from} is after {to}")]
    InvalidDateRange {
        from: chrono::NaiveDate,
        to: chrono::NaiveDate,
    },
}
