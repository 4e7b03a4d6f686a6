//! Canonical CREATE TABLE statements for Skype tables.
//!
//! Each statement carries the superset of columns seen across client
//! versions, so rows copied from any version insert without migration.

pub const TABLES: [&str; 27] = [
    "accounts",
    "alerts",
    "appschemaversion",
    "callhandlers",
    "callmembers",
    "calls",
    "chatmembers",
    "chats",
    "contactgroups",
    "contacts",
    "contentsharings",
    "conversations",
    "conversationviews",
    "datachannels",
    "dbmeta",
    "legacymessages",
    "lightweightmeetings",
    "mediadocuments",
    "messageannotations",
    "messages",
    "participants",
    "smses",
    "transfers",
    "translators",
    "videomessages",
    "videos",
    "voicemails",
];

/// CREATE TABLE statement for a table name, matched case-insensitively.
pub fn create_statement(table: &str) -> Option<&'static str> {
    let sql = match table.to_lowercase().as_str() {
        "accounts" => include_str!("../schema/accounts.sql"),
        "alerts" => include_str!("../schema/alerts.sql"),
        "appschemaversion" => include_str!("../schema/appschemaversion.sql"),
        "callhandlers" => include_str!("../schema/callhandlers.sql"),
        "callmembers" => include_str!("../schema/callmembers.sql"),
        "calls" => include_str!("../schema/calls.sql"),
        "chatmembers" => include_str!("../schema/chatmembers.sql"),
        "chats" => include_str!("../schema/chats.sql"),
        "contactgroups" => include_str!("../schema/contactgroups.sql"),
        "contacts" => include_str!("../schema/contacts.sql"),
        "contentsharings" => include_str!("../schema/contentsharings.sql"),
        "conversations" => include_str!("../schema/conversations.sql"),
        "conversationviews" => include_str!("../schema/conversationviews.sql"),
        "datachannels" => include_str!("../schema/datachannels.sql"),
        "dbmeta" => include_str!("../schema/dbmeta.sql"),
        "legacymessages" => include_str!("../schema/legacymessages.sql"),
        "lightweightmeetings" => include_str!("../schema/lightweightmeetings.sql"),
        "mediadocuments" => include_str!("../schema/mediadocuments.sql"),
        "messageannotations" => include_str!("../schema/messageannotations.sql"),
        "messages" => include_str!("../schema/messages.sql"),
        "participants" => include_str!("../schema/participants.sql"),
        "smses" => include_str!("../schema/smses.sql"),
        "transfers" => include_str!("../schema/transfers.sql"),
        "translators" => include_str!("../schema/translators.sql"),
        "videomessages" => include_str!("../schema/videomessages.sql"),
        "videos" => include_str!("../schema/videos.sql"),
        "voicemails" => include_str!("../schema/voicemails.sql"),
        _ => return None,
    };
    Some(sql)
}

pub fn is_known(table: &str) -> bool {
    create_statement(table).is_some()
}
