use crate::schema;
use crate::SkypeDatabase;
use rusqlite::{params, Connection};
use skyp_core::{SkypConfig, TracingSink, MESSAGE_TYPE_MESSAGE};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

const FIXTURE_TABLES: [&str; 11] = [
    "accounts",
    "calls",
    "chats",
    "contactgroups",
    "contacts",
    "conversations",
    "messages",
    "participants",
    "smses",
    "transfers",
    "videos",
];

pub(crate) fn display_name(identity: &str) -> Option<&'static str> {
    match identity {
        "me" => Some("Me Myself"),
        "other" => Some("Other Owner"),
        "alice" => Some("Alice Liddell"),
        "bob" => Some("Bob Builder"),
        "carol" => Some("Carol Singer"),
        _ => None,
    }
}

pub(crate) struct SampleChat {
    identity: String,
    id: i64,
    chat_type: i64,
    participants: Vec<String>,
    messages: Vec<(String, i64, String)>,
}

impl SampleChat {
    pub(crate) fn new(identity: &str, id: i64) -> Self {
        Self {
            identity: identity.to_string(),
            id,
            chat_type: 1,
            participants: Vec::new(),
            messages: Vec::new(),
        }
    }

    pub(crate) fn participants(mut self, identities: &[&str]) -> Self {
        self.participants = identities.iter().map(|identity| identity.to_string()).collect();
        self
    }

    pub(crate) fn messages(mut self, messages: &[(&str, i64, &str)]) -> Self {
        self.messages = messages
            .iter()
            .map(|(author, timestamp, body)| (author.to_string(), *timestamp, body.to_string()))
            .collect();
        self
    }
}

/// Writes a Skype-shaped database owned by `owner` and opens it.
pub(crate) fn sample_database(
    dir: &Path,
    name: &str,
    owner: &str,
    chats: &[SampleChat],
) -> SkypeDatabase {
    let path = dir.join(name);
    let conn = Connection::open(&path).expect("create fixture db");
    for table in FIXTURE_TABLES {
        let sql = schema::create_statement(table).expect("known table");
        conn.execute_batch(sql).expect("create fixture table");
    }
    conn.execute(
        "INSERT INTO accounts (id, skypename, fullname) VALUES (1, ?1, ?2)",
        params![owner, display_name(owner)],
    )
    .expect("insert account");

    let mut contacts = BTreeSet::new();
    for chat in chats {
        contacts.insert(chat.identity.clone());
        contacts.extend(chat.participants.iter().cloned());
    }
    for identity in contacts.iter().filter(|identity| identity.as_str() != owner) {
        if let Some(fullname) = display_name(identity) {
            conn.execute(
                "INSERT INTO contacts (skypename, fullname, is_permanent) VALUES (?1, ?2, 1)",
                params![identity, fullname],
            )
            .expect("insert contact");
        }
    }

    for chat in chats {
        let first = chat.messages.iter().map(|(_, timestamp, _)| *timestamp).min();
        let last = chat.messages.iter().map(|(_, timestamp, _)| *timestamp).max();
        let chatname = format!("#{owner}/${};{}", chat.identity, chat.id);
        conn.execute(
            "INSERT INTO conversations (id, identity, type, displayname, \
             creation_timestamp, last_activity_timestamp) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                chat.id,
                chat.identity,
                chat.chat_type,
                display_name(&chat.identity).unwrap_or(chat.identity.as_str()),
                first,
                last
            ],
        )
        .expect("insert conversation");
        conn.execute(
            "INSERT INTO chats (name, conv_dbid, friendlyname) VALUES (?1, ?2, ?3)",
            params![chatname, chat.id, chat.identity],
        )
        .expect("insert chats row");
        for identity in &chat.participants {
            conn.execute(
                "INSERT INTO participants (convo_id, identity) VALUES (?1, ?2)",
                params![chat.id, identity],
            )
            .expect("insert participant");
        }
        for (index, (author, timestamp, body)) in chat.messages.iter().enumerate() {
            let guid = format!("{}:{index}", chat.identity).into_bytes();
            conn.execute(
                "INSERT INTO messages (convo_id, chatname, author, from_dispname, \
                 timestamp, type, chatmsg_type, body_xml, guid) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 3, ?7, ?8)",
                params![
                    chat.id,
                    chatname,
                    author,
                    display_name(author),
                    timestamp,
                    MESSAGE_TYPE_MESSAGE,
                    body,
                    guid
                ],
            )
            .expect("insert message");
        }
    }
    drop(conn);
    SkypeDatabase::open_with(&path, SkypConfig::default(), Arc::new(TracingSink))
        .expect("open fixture db")
}

impl SkypeDatabase {
    /// Runs SQL behind the handle's back, leaving caches untouched.
    pub(crate) fn execute_raw(&self, sql: &str) {
        self.conn.execute_batch(sql).expect("raw sql");
    }
}
