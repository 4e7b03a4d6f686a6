#![allow(dead_code)]

use skyp_core::{Account, Row, SkypConfig, TracingSink, MESSAGE_TYPE_MESSAGE};
use skyp_storage::SkypeDatabase;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub fn full_name(identity: &str) -> Option<&'static str> {
    match identity {
        "me" => Some("Me Myself"),
        "other" => Some("Other Owner"),
        "alice" => Some("Alice Liddell"),
        "bob" => Some("Bob Builder"),
        "carol" => Some("Carol Singer"),
        "dave" => Some("Dave Grohl"),
        _ => None,
    }
}

pub struct ChatFixture {
    pub identity: String,
    pub id: i64,
    pub participants: Vec<String>,
    pub messages: Vec<Row>,
}

impl ChatFixture {
    pub fn new(identity: &str, id: i64) -> Self {
        Self {
            identity: identity.to_string(),
            id,
            participants: Vec::new(),
            messages: Vec::new(),
        }
    }

    pub fn with_participants(mut self, identities: &[&str]) -> Self {
        self.participants = identities.iter().map(|identity| identity.to_string()).collect();
        self
    }

    pub fn with_messages(mut self, messages: &[(&str, i64, &str)]) -> Self {
        for (author, timestamp, body) in messages {
            self.messages.push(text_message(author, *timestamp, body));
        }
        self
    }

    pub fn with_message_row(mut self, row: Row) -> Self {
        self.messages.push(row);
        self
    }
}

pub fn text_message(author: &str, timestamp: i64, body: &str) -> Row {
    Row::new()
        .with("author", author)
        .with("from_dispname", full_name(author))
        .with("timestamp", timestamp)
        .with("type", MESSAGE_TYPE_MESSAGE)
        .with("chatmsg_type", 3_i64)
        .with("body_xml", body)
}

pub fn contact_row(identity: &str) -> Row {
    Row::new()
        .with("skypename", identity)
        .with("fullname", full_name(identity))
        .with("is_permanent", 1_i64)
}

/// Builds a database owned by `owner` through the public write API, then
/// reopens it.
pub fn build(dir: &Path, file: &str, owner: &str, chats: &[ChatFixture]) -> SkypeDatabase {
    let path = dir.join(file);
    let mut db = SkypeDatabase::create(&path, SkypConfig::default(), Arc::new(TracingSink))
        .expect("create db");
    db.insert_account(&Account::from_row(
        Row::new()
            .with("skypename", owner)
            .with("fullname", full_name(owner)),
    ))
    .expect("insert account");

    let mut identities = BTreeSet::new();
    for chat in chats {
        identities.insert(chat.identity.clone());
        identities.extend(chat.participants.iter().cloned());
    }
    for identity in identities.iter().filter(|identity| identity.as_str() != owner) {
        if full_name(identity).is_some() {
            db.insert_row("contacts", &contact_row(identity))
                .expect("insert contact");
        }
    }

    for chat in chats {
        let stamps = chat.messages.iter().filter_map(|row| row.i64("timestamp"));
        let first = stamps.clone().min();
        let last = stamps.max();
        let chatname = format!("#{owner}/${};{}", chat.identity, chat.id);
        db.insert_row(
            "conversations",
            &Row::new()
                .with("id", chat.id)
                .with("identity", chat.identity.as_str())
                .with("type", 1_i64)
                .with(
                    "displayname",
                    full_name(&chat.identity).unwrap_or(chat.identity.as_str()),
                )
                .with("creation_timestamp", first)
                .with("last_activity_timestamp", last),
        )
        .expect("insert conversation");
        db.insert_row(
            "chats",
            &Row::new()
                .with("name", chatname.as_str())
                .with("conv_dbid", chat.id),
        )
        .expect("insert chats row");
        for identity in &chat.participants {
            db.insert_row(
                "participants",
                &Row::new()
                    .with("convo_id", chat.id)
                    .with("identity", identity.as_str()),
            )
            .expect("insert participant");
        }
        for (index, message) in chat.messages.iter().enumerate() {
            let mut row = message.clone();
            row.set("convo_id", chat.id);
            row.set("chatname", chatname.as_str());
            if !row.contains("guid") {
                row.set("guid", format!("{}-{index}", chat.identity));
            }
            db.insert_row("messages", &row).expect("insert message");
        }
    }
    drop(db);
    reopen(&path)
}

pub fn reopen(path: &Path) -> SkypeDatabase {
    SkypeDatabase::open(path).expect("open db")
}

pub fn path_of(db: &SkypeDatabase) -> PathBuf {
    db.filename().to_path_buf()
}
