//! Comparison of chats, messages, participants and contacts between two
//! databases.
//!
//! Chats, contacts and groups are matched by natural key (identity or
//! name); messages by author, timestamp and body, with each side's own
//! account identity treated as the same author.

use crate::MergeError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use skyp_core::{plural, Chat, Contact, ContactGroup, Message, Participant};
use skyp_storage::SkypeDatabase;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use tracing::{debug, info};

/// Which way data flows: index 0 holds what left has and right lacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Direction {
    LeftToRight,
    RightToLeft,
}

impl Direction {
    pub fn index(self) -> usize {
        match self {
            Direction::LeftToRight => 0,
            Direction::RightToLeft => 1,
        }
    }

    pub fn reversed(self) -> Self {
        match self {
            Direction::LeftToRight => Direction::RightToLeft,
            Direction::RightToLeft => Direction::LeftToRight,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiffStatus {
    Identical,
    Different,
}

impl fmt::Display for DiffStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiffStatus::Identical => f.write_str("IDENTICAL"),
            DiffStatus::Different => f.write_str("DIFFERENT"),
        }
    }
}

/// One chat identity as seen from both databases.
#[derive(Debug, Clone, Serialize)]
pub struct ComparedChat {
    pub identity: String,
    pub title: String,
    pub title_long: String,
    pub c1: Option<Chat>,
    pub c2: Option<Chat>,
    pub messages1: i64,
    pub messages2: i64,
    pub last_message_datetime1: Option<DateTime<Utc>>,
    pub last_message_datetime2: Option<DateTime<Utc>>,
    pub diff_status: DiffStatus,
}

impl ComparedChat {
    fn new(identity: String, c1: Option<Chat>, c2: Option<Chat>) -> Self {
        let shown = c1.as_ref().or(c2.as_ref());
        let title = shown.map(|chat| chat.title.clone()).unwrap_or_default();
        let title_long = shown.map(|chat| chat.title_long.clone()).unwrap_or_default();
        let messages1 = c1.as_ref().map_or(0, Chat::message_count);
        let messages2 = c2.as_ref().map_or(0, Chat::message_count);
        let last_message_datetime1 = c1.as_ref().and_then(Chat::last_message_datetime);
        let last_message_datetime2 = c2.as_ref().and_then(Chat::last_message_datetime);
        let diff_status = if c1.is_some()
            && c2.is_some()
            && messages1 == messages2
            && last_message_datetime1 == last_message_datetime2
        {
            DiffStatus::Identical
        } else {
            DiffStatus::Different
        };
        Self {
            identity,
            title,
            title_long,
            c1,
            c2,
            messages1,
            messages2,
            last_message_datetime1,
            last_message_datetime2,
            diff_status,
        }
    }

    pub fn chat(&self, side: usize) -> Option<&Chat> {
        match side {
            0 => self.c1.as_ref(),
            _ => self.c2.as_ref(),
        }
    }
}

/// Pairs up chats of both databases by identity, ordered by title.
///
/// Chats present on both sides with equal message counts and equal last
/// message time are taken as identical without looking at messages.
pub fn compare_chats(
    db1: &SkypeDatabase,
    db2: &SkypeDatabase,
) -> Result<Vec<ComparedChat>, MergeError> {
    let chats1 = db1.get_conversations_with_stats()?;
    let chats2 = db2.get_conversations_with_stats()?;
    let mut pairs: BTreeMap<String, (Option<Chat>, Option<Chat>)> = BTreeMap::new();
    for chat in chats1.iter() {
        pairs.entry(chat.identity.clone()).or_default().0 = Some(chat.clone());
    }
    for chat in chats2.iter() {
        pairs.entry(chat.identity.clone()).or_default().1 = Some(chat.clone());
    }
    let mut compared: Vec<ComparedChat> = pairs
        .into_iter()
        .map(|(identity, (c1, c2))| ComparedChat::new(identity, c1, c2))
        .collect();
    compared.sort_by_cached_key(|chat| chat.title.to_lowercase());
    debug!(
        event = "chats_compared",
        chats = compared.len(),
        identical = compared
            .iter()
            .filter(|chat| chat.diff_status == DiffStatus::Identical)
            .count()
    );
    Ok(compared)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Author {
    Own,
    Other(Option<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct MessageKey {
    author: Author,
    timestamp: i64,
    body: Option<String>,
}

impl MessageKey {
    pub(crate) fn new(own_id: Option<&str>, message: &Message) -> Self {
        Self {
            author: author_key(own_id, message.author.as_deref()),
            timestamp: message.timestamp,
            body: message.body_xml.clone(),
        }
    }
}

fn author_key(own_id: Option<&str>, identity: Option<&str>) -> Author {
    match (own_id, identity) {
        (Some(own), Some(identity)) if own == identity => Author::Own,
        (_, identity) => Author::Other(identity.map(str::to_string)),
    }
}

/// Identity key of a participant; own-account participations compare equal.
pub(crate) fn participant_key(own_id: Option<&str>, identity: &str) -> Option<String> {
    if own_id == Some(identity) {
        None
    } else {
        Some(identity.to_string())
    }
}

/// Messages and participants one side of a chat has and the other lacks.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChatDiff {
    pub messages: [Vec<Message>; 2],
    pub participants: [Vec<Participant>; 2],
}

impl ChatDiff {
    pub fn is_empty(&self) -> bool {
        self.messages.iter().all(Vec::is_empty) && self.participants.iter().all(Vec::is_empty)
    }
}

/// Full message and participant comparison of one chat.
pub fn get_chat_diff(
    db1: &SkypeDatabase,
    db2: &SkypeDatabase,
    c1: Option<&Chat>,
    c2: Option<&Chat>,
) -> Result<ChatDiff, MergeError> {
    let dbs = [db1, db2];
    let chats = [c1, c2];
    let mut messages: [Vec<Message>; 2] = [Vec::new(), Vec::new()];
    for side in 0..2 {
        if let Some(chat) = chats[side] {
            messages[side] = dbs[side].chat_messages(chat)?;
        }
    }

    let mut diff = ChatDiff::default();
    for side in 0..2 {
        let other = 1 - side;
        let own_id = dbs[side].id();
        let other_id = dbs[other].id();
        let present: HashSet<MessageKey> = messages[other]
            .iter()
            .map(|message| MessageKey::new(other_id, message))
            .collect();
        let mut missing: Vec<Message> = messages[side]
            .iter()
            .filter(|message| !present.contains(&MessageKey::new(own_id, message)))
            .cloned()
            .collect();
        missing.sort_by_key(|message| (message.timestamp, message.id));
        diff.messages[side] = missing;

        let known: HashSet<Option<String>> = chats[other]
            .map(|chat| {
                chat.participants
                    .iter()
                    .map(|participant| participant_key(other_id, &participant.identity))
                    .collect()
            })
            .unwrap_or_default();
        diff.participants[side] = chats[side]
            .map(|chat| {
                chat.participants
                    .iter()
                    .filter(|participant| {
                        !known.contains(&participant_key(own_id, &participant.identity))
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
    }
    Ok(diff)
}

/// What one side of a scanned chat can give the other.
#[derive(Debug, Clone, Serialize)]
pub struct ChatDiffEntry {
    pub identity: String,
    pub title_long: String,
    /// The chat in the database holding the extra data.
    pub chat: Chat,
    /// The chat in the receiving database, if it exists there.
    pub target: Option<Chat>,
    pub messages: Vec<Message>,
    pub participants: Vec<Participant>,
}

impl ChatDiffEntry {
    pub fn is_new_chat(&self) -> bool {
        self.target.is_none()
    }

    /// One-line HTML summary, linking to the chat identity.
    pub fn html(&self) -> String {
        let link = format!(
            "<a href=\"{}\">{}</a>",
            escape_html(&self.identity),
            escape_html(&self.title_long)
        );
        let detail = if self.is_new_chat() {
            format!("new chat, {}", plural("message", self.messages.len()))
        } else {
            let mut parts = Vec::new();
            if !self.messages.is_empty() {
                parts.push(plural("new message", self.messages.len()));
            }
            if !self.participants.is_empty() {
                parts.push(plural("new participant", self.participants.len()));
            }
            parts.join(", ")
        };
        format!("{link} - {detail}.<br />")
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Partial result posted while a scan runs.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanChunk {
    /// HTML lines for chats found since the previous chunk, per side.
    pub htmls: [String; 2],
    /// All differing chats found so far, per side.
    pub chats: [Vec<ChatDiffEntry>; 2],
    /// How many compared chats have been processed.
    pub index: usize,
    pub done: bool,
}

/// Differing chats of a finished scan, per side.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanResult {
    pub chats: [Vec<ChatDiffEntry>; 2],
}

impl ScanResult {
    /// Left and right exchanged.
    pub fn swapped(&self) -> Self {
        let [left, right] = self.chats.clone();
        Self {
            chats: [right, left],
        }
    }

    pub fn entries(&self, direction: Direction) -> &[ChatDiffEntry] {
        &self.chats[direction.index()]
    }

    pub fn find(&self, direction: Direction, identity: &str) -> Option<&ChatDiffEntry> {
        self.chats[direction.index()]
            .iter()
            .find(|entry| entry.identity == identity)
    }

    /// Drops a chat from the outstanding list; true if it was there.
    pub fn remove(&mut self, direction: Direction, identity: &str) -> bool {
        let entries = &mut self.chats[direction.index()];
        let before = entries.len();
        entries.retain(|entry| entry.identity != identity);
        entries.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.chats.iter().all(Vec::is_empty)
    }
}

impl From<ScanChunk> for ScanResult {
    fn from(chunk: ScanChunk) -> Self {
        Self {
            chats: chunk.chats,
        }
    }
}

/// Deep-diffs every chat not classified identical.
///
/// `on_chunk` receives accumulated results every time either side gathers
/// `chunk_size` new differing chats, and once more at the end. `stopped` is
/// polled before each chat; a stopped scan ends with
/// [`MergeError::WorkerStopped`].
pub fn scan_chats(
    db1: &SkypeDatabase,
    db2: &SkypeDatabase,
    compared: &[ComparedChat],
    chunk_size: usize,
    stopped: impl Fn() -> bool,
    mut on_chunk: impl FnMut(ScanChunk),
) -> Result<ScanResult, MergeError> {
    let chunk_size = chunk_size.max(1);
    let mut chats: [Vec<ChatDiffEntry>; 2] = [Vec::new(), Vec::new()];
    let mut htmls = [String::new(), String::new()];
    let mut pending = [0_usize; 2];

    for (index, pair) in compared.iter().enumerate() {
        if stopped() {
            debug!(event = "scan_stopped", index);
            return Err(MergeError::WorkerStopped);
        }
        if pair.diff_status == DiffStatus::Identical {
            continue;
        }
        let diff = get_chat_diff(db1, db2, pair.c1.as_ref(), pair.c2.as_ref())?;
        let ChatDiff {
            messages,
            participants,
        } = diff;
        for (side, (messages, participants)) in messages.into_iter().zip(participants).enumerate()
        {
            let Some(chat) = pair.chat(side) else {
                continue;
            };
            if messages.is_empty() && participants.is_empty() && pair.chat(1 - side).is_some() {
                continue;
            }
            let entry = ChatDiffEntry {
                identity: pair.identity.clone(),
                title_long: pair.title_long.clone(),
                chat: chat.clone(),
                target: pair.chat(1 - side).cloned(),
                messages,
                participants,
            };
            htmls[side].push_str(&entry.html());
            htmls[side].push('\n');
            chats[side].push(entry);
            pending[side] += 1;
        }
        if pending.iter().any(|count| *count >= chunk_size) {
            on_chunk(ScanChunk {
                htmls: std::mem::take(&mut htmls),
                chats: chats.clone(),
                index: index + 1,
                done: false,
            });
            pending = [0, 0];
        }
    }

    on_chunk(ScanChunk {
        htmls,
        chats: chats.clone(),
        index: compared.len(),
        done: true,
    });
    info!(
        event = "scan_finished",
        left = chats[0].len(),
        right = chats[1].len()
    );
    Ok(ScanResult { chats })
}

/// Contacts and groups one side has and the other lacks.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContactsDiff {
    pub contacts: [Vec<Contact>; 2],
    pub groups: [Vec<ContactGroup>; 2],
}

impl ContactsDiff {
    pub fn swapped(&self) -> Self {
        let [left, right] = self.contacts.clone();
        let [groups_left, groups_right] = self.groups.clone();
        Self {
            contacts: [right, left],
            groups: [groups_right, groups_left],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.iter().all(Vec::is_empty) && self.groups.iter().all(Vec::is_empty)
    }
}

/// Contacts by identity, groups by name; a group present on both sides
/// with different members is listed on both.
pub fn compare_contacts(
    db1: &SkypeDatabase,
    db2: &SkypeDatabase,
) -> Result<ContactsDiff, MergeError> {
    let contacts = [db1.get_contacts()?, db2.get_contacts()?];
    let groups = [db1.get_contactgroups()?, db2.get_contactgroups()?];
    let mut diff = ContactsDiff::default();
    for side in 0..2 {
        let other = 1 - side;
        let known: HashSet<&str> = contacts[other]
            .iter()
            .map(|contact| contact.identity.as_str())
            .collect();
        diff.contacts[side] = contacts[side]
            .iter()
            .filter(|contact| !known.contains(contact.identity.as_str()))
            .cloned()
            .collect();

        let other_groups: HashMap<&str, Option<&str>> = groups[other]
            .iter()
            .filter_map(|group| Some((group.name.as_deref()?, group.members.as_deref())))
            .collect();
        diff.groups[side] = groups[side]
            .iter()
            .filter(|group| match group.name.as_deref() {
                Some(name) => other_groups.get(name) != Some(&group.members.as_deref()),
                None => false,
            })
            .cloned()
            .collect();
    }
    debug!(
        event = "contacts_compared",
        left = diff.contacts[0].len(),
        right = diff.contacts[1].len(),
        groups_left = diff.groups[0].len(),
        groups_right = diff.groups[1].len()
    );
    Ok(diff)
}
