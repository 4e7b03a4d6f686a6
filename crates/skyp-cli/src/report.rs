use chrono::{DateTime, Utc};
use serde::Serialize;
use skyp_core::plural;
use skyp_merge::{ChatDiffEntry, ContactsDiff, Direction, ScanChunk};

pub fn format_datetime(datetime: Option<DateTime<Utc>>) -> String {
    datetime
        .map(|datetime| datetime.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Plain-text counterpart of `ChatDiffEntry::html`.
pub fn entry_line(entry: &ChatDiffEntry) -> String {
    let detail = if entry.is_new_chat() {
        format!("new chat, {}", plural("message", entry.messages.len()))
    } else {
        let mut parts = Vec::new();
        if !entry.messages.is_empty() {
            parts.push(plural("new message", entry.messages.len()));
        }
        if !entry.participants.is_empty() {
            parts.push(plural("new participant", entry.participants.len()));
        }
        parts.join(", ")
    };
    format!("{} [{}]: {detail}", entry.title_long, entry.identity)
}

#[derive(Debug, Serialize)]
pub struct EntrySummary<'a> {
    pub direction: Direction,
    pub identity: &'a str,
    pub title: &'a str,
    pub new_chat: bool,
    pub messages: usize,
    pub participants: usize,
}

impl<'a> EntrySummary<'a> {
    pub fn new(direction: Direction, entry: &'a ChatDiffEntry) -> Self {
        Self {
            direction,
            identity: &entry.identity,
            title: &entry.title_long,
            new_chat: entry.is_new_chat(),
            messages: entry.messages.len(),
            participants: entry.participants.len(),
        }
    }
}

/// Turns accumulated scan chunks into output lines, each entry once.
pub struct ChunkPrinter {
    labels: [String; 2],
    printed: [usize; 2],
    json: bool,
}

impl ChunkPrinter {
    pub fn new(labels: [String; 2], json: bool) -> Self {
        Self {
            labels,
            printed: [0, 0],
            json,
        }
    }

    pub fn lines(&mut self, chunk: &ScanChunk) -> Vec<String> {
        let mut lines = Vec::new();
        for direction in [Direction::LeftToRight, Direction::RightToLeft] {
            let side = direction.index();
            let fresh = chunk.chats[side].iter().skip(self.printed[side]);
            for entry in fresh {
                lines.push(if self.json {
                    serde_json::to_string(&EntrySummary::new(direction, entry))
                        .unwrap_or_default()
                } else {
                    format!("{} has more: {}", self.labels[side], entry_line(entry))
                });
            }
            self.printed[side] = chunk.chats[side].len();
        }
        lines
    }

    pub fn total(&self) -> usize {
        self.printed.iter().sum()
    }
}

pub fn contact_lines(labels: &[String; 2], diff: &ContactsDiff) -> Vec<String> {
    (0..2)
        .flat_map(|side| side_contact_lines(&labels[side], diff, side))
        .collect()
}

/// Contacts and groups only one side has, for that side.
pub fn side_contact_lines(label: &str, diff: &ContactsDiff, side: usize) -> Vec<String> {
    let contacts = diff.contacts[side]
        .iter()
        .map(|contact| format!("{label} has contact {} [{}]", contact.name, contact.identity));
    let groups = diff.groups[side].iter().map(|group| {
        format!(
            "{label} has contact group {}",
            group.name.as_deref().unwrap_or("")
        )
    });
    contacts.chain(groups).collect()
}
