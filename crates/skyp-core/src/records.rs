use crate::row::Row;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;

/// Skype stores UNIX epoch seconds; zero and NULL both mean "not set".
pub fn timestamp_to_datetime(timestamp: i64) -> Option<DateTime<Utc>> {
    if timestamp == 0 {
        return None;
    }
    DateTime::<Utc>::from_timestamp(timestamp, 0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChatType {
    Single,
    Group,
    Conference,
    Other(i64),
}

impl ChatType {
    pub fn code(&self) -> i64 {
        match self {
            ChatType::Single => 1,
            ChatType::Group => 2,
            ChatType::Conference => 4,
            ChatType::Other(code) => *code,
        }
    }

    pub fn name(&self) -> String {
        match self {
            ChatType::Single => "Single".to_string(),
            ChatType::Group => "Group".to_string(),
            ChatType::Conference => "Conference".to_string(),
            ChatType::Other(code) => format!("Unknown ({code})"),
        }
    }
}

impl From<i64> for ChatType {
    fn from(code: i64) -> Self {
        match code {
            1 => ChatType::Single,
            2 => ChatType::Group,
            4 => ChatType::Conference,
            other => ChatType::Other(other),
        }
    }
}

impl fmt::Display for ChatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// The local account profile row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Account {
    pub id: i64,
    pub skypename: Option<String>,
    pub name: String,
    pub row: Row,
}

impl Account {
    pub fn from_row(row: Row) -> Self {
        let skypename = row.text("skypename").map(str::to_string);
        let name = row
            .text("name")
            .or_else(|| row.text("fullname"))
            .or_else(|| row.text("displayname"))
            .or(skypename.as_deref())
            .unwrap_or_default()
            .to_string();
        Self {
            id: row.i64("id").unwrap_or_default(),
            skypename,
            name,
            row,
        }
    }

    pub fn identity(&self) -> Option<&str> {
        self.skypename.as_deref()
    }

    /// Contact view of the account, used for the owner's own participations.
    pub fn as_contact(&self) -> Contact {
        let identity = self.skypename.clone().unwrap_or_default();
        let mut row = self.row.clone();
        row.set("identity", identity.as_str());
        row.set("name", self.name.as_str());
        Contact {
            id: None,
            identity,
            name: self.name.clone(),
            skypename: self.skypename.clone(),
            pstnnumber: None,
            row,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Contact {
    /// None for placeholders that have no row in Contacts.
    pub id: Option<i64>,
    pub identity: String,
    pub name: String,
    pub skypename: Option<String>,
    pub pstnnumber: Option<String>,
    pub row: Row,
}

impl Contact {
    pub fn from_row(row: Row) -> Self {
        let skypename = row.text("skypename").map(str::to_string);
        let pstnnumber = row.text("pstnnumber").map(str::to_string);
        let identity = row
            .text("identity")
            .map(str::to_string)
            .or_else(|| skypename.clone())
            .or_else(|| pstnnumber.clone())
            .unwrap_or_default();
        let name = row
            .text("name")
            .or_else(|| row.text("fullname"))
            .or_else(|| row.text("displayname"))
            .or(skypename.as_deref())
            .or(pstnnumber.as_deref())
            .unwrap_or_default()
            .to_string();
        Self {
            id: row.i64("id"),
            identity,
            name,
            skypename,
            pstnnumber,
            row,
        }
    }

    /// Stand-in for a participant identity with no Contacts row.
    pub fn placeholder(identity: &str) -> Self {
        let row = Row::new()
            .with("skypename", identity)
            .with("identity", identity)
            .with("name", identity)
            .with("fullname", identity)
            .with("displayname", identity);
        Self {
            id: None,
            identity: identity.to_string(),
            name: identity.to_string(),
            skypename: Some(identity.to_string()),
            pstnnumber: None,
            row,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContactGroup {
    pub id: i64,
    pub name: Option<String>,
    pub members: Option<String>,
    pub row: Row,
}

impl ContactGroup {
    pub fn from_row(row: Row) -> Self {
        Self {
            id: row.i64("id").unwrap_or_default(),
            name: row
                .text("name")
                .or_else(|| row.text("given_displayname"))
                .map(str::to_string),
            members: row.text("members").map(str::to_string),
            row,
        }
    }

    /// Member identities from the space-separated members column.
    pub fn member_identities(&self) -> Vec<&str> {
        self.members
            .as_deref()
            .map(|members| members.split_whitespace().collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Participant {
    pub id: i64,
    pub convo_id: i64,
    pub identity: String,
    pub contact: Contact,
    pub row: Row,
}

impl Participant {
    pub fn from_row(row: Row, contact: Contact) -> Self {
        Self {
            id: row.i64("id").unwrap_or_default(),
            convo_id: row.i64("convo_id").unwrap_or_default(),
            identity: row.text("identity").unwrap_or_default().to_string(),
            contact,
            row,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChatStats {
    pub message_count: i64,
    pub first_message_timestamp: Option<i64>,
    pub last_message_timestamp: Option<i64>,
    pub first_message_datetime: Option<DateTime<Utc>>,
    pub last_message_datetime: Option<DateTime<Utc>>,
}

impl ChatStats {
    pub fn new(message_count: i64, first: Option<i64>, last: Option<i64>) -> Self {
        Self {
            message_count,
            first_message_timestamp: first,
            last_message_timestamp: last,
            first_message_datetime: first.and_then(timestamp_to_datetime),
            last_message_datetime: last.and_then(timestamp_to_datetime),
        }
    }
}

/// A row from Conversations with resolved participants.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chat {
    pub id: i64,
    pub identity: String,
    pub chat_type: ChatType,
    pub title: String,
    pub title_long: String,
    pub creation_timestamp: Option<i64>,
    pub created_datetime: Option<DateTime<Utc>>,
    pub last_activity_timestamp: Option<i64>,
    pub participants: Vec<Participant>,
    /// Filled by conversation statistics; None until collected.
    pub stats: Option<ChatStats>,
    pub row: Row,
}

impl Chat {
    pub fn from_row(row: Row) -> Self {
        let identity = row.text("identity").unwrap_or_default().to_string();
        let chat_type = ChatType::from(row.i64("type").unwrap_or_default());
        let title = row
            .text("title")
            .or_else(|| row.text("displayname"))
            .or_else(|| row.text("meta_topic"))
            .unwrap_or(identity.as_str())
            .to_string();
        let title_long = match chat_type {
            ChatType::Single => format!("Chat with {title}"),
            _ => format!("Group chat \"{title}\""),
        };
        let creation_timestamp = row.i64("creation_timestamp");
        Self {
            id: row.i64("id").unwrap_or_default(),
            identity,
            chat_type,
            title,
            title_long,
            creation_timestamp,
            created_datetime: creation_timestamp.and_then(timestamp_to_datetime),
            last_activity_timestamp: row.i64("last_activity_timestamp"),
            participants: Vec::new(),
            stats: None,
            row,
        }
    }

    pub fn message_count(&self) -> i64 {
        self.stats.as_ref().map_or(0, |stats| stats.message_count)
    }

    pub fn last_message_datetime(&self) -> Option<DateTime<Utc>> {
        self.stats
            .as_ref()
            .and_then(|stats| stats.last_message_datetime)
    }

    pub fn first_message_datetime(&self) -> Option<DateTime<Utc>> {
        self.stats
            .as_ref()
            .and_then(|stats| stats.first_message_datetime)
    }

    /// Lowercase-initial form for use inside sentences.
    pub fn title_long_lc(&self) -> String {
        let mut chars = self.title_long.chars();
        match chars.next() {
            Some(first) => first.to_lowercase().chain(chars).collect(),
            None => String::new(),
        }
    }

    pub fn set_creation_timestamp(&mut self, timestamp: i64) {
        self.creation_timestamp = Some(timestamp);
        self.created_datetime = timestamp_to_datetime(timestamp);
        self.row.set("creation_timestamp", timestamp);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub id: i64,
    pub convo_id: i64,
    pub chatname: Option<String>,
    pub author: Option<String>,
    pub from_dispname: Option<String>,
    pub timestamp: i64,
    pub datetime: Option<DateTime<Utc>>,
    pub msg_type: i64,
    pub chatmsg_type: Option<i64>,
    pub body_xml: Option<String>,
    pub guid: Option<Vec<u8>>,
    pub remote_id: Option<i64>,
    pub row: Row,
}

impl Message {
    pub fn from_row(row: Row) -> Self {
        let timestamp = row.i64("timestamp").unwrap_or_default();
        Self {
            id: row.i64("id").unwrap_or_default(),
            convo_id: row.i64("convo_id").unwrap_or_default(),
            chatname: row.text("chatname").map(str::to_string),
            author: row.text("author").map(str::to_string),
            from_dispname: row.text("from_dispname").map(str::to_string),
            timestamp,
            datetime: timestamp_to_datetime(timestamp),
            msg_type: row.i64("type").unwrap_or_default(),
            chatmsg_type: row.i64("chatmsg_type"),
            body_xml: row.text("body_xml").map(str::to_string),
            guid: row.bytes("guid").map(<[u8]>::to_vec),
            remote_id: row.i64("remote_id"),
            row,
        }
    }

    pub fn author(&self) -> &str {
        self.author.as_deref().unwrap_or_default()
    }

    pub fn body(&self) -> &str {
        self.body_xml.as_deref().unwrap_or_default()
    }

    /// `<file>` elements from a file transfer message body.
    pub fn file_elements(&self) -> Vec<FileElement> {
        parse_file_elements(self.body())
    }
}

/// One `<file size=".." index="..">name</file>` entry of a message body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileElement {
    pub index: i64,
    pub filename: String,
    pub size: Option<i64>,
}

fn file_element_regex() -> &'static Regex {
    static FILE_RGX: OnceLock<Regex> = OnceLock::new();
    FILE_RGX.get_or_init(|| {
        Regex::new(r"(?s)<file\b([^>]*)>(.*?)</file>").expect("valid regex")
    })
}

fn attribute_regex() -> &'static Regex {
    static ATTR_RGX: OnceLock<Regex> = OnceLock::new();
    ATTR_RGX.get_or_init(|| {
        Regex::new(r#"([A-Za-z_:][\w:.-]*)\s*=\s*"([^"]*)""#).expect("valid regex")
    })
}

pub fn parse_file_elements(body: &str) -> Vec<FileElement> {
    let mut files = Vec::new();
    for (position, captures) in file_element_regex().captures_iter(body).enumerate() {
        let attributes = captures.get(1).map_or("", |m| m.as_str());
        let mut index = None;
        let mut size = None;
        for attr in attribute_regex().captures_iter(attributes) {
            match &attr[1] {
                "index" => index = attr[2].trim().parse().ok(),
                "size" => size = attr[2].trim().parse().ok(),
                _ => {}
            }
        }
        let filename = captures.get(2).map_or("", |m| m.as_str());
        files.push(FileElement {
            index: index.unwrap_or(position as i64),
            filename: unescape_xml(filename.trim()),
            size,
        });
    }
    files.sort_by_key(|file| file.index);
    files
}

fn unescape_xml(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transfer {
    pub id: i64,
    pub convo_id: Option<i64>,
    pub chatmsg_guid: Option<Vec<u8>>,
    pub chatmsg_index: Option<i64>,
    pub partner_handle: Option<String>,
    pub filename: Option<String>,
    pub filesize: Option<String>,
    pub row: Row,
}

impl Transfer {
    pub fn from_row(row: Row) -> Self {
        Self {
            id: row.i64("id").unwrap_or_default(),
            convo_id: row.i64("convo_id"),
            chatmsg_guid: row.bytes("chatmsg_guid").map(<[u8]>::to_vec),
            chatmsg_index: row.i64("chatmsg_index"),
            partner_handle: row.text("partner_handle").map(str::to_string),
            filename: row.text("filename").map(str::to_string),
            filesize: row.get("filesize").and_then(|value| {
                if value.is_null() {
                    None
                } else {
                    Some(value.to_string())
                }
            }),
            row,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sms {
    pub id: i64,
    pub chatmsg_id: Option<i64>,
    pub row: Row,
}

impl Sms {
    pub fn from_row(row: Row) -> Self {
        Self {
            id: row.i64("id").unwrap_or_default(),
            chatmsg_id: row.i64("chatmsg_id"),
            row,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Call {
    pub id: i64,
    pub conv_dbid: Option<i64>,
    pub begin_timestamp: Option<i64>,
    pub row: Row,
}

impl Call {
    pub fn from_row(row: Row) -> Self {
        Self {
            id: row.i64("id").unwrap_or_default(),
            conv_dbid: row.i64("conv_dbid"),
            begin_timestamp: row.i64("begin_timestamp"),
            row,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Video {
    pub id: i64,
    pub convo_id: Option<i64>,
    pub row: Row,
}

impl Video {
    pub fn from_row(row: Row) -> Self {
        Self {
            id: row.i64("id").unwrap_or_default(),
            convo_id: row.i64("convo_id"),
            row,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_title_long_depends_on_type() {
        let single = Chat::from_row(
            Row::new()
                .with("id", 1_i64)
                .with("identity", "bob")
                .with("type", 1_i64)
                .with("displayname", "Bob"),
        );
        assert_eq!(single.title_long, "Chat with Bob");
        assert_eq!(single.title_long_lc(), "chat with Bob");

        let group = Chat::from_row(
            Row::new()
                .with("id", 2_i64)
                .with("identity", "#alice/$abc")
                .with("type", 2_i64)
                .with("meta_topic", "Planning"),
        );
        assert_eq!(group.title_long, "Group chat \"Planning\"");
        assert_eq!(group.chat_type.name(), "Group");
        assert_eq!(ChatType::from(9).name(), "Unknown (9)");
    }

    #[test]
    fn contact_identity_falls_back_to_phone_number() {
        let contact = Contact::from_row(
            Row::new()
                .with("id", 3_i64)
                .with("pstnnumber", "+3725550000")
                .with("displayname", "Phone friend"),
        );
        assert_eq!(contact.identity, "+3725550000");
        assert_eq!(contact.name, "Phone friend");
        assert!(!contact.is_placeholder());
        assert!(Contact::placeholder("ghost").is_placeholder());
    }

    #[test]
    fn message_datetime_is_derived_from_timestamp() {
        let message = Message::from_row(
            Row::new()
                .with("id", 10_i64)
                .with("timestamp", 1_000_i64)
                .with("type", 61_i64),
        );
        assert_eq!(message.datetime, DateTime::<Utc>::from_timestamp(1_000, 0));
        assert_eq!(message.author(), "");
    }

    #[test]
    fn file_elements_are_read_from_body_in_index_order() {
        let body = r#"<files alt="sent files"><file size="2048" index="1">b&amp;c.txt</file><file size="10" index="0">a.png</file></files>"#;
        let files = parse_file_elements(body);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].filename, "a.png");
        assert_eq!(files[0].size, Some(10));
        assert_eq!(files[1].filename, "b&c.txt");
        assert_eq!(files[1].index, 1);
    }

    #[test]
    fn group_members_split_on_whitespace() {
        let group = ContactGroup::from_row(
            Row::new()
                .with("id", 1_i64)
                .with("given_displayname", "Friends")
                .with("members", "alice bob  carol"),
        );
        assert_eq!(group.name.as_deref(), Some("Friends"));
        assert_eq!(group.member_identities(), vec!["alice", "bob", "carol"]);
    }
}
