mod common;

use common::{build, contact_row, ChatFixture};
use skyp_core::{Row, SkypConfig, TracingSink, MESSAGE_TYPE_FILE};
use skyp_merge::{
    compare_chats, compare_contacts, get_chat_diff, scan_chats, ComparedChat, Direction,
    DiffStatus, MergeError, Merger, ScanResult,
};
use skyp_storage::{MessageQuery, SkypeDatabase};
use std::sync::Arc;
use tempfile::tempdir;

fn merger() -> Merger {
    Merger::new(SkypConfig::default(), Arc::new(TracingSink))
}

fn scan(left: &SkypeDatabase, right: &SkypeDatabase) -> (Vec<ComparedChat>, ScanResult) {
    let compared = compare_chats(left, right).expect("compare");
    let result = scan_chats(left, right, &compared, 5, || false, |_| {}).expect("scan");
    (compared, result)
}

fn status_of(compared: &[ComparedChat], identity: &str) -> DiffStatus {
    compared
        .iter()
        .find(|chat| chat.identity == identity)
        .map(|chat| chat.diff_status)
        .expect("chat compared")
}

#[test]
fn one_sided_chat_is_copied_whole() {
    let dir = tempdir().expect("tempdir");
    let left = build(
        dir.path(),
        "left.db",
        "me",
        &[ChatFixture::new("carol", 1)
            .with_participants(&["me", "carol"])
            .with_messages(&[
                ("carol", 1_000, "hello"),
                ("me", 2_000, "hi carol"),
                ("carol", 3_000, "bye"),
            ])],
    );
    let mut right = build(dir.path(), "right.db", "me", &[ChatFixture::new("bob", 1)]);

    let (compared, mut result) = scan(&left, &right);
    assert_eq!(status_of(&compared, "carol"), DiffStatus::Different);
    let entry = result
        .find(Direction::LeftToRight, "carol")
        .expect("carol differs")
        .clone();
    assert!(entry.is_new_chat());
    assert_eq!(entry.messages.len(), 3);
    assert!(entry.html().contains("new chat, 3 messages"));

    let report = merger()
        .merge_scanned_chat(&left, &mut right, &mut result, Direction::LeftToRight, "carol")
        .expect("merge");
    assert_eq!(report.chats, 1);
    assert_eq!(report.messages, 3);
    assert_eq!(report.participants, 2);
    assert_eq!(report.contacts, 1);
    assert!(result.find(Direction::LeftToRight, "carol").is_none());

    let merged = right
        .get_conversation("carol")
        .expect("lookup")
        .expect("carol exists");
    assert_eq!(merged.message_count(), 3);
    assert_eq!(merged.participants.len(), 2);
    assert!(right.get_contact("carol").expect("contact").is_some());

    let (compared, _) = scan(&left, &right);
    assert_eq!(status_of(&compared, "carol"), DiffStatus::Identical);
}

#[test]
fn equal_counts_and_last_time_count_as_identical() {
    let dir = tempdir().expect("tempdir");
    let left = build(
        dir.path(),
        "left.db",
        "me",
        &[ChatFixture::new("bob", 1).with_messages(&[
            ("bob", 1_000, "one"),
            ("me", 2_000, "two"),
            ("bob", 3_000, "three"),
        ])],
    );
    let right = build(
        dir.path(),
        "right.db",
        "me",
        &[ChatFixture::new("bob", 7).with_messages(&[
            ("bob", 1_000, "one"),
            ("me", 2_000, "edited"),
            ("bob", 3_000, "three"),
        ])],
    );

    let (compared, result) = scan(&left, &right);
    assert_eq!(status_of(&compared, "bob"), DiffStatus::Identical);
    assert!(result.is_empty());

    let pair = compared.iter().find(|chat| chat.identity == "bob").expect("bob");
    let diff = get_chat_diff(&left, &right, pair.c1.as_ref(), pair.c2.as_ref()).expect("diff");
    assert_eq!(diff.messages[0].len(), 1);
    assert_eq!(diff.messages[1].len(), 1);
}

#[test]
fn messages_match_on_content_not_ids() {
    let dir = tempdir().expect("tempdir");
    let left = build(
        dir.path(),
        "left.db",
        "me",
        &[
            ChatFixture::new("alice", 1),
            ChatFixture::new("bob", 2).with_messages(&[("bob", 1_000, "a"), ("me", 2_000, "b")]),
        ],
    );
    let right = build(
        dir.path(),
        "right.db",
        "me",
        &[ChatFixture::new("bob", 1).with_messages(&[
            ("me", 2_000, "b"),
            ("bob", 1_000, "a"),
            ("bob", 4_000, "c"),
            ("bob", 1_000, "a twin"),
        ])],
    );

    let (_, result) = scan(&left, &right);
    assert!(result.find(Direction::LeftToRight, "bob").is_none());
    let entry = result
        .find(Direction::RightToLeft, "bob")
        .expect("right has more");
    let bodies: Vec<&str> = entry.messages.iter().map(|message| message.body()).collect();
    assert_eq!(bodies, vec!["a twin", "c"]);
    assert!(!entry.is_new_chat());
    assert_eq!(
        entry.html(),
        "<a href=\"bob\">Chat with Bob Builder</a> - 2 new messages.<br />"
    );
}

#[test]
fn file_transfers_follow_merged_messages() {
    let dir = tempdir().expect("tempdir");
    let mut left = build(
        dir.path(),
        "left.db",
        "me",
        &[ChatFixture::new("bob", 3).with_message_row(
            Row::new()
                .with("author", "bob")
                .with("timestamp", 1_500_i64)
                .with("type", MESSAGE_TYPE_FILE)
                .with("guid", "file-guid")
                .with(
                    "body_xml",
                    "<files><file index=\"0\" size=\"4\">a.txt</file>\
                     <file index=\"1\" size=\"8\">b.txt</file></files>",
                ),
        )],
    );
    for (index, name) in [(1_i64, "b.txt"), (0, "a.txt")] {
        left.insert_row(
            "transfers",
            &Row::new()
                .with("type", 2_i64)
                .with("partner_handle", "bob")
                .with("filename", name)
                .with("chatmsg_guid", "file-guid")
                .with("chatmsg_index", index)
                .with("convo_id", 3_i64),
        )
        .expect("insert transfer");
    }
    left.insert_row(
        "transfers",
        &Row::new()
            .with("filename", "unrelated.bin")
            .with("chatmsg_guid", "other-guid"),
    )
    .expect("insert transfer");
    let mut right = build(dir.path(), "right.db", "me", &[ChatFixture::new("bob", 9)]);

    let (_, mut result) = scan(&left, &right);
    let contacts = compare_contacts(&left, &right).expect("contacts");
    let report = merger().merge_all(
        &left,
        &mut right,
        &mut result,
        &contacts,
        Direction::LeftToRight,
    );
    assert_eq!(report.messages, 1);
    assert!(report.errors.is_empty());

    let transfers = right.get_transfers().expect("transfers");
    let copied: Vec<(Option<&str>, Option<i64>, Option<i64>)> = transfers
        .iter()
        .map(|transfer| {
            (
                transfer.filename.as_deref(),
                transfer.chatmsg_index,
                transfer.convo_id,
            )
        })
        .collect();
    assert_eq!(
        copied,
        vec![(Some("a.txt"), Some(0), Some(9)), (Some("b.txt"), Some(1), Some(9))]
    );
}

#[test]
fn creation_timestamp_never_follows_first_message() {
    let dir = tempdir().expect("tempdir");
    let left = build(
        dir.path(),
        "left.db",
        "me",
        &[ChatFixture::new("bob", 1).with_messages(&[("bob", 1_000, "early"), ("bob", 5_000, "x")])],
    );
    let mut right = build(
        dir.path(),
        "right.db",
        "me",
        &[ChatFixture::new("bob", 1).with_messages(&[("bob", 5_000, "x")])],
    );
    let before = right.get_conversation("bob").expect("lookup").expect("bob");
    assert_eq!(before.creation_timestamp, Some(5_000));

    let (_, mut result) = scan(&left, &right);
    merger()
        .merge_scanned_chat(&left, &mut right, &mut result, Direction::LeftToRight, "bob")
        .expect("merge");

    let after = right.get_conversation("bob").expect("lookup").expect("bob");
    assert_eq!(after.creation_timestamp, Some(1_000));
    assert_eq!(
        after.first_message_datetime(),
        after.created_datetime,
    );
}

#[test]
fn merging_twice_adds_nothing() {
    let dir = tempdir().expect("tempdir");
    let left = build(
        dir.path(),
        "left.db",
        "me",
        &[
            ChatFixture::new("bob", 1)
                .with_participants(&["me", "bob", "dave"])
                .with_messages(&[("bob", 1_000, "a"), ("dave", 1_100, "b")]),
            ChatFixture::new("carol", 2).with_messages(&[("carol", 2_000, "c")]),
        ],
    );
    let mut right = build(
        dir.path(),
        "right.db",
        "me",
        &[ChatFixture::new("bob", 1)
            .with_participants(&["me", "bob"])
            .with_messages(&[("bob", 1_000, "a")])],
    );

    let (_, mut result) = scan(&left, &right);
    let stale = result.clone();
    let contacts = compare_contacts(&left, &right).expect("contacts");
    let first = merger().merge_all(&left, &mut right, &mut result, &contacts, Direction::LeftToRight);
    assert_eq!(first.chats, 1);
    assert_eq!(first.messages, 2);
    assert_eq!(first.participants, 1);
    assert!(result.entries(Direction::LeftToRight).is_empty());

    let mut stale = stale;
    let second = merger().merge_all(&left, &mut right, &mut stale, &contacts, Direction::LeftToRight);
    assert!(second.is_empty(), "second merge copied {}", second.summary());

    let (compared, rescanned) = scan(&left, &right);
    assert!(compared
        .iter()
        .all(|chat| chat.diff_status == DiffStatus::Identical));
    assert!(rescanned.entries(Direction::LeftToRight).is_empty());
    assert!(compare_contacts(&left, &right)
        .expect("contacts")
        .contacts[0]
        .is_empty());
}

#[test]
fn own_messages_are_reattributed_between_accounts() {
    let dir = tempdir().expect("tempdir");
    let left = build(
        dir.path(),
        "left.db",
        "me",
        &[ChatFixture::new("bob", 1)
            .with_participants(&["me", "bob"])
            .with_messages(&[("me", 1_000, "from me"), ("bob", 2_000, "from bob")])],
    );
    let mut right = build(
        dir.path(),
        "right.db",
        "other",
        &[ChatFixture::new("bob", 1)
            .with_participants(&["other", "bob"])
            .with_messages(&[("bob", 2_000, "from bob")])],
    );

    let (_, mut result) = scan(&left, &right);
    let entry = result.find(Direction::LeftToRight, "bob").expect("bob differs");
    assert_eq!(entry.messages.len(), 1);
    assert!(entry.participants.is_empty());

    merger()
        .merge_scanned_chat(&left, &mut right, &mut result, Direction::LeftToRight, "bob")
        .expect("merge");
    let chat = right.get_conversation("bob").expect("lookup").expect("bob");
    let authors: Vec<String> = right
        .chat_messages(&chat)
        .expect("messages")
        .iter()
        .map(|message| message.author().to_string())
        .collect();
    assert_eq!(authors, vec!["other", "bob"]);

    let (compared, _) = scan(&left, &right);
    assert_eq!(status_of(&compared, "bob"), DiffStatus::Identical);
}

#[test]
fn contact_groups_bring_their_members() {
    let dir = tempdir().expect("tempdir");
    let mut left = build(
        dir.path(),
        "left.db",
        "me",
        &[ChatFixture::new("alice", 1), ChatFixture::new("carol", 2)],
    );
    left.insert_row(
        "contactgroups",
        &Row::new()
            .with("type", 10_i64)
            .with("given_displayname", "Friends")
            .with("members", "alice carol"),
    )
    .expect("insert group");
    let mut right = build(dir.path(), "right.db", "me", &[ChatFixture::new("bob", 1)]);
    right
        .insert_row("contacts", &contact_row("alice"))
        .expect("insert contact");

    let diff = compare_contacts(&left, &right).expect("contacts");
    let identities: Vec<&str> = diff.contacts[0]
        .iter()
        .map(|contact| contact.identity.as_str())
        .collect();
    assert_eq!(identities, vec!["carol"]);
    assert_eq!(diff.groups[0].len(), 1);
    assert_eq!(diff.swapped().contacts[1].len(), 1);

    let report = merger()
        .merge_contacts(&left, &mut right, &[], &diff.groups[0])
        .expect("merge contacts");
    assert_eq!(report.contacts, 1);
    assert_eq!(report.contact_groups, 1);
    assert!(right.get_contact("carol").expect("lookup").is_some());

    let after = compare_contacts(&left, &right).expect("contacts");
    assert!(after.contacts[0].is_empty());
    assert!(after.groups[0].is_empty());
}

#[test]
fn merge_refreshes_cached_views() {
    let dir = tempdir().expect("tempdir");
    let left = build(
        dir.path(),
        "left.db",
        "me",
        &[ChatFixture::new("bob", 1).with_messages(&[("bob", 1_000, "a"), ("bob", 2_000, "b")])],
    );
    let mut right = build(
        dir.path(),
        "right.db",
        "me",
        &[ChatFixture::new("bob", 1).with_messages(&[("bob", 1_000, "a")])],
    );
    let held = right.get_conversations_with_stats().expect("chats");
    let chat = held[0].clone();
    assert_eq!(right.chat_messages(&chat).expect("messages").len(), 1);

    let (_, mut result) = scan(&left, &right);
    merger()
        .merge_scanned_chat(&left, &mut right, &mut result, Direction::LeftToRight, "bob")
        .expect("merge");

    assert_eq!(held[0].message_count(), 1);
    let fresh = right.get_conversations_with_stats().expect("chats");
    assert_eq!(fresh[0].message_count(), 2);
    assert_eq!(right.chat_messages(&fresh[0]).expect("messages").len(), 2);
    assert!(right.file_info().last_modified.is_some());
}

#[test]
fn unknown_scanned_chat_is_reported() {
    let dir = tempdir().expect("tempdir");
    let left = build(dir.path(), "left.db", "me", &[]);
    let mut right = build(dir.path(), "right.db", "me", &[]);
    let mut result = ScanResult::default();
    let err = merger()
        .merge_scanned_chat(&left, &mut right, &mut result, Direction::LeftToRight, "ghost")
        .expect_err("nothing to merge");
    assert!(matches!(err, MergeError::ChatNotFound(identity) if identity == "ghost"));
}

#[test]
fn scan_posts_chunks_and_honours_stop() {
    let dir = tempdir().expect("tempdir");
    let chats: Vec<ChatFixture> = (1..=4)
        .map(|id| {
            ChatFixture::new(&format!("chat{id}"), id).with_messages(&[("bob", id * 100, "x")])
        })
        .collect();
    let left = build(dir.path(), "left.db", "me", &chats);
    let right = build(dir.path(), "right.db", "me", &[]);
    let compared = compare_chats(&left, &right).expect("compare");

    let mut chunks = Vec::new();
    let result = scan_chats(&left, &right, &compared, 3, || false, |chunk| chunks.push(chunk))
        .expect("scan");
    assert_eq!(result.entries(Direction::LeftToRight).len(), 4);
    assert_eq!(chunks.len(), 2);
    assert!(!chunks[0].done);
    assert_eq!(chunks[0].chats[0].len(), 3);
    assert_eq!(chunks[0].htmls[0].lines().count(), 3);
    assert!(chunks[1].done);
    assert_eq!(chunks[1].htmls[0].lines().count(), 1);
    assert_eq!(chunks[1].index, 4);

    let polls = std::cell::Cell::new(0);
    let stopped = scan_chats(
        &left,
        &right,
        &compared,
        3,
        || {
            polls.set(polls.get() + 1);
            polls.get() > 2
        },
        |_| {},
    );
    assert!(matches!(stopped, Err(MergeError::WorkerStopped)));
}

#[test]
fn scanning_leaves_message_caches_empty() {
    let dir = tempdir().expect("tempdir");
    let chats: Vec<ChatFixture> = (1..=6)
        .map(|id| {
            ChatFixture::new(&format!("chat{id}"), id)
                .with_messages(&[("bob", id * 100, "x"), ("me", id * 100 + 1, "y")])
        })
        .collect();
    let left = build(dir.path(), "left.db", "me", &chats);
    let mut right = build(dir.path(), "right.db", "me", &chats[..2]);

    let (_, mut result) = scan(&left, &right);
    assert_eq!(result.entries(Direction::LeftToRight).len(), 4);
    for id in 1..=6 {
        assert!(!left.get_messages(MessageQuery::chat(id)).is_from_cache());
    }
    for id in 1..=2 {
        assert!(!right.get_messages(MessageQuery::chat(id)).is_from_cache());
    }

    merger()
        .merge_scanned_chat(&left, &mut right, &mut result, Direction::LeftToRight, "chat3")
        .expect("merge");
    assert!(!left.get_messages(MessageQuery::chat(3)).is_from_cache());
}

#[test]
fn failing_chat_keeps_its_committed_counts_and_the_rest_merge() {
    let dir = tempdir().expect("tempdir");
    let left = build(
        dir.path(),
        "left.db",
        "me",
        &[
            ChatFixture::new("carol", 1)
                .with_participants(&["me", "carol"])
                .with_messages(&[("carol", 1_000, "boom")]),
            ChatFixture::new("dave", 2)
                .with_participants(&["me", "dave"])
                .with_messages(&[("dave", 2_000, "fine")]),
        ],
    );
    let mut right = build(
        dir.path(),
        "right.db",
        "me",
        &[ChatFixture::new("bob", 1).with_messages(&[("bob", 500, "hi")])],
    );
    right
        .execute_action(
            "CREATE TRIGGER refuse_boom BEFORE INSERT ON messages \
             WHEN NEW.body_xml = 'boom' BEGIN SELECT RAISE(ABORT, 'disk full'); END",
        )
        .expect("create trigger");

    let (_, mut result) = scan(&left, &right);
    let contacts = compare_contacts(&left, &right).expect("contacts");
    let report = merger().merge_all(&left, &mut right, &mut result, &contacts, Direction::LeftToRight);

    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].0, "carol");
    assert!(report.errors[0].1.contains("disk full"));
    assert_eq!(report.chats, 2);
    assert_eq!(report.contacts, 2);
    assert_eq!(report.participants, 4);
    assert_eq!(report.messages, 1);

    let remaining: Vec<&str> = result
        .entries(Direction::LeftToRight)
        .iter()
        .map(|entry| entry.identity.as_str())
        .collect();
    assert_eq!(remaining, vec!["carol"]);

    let carol = right
        .get_conversation("carol")
        .expect("lookup")
        .expect("carol chat committed");
    assert_eq!(carol.message_count(), 0);
    assert_eq!(carol.participants.len(), 2);
    let dave = right
        .get_conversation("dave")
        .expect("lookup")
        .expect("dave chat merged");
    assert_eq!(dave.message_count(), 1);
}

#[test]
fn contacts_match_by_identity_despite_ids_and_fields() {
    let dir = tempdir().expect("tempdir");
    let mut left = build(dir.path(), "left.db", "me", &[]);
    left.insert_row("contacts", &contact_row("alice"))
        .expect("insert alice");
    left.insert_row("contacts", &contact_row("bob"))
        .expect("insert bob");
    let mut right = build(dir.path(), "right.db", "me", &[]);
    right
        .insert_row("contacts", &contact_row("bob").with("fullname", "Robert"))
        .expect("insert bob");
    right
        .insert_row(
            "contacts",
            &contact_row("alice")
                .with("fullname", "Alice L.")
                .with("city", "Oxford"),
        )
        .expect("insert alice");

    let left_alice = left.get_contact("alice").expect("lookup").expect("alice");
    let right_alice = right.get_contact("alice").expect("lookup").expect("alice");
    assert_ne!(left_alice.id, right_alice.id);
    assert_ne!(left_alice.name, right_alice.name);

    let diff = compare_contacts(&left, &right).expect("contacts");
    assert!(diff.contacts.iter().all(Vec::is_empty));
    assert!(diff.groups.iter().all(Vec::is_empty));
}
