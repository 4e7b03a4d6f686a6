use crate::report::{contact_lines, entry_line, format_datetime, side_contact_lines, ChunkPrinter};
use anyhow::{anyhow, bail, Context as _, Result};
use chrono::NaiveDate;
use skyp_core::{MessageFilter, NoopOsHandler, SkypConfig, StatusSink};
use skyp_merge::{
    compare_chats, compare_contacts, get_chat_diff, scan_chats, DiffJob, DiffWorker, Direction,
    MergeReport, Merger,
};
use skyp_storage::{open_with_retry, DatabaseRegistry, MessageQuery, SkypeDatabase};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{mpsc, Arc, PoisonError};
use tracing::info;

/// Status lines go to stdout, log lines to tracing.
struct ConsoleSink;

impl StatusSink for ConsoleSink {
    fn log(&self, message: &str) {
        info!(event = "status_log", message);
    }

    fn status(&self, message: &str) {
        println!("{message}");
    }
}

pub struct Context {
    config: SkypConfig,
    sink: Arc<dyn StatusSink>,
}

impl Context {
    pub fn new(config: SkypConfig) -> Self {
        Self {
            config,
            sink: Arc::new(ConsoleSink),
        }
    }

    fn open(&self, path: &Path) -> Result<SkypeDatabase> {
        open_with_retry(path, &self.config, Arc::clone(&self.sink), &NoopOsHandler)
            .with_context(|| format!("Failed to open {}", path.display()))
    }
}

pub struct MessageArgs {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub authors: Vec<String>,
    pub text: Option<String>,
    pub desc: bool,
}

pub struct MergeArgs {
    pub chat: Option<String>,
    pub contacts_only: bool,
    pub yes: bool,
}

fn label(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub fn info(ctx: &Context, path: &Path) -> Result<()> {
    let db = ctx.open(path)?;
    let file = db.file_info();
    println!("File:          {}", file.path.display());
    println!("Size:          {} bytes", file.size);
    println!("Last modified: {}", format_datetime(file.last_modified));
    match db.account() {
        Some(account) => println!(
            "Account:       {} ({})",
            account.name,
            account.identity().unwrap_or("-")
        ),
        None => println!("Account:       -"),
    }
    let tables = db.get_tables(false, None)?;
    println!("Tables:        {}", tables.len());
    for table in tables {
        println!("  {:<24} {:>8}", table.name, table.rows);
    }
    Ok(())
}

pub fn chats(ctx: &Context, path: &Path) -> Result<()> {
    let db = ctx.open(path)?;
    let chats = db.get_conversations_with_stats()?;
    for chat in chats.iter() {
        println!(
            "{:<40} {:<11} {:>7}  {}  {}  [{}]",
            chat.title_long,
            chat.chat_type.name(),
            chat.message_count(),
            format_datetime(chat.first_message_datetime()),
            format_datetime(chat.last_message_datetime()),
            chat.identity
        );
    }
    println!("{} chats.", chats.len());
    Ok(())
}

pub fn contacts(ctx: &Context, path: &Path) -> Result<()> {
    let db = ctx.open(path)?;
    let contacts = db.get_contacts()?;
    for contact in contacts.iter() {
        println!("{:<32} {}", contact.name, contact.identity);
    }
    let groups = db.get_contactgroups()?;
    for group in groups.iter() {
        println!(
            "Group {}: {}",
            group.name.as_deref().unwrap_or("-"),
            group.member_identities().join(", ")
        );
    }
    println!("{} contacts, {} groups.", contacts.len(), groups.len());
    Ok(())
}

/// Caches display names while printing messages.
struct NameBook<'a> {
    db: &'a SkypeDatabase,
    names: HashMap<String, String>,
}

impl<'a> NameBook<'a> {
    fn new(db: &'a SkypeDatabase) -> Self {
        Self {
            db,
            names: HashMap::new(),
        }
    }

    fn name(&mut self, identity: &str) -> Result<&str> {
        if !self.names.contains_key(identity) {
            let name = self.db.get_contact_name(identity)?;
            self.names.insert(identity.to_string(), name);
        }
        Ok(self.names[identity].as_str())
    }
}

pub fn messages(ctx: &Context, path: &Path, identity: &str, args: MessageArgs) -> Result<()> {
    let db = ctx.open(path)?;
    let chat = db
        .get_conversation(identity)?
        .ok_or_else(|| anyhow!("No chat {identity} in {}", path.display()))?;
    let filter = MessageFilter::new()
        .with_participants(args.authors)
        .with_date_range(args.from, args.to)?
        .with_text(args.text.unwrap_or_default());
    let mut query = MessageQuery::for_chat(&chat);
    if args.desc {
        query = query.descending();
    }

    let mut names = NameBook::new(&db);
    let mut shown = 0;
    for message in db.get_messages(query) {
        let message = message?;
        if !filter.matches(&message) {
            continue;
        }
        shown += 1;
        println!(
            "[{}] {}: {}",
            format_datetime(message.datetime),
            names.name(message.author())?,
            message.body()
        );
    }
    println!("{shown} of {} messages in {}.", chat.message_count(), chat.title_long);
    Ok(())
}

pub fn search(ctx: &Context, path: &Path, text: &str, limit: Option<usize>) -> Result<()> {
    let db = ctx.open(path)?;
    let titles: HashMap<i64, String> = db
        .get_conversations()?
        .iter()
        .map(|chat| (chat.id, chat.title_long.clone()))
        .collect();
    let found = db.search_messages(text, limit)?;
    let mut names = NameBook::new(&db);
    for message in &found {
        println!(
            "[{}] {} | {}: {}",
            format_datetime(message.datetime),
            titles.get(&message.convo_id).map(String::as_str).unwrap_or("?"),
            names.name(message.author())?,
            message.body()
        );
    }
    println!("{} found.", skyp_core::plural("message", found.len()));
    Ok(())
}

pub fn diff(ctx: &Context, path1: &Path, path2: &Path, chat: Option<&str>, json: bool) -> Result<()> {
    let labels = [label(path1), label(path2)];
    if let Some(identity) = chat {
        return diff_chat(ctx, path1, path2, identity, &labels, json);
    }

    let registry = DatabaseRegistry::new(ctx.config.clone(), Arc::clone(&ctx.sink));
    let left = registry
        .open(path1)
        .with_context(|| format!("Failed to open {}", path1.display()))?;
    let right = registry
        .open(path2)
        .with_context(|| format!("Failed to open {}", path2.display()))?;

    let (sender, receiver) = mpsc::channel();
    let mut worker = DiffWorker::new(ctx.config.clone(), move |event| {
        let _ = sender.send(event);
    });
    worker.work(DiffJob {
        left: Arc::clone(&left),
        right: Arc::clone(&right),
    })?;

    let mut printer = ChunkPrinter::new(labels.clone(), json);
    loop {
        let chunk = receiver
            .recv()
            .map_err(|_| anyhow!("Diff worker exited before finishing"))??;
        for line in printer.lines(&chunk) {
            println!("{line}");
        }
        if chunk.done {
            break;
        }
    }
    worker.stop();

    let contacts = if Arc::ptr_eq(&left, &right) {
        let db = left.lock().unwrap_or_else(PoisonError::into_inner);
        compare_contacts(&db, &db)?
    } else {
        let left = left.lock().unwrap_or_else(PoisonError::into_inner);
        let right = right.lock().unwrap_or_else(PoisonError::into_inner);
        compare_contacts(&left, &right)?
    };
    if json {
        println!("{}", serde_json::to_string(&contacts)?);
    } else {
        for line in contact_lines(&labels, &contacts) {
            println!("{line}");
        }
        println!(
            "{} differing.",
            skyp_core::plural("chat", printer.total())
        );
    }
    Ok(())
}

fn diff_chat(
    ctx: &Context,
    path1: &Path,
    path2: &Path,
    identity: &str,
    labels: &[String; 2],
    json: bool,
) -> Result<()> {
    let db1 = ctx.open(path1)?;
    let db2 = ctx.open(path2)?;
    let compared = compare_chats(&db1, &db2)?;
    let pair = compared
        .iter()
        .find(|pair| pair.identity == identity)
        .ok_or_else(|| anyhow!("No chat {identity} in either database"))?;
    let diff = get_chat_diff(&db1, &db2, pair.c1.as_ref(), pair.c2.as_ref())?;
    if json {
        println!("{}", serde_json::to_string(&diff)?);
        return Ok(());
    }
    println!("{} [{}]", pair.title_long, pair.identity);
    for side in 0..2 {
        println!(
            "  {} has {} and {} the other lacks.",
            labels[side],
            skyp_core::plural("message", diff.messages[side].len()),
            skyp_core::plural("participant", diff.participants[side].len())
        );
        for message in &diff.messages[side] {
            println!(
                "    [{}] {}: {}",
                format_datetime(message.datetime),
                message.author(),
                message.body()
            );
        }
    }
    Ok(())
}

pub fn merge(ctx: &Context, source_path: &Path, target_path: &Path, args: MergeArgs) -> Result<()> {
    let canonical = |path: &Path| {
        path.canonicalize()
            .with_context(|| format!("Failed to resolve {}", path.display()))
    };
    if canonical(source_path)? == canonical(target_path)? {
        bail!("Source and target are the same file");
    }
    let source = ctx.open(source_path)?;
    let mut target = ctx.open(target_path)?;
    let labels = [label(source_path), label(target_path)];
    let direction = Direction::LeftToRight;

    let contacts = compare_contacts(&source, &target)?;
    let mut scan = if args.contacts_only {
        Default::default()
    } else {
        let compared = compare_chats(&source, &target)?;
        scan_chats(
            &source,
            &target,
            &compared,
            ctx.config.diff_results_chunk,
            || false,
            |_| {},
        )?
    };

    let entries: Vec<_> = scan
        .entries(direction)
        .iter()
        .filter(|entry| args.chat.as_deref().map_or(true, |chat| chat == entry.identity))
        .collect();
    if let Some(chat) = &args.chat {
        if entries.is_empty() {
            bail!("Nothing to merge for chat {chat}");
        }
    }
    for entry in &entries {
        println!("{} has more: {}", labels[0], entry_line(entry));
    }
    if args.chat.is_none() {
        for line in side_contact_lines(&labels[0], &contacts, direction.index()) {
            println!("{line}");
        }
    }
    if !args.yes {
        println!("Dry run, nothing written. Repeat with --yes to merge into {}.", labels[1]);
        return Ok(());
    }

    let merger = Merger::new(ctx.config.clone(), Arc::clone(&ctx.sink));
    let side = direction.index();
    let report = if let Some(chat) = &args.chat {
        merger.merge_scanned_chat(&source, &mut target, &mut scan, direction, chat)?
    } else if args.contacts_only {
        merger.merge_contacts(
            &source,
            &mut target,
            &contacts.contacts[side],
            &contacts.groups[side],
        )?
    } else {
        merger.merge_all(&source, &mut target, &mut scan, &contacts, direction)
    };
    finish_merge(&report, &labels[1])
}

fn finish_merge(report: &MergeReport, target: &str) -> Result<()> {
    println!("Merged {} into {target}.", report.summary());
    for (identity, error) in &report.errors {
        eprintln!("Failed to merge {identity}: {error}");
    }
    if !report.errors.is_empty() {
        bail!("{} failed", skyp_core::plural("merge", report.errors.len()));
    }
    Ok(())
}

pub fn future_dates(ctx: &Context, path: &Path, days: i64, hours: i64) -> Result<()> {
    let mut db = ctx.open(path)?;
    let found = db.check_future_dates()?;
    println!(
        "{} dated in the future, latest {}.",
        skyp_core::plural("message", found.count.max(0) as usize),
        format_datetime(found.latest)
    );
    if found.count == 0 || (days == 0 && hours == 0) {
        return Ok(());
    }
    let moved = db.move_future_dates(found.checked_at, days, hours)?;
    println!(
        "Moved {} back by {days} days and {hours} hours.",
        skyp_core::plural("message", moved)
    );
    Ok(())
}
