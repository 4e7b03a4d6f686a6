use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use skyp_core::SkypConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod report;

#[derive(Parser)]
#[command(name = "skyp")]
#[command(about = "Skype message database browser and merger", long_about = None)]
struct Cli {
    /// Configuration file, defaults to the user config directory.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log at debug level.
    #[arg(long, global = true)]
    debug: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
#[command(rename_all = "kebab-case")]
enum Commands {
    /// Account, tables and file details
    Info { db: PathBuf },
    /// Conversations with message counts and dates
    Chats { db: PathBuf },
    /// Contacts and contact groups
    Contacts { db: PathBuf },
    /// Messages of one conversation
    Messages {
        db: PathBuf,
        chat: String,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        #[arg(long = "author")]
        authors: Vec<String>,
        #[arg(long)]
        text: Option<String>,
        #[arg(long)]
        desc: bool,
    },
    /// Messages containing text, newest first
    Search {
        db: PathBuf,
        text: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Chats and contacts differing between two databases
    Diff {
        db1: PathBuf,
        db2: PathBuf,
        #[arg(long)]
        chat: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Copy what source has and target lacks into target
    Merge {
        source: PathBuf,
        target: PathBuf,
        #[arg(long)]
        chat: Option<String>,
        #[arg(long)]
        contacts_only: bool,
        /// Write changes; without it only the plan is printed.
        #[arg(long)]
        yes: bool,
    },
    /// Messages dated in the future, optionally shifted back
    FutureDates {
        db: PathBuf,
        #[arg(long, default_value_t = 0)]
        shift_days: i64,
        #[arg(long, default_value_t = 0)]
        shift_hours: i64,
    },
}

fn init_logging(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    let filter = if debug {
        EnvFilter::new(level)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn load_config(path: Option<PathBuf>) -> Result<SkypConfig> {
    let Some(path) = path.or_else(SkypConfig::default_path) else {
        return Ok(SkypConfig::default());
    };
    SkypConfig::load(&path).with_context(|| format!("Failed to load config {}", path.display()))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);
    let config = load_config(cli.config)?;
    let ctx = commands::Context::new(config);

    match cli.command {
        Commands::Info { db } => commands::info(&ctx, &db),
        Commands::Chats { db } => commands::chats(&ctx, &db),
        Commands::Contacts { db } => commands::contacts(&ctx, &db),
        Commands::Messages {
            db,
            chat,
            from,
            to,
            authors,
            text,
            desc,
        } => commands::messages(
            &ctx,
            &db,
            &chat,
            commands::MessageArgs {
                from,
                to,
                authors,
                text,
                desc,
            },
        ),
        Commands::Search { db, text, limit } => commands::search(&ctx, &db, &text, limit),
        Commands::Diff {
            db1,
            db2,
            chat,
            json,
        } => commands::diff(&ctx, &db1, &db2, chat.as_deref(), json),
        Commands::Merge {
            source,
            target,
            chat,
            contacts_only,
            yes,
        } => commands::merge(
            &ctx,
            &source,
            &target,
            commands::MergeArgs {
                chat,
                contacts_only,
                yes,
            },
        ),
        Commands::FutureDates {
            db,
            shift_days,
            shift_hours,
        } => commands::future_dates(&ctx, &db, shift_days, shift_hours),
    }
}
