use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tally_core::{CancelFlag, SourceRef, Upload, UploadStatus, validate_upload_with};
use tally_finance::{InsightCollaborator, Pipeline};
use tally_ingest::PlainTextExtractor;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod auth;
mod config;
mod insight;
mod state;

use insight::{HttpInsight, Provider};
use state::UploadStore;

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("TALLY_BUILD_SHA"), ")");

#[derive(Parser, Debug)]
#[command(name = "tally", version = VERSION, about = "Bank statement ingestion: parse, categorize, summarize")]
struct Cli {
    /// Debug logging (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a statement through the pipeline and store the result
    Process {
        file: PathBuf,

        /// Treat the file as plain text (.txt) instead of PDF
        #[arg(long)]
        text: bool,

        /// Skip the insight call
        #[arg(long)]
        no_insight: bool,

        /// Print the stored upload as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the status of an upload (and its failure reason)
    Status { id: Uuid },

    /// Show transactions, summary and insight of a completed upload
    Results {
        id: Uuid,

        #[arg(long)]
        json: bool,
    },

    /// List stored uploads, newest first
    List,

    /// Delete an upload with its transactions, summary and insight
    Delete { id: Uuid },

    /// Print the effective category rule table
    Rules,

    /// Configuration file commands
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Store provider credentials under the tally home
    Auth {
        #[command(subcommand)]
        command: AuthCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write the default config.toml if none exists
    Init,

    /// Print the effective configuration
    Show,
}

#[derive(Subcommand, Debug)]
enum AuthCommand {
    PasteOpenaiApiKey,
    PasteAnthropicToken,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Command::Process {
            file,
            text,
            no_insight,
            json,
        } => {
            let upload = process(&file, text, no_insight).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&upload)?);
            } else {
                print_upload(&upload);
            }
        }

        Command::Status { id } => {
            let upload = UploadStore::open_default()?.load(id)?;
            let report = upload.status_report();
            println!("{}  {}", report.id, report.status);
            if let (Some(reason), Some(message)) = (&report.failure, &report.message) {
                println!("reason: {} ({})", message, reason.code());
            }
        }

        Command::Results { id, json } => {
            let upload = UploadStore::open_default()?.load(id)?;
            if upload.status() != UploadStatus::Completed {
                let report = upload.status_report();
                match report.message {
                    Some(m) => bail!("upload {} is {}: {}", id, report.status, m),
                    None => bail!("upload {} is {}; no results yet", id, report.status),
                }
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&upload)?);
            } else {
                print_upload(&upload);
            }
        }

        Command::List => {
            let uploads = UploadStore::open_default()?.list()?;
            if uploads.is_empty() {
                println!("No uploads stored.");
            }
            for u in &uploads {
                println!(
                    "{}  {:<10}  {}  {}  txns={}",
                    u.id,
                    u.status().as_str(),
                    u.created_at.format("%Y-%m-%d %H:%M"),
                    u.source.file_name,
                    u.transactions.len()
                );
            }
        }

        Command::Delete { id } => {
            UploadStore::open_default()?.delete(id)?;
            println!("Deleted {}", id);
        }

        Command::Rules => {
            let cfg = config::load_config()?;
            let compiled = cfg.pipeline_settings().compile()?;
            let categorizer = compiled.categorizer();
            for (i, rule) in categorizer.rules().enumerate() {
                println!(
                    "{:>3}  {:<16} {:<11} {}",
                    i + 1,
                    rule.category,
                    rule.match_kind.as_str(),
                    rule.pattern
                );
            }
            println!("fallback: {}", categorizer.fallback());
        }

        Command::Config { command } => match command {
            ConfigCommand::Init => config::init_config()?,
            ConfigCommand::Show => {
                let cfg = config::load_config()?;
                print!("{}", config::render_config(&cfg)?);
            }
        },

        Command::Auth { command } => match command {
            AuthCommand::PasteOpenaiApiKey => auth::paste_key(Provider::OpenAI)?,
            AuthCommand::PasteAnthropicToken => auth::paste_key(Provider::Anthropic)?,
        },
    }

    Ok(())
}

async fn process(file: &Path, text: bool, no_insight: bool) -> Result<Upload> {
    let bytes = std::fs::read(file).with_context(|| format!("read {}", file.display()))?;
    let file_name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string());

    let extensions: &[&str] = if text { &["txt", "text"] } else { &["pdf"] };
    validate_upload_with(&file_name, &bytes, extensions)
        .with_context(|| format!("rejected {}", file.display()))?;

    let cfg = config::load_config()?;
    let compiled = Arc::new(cfg.pipeline_settings().compile()?);
    let store = Arc::new(UploadStore::open_default()?);

    let mut pipeline = Pipeline::new(compiled).with_observer(store.clone());
    if text {
        pipeline = pipeline.with_extractor(Arc::new(PlainTextExtractor));
    }

    let collaborator = if no_insight || !cfg.insight.enabled {
        None
    } else {
        match HttpInsight::from_config(&cfg.insight, &auth::load_auth()?) {
            Ok(c) => Some(c),
            Err(e) => {
                warn!(error = %e, "insight disabled for this run");
                None
            }
        }
    };

    let upload = Upload::new(SourceRef::from_bytes(file_name, &bytes));
    store.save(&upload)?;
    info!(upload = %upload.id, file = %upload.source.file_name, bytes = upload.source.size_bytes, "upload accepted");

    let cancel = CancelFlag::new();
    let on_signal = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; cancelling");
            on_signal.cancel();
        }
    });

    let joined = tokio::task::spawn_blocking(move || {
        let mut upload = upload;
        let insight = collaborator.as_ref().map(|c| c as &dyn InsightCollaborator);
        let outcome = pipeline.process(&mut upload, &bytes, insight, &cancel);
        (upload, outcome)
    })
    .await;
    watcher.abort();

    let (upload, outcome) = joined.context("pipeline task")?;
    outcome?;
    store.save(&upload)?;
    Ok(upload)
}

fn print_upload(upload: &Upload) {
    println!("Upload {}  {}", upload.id, upload.status());
    println!("Source  {} ({} bytes)", upload.source.file_name, upload.source.size_bytes);

    if let Some(reason) = upload.failure() {
        println!("Failed  {} ({})", reason, reason.code());
        return;
    }

    if !upload.transactions.is_empty() {
        println!();
        for t in &upload.transactions {
            println!(
                "{}  {:>12}  {:<14} {:.2}  {}",
                t.date,
                format!("{:.2}", t.amount),
                t.category,
                t.confidence,
                t.description
            );
        }
    }

    if let Some(s) = &upload.summary {
        println!();
        println!(
            "Income {:.2}  Expense {:.2}  Net {:.2}  ({} transactions)",
            s.total_income, s.total_expense, s.net, s.transaction_count
        );
        for c in &s.by_category {
            println!(
                "  {:<16} {:>12}  n={:<3} {:>6}% of expenses",
                c.category,
                format!("{:.2}", c.total),
                c.count,
                format!("{:.2}", c.share_of_expenses)
            );
        }
    }

    if let Some(insight) = &upload.insight {
        println!();
        println!("Insight ({})", insight.model);
        println!("{}", insight.text);
        for flag in &insight.risk_flags {
            println!("  ! {}", flag);
        }
    }
}
