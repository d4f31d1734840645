//! Command-line interface and run orchestration

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::checkpoint;
use crate::config::Config;
use crate::error::{ArchiveError, Result};
use crate::store::StoreProvider;
use crate::sync::{SyncEngine, SyncReport};

#[derive(Parser, Debug)]
#[command(name = "mail-archiver")]
#[command(version)]
#[command(about = "Incremental mailbox archiver", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Archive new mail for every configured user
    Run {
        /// Plan and report without writing files or checkpoints
        #[arg(long)]
        dry_run: bool,
    },

    /// Show per-user checkpoints
    Status,

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

/// Per-user progress bar fed from the sync engine's callback
pub struct ProgressReporter {
    bar: Arc<ProgressBar>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let bar = ProgressBar::hidden();
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed:>6}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        Self { bar: Arc::new(bar) }
    }

    pub fn callback(&self) -> crate::sync::ProgressCallback {
        let bar = Arc::clone(&self.bar);
        Arc::new(move |index, total| {
            // the engine reports index 0 once per user, before processing
            if index == 0 {
                bar.set_length(total as u64);
                bar.set_position(0);
                if total > 0 {
                    bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
                }
                return;
            }
            bar.set_position(index as u64);
        })
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Load checkpoints, sync every user, print the summary
pub async fn run_pipeline(
    config: &Config,
    provider: &dyn StoreProvider,
    dry_run: bool,
) -> Result<SyncReport> {
    let mut checkpoints = checkpoint::load(
        &config.timestamp_file,
        &config.users,
        config.oldest_date_utc(),
    )
    .await;

    let reporter = ProgressReporter::new();
    let engine = SyncEngine::new(config, provider)
        .with_dry_run(dry_run)
        .with_progress(reporter.callback());

    let report = engine.run(&mut checkpoints).await;
    reporter.finish();

    print_report(&report, dry_run);
    Ok(report)
}

fn print_report(report: &SyncReport, dry_run: bool) {
    if dry_run {
        println!("Dry run - nothing was written");
    }
    println!("Users synced:       {}", report.users_synced);
    println!("Users failed:       {}", report.users_failed);
    println!("Messages processed: {}", report.messages_processed);
    println!("Files written:      {}", report.files_written);
    println!("Duplicates skipped: {}", report.duplicates_skipped);
}

/// Print each configured user's checkpoint
pub async fn show_status(config: &Config) -> Result<()> {
    let checkpoints = checkpoint::load(
        &config.timestamp_file,
        &config.users,
        config.oldest_date_utc(),
    )
    .await;

    println!("Checkpoint file: {:?}", config.timestamp_file);
    for user in &config.users {
        match checkpoints.get(user) {
            Some(ts) => println!("  {:<24} {}", user, checkpoint::format_timestamp(*ts)),
            None => println!("  {:<24} (no checkpoint)", user),
        }
    }
    Ok(())
}

pub async fn init_config(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        return Err(ArchiveError::ConfigError(format!(
            "{:?} already exists, use --force to overwrite",
            output
        )));
    }

    Config::create_example(output).await?;
    info!("wrote example configuration");
    println!("Created example configuration at {:?}", output);
    println!("Edit it, then archive with: mail-archiver run");
    Ok(())
}
