use clap::Parser;
use mail_archiver::cli::{self, Cli, Commands};
use mail_archiver::config::Config;
use std::process;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        eprintln!("\nFor help, run: mail-archiver --help");
        process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("mail_archiver=debug,info"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("mail_archiver=info,warn,error"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run { dry_run } => {
            let config = Config::load(&cli.config).await?;
            if dry_run {
                println!("Running in DRY RUN mode - no files or checkpoints will be written");
            }

            let provider = build_provider(&config)?;
            let report = cli::run_pipeline(&config, provider.as_ref(), dry_run).await?;

            if report.users_failed > 0 {
                anyhow::bail!("{} user(s) failed to sync", report.users_failed);
            }
            Ok(())
        }

        Commands::Status => {
            let config = Config::load(&cli.config).await?;
            cli::show_status(&config).await?;
            Ok(())
        }

        Commands::InitConfig { output, force } => {
            cli::init_config(&output, force).await?;
            Ok(())
        }
    }
}

#[cfg(feature = "imap")]
fn build_provider(
    config: &Config,
) -> anyhow::Result<Box<dyn mail_archiver::store::StoreProvider>> {
    Ok(Box::new(mail_archiver::store::imap::ImapStoreProvider::new(
        config.store.clone(),
    )))
}

#[cfg(not(feature = "imap"))]
fn build_provider(
    _config: &Config,
) -> anyhow::Result<Box<dyn mail_archiver::store::StoreProvider>> {
    anyhow::bail!(
        "this build has no mail store backend; rebuild with `--features imap` to talk to a server"
    )
}
