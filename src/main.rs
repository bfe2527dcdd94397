use clap::Parser;
use wordsync::anki::AnkiConnect;
use wordsync::checkpoint::Checkpoint;
use wordsync::config::{Cli, Config, default_config_path};
use wordsync::readwise::ReadwiseClient;
use wordsync::sync::{RunOutcome, SyncSettings, Syncer};
use wordsync::{telemetry, unpack_error};

fn load_config(args: &Cli) -> anyhow::Result<Config> {
    // An explicit --config must exist; the default path is only used when present,
    // otherwise settings come from the environment.
    let cfg = match &args.config_path {
        Some(path) => Config::new(path)?,
        None => {
            let path = default_config_path();
            if path.exists() {
                Config::new(&path)?
            } else {
                Config::from_env()?
            }
        }
    };
    Ok(cfg)
}

async fn run(args: Cli) -> anyhow::Result<()> {
    let cfg = load_config(&args)?;

    let checkpoint_path = args
        .checkpoint_path
        .clone()
        .unwrap_or_else(|| cfg.app.checkpoint_file.clone());

    let checkpoint = Checkpoint::new(checkpoint_path);
    tracing::info!(
        checkpoint = ?checkpoint.path(),
        deck = %cfg.anki.deck,
        model = %cfg.anki.model,
        dry_run = args.dry_run,
        "configuration loaded"
    );

    let readwise = ReadwiseClient::new(&cfg.readwise)?;
    let anki = AnkiConnect::new(&cfg.anki)?;
    let syncer = Syncer::new(
        readwise,
        anki,
        checkpoint,
        SyncSettings::from_config(&cfg, args.dry_run),
    );

    match syncer.run().await? {
        RunOutcome::NothingNew { committed } => {
            tracing::info!(checkpoint_saved = committed, "nothing to add to anki");
        }
        RunOutcome::Completed { stats, committed } => {
            tracing::info!(
                created = stats.created,
                duplicates = stats.duplicates,
                failed = stats.failed,
                checkpoint_saved = committed,
                "sync complete"
            );
        }
        RunOutcome::DryRun { definitions } => {
            tracing::info!(definitions, "dry run complete, nothing was written");
        }
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = Cli::parse();

    let _telemetry = telemetry::init(args.log_format);

    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = ?path, "loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "failed to load .env"),
    }

    tracing::info!("wordsync starting");

    if let Err(e) = run(args).await {
        tracing::error!(error = %unpack_error(&*e), "sync aborted");
    }

    tracing::info!("wordsync finished");
}
