use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use dialoguer::Confirm;
use quest_log_sync::cli::{Cli, Command, Settings};
use quest_log_sync::client::{OfflineRemote, RemoteApi, create_api_client};
use quest_log_sync::clock::SystemClock;
use quest_log_sync::error::{ServiceError, ServiceResult};
use quest_log_sync::metadata::{PKG_NAME, PKG_VERSION};
use quest_log_sync::persistence::PersistenceAdapter;
use quest_log_sync::storage::FileCache;
use quest_log_sync::store::StoreError;
use quest_log_sync::{QuestLogSession, shell, view};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn build_session(settings: &Settings) -> QuestLogSession {
    let remote: Box<dyn RemoteApi> = if settings.offline {
        Box::new(OfflineRemote)
    } else {
        Box::new(create_api_client(
            settings.api_url.trim(),
            settings.request_timeout(),
        ))
    };
    let cache = FileCache::new(settings.cache_path());
    tracing::debug!(
        cache = %cache.path().display(),
        offline = settings.offline,
        timeout_ms = settings.timeout_ms,
        "session configured"
    );
    let persistence = PersistenceAdapter::new(remote, Box::new(cache));
    QuestLogSession::new(persistence, Arc::new(SystemClock), settings.session_config())
}

/// Prints pending notifications to stderr so stdout stays clean for output.
fn report(session: &mut QuestLogSession) {
    for n in session.take_notifications() {
        eprintln!("{}", view::render_notification(&n));
    }
}

fn run_command(command: Command, session: &mut QuestLogSession) -> ServiceResult<()> {
    let now = session.now();
    match command {
        Command::Shell | Command::Version => {}
        Command::List => {
            session.start();
            print!("{}", view::render_menu(&session.summaries(), now));
        }
        Command::Show { id } => {
            session.start();
            session.open_log(&id)?;
            if let Some(log) = session.current_log() {
                print!("{}", view::render_log(log, None, session.save_status(), now));
                for quest in &log.quests {
                    print!("{}", view::render_quest(quest, now));
                }
            }
        }
        Command::Export { id, output } => {
            session.start();
            let exported = session.export_log(&id)?;
            let path = output.unwrap_or_else(|| PathBuf::from(&exported.file_name));
            std::fs::write(&path, exported.document)?;
            println!("wrote {}", path.display());
        }
        Command::Import { path } => {
            session.start();
            let text = std::fs::read_to_string(&path)?;
            let id = session.import_document(&text)?;
            println!("imported as {id}");
        }
        Command::Templates => {
            let templates = session.templates();
            print!("{}", view::render_templates(&templates));
        }
        Command::UseTemplate { id } => {
            session.start();
            let id = session.use_template(&id)?;
            println!("created {id}");
        }
        Command::Delete { id, yes } => {
            session.start();
            let Some(log) = session.logs().iter().find(|l| l.id == id) else {
                return Err(StoreError::LogNotFound(id).into());
            };
            let prompt = format!("Delete '{}'? This cannot be undone.", log.name);
            let confirmed = yes
                || Confirm::new()
                    .with_prompt(prompt)
                    .default(false)
                    .interact()
                    .map_err(|e| ServiceError::Other(format!("confirmation failed: {e}")))?;
            if !confirmed {
                println!("Delete cancelled.");
                return Ok(());
            }
            let outcome = session.delete_log(&id);
            if !outcome.local_ok {
                eprintln!("{}", "Local backup could not be updated".red());
            }
        }
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    if let Err(e) = cli.settings.validate() {
        eprintln!("{}", e.red());
        std::process::exit(2);
    }

    let command = cli.command();
    if command == Command::Version {
        println!("{PKG_NAME} {PKG_VERSION}");
        return Ok(());
    }

    let mut session = build_session(&cli.settings);
    if command == Command::Shell {
        tracing::info!("Starting {PKG_NAME} shell");
        let mut session = shell::run(session).await?;
        report(&mut session);
        return Ok(());
    }

    let result = run_command(command, &mut session);
    report(&mut session);
    if let Err(e) = &result {
        eprintln!("{}", e.to_string().red());
        std::process::exit(1);
    }
    Ok(())
}
