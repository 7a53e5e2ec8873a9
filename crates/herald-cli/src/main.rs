use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tracing::info;
use uuid::Uuid;

use herald_db::Database;
use herald_dispatch::{DispatchError, Dispatcher};
use herald_types::MANAGERS_GROUP;
use herald_types::api::DataExport;

#[derive(Parser)]
#[command(name = "herald-admin", about = "Maintenance and dispatch commands for Herald")]
struct Cli {
    /// SQLite file to operate on. Falls back to HERALD_DB_PATH, then herald.db.
    #[arg(long)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a mailing's message to all of its recipients.
    SendMailing {
        #[arg(value_name = "MAILING_ID")]
        mailing_id: Uuid,
    },
    /// Create the Managers group if it does not exist yet.
    CreateManagerGroup,
    /// Add an existing user to the Managers group.
    AddManager {
        #[arg(value_name = "USERNAME")]
        username: String,
    },
    /// Write every recipient, message, mailing and attempt to a JSON file.
    ExportMailingData {
        #[arg(short, long, default_value = "mailing.json")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "herald=info".into()),
        )
        .init();

    let cli = Cli::parse();

    let db_path = match cli.db {
        Some(path) => path,
        None => std::env::var("HERALD_DB_PATH")
            .unwrap_or_else(|_| "herald.db".into())
            .into(),
    };
    let db = Database::open(&db_path)
        .with_context(|| format!("opening database {}", db_path.display()))?;

    match cli.command {
        Commands::SendMailing { mailing_id } => {
            let dispatcher = Dispatcher::from_env()?;
            send_mailing(&db, &dispatcher, mailing_id).await
        }
        Commands::CreateManagerGroup => create_manager_group(&db),
        Commands::AddManager { username } => add_manager(&db, &username),
        Commands::ExportMailingData { output } => export_mailing_data(&db, &output),
    }
}

async fn send_mailing(db: &Database, dispatcher: &Dispatcher, mailing_id: Uuid) -> Result<()> {
    match dispatcher.dispatch(db, mailing_id).await {
        Ok(()) => {
            println!("Successfully sent mailing {}", mailing_id);
            Ok(())
        }
        Err(DispatchError::NotFound(id)) => bail!("Mailing {} does not exist", id),
        Err(DispatchError::Store(e)) => Err(e),
    }
}

fn create_manager_group(db: &Database) -> Result<()> {
    if db.ensure_group(MANAGERS_GROUP)? {
        println!("Group '{}' created", MANAGERS_GROUP);
    } else {
        println!("Group '{}' already exists", MANAGERS_GROUP);
    }
    Ok(())
}

fn add_manager(db: &Database, username: &str) -> Result<()> {
    let user = db
        .get_user_by_username(username)?
        .with_context(|| format!("no user named '{}'", username))?;
    db.add_user_to_group(&user.id, MANAGERS_GROUP)
        .with_context(|| format!("run create-manager-group before adding '{}'", username))?;
    println!("User '{}' is now in '{}'", username, MANAGERS_GROUP);
    Ok(())
}

fn export_mailing_data(db: &Database, output: &Path) -> Result<()> {
    let mailing_rows = db.list_mailings(None)?;
    let ids: Vec<String> = mailing_rows.iter().map(|r| r.id.clone()).collect();
    let mut links = db.get_recipient_ids_for_mailings(&ids)?;

    let export = DataExport {
        recipients: db.list_recipients(None)?.into_iter().map(|r| r.into_model()).collect(),
        messages: db.list_messages(None)?.into_iter().map(|r| r.into_model()).collect(),
        mailings: mailing_rows
            .into_iter()
            .map(|row| {
                let recipient_ids = links.remove(&row.id).unwrap_or_default();
                row.into_model(recipient_ids)
            })
            .collect(),
        mailing_attempts: db.list_attempts(None)?.into_iter().map(|r| r.into_model()).collect(),
    };

    let json = serde_json::to_string_pretty(&export)?;
    std::fs::write(output, json).with_context(|| format!("writing {}", output.display()))?;

    info!(
        "Exported {} recipients, {} messages, {} mailings, {} attempts",
        export.recipients.len(),
        export.messages.len(),
        export.mailings.len(),
        export.mailing_attempts.len()
    );
    println!("Data exported to {}", output.display());
    Ok(())
}
