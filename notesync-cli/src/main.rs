mod commands;
mod session_file;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use notesync_core::{logging::setup_tracing, Config, NotesStore};

use crate::commands::Command;

#[derive(Parser)]
#[command(name = "notesync")]
#[command(about = "Share short notes and get told when others post")]
struct Cli {
    /// Where the signed-in session is kept
    #[arg(long, env = "NOTESYNC_SESSION_FILE")]
    session_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::from_env().context("NOTESYNC_BACKEND_URL and NOTESYNC_ANON_KEY must be set")?;
    setup_tracing("notesync_cli=info,notesync_core=info", config.log_json);

    let session_path = match cli.session_file {
        Some(path) => path,
        None => session_file::default_path()?,
    };
    let store = Arc::new(NotesStore::from_config(&config)?);

    let mut stdout = std::io::stdout();
    commands::run(cli.command, store, &session_path, &config, &mut stdout).await
}
