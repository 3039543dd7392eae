use std::{future::Future, io::Write, path::Path, sync::Arc, time::Duration};

use anyhow::{bail, Context};
use clap::Subcommand;
use notesync_core::{
    notes::{Note, NoteId},
    notifications::Notification,
    poller::spawn_poller,
    Config, NotesStore,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::session_file;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an account and sign in
    Register {
        username: String,
        #[arg(long, env = "NOTESYNC_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Sign in and remember the session
    Login {
        username: String,
        #[arg(long, env = "NOTESYNC_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Sign out and forget the session
    Logout,

    /// Show the community feed, newest first
    Feed,

    /// Show your own notes
    Mine,

    /// Publish a note
    Create {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        content: String,
    },

    /// Change one of your notes; omitted fields keep their value
    Edit {
        id: NoteId,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
    },

    /// Delete one of your notes
    Delete { id: NoteId },

    /// Print notes from other users as they show up, until Ctrl-C
    Watch {
        /// Seconds between checks (defaults to NOTESYNC_POLL_INTERVAL_SECS)
        #[arg(long)]
        interval: Option<u64>,
    },
}

pub async fn run(
    command: Command,
    store: Arc<NotesStore>,
    session_path: &Path,
    config: &Config,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    let result = dispatch(command, store.clone(), session_path, config, out).await;
    // tokens rotated mid-command must outlive it, even when the command failed
    persist_rotated(&store, session_path).await?;
    result
}

async fn dispatch(
    command: Command,
    store: Arc<NotesStore>,
    session_path: &Path,
    config: &Config,
    out: &mut impl Write,
) -> anyhow::Result<()> {
    match command {
        Command::Register { username, password } => {
            store.sign_up(&username, &password).await?;
            let session = store.sign_in(&username, &password).await?;
            session_file::save(session_path, &session)?;
            writeln!(out, "Registered and signed in as @{}", display_name(&session.user.username, &username))?;
        }
        Command::Login { username, password } => {
            let session = store.sign_in(&username, &password).await?;
            session_file::save(session_path, &session)?;
            writeln!(out, "Signed in as @{}", display_name(&session.user.username, &username))?;
        }
        Command::Logout => {
            if resume(&store, session_path).await? {
                if let Err(e) = store.sign_out().await {
                    warn!(code = e.code(), "backend sign-out failed, forgetting the session anyway: {}", e);
                }
            }
            session_file::clear(session_path)?;
            writeln!(out, "Signed out")?;
        }
        Command::Feed => {
            resume(&store, session_path).await?;
            store.load_notes().await?;
            print_notes(out, &store.notes().await)?;
        }
        Command::Mine => {
            require_session(&store, session_path).await?;
            store.load_user_notes().await?;
            print_notes(out, &store.user_notes().await)?;
        }
        Command::Create { title, content } => {
            require_session(&store, session_path).await?;
            let note = store.create_note(&title, &content).await?;
            writeln!(out, "Created {}", note.id)?;
        }
        Command::Edit { id, title, content } => {
            require_session(&store, session_path).await?;
            store.load_user_notes().await?;
            let current = store
                .user_notes()
                .await
                .into_iter()
                .find(|note| note.id == id)
                .with_context(|| format!("you have no note {id}"))?;

            let note = store
                .update_note(
                    id,
                    title.as_deref().unwrap_or(&current.title),
                    content.as_deref().unwrap_or(&current.content),
                )
                .await?;
            writeln!(out, "Updated {}", note.id)?;
        }
        Command::Delete { id } => {
            require_session(&store, session_path).await?;
            store.delete_note(id).await?;
            writeln!(out, "Deleted {id}")?;
        }
        Command::Watch { interval } => {
            resume(&store, session_path).await?;
            let interval = Duration::from_secs(interval.unwrap_or(config.poll_interval_secs).max(1));
            let shutdown = async { tokio::signal::ctrl_c().await.context("failed to listen for Ctrl-C") };
            watch(store, interval, shutdown, out).await?;
        }
    }

    Ok(())
}

/// Adopts the stored session, if any. Only a session the backend refuses is
/// forgotten; any other failure leaves the file alone and aborts the command.
async fn resume(store: &NotesStore, session_path: &Path) -> anyhow::Result<bool> {
    let Some(session) = session_file::load(session_path)? else {
        return Ok(false);
    };

    match store.restore_session(session).await {
        Ok(session) => {
            session_file::save(session_path, &session)?;
            Ok(true)
        }
        Err(e) if e.is_auth_rejection() => {
            warn!(code = e.code(), "stored session rejected: {}", e);
            session_file::clear(session_path)?;
            Ok(false)
        }
        Err(e) => Err(e).context("could not verify the stored session"),
    }
}

/// Rewrites the session file when the store refreshed its tokens. A cleared file stays cleared.
async fn persist_rotated(store: &NotesStore, session_path: &Path) -> anyhow::Result<()> {
    let Some(session) = store.session().await else {
        return Ok(());
    };
    match session_file::load(session_path)? {
        Some(saved) if saved != session => {
            debug!("saving rotated session");
            session_file::save(session_path, &session)
        }
        _ => Ok(()),
    }
}

async fn require_session(store: &NotesStore, session_path: &Path) -> anyhow::Result<()> {
    if !resume(store, session_path).await? {
        bail!("not signed in, run `notesync login <username>` first");
    }
    Ok(())
}

/// Prints each batch of new notes until `shutdown` resolves, then acknowledges them all.
async fn watch<S>(store: Arc<NotesStore>, interval: Duration, shutdown: S, out: &mut impl Write) -> anyhow::Result<()>
where
    S: Future<Output = anyhow::Result<()>>,
{
    info!(interval_secs = interval.as_secs(), "watching for new notes");

    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<Notification>>();
    let poller = spawn_poller(store.clone(), interval, move |added| {
        if tx.send(added).is_err() {
            debug!("watch output closed, dropping batch");
        }
    });

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            stopped = &mut shutdown => {
                stopped?;
                break;
            }
            Some(batch) = rx.recv() => {
                for notification in &batch {
                    writeln!(out, "{}", format_notification(notification))?;
                }
                out.flush()?;
            }
        }
    }
    poller.stop();

    let seen = store.unread_count().await;
    store.mark_notifications_read().await;
    writeln!(out, "\n{seen} new note(s) seen")?;
    Ok(())
}

fn display_name<'a>(stored: &'a Option<String>, typed: &'a str) -> &'a str {
    stored.as_deref().unwrap_or(typed)
}

fn print_notes(out: &mut impl Write, notes: &[Note]) -> std::io::Result<()> {
    if notes.is_empty() {
        return writeln!(out, "No notes yet");
    }
    for note in notes {
        writeln!(out, "{}", format_note(note))?;
    }
    Ok(())
}

fn format_note(note: &Note) -> String {
    let author = if note.username.is_empty() { "anonymous" } else { &note.username };
    let mut line = format!("{}  @{}  {}  [{}]", note.timestamp, author, note.title, note.id);
    if !note.content.is_empty() {
        line.push_str("\n    ");
        line.push_str(&note.content.replace('\n', "\n    "));
    }
    line
}

fn format_notification(notification: &Notification) -> String {
    format!("* {}  {}", notification.timestamp, notification.title)
}
