#![deny(dead_code)] // DO NOT REMOVE THIS EVER
use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{info, LevelFilter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

mod display;
mod settings;
mod utils;

use crate::settings::Settings;
use tenant_chat::messaging::{ChatSession, ChatSnapshot, HttpApi, MessagesApi, MessagingError, Notice, SendOutcome};

const WRAP_WIDTH: usize = 72;

/// Command line arguments for tenant-chat
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "tenant-chat: talk to landlords and tenants from the terminal.",
    long_about = "tenant-chat reads and sends marketplace messages through the messages backend.\n\n\
    The session identity is read from session.json in the config directory,\n\
    then TENANT_CHAT_BASE_URL / TENANT_CHAT_USER_ID / TENANT_CHAT_TOKEN, then the flags below."
)]
struct Args {
    /// Backend base URL, e.g. http://localhost:3333
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    /// Act as this user for this run only
    #[arg(long, value_name = "ID")]
    user_id: Option<String>,

    /// Directory holding session.json
    #[arg(long, value_name = "PATH")]
    config_dir: Option<PathBuf>,

    #[arg(long, value_name = "PATH", default_value = "tenant-chat.log")]
    log_file: PathBuf,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Store the session identity and backend settings
    Session {
        #[arg(long, value_name = "ID")]
        user_id: Option<String>,
        #[arg(long, value_name = "URL")]
        base_url: Option<String>,
        #[arg(long)]
        token: Option<String>,
        #[arg(long, value_name = "SECS")]
        poll_interval_secs: Option<u64>,
    },
    #[command(flatten)]
    Backend(BackendCommand),
}

/// Commands that talk to the messages backend
#[derive(Subcommand, Debug)]
enum BackendCommand {
    /// List your conversations
    Conversations,
    /// Show the thread with a contact
    Thread { contact: String },
    /// Send one message to a contact
    Send {
        contact: String,
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
    },
    /// Mark a message as read
    MarkRead { message_id: String },
    /// Interactive chat
    Chat {
        /// Contact to open right away
        #[arg(long = "with", value_name = "CONTACT")]
        with: Option<String>,
    },
}

/// What a line typed in interactive mode asks for
#[derive(Debug, PartialEq)]
enum ChatInput {
    Quit,
    Open(String),
    Refresh,
    Retry,
    Text(String),
    Nothing,
}

fn parse_input(line: &str) -> ChatInput {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ChatInput::Nothing;
    }
    match trimmed.split_once(' ') {
        Some(("/open", contact)) if !contact.trim().is_empty() => ChatInput::Open(contact.trim().to_string()),
        _ => match trimmed {
            "/quit" | "/exit" => ChatInput::Quit,
            "/refresh" => ChatInput::Refresh,
            "/retry" => ChatInput::Retry,
            // Anything else is a message, sent exactly as typed
            _ => ChatInput::Text(line.to_string()),
        },
    }
}

fn store_session(
    path: &Path,
    mut stored: Settings,
    user_id: Option<String>,
    base_url: Option<String>,
    token: Option<String>,
    poll_interval_secs: Option<u64>,
) -> Result<()> {
    if let Some(user_id) = user_id {
        stored.user_id = Some(user_id);
    }
    if stored.user_id.is_none() {
        eprintln!("Enter your user id:");
        let user_id = utils::read_line()?;
        if user_id.is_empty() {
            return Err(anyhow!("A user id is required"));
        }
        stored.user_id = Some(user_id);
    }
    if let Some(base_url) = base_url {
        stored.base_url = base_url;
    }
    if let Some(token) = token {
        stored.token = Some(token);
    }
    if let Some(secs) = poll_interval_secs {
        stored.poll_interval_secs = secs;
    }

    settings::save_settings(path, &stored)?;
    println!("Session saved to {}", path.display());
    Ok(())
}

fn print_notices(notices: &mut mpsc::Receiver<Notice>) {
    while let Ok(notice) = notices.try_recv() {
        eprintln!("{}", display::render_notice(&notice));
    }
}

fn print_screen(snapshot: &ChatSnapshot, me: &str) {
    println!("{}", display::render_directory(&snapshot.directory));
    println!();
    println!("{}", display::render_thread(&snapshot.thread, me, WRAP_WIDTH));
    if snapshot.sending {
        println!("(sending...)");
    }
}

async fn run_chat(
    session: &ChatSession,
    notices: &mut mpsc::Receiver<Notice>,
    me: &str,
    initial_contact: Option<String>,
    poll_interval: Duration,
) -> Result<()> {
    session.open(initial_contact.as_deref()).await;
    let mut shown = session.snapshot().await;
    print_screen(&shown, me);
    println!("Type a message and press Enter. /open <id>, /refresh, /retry, /quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line? {
                    Some(line) => line,
                    None => break,
                };
                match parse_input(&line) {
                    ChatInput::Quit => break,
                    ChatInput::Nothing => continue,
                    ChatInput::Open(contact) => {
                        let _ = session.select_contact(&contact).await;
                    }
                    ChatInput::Refresh => session.refresh().await,
                    ChatInput::Retry => {
                        let _ = session.submit().await;
                    }
                    ChatInput::Text(text) => {
                        session.set_draft(&text).await;
                        let _ = session.submit().await;
                    }
                }
                print_notices(notices);
                shown = session.snapshot().await;
                print_screen(&shown, me);
                if !shown.draft.is_empty() {
                    println!("Draft kept: {} (/retry to send again)", shown.draft);
                }
            }
            _ = ticker.tick() => {
                session.refresh().await;
                let latest = session.snapshot().await;
                if latest.thread != shown.thread || latest.directory != shown.directory {
                    shown = latest;
                    print_screen(&shown, me);
                }
            }
            Some(notice) = notices.recv() => {
                eprintln!("{}", display::render_notice(&notice));
            }
        }
    }

    session.settle_read_marks().await;
    info!("Leaving interactive chat");
    Ok(())
}

async fn run(command: BackendCommand, settings: Settings) -> Result<()> {
    let api: Arc<dyn MessagesApi> = Arc::new(HttpApi::new(&settings.api_config())?);
    let (session, mut notices) = ChatSession::new(api, settings.user_id.clone());
    let me = session
        .user_id()
        .ok_or_else(|| anyhow!("No session identity. Run `tenant-chat session --user-id <id>` first."))?
        .to_string();

    let show_screen = matches!(command, BackendCommand::Conversations | BackendCommand::Thread { .. });
    let result = match command {
        BackendCommand::Conversations => session.load_conversations().await.map(|_| ()),
        BackendCommand::Thread { contact } => {
            // Names for the header come from the directory
            let _ = session.load_conversations().await;
            match session.select_contact(&contact).await {
                // Unknown contact renders as an empty thread
                Ok(_) | Err(MessagingError::NotFound(_)) => Ok(()),
                Err(e) => Err(e),
            }
        }
        BackendCommand::Send { contact, text } => {
            let text = text.join(" ");
            session.send_to(&contact, &text).await.map(|outcome| {
                if let SendOutcome::Sent(message) = outcome {
                    println!("Sent {} to {}", message.public_id, contact);
                }
            })
        }
        BackendCommand::MarkRead { message_id } => session.dispatcher().mark_read(&message_id).await.map(|_| {
            println!("Marked {} read", message_id);
        }),
        BackendCommand::Chat { with } => {
            return run_chat(&session, &mut notices, &me, with, settings.poll_interval()).await;
        }
    };

    let snapshot = session.snapshot().await;
    if result.is_ok() && show_screen {
        if snapshot.thread.header.is_some() {
            println!("{}", display::render_thread(&snapshot.thread, &me, WRAP_WIDTH));
        } else {
            println!("{}", display::render_directory(&snapshot.directory));
        }
    }
    session.settle_read_marks().await;
    print_notices(&mut notices);

    result.map_err(Into::into)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose { LevelFilter::Debug } else { LevelFilter::Info };
    utils::setup_logging(args.log_file.to_str(), level)?;
    info!("System information: {} {}", std::env::consts::OS, std::env::consts::ARCH);

    if let Some(dir) = &args.config_dir {
        settings::set_config_dir_override(dir.clone());
    }
    let path = settings::settings_path()?;
    let stored = settings::load_settings(&path)?.unwrap_or_default();

    match args.command {
        Command::Session { user_id, base_url, token, poll_interval_secs } => {
            store_session(&path, stored, user_id, base_url, token, poll_interval_secs)
        }
        Command::Backend(command) => {
            let mut settings = stored.apply_env();
            if let Some(base_url) = args.base_url {
                settings.base_url = base_url;
            }
            if let Some(user_id) = args.user_id {
                settings.user_id = Some(user_id);
            }
            run(command, settings).await
        }
    }
}
