use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tokio::sync::mpsc;

use event_chat::chat::ChatService;
use event_chat::config::{self, AppConfig};
use event_chat::storage::{self, DocumentService, LocalAttachmentStore, SqliteProfileDirectory};
use event_chat::ui::ChatApp;
use event_chat::worker::ChatWorker;

#[derive(Parser)]
#[command(name = "event_chat", version, about = "Organizer/attendee chat for events")]
struct Cli {
    /// Path to JSON config file
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH, value_name = "FILE")]
    config: String,
    /// Signed-in user id (falls back to EVENT_CHAT_USER / default_user)
    #[arg(long, value_name = "ID")]
    user: Option<String>,
    #[command(subcommand)]
    mode: Option<Mode>,
}

#[derive(Subcommand)]
enum Mode {
    /// Print the user's conversations once
    Conversations,
    /// Print the conversation with another user (marks it read)
    History {
        #[arg(long, value_name = "ID")]
        with: String,
    },
    /// Send a message, optionally with an image
    Send {
        #[arg(long, value_name = "ID")]
        to: String,
        #[arg(long)]
        text: Option<String>,
        #[arg(long, value_name = "FILE")]
        image: Option<PathBuf>,
    },
    /// Create or update the user's display profile
    Profile {
        #[arg(long)]
        name: String,
        #[arg(long, value_name = "URL")]
        avatar: Option<String>,
    },
    /// Recompute every unread counter from the message log
    Reconcile,
}

struct Backend {
    chat: ChatService,
    profiles: SqliteProfileDirectory,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenv().ok();
    // Khởi tạo Logger để debug
    env_logger::init();

    let cli = Cli::parse();
    let app_config = config::apply_env_overrides(config::load_config(&cli.config));
    let backend = open_backend(&app_config)?;
    let viewer = cli.user.or_else(|| app_config.default_user.clone());

    match cli.mode {
        None => run_desktop(backend, require_user(viewer)?, &app_config).await,
        Some(mode) => run_command(backend, viewer, mode).await,
    }
}

fn open_backend(app_config: &AppConfig) -> Result<Backend, Box<dyn Error>> {
    storage::ensure_parent_dir(&app_config.database_path)?;
    let service = DocumentService::open(&app_config.database_path)?;
    let profiles = SqliteProfileDirectory::new(service.clone());
    let chat = ChatService::new(
        service,
        Arc::new(profiles.clone()),
        Arc::new(LocalAttachmentStore::new(&app_config.attachments_dir)),
        app_config.subscription_buffer,
    );
    log::info!("Chat database at {}", app_config.database_path);
    Ok(Backend { chat, profiles })
}

fn require_user(viewer: Option<String>) -> Result<String, Box<dyn Error>> {
    viewer
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| format!("no user: pass --user or set {}", config::ENV_USER).into())
}

async fn run_command(
    backend: Backend,
    viewer: Option<String>,
    mode: Mode,
) -> Result<(), Box<dyn Error>> {
    let chat = backend.chat;
    match mode {
        Mode::Reconcile => {
            // Không cần user: sửa toàn bộ bộ đếm
            let corrected = chat.unread().reconcile_all().await?;
            println!("Corrected {corrected} conversation(s)");
        }
        Mode::Conversations => {
            let viewer = require_user(viewer)?;
            let list = chat.list_view().snapshot(&viewer).await?;
            if list.is_empty() {
                println!("No conversations");
            }
            for summary in list {
                println!(
                    "{:>3}  {} ({})  {}",
                    summary.unread,
                    summary.counterpart.display_name,
                    summary.counterpart.id,
                    summary.last_message.unwrap_or_default()
                );
            }
        }
        Mode::History { with } => {
            let viewer = require_user(viewer)?;
            let mut session = chat.open_session(&viewer, &with).await?;
            if let Some(messages) = session.next_messages().await {
                for message in messages? {
                    let sender = if message.sender == viewer { "you" } else { with.as_str() };
                    let body = match (&message.text, &message.attachment) {
                        (Some(text), Some(url)) => format!("{text} [{url}]"),
                        (Some(text), None) => text.clone(),
                        (None, Some(url)) => format!("[{url}]"),
                        (None, None) => String::new(),
                    };
                    println!("{} {sender}: {body}", message.created_at);
                }
            }
            session.close();
        }
        Mode::Send { to, text, image } => {
            let viewer = require_user(viewer)?;
            let session = chat.open_session(&viewer, &to).await?;
            let sent = match image {
                Some(path) => {
                    let bytes = tokio::fs::read(&path).await?;
                    let file_name = path.file_name().and_then(|name| name.to_str());
                    session.send_attachment(file_name, bytes, text).await?
                }
                None => session.send_text(text.as_deref().unwrap_or_default()).await?,
            };
            println!("Sent {} to {}", sent.id, session.key());
            session.close();
        }
        Mode::Profile { name, avatar } => {
            let viewer = require_user(viewer)?;
            backend.profiles.upsert(&viewer, &name, avatar.as_deref()).await?;
            println!("Profile saved for {viewer}");
        }
    }
    Ok(())
}

async fn run_desktop(backend: Backend, viewer: String, app_config: &AppConfig) -> Result<(), Box<dyn Error>> {
    // 1. Tạo các kênh giao tiếp (Channels)
    // UI -> Worker
    let (cmd_tx, cmd_rx) = mpsc::channel(100);
    // Worker -> UI
    let (event_tx, event_rx) = mpsc::channel(100);

    // 2. Khởi chạy chat worker (Chạy ngầm)
    let reconcile_every = (app_config.reconcile_interval_secs > 0)
        .then(|| Duration::from_secs(app_config.reconcile_interval_secs));
    let worker = ChatWorker::new(backend.chat, viewer.clone(), event_tx, cmd_rx, reconcile_every);
    tokio::spawn(async move {
        if let Err(err) = worker.run().await {
            log::error!("Chat worker terminated: {err}");
        }
    });

    // 3. Khởi chạy UI (Chạy trên Main Thread)
    let options = eframe::NativeOptions::default();
    let mut event_rx = Some(event_rx);

    eframe::run_native(
        "Event Chat",
        options,
        Box::new(move |cc| {
            let event_receiver = event_rx
                .take()
                .expect("ChatApp should only be initialized once");

            log::info!("Desktop chat started for {viewer}");
            Ok(Box::new(ChatApp::new(cc, viewer.clone(), cmd_tx.clone(), event_receiver)))
        }),
    )?;
    Ok(())
}
