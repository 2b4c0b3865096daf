use std::path::Path;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};

use crate::chat::{ChatService, ChatSession, Subscription};
use crate::common::{ChatCommand, ChatEvent, ConversationSummary, Message};
use crate::error::{ChatError, Result};

// Chờ một chút trước khi đăng ký lại sau lỗi
const RESUBSCRIBE_DELAY: Duration = Duration::from_secs(2);

struct OpenConversation {
    session: ChatSession,
    /// Highest incoming `seq` already marked read.
    read_up_to: i64,
}

/// Background task behind the desktop view. Owns the live subscriptions
/// and cancels them when the UI goes away.
pub struct ChatWorker {
    chat: ChatService,
    viewer: String,
    event_sender: mpsc::Sender<ChatEvent>,
    command_receiver: mpsc::Receiver<ChatCommand>,
    reconcile_every: Option<Duration>,
}

impl ChatWorker {
    pub fn new(
        chat: ChatService,
        viewer: String,
        event_sender: mpsc::Sender<ChatEvent>,
        command_receiver: mpsc::Receiver<ChatCommand>,
        reconcile_every: Option<Duration>,
    ) -> Self {
        Self {
            chat,
            viewer,
            event_sender,
            command_receiver,
            reconcile_every,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        let mut conversations = self.chat.list_view().subscribe(&self.viewer);
        let mut open: Option<OpenConversation> = None;
        let mut ticker = self.reconcile_every.map(|period| {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
        log::info!("Chat worker started for {}", self.viewer);

        loop {
            tokio::select! {
                command = self.command_receiver.recv() => {
                    if let Some(command) = command {
                        self.handle_command(command, &mut open).await;
                    } else {
                        break;
                    }
                }
                snapshot = conversations.next() => {
                    self.handle_conversations(snapshot, &mut conversations).await;
                }
                snapshot = next_messages(&mut open) => {
                    self.handle_messages(snapshot, &mut open).await;
                }
                _ = tick(&mut ticker) => {
                    match self.chat.unread().reconcile_all().await {
                        Ok(0) => {}
                        Ok(corrected) => log::info!("Reconciled {corrected} unread counters"),
                        Err(err) => log::warn!("Unread reconciliation failed: {err}"),
                    }
                }
            }
        }

        if let Some(open) = open.take() {
            open.session.close();
        }
        conversations.cancel();
        log::info!("Chat worker stopped for {}", self.viewer);
        Ok(())
    }

    async fn handle_command(&mut self, command: ChatCommand, open: &mut Option<OpenConversation>) {
        match command {
            ChatCommand::OpenConversation { counterpart } => {
                if let Some(previous) = open.take() {
                    previous.session.close();
                }
                match self.open_conversation(&counterpart).await {
                    Ok((conversation, event)) => {
                        *open = Some(conversation);
                        self.emit(event).await;
                    }
                    Err(err) => self.emit_error(&err).await,
                }
            }
            ChatCommand::CloseConversation => {
                if let Some(previous) = open.take() {
                    previous.session.close();
                }
            }
            ChatCommand::SendText(text) => {
                let result = match open {
                    Some(open) => open.session.send_text(&text).await.map(|_| ()),
                    None => Err(no_open_conversation()),
                };
                if let Err(err) = result {
                    self.emit_error(&err).await;
                }
            }
            ChatCommand::SendImage(path) => {
                let result = match open {
                    Some(open) => send_image(&open.session, &path).await,
                    None => Err(no_open_conversation()),
                };
                if let Err(err) = result {
                    self.emit_error(&err).await;
                }
            }
        }
    }

    async fn open_conversation(&self, counterpart: &str) -> Result<(OpenConversation, ChatEvent)> {
        let session = self.chat.open_session(&self.viewer, counterpart).await?;
        let counterpart = self.chat.participant(counterpart).await?;
        let event = ChatEvent::ConversationOpened {
            key: session.key().to_string(),
            counterpart,
        };
        Ok((
            OpenConversation {
                session,
                read_up_to: 0,
            },
            event,
        ))
    }

    async fn handle_conversations(
        &mut self,
        snapshot: Option<Result<Vec<ConversationSummary>>>,
        conversations: &mut Subscription<Vec<ConversationSummary>>,
    ) {
        match snapshot {
            Some(Ok(list)) => {
                log::debug!("{} conversations for {}", list.len(), self.viewer);
                self.emit(ChatEvent::ConversationsUpdated(list)).await;
            }
            Some(Err(err)) => {
                self.emit_error(&err).await;
                tokio::time::sleep(RESUBSCRIBE_DELAY).await;
                *conversations = self.chat.list_view().subscribe(&self.viewer);
            }
            None => {
                tokio::time::sleep(RESUBSCRIBE_DELAY).await;
                *conversations = self.chat.list_view().subscribe(&self.viewer);
            }
        }
    }

    async fn handle_messages(
        &mut self,
        snapshot: Option<Result<Vec<Message>>>,
        open: &mut Option<OpenConversation>,
    ) {
        let Some(current) = open.as_mut() else {
            return;
        };

        match snapshot {
            Some(Ok(messages)) => {
                // Người xem đang mở hội thoại nên tin mới coi như đã đọc
                let newest_incoming = messages
                    .iter()
                    .filter(|m| m.sender != current.session.viewer())
                    .map(|m| m.seq)
                    .max()
                    .unwrap_or(0);
                if newest_incoming > current.read_up_to {
                    match current.session.mark_read().await {
                        Ok(()) => current.read_up_to = newest_incoming,
                        Err(err) => log::warn!("Failed to mark {} read: {err}", current.session.key()),
                    }
                }

                let key = current.session.key().to_string();
                self.emit(ChatEvent::MessagesUpdated { key, messages }).await;
            }
            Some(Err(err)) => {
                self.emit_error(&err).await;
                tokio::time::sleep(RESUBSCRIBE_DELAY).await;
                current.session.resubscribe();
            }
            None => {
                tokio::time::sleep(RESUBSCRIBE_DELAY).await;
                current.session.resubscribe();
            }
        }
    }

    async fn emit(&self, event: ChatEvent) {
        if let Err(err) = self.event_sender.send(event).await {
            log::warn!("Failed to notify UI: {err}");
        }
    }

    async fn emit_error(&self, err: &ChatError) {
        log::warn!("Chat operation failed: {err}");
        self.emit(ChatEvent::Error {
            message: err.to_string(),
            retryable: err.is_retryable(),
        })
        .await;
    }
}

async fn next_messages(open: &mut Option<OpenConversation>) -> Option<Result<Vec<Message>>> {
    match open {
        Some(open) => open.session.next_messages().await,
        None => std::future::pending().await,
    }
}

async fn tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn send_image(session: &ChatSession, path: &Path) -> Result<()> {
    let bytes = tokio::fs::read(path).await?;
    let file_name = path.file_name().and_then(|name| name.to_str());
    session.send_attachment(file_name, bytes, None).await?;
    Ok(())
}

fn no_open_conversation() -> ChatError {
    ChatError::Validation("no conversation is open".to_string())
}
