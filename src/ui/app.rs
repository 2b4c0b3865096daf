use eframe::egui;
use tokio::sync::mpsc;

use crate::common::{ChatCommand, ChatEvent};

use super::components::{
    chat_area,
    input_bar::{self, InputAction},
    sidebar::{self, SidebarActions},
};
use super::state::AppState;

pub struct ChatApp {
    state: AppState,
    command_sender: mpsc::Sender<ChatCommand>,
    event_receiver: mpsc::Receiver<ChatEvent>,
}

impl ChatApp {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        viewer: String,
        command_sender: mpsc::Sender<ChatCommand>,
        event_receiver: mpsc::Receiver<ChatEvent>,
    ) -> Self {
        Self {
            state: AppState::new(viewer),
            command_sender,
            event_receiver,
        }
    }

    fn handle_chat_events(&mut self) {
        while let Ok(event) = self.event_receiver.try_recv() {
            self.state.apply(event);
        }
    }

    fn send_command(&mut self, command: ChatCommand) {
        if let Err(err) = self.command_sender.try_send(command) {
            log::warn!("Failed to send command to chat worker: {err}");
        }
    }
}

impl eframe::App for ChatApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_chat_events();

        egui::SidePanel::left("conversation_sidebar")
            .resizable(true)
            .default_width(240.0)
            .show(ctx, |ui| {
                let actions: SidebarActions = sidebar::render(ui, &mut self.state);
                if let Some(counterpart) = actions.open_counterpart {
                    self.send_command(ChatCommand::OpenConversation { counterpart });
                }
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            if let Some(error) = &self.state.error {
                let hint = if error.retryable { " (will retry)" } else { "" };
                ui.colored_label(egui::Color32::RED, format!("{}{hint}", error.message));
            }

            let Some(open) = self.state.open.clone() else {
                ui.heading("Event Chat");
                ui.label("Pick a conversation on the left.");
                return;
            };

            ui.horizontal(|ui| {
                ui.heading(&open.counterpart.display_name);
                if ui.button("Close").clicked() {
                    self.state.close_conversation();
                    self.send_command(ChatCommand::CloseConversation);
                }
            });
            ui.separator();
            chat_area::render(ui, &self.state);

            ui.separator();
            match input_bar::render(ui, &mut self.state) {
                Some(InputAction::Text(content)) => self.send_command(ChatCommand::SendText(content)),
                Some(InputAction::Image(path)) => self.send_command(ChatCommand::SendImage(path)),
                None => {}
            }
        });

        ctx.request_repaint_after(std::time::Duration::from_millis(250));
    }
}
