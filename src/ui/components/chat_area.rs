use chrono::{DateTime, Local, Utc};
use eframe::egui;

use crate::ui::state::AppState;

pub fn render(ui: &mut egui::Ui, state: &AppState) {
    egui::ScrollArea::vertical()
        .stick_to_bottom(true)
        .show(ui, |ui| {
            if state.messages.is_empty() {
                ui.label(egui::RichText::new("No messages yet. Say hello!").weak());
            }

            for message in &state.messages {
                ui.horizontal(|ui| {
                    ui.label(egui::RichText::new(state.sender_label(&message.sender)).strong());
                    ui.label(egui::RichText::new(format_time(message.created_at)).weak().small());
                });
                if let Some(text) = &message.text {
                    ui.label(text.as_str());
                }
                if let Some(url) = &message.attachment {
                    ui.hyperlink_to("📷 Image", url);
                }
                ui.add_space(4.0);
            }
        });
}

fn format_time(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|time| time.with_timezone(&Local).format("%H:%M").to_string())
        .unwrap_or_default()
}
