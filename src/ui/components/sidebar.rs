use crate::ui::state::AppState;
use eframe::egui;

#[derive(Default)]
pub struct SidebarActions {
    pub open_counterpart: Option<String>,
}

pub fn render(ui: &mut egui::Ui, state: &mut AppState) -> SidebarActions {
    let mut actions = SidebarActions::default();

    let unread = state.total_unread();
    if unread > 0 {
        ui.heading(format!("Conversations ({unread} unread)"));
    } else {
        ui.heading("Conversations");
    }
    ui.label(egui::RichText::new(format!("Signed in as {}", state.viewer)).weak());
    ui.separator();

    // Bắt đầu hội thoại mới theo user id
    ui.label("Chat with user:");
    ui.horizontal(|ui| {
        ui.text_edit_singleline(&mut state.new_chat_input);
        if ui.button("Open").clicked() && !state.new_chat_input.trim().is_empty() {
            actions.open_counterpart = Some(state.new_chat_input.trim().to_string());
            state.new_chat_input.clear();
        }
    });

    ui.separator();

    if state.conversations.is_empty() {
        ui.label("No conversations yet");
        return actions;
    }

    let open_key = state.open.as_ref().map(|open| open.key.clone());
    for summary in &state.conversations {
        ui.horizontal(|ui| {
            let name = if open_key.as_deref() == Some(summary.key.as_str()) {
                egui::RichText::new(&summary.counterpart.display_name).strong()
            } else {
                egui::RichText::new(&summary.counterpart.display_name)
            };
            if ui.button(name).clicked() {
                actions.open_counterpart = Some(summary.counterpart.id.clone());
            }

            if summary.unread > 0 {
                ui.colored_label(egui::Color32::LIGHT_BLUE, format!("● {}", summary.unread));
            }
        });

        if let Some(preview) = &summary.last_message {
            ui.label(egui::RichText::new(preview).weak().small());
        }
    }

    actions
}
