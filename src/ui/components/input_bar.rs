use std::path::PathBuf;

use eframe::egui;

use crate::ui::state::AppState;

pub enum InputAction {
    Text(String),
    Image(PathBuf),
}

pub fn render(ui: &mut egui::Ui, state: &mut AppState) -> Option<InputAction> {
    let mut send = false;
    ui.horizontal(|ui| {
        let response = ui.text_edit_singleline(&mut state.input_text);
        if ui.button("Send").clicked() {
            send = true;
        }

        if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
            send = true;
        }
    });

    let mut attach = false;
    ui.horizontal(|ui| {
        ui.label("Image file:");
        ui.text_edit_singleline(&mut state.image_path_input);
        if ui.button("Attach").clicked() {
            attach = true;
        }
    });

    if attach {
        if let Some(path) = state.take_image_path() {
            return Some(InputAction::Image(path));
        }
    }

    // Tin nhắn rỗng bị chặn ngay tại UI
    if send && !state.input_text.trim().is_empty() {
        let message = state.input_text.clone();
        state.input_text.clear();
        return Some(InputAction::Text(message));
    }

    None
}
