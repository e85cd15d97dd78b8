use eframe::egui;

use crate::ui::theme;

/// Draft box plus send button. Returns the draft to submit; the draft itself
/// is only cleared once the store accepts the message.
pub fn render(ui: &mut egui::Ui, input_text: &mut String) -> Option<String> {
    let mut send = false;
    ui.horizontal(|ui| {
        let can_send = !input_text.is_empty();
        let button_width = 64.0;
        let text_width = (ui.available_width() - button_width - ui.spacing().item_spacing.x).max(120.0);

        let response = ui.add_sized(
            [text_width, 36.0],
            egui::TextEdit::singleline(input_text)
                .hint_text("Write a message...")
                .text_color(egui::Color32::WHITE)
                .background_color(theme::BACKGROUND)
                .frame(false),
        );

        let label = egui::RichText::new("Send").color(if can_send {
            theme::SENT
        } else {
            egui::Color32::GRAY
        });
        if ui
            .add_enabled(can_send, egui::Button::new(label).frame(false))
            .clicked()
        {
            send = true;
        }

        if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
            send = true;
            response.request_focus();
        }
    });

    if send && !input_text.is_empty() {
        return Some(input_text.clone());
    }

    None
}
