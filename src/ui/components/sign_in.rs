use eframe::egui;

use crate::ui::state::Notice;

/// Full-window sign-in prompt. Returns true when the button was clicked.
pub fn render(ui: &mut egui::Ui, notice: Option<&Notice>, consent_url: Option<&str>) -> bool {
    let mut clicked = false;
    ui.vertical_centered(|ui| {
        ui.add_space((ui.available_height() / 2.0 - 40.0).max(0.0));

        let button = egui::Button::new(
            egui::RichText::new("Sign in with Google")
                .size(20.0)
                .strong()
                .color(egui::Color32::BLACK),
        )
        .fill(egui::Color32::WHITE)
        .corner_radius(egui::CornerRadius::same(12))
        .min_size(egui::vec2(240.0, 48.0));
        clicked = ui.add(button).clicked();

        if let Some(url) = consent_url {
            ui.add_space(8.0);
            ui.hyperlink_to("Browser did not open? Continue here", url);
        }

        if let Some(Notice::SignIn(reason)) = notice {
            ui.add_space(8.0);
            ui.label(egui::RichText::new(format!("Not signed in: {reason}")).weak());
        }
    });
    clicked
}
