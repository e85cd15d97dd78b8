use eframe::egui;

use crate::common::Identity;
use crate::ui::theme;

/// Greeting and sign-out button. Returns true when sign-out was clicked.
pub fn render(ui: &mut egui::Ui, identity: &Identity) -> bool {
    let mut sign_out = false;
    ui.horizontal_centered(|ui| {
        let name = identity.display_name.as_deref().unwrap_or("there");
        ui.label(
            egui::RichText::new(format!("Hi, {name} 👋"))
                .size(24.0)
                .color(egui::Color32::BLACK),
        );

        ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
            let button = egui::Button::new(
                egui::RichText::new("Sign out")
                    .strong()
                    .color(egui::Color32::WHITE),
            )
            .fill(theme::DANGER)
            .corner_radius(egui::CornerRadius::same(255));
            sign_out = ui.add(button).clicked();
        });
    });
    sign_out
}
