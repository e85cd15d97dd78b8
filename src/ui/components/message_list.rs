use std::collections::HashMap;

use eframe::egui;

use crate::common::ChatMessage;
use crate::ui::grouping::{MessageLayout, avatar_tooltip, classify};
use crate::ui::theme;

pub fn render(
    ui: &mut egui::Ui,
    messages: &[ChatMessage],
    current_uid: &str,
    avatars: &HashMap<String, egui::TextureHandle>,
    scroll_to_bottom: &mut bool,
) {
    let layouts = classify(messages, current_uid);

    egui::ScrollArea::vertical()
        .id_salt("chat_messages")
        .auto_shrink([false, false])
        .stick_to_bottom(true)
        .show(ui, |ui| {
            ui.spacing_mut().item_spacing.y = 0.0;
            for (message, layout) in messages.iter().zip(&layouts) {
                render_row(ui, message, *layout, avatars);
                ui.add_space(if layout.last_of_run {
                    theme::RUN_GAP
                } else {
                    theme::INNER_GAP
                });
            }

            if *scroll_to_bottom {
                ui.scroll_to_cursor(Some(egui::Align::BOTTOM));
                *scroll_to_bottom = false;
            }
        });
}

fn render_row(
    ui: &mut egui::Ui,
    message: &ChatMessage,
    layout: MessageLayout,
    avatars: &HashMap<String, egui::TextureHandle>,
) {
    // Sent rows are mirrored: avatar on the trailing edge.
    let direction = if layout.sent {
        egui::Layout::right_to_left(egui::Align::Max)
    } else {
        egui::Layout::left_to_right(egui::Align::Max)
    };
    let max_bubble = (ui.available_width() * 0.75).max(120.0);

    ui.with_layout(direction, |ui| {
        ui.spacing_mut().item_spacing.x = 16.0;
        render_avatar(ui, message, layout, avatars);

        let fill = if layout.sent {
            theme::SENT
        } else {
            theme::RECEIVED
        };
        egui::Frame::new()
            .fill(fill)
            .corner_radius(egui::CornerRadius::same(8))
            .inner_margin(egui::Margin::same(8))
            .show(ui, |ui| {
                ui.set_max_width(max_bubble);
                ui.set_min_height(theme::AVATAR_SIZE - 16.0);
                ui.add(
                    egui::Label::new(
                        egui::RichText::new(&message.text)
                            .size(14.0)
                            .color(egui::Color32::WHITE),
                    )
                    .wrap(),
                );
            });
    });
}

fn render_avatar(
    ui: &mut egui::Ui,
    message: &ChatMessage,
    layout: MessageLayout,
    avatars: &HashMap<String, egui::TextureHandle>,
) {
    let size = egui::vec2(theme::AVATAR_SIZE, theme::AVATAR_SIZE);
    let (rect, response) = ui.allocate_exact_size(size, egui::Sense::hover());
    if let Some(name) = avatar_tooltip(message) {
        response.on_hover_text(name);
    }

    // Interior rows keep the slot empty so the bubbles stay aligned.
    if !layout.last_of_run {
        return;
    }

    let texture = message
        .photo_url
        .as_ref()
        .and_then(|url| avatars.get(url));
    match texture {
        Some(texture) => {
            egui::Image::from_texture(texture)
                .corner_radius(egui::CornerRadius::same(12))
                .paint_at(ui, rect);
        }
        None => {
            ui.painter().rect_filled(
                rect,
                egui::CornerRadius::same(12),
                theme::AVATAR_PLACEHOLDER,
            );
        }
    }
}
