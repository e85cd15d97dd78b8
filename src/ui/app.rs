use std::collections::HashMap;
use std::time::Duration;

use eframe::egui;
use tokio::sync::mpsc;

use crate::common::{AvatarImage, BackendCommand, BackendEvent};

use super::components::{header, input_bar, message_list, sign_in};
use super::state::{AppState, Notice, Screen};
use super::theme;

pub struct ChatApp {
    state: AppState,
    avatars: HashMap<String, egui::TextureHandle>,
    command_sender: mpsc::Sender<BackendCommand>,
    event_receiver: mpsc::Receiver<BackendEvent>,
}

impl ChatApp {
    pub fn new(
        _cc: &eframe::CreationContext<'_>,
        command_sender: mpsc::Sender<BackendCommand>,
        event_receiver: mpsc::Receiver<BackendEvent>,
    ) -> Self {
        Self {
            state: AppState::new(),
            avatars: HashMap::new(),
            command_sender,
            event_receiver,
        }
    }

    fn handle_backend_events(&mut self, ctx: &egui::Context) {
        while let Ok(event) = self.event_receiver.try_recv() {
            match event {
                BackendEvent::SessionChanged(identity) => self.state.set_identity(identity),
                BackendEvent::OpenConsentUrl(url) => {
                    ctx.open_url(egui::OpenUrl::new_tab(&url));
                    self.state.consent_url = Some(url);
                }
                BackendEvent::SignInFailed(reason) => self.state.on_sign_in_failed(reason),
                BackendEvent::Snapshot(messages) => self.state.replace_messages(messages),
                BackendEvent::SubscriptionFailed(reason) => self.state.on_feed_failed(reason),
                BackendEvent::MessageSent { .. } => self.state.on_message_sent(),
                BackendEvent::SendFailed { reason } => self.state.on_send_failed(reason),
                BackendEvent::AvatarLoaded(avatar) => self.load_avatar(ctx, avatar),
            }
        }
    }

    fn load_avatar(&mut self, ctx: &egui::Context, avatar: AvatarImage) {
        let image = egui::ColorImage::from_rgba_unmultiplied([avatar.width, avatar.height], &avatar.rgba);
        let texture = ctx.load_texture(&avatar.url, image, egui::TextureOptions::LINEAR);
        self.avatars.insert(avatar.url, texture);
    }

    fn send_command(&mut self, command: BackendCommand) {
        if let Err(err) = self.command_sender.try_send(command) {
            log::warn!("Failed to send command to backend: {err}");
        }
    }

    fn render_sign_in(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default()
            .frame(egui::Frame::new().fill(theme::BACKGROUND))
            .show(ctx, |ui| {
                let clicked = sign_in::render(
                    ui,
                    self.state.notice.as_ref(),
                    self.state.consent_url.as_deref(),
                );
                if clicked {
                    self.send_command(BackendCommand::SignIn);
                }
            });
    }

    fn render_chat_room(&mut self, ctx: &egui::Context) {
        let Some(identity) = self.state.identity.clone() else {
            return;
        };

        egui::TopBottomPanel::top("chat_header")
            .exact_height(64.0)
            .frame(
                egui::Frame::new()
                    .fill(theme::HEADER)
                    .inner_margin(egui::Margin::symmetric(16, 8)),
            )
            .show(ctx, |ui| {
                if header::render(ui, &identity) {
                    self.send_command(BackendCommand::SignOut);
                }
            });

        egui::TopBottomPanel::bottom("chat_input")
            .frame(
                egui::Frame::new()
                    .fill(theme::BACKGROUND)
                    .inner_margin(egui::Margin::symmetric(16, 8)),
            )
            .show(ctx, |ui| {
                if let Some(notice) = &self.state.notice {
                    let text = match notice {
                        Notice::SendFailed(reason) => format!("Message not sent: {reason}"),
                        Notice::Feed(reason) => format!("Messages are not updating: {reason}"),
                        Notice::SignIn(reason) => reason.clone(),
                    };
                    ui.colored_label(theme::DANGER, text);
                }
                if let Some(draft) = input_bar::render(ui, &mut self.state.input_text) {
                    if self.state.can_submit() {
                        self.send_command(BackendCommand::SendMessage(draft));
                    }
                }
            });

        egui::CentralPanel::default()
            .frame(
                egui::Frame::new()
                    .fill(theme::BACKGROUND)
                    .inner_margin(egui::Margin::symmetric(16, 16)),
            )
            .show(ctx, |ui| {
                message_list::render(
                    ui,
                    &self.state.messages,
                    &identity.uid,
                    &self.avatars,
                    &mut self.state.scroll_to_bottom,
                );
            });
    }
}

impl eframe::App for ChatApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_backend_events(ctx);

        match self.state.screen() {
            Screen::SignIn => self.render_sign_in(ctx),
            Screen::ChatRoom => self.render_chat_room(ctx),
        }

        // Backend events arrive on a channel; poll it even when idle.
        ctx.request_repaint_after(Duration::from_millis(100));
    }
}
