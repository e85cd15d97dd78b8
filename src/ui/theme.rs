use eframe::egui::Color32;

pub const BACKGROUND: Color32 = Color32::from_rgb(0x20, 0x23, 0x29);
pub const HEADER: Color32 = Color32::from_rgb(0x9c, 0xa3, 0xaf);
pub const SENT: Color32 = Color32::from_rgb(0x6b, 0x8a, 0xfd);
pub const RECEIVED: Color32 = Color32::from_rgb(0x2e, 0x33, 0x3d);
pub const AVATAR_PLACEHOLDER: Color32 = Color32::from_rgb(0x14, 0xb8, 0xa6);
pub const DANGER: Color32 = Color32::from_rgb(0xef, 0x44, 0x44);

pub const AVATAR_SIZE: f32 = 48.0;
pub const RUN_GAP: f32 = 16.0;
pub const INNER_GAP: f32 = 4.0;
