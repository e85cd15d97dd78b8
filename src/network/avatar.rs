use std::collections::HashSet;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::common::{AvatarImage, BackendEvent, ChatMessage};

#[derive(Debug, Error)]
pub enum AvatarError {
    #[error("download failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("decode failed: {0}")]
    Decode(#[from] image::ImageError),
}

/// Downloads each distinct avatar once and hands the decoded pixels to the UI.
pub struct AvatarLoader {
    http: reqwest::Client,
    requested: HashSet<String>,
}

impl AvatarLoader {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            requested: HashSet::new(),
        }
    }

    /// URLs from `messages` that have not been requested yet, in first-seen order.
    pub fn claim_new(&mut self, messages: &[ChatMessage]) -> Vec<String> {
        messages
            .iter()
            .filter_map(|message| message.photo_url.as_ref())
            .filter(|url| self.requested.insert((*url).clone()))
            .cloned()
            .collect()
    }

    pub fn load_for(&mut self, messages: &[ChatMessage], events: &mpsc::Sender<BackendEvent>) {
        for url in self.claim_new(messages) {
            let http = self.http.clone();
            let events = events.clone();
            tokio::spawn(async move {
                match fetch(&http, &url).await {
                    Ok(avatar) => {
                        let _ = events.send(BackendEvent::AvatarLoaded(avatar)).await;
                    }
                    Err(err) => log::warn!("Avatar {url} unavailable: {err}"),
                }
            });
        }
    }
}

async fn fetch(http: &reqwest::Client, url: &str) -> Result<AvatarImage, AvatarError> {
    let bytes = http.get(url).send().await?.error_for_status()?.bytes().await?;
    decode(url, &bytes)
}

fn decode(url: &str, bytes: &[u8]) -> Result<AvatarImage, AvatarError> {
    let rgba = image::load_from_memory(bytes)?.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(AvatarImage {
        url: url.to_string(),
        width: width as usize,
        height: height as usize,
        rgba: rgba.into_raw(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Timestamp;

    fn message(id: &str, photo: Option<&str>) -> ChatMessage {
        ChatMessage {
            id: id.into(),
            uid: "A".into(),
            display_name: None,
            photo_url: photo.map(str::to_owned),
            text: String::new(),
            created_at: Timestamp::Pending,
        }
    }

    #[test]
    fn each_url_is_claimed_once() {
        let mut loader = AvatarLoader::new(reqwest::Client::new());
        let first = vec![message("1", Some("a.png")), message("2", Some("a.png")), message("3", None)];
        assert_eq!(loader.claim_new(&first), vec!["a.png".to_string()]);

        let second = vec![message("4", Some("a.png")), message("5", Some("b.png"))];
        assert_eq!(loader.claim_new(&second), vec!["b.png".to_string()]);
    }

    #[test]
    fn decodes_png_to_rgba() {
        let mut png = Vec::new();
        image::RgbaImage::from_pixel(2, 3, image::Rgba([1, 2, 3, 255]))
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let avatar = decode("x.png", &png).unwrap();
        assert_eq!((avatar.width, avatar.height), (2, 3));
        assert_eq!(&avatar.rgba[..4], &[1, 2, 3, 255]);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(decode("x", b"not an image"), Err(AvatarError::Decode(_))));
    }
}
