//! System clipboard access through `arboard`.
//!
//! Text wins over images. Images are re-encoded as PNG and sent base64
//! encoded, so peers never see platform pixel formats.

use std::io::Cursor;

use arboard::Clipboard;
use base64::{Engine, engine::general_purpose::STANDARD};
use clipcast_shared::protocol::BroadcastPayload;
use image::{ImageFormat, RgbaImage};

use crate::domain::{ClipboardError, ClipboardSource};

/// The clipboard of the machine the server runs on.
///
/// A fresh `arboard::Clipboard` is opened on every read, so this type holds
/// no platform handle and is `Send + Sync` everywhere.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClipboard;

impl ClipboardSource for SystemClipboard {
    fn read(&self) -> Result<Option<BroadcastPayload>, ClipboardError> {
        let mut clipboard =
            Clipboard::new().map_err(|e| ClipboardError::Unavailable(e.to_string()))?;

        match clipboard.get_text() {
            Ok(text) if !text.is_empty() => return Ok(Some(BroadcastPayload::Text(text))),
            Ok(_) | Err(arboard::Error::ContentNotAvailable) => {}
            Err(e) => return Err(ClipboardError::Unavailable(e.to_string())),
        }

        match clipboard.get_image() {
            Ok(image) => {
                let png = encode_png(image.width, image.height, image.bytes.into_owned())?;
                Ok(Some(BroadcastPayload::Image(png)))
            }
            Err(arboard::Error::ContentNotAvailable) => Ok(None),
            Err(e) => Err(ClipboardError::Unavailable(e.to_string())),
        }
    }
}

/// RGBA pixels to a base64 encoded PNG.
fn encode_png(width: usize, height: usize, rgba: Vec<u8>) -> Result<String, ClipboardError> {
    let width = u32::try_from(width).map_err(|e| ClipboardError::Image(e.to_string()))?;
    let height = u32::try_from(height).map_err(|e| ClipboardError::Image(e.to_string()))?;
    let buffer = RgbaImage::from_raw(width, height, rgba).ok_or_else(|| {
        ClipboardError::Image(format!("pixel data does not fit {}x{}", width, height))
    })?;

    let mut png = Vec::new();
    buffer
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| ClipboardError::Image(e.to_string()))?;
    Ok(STANDARD.encode(png))
}
