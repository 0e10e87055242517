use base64::{engine::general_purpose, Engine};

use crate::models::UploadedImage;

/// Which media type goes into the data URI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaTypeLabel {
    /// Always `image/jpeg`, whatever was uploaded
    Fixed,
    /// Follow the declared extension (png uploads become `image/png`)
    #[default]
    Declared,
}

impl MediaTypeLabel {
    pub fn from_setting(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "jpeg" | "fixed" => Some(MediaTypeLabel::Fixed),
            "declared" | "auto" => Some(MediaTypeLabel::Declared),
            _ => None,
        }
    }
}

/// Standard padded base64, no line wrapping
pub fn encode(bytes: &[u8]) -> String {
    general_purpose::STANDARD.encode(bytes)
}

pub fn data_uri(image: &UploadedImage, label: MediaTypeLabel) -> String {
    let media_type = match label {
        MediaTypeLabel::Fixed => "image/jpeg",
        MediaTypeLabel::Declared => image.format.media_type(),
    };

    let base64_image = encode(&image.bytes);
    log::debug!(
        "🔄 Encoded {} ({} bytes) as {} base64 chars",
        image.filename,
        image.bytes.len(),
        base64_image.len()
    );

    format!("data:{};base64,{}", media_type, base64_image)
}
