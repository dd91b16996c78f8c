use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};

/// Largest upload accepted, before encoding
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("please select a valid image file")]
    NotAnImage,
    #[error("image file size must be less than 10MB (got {0} bytes)")]
    TooLarge(usize),
    #[error("failed to read image: {0}")]
    Unreadable(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImageType {
    Png,
    Jpeg,
    Gif,
    Webp,
    Bmp,
}

impl ImageType {
    fn sniff(data: &[u8]) -> Option<Self> {
        if data.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(ImageType::Png)
        } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageType::Jpeg)
        } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            Some(ImageType::Gif)
        } else if data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            Some(ImageType::Webp)
        } else if data.starts_with(b"BM") && data.len() >= 14 {
            Some(ImageType::Bmp)
        } else {
            None
        }
    }

    fn mime(&self) -> &'static str {
        match self {
            ImageType::Png => "image/png",
            ImageType::Jpeg => "image/jpeg",
            ImageType::Gif => "image/gif",
            ImageType::Webp => "image/webp",
            ImageType::Bmp => "image/bmp",
        }
    }
}

/// Validate raw image bytes and wrap them in a `data:` URI ready for the store.
pub fn encode_image(data: &[u8]) -> Result<String, ValidationError> {
    let image_type = ImageType::sniff(data).ok_or(ValidationError::NotAnImage)?;
    if data.len() > MAX_IMAGE_BYTES {
        return Err(ValidationError::TooLarge(data.len()));
    }
    Ok(format!(
        "data:{};base64,{}",
        image_type.mime(),
        STANDARD.encode(data)
    ))
}

pub fn read_image<P: AsRef<Path>>(path: P) -> Result<String, ValidationError> {
    let path = path.as_ref();
    // Check the size before pulling a huge file into memory
    let len = std::fs::metadata(path)?.len() as usize;
    if len > MAX_IMAGE_BYTES {
        return Err(ValidationError::TooLarge(len));
    }
    encode_image(&std::fs::read(path)?)
}
