//! Upload validation
//!
//! Checks type and size of an uploaded image and decodes its natural pixel
//! dimensions from the file header.

use std::io::Cursor;

use image::ImageReader;

use crate::analysis::ImageDimensions;
use crate::error::{AppError, Result};

/// Accepted image content types
pub const ALLOWED_TYPES: [&str; 3] = ["image/jpeg", "image/png", "image/gif"];

/// Validated upload, ready to store
#[derive(Debug, Clone)]
pub struct ValidatedUpload {
    pub filename: String,
    pub content_type: String,
    pub natural_dimensions: Option<ImageDimensions>,
}

/// Content type of an upload: the declared part type, or a guess from the
/// file name when the client sent none or a generic one.
pub fn resolve_content_type(declared: Option<&str>, filename: &str) -> String {
    let declared = declared
        .map(|ct| ct.split(';').next().unwrap_or_default().trim().to_ascii_lowercase())
        .filter(|ct| !ct.is_empty() && ct != "application/octet-stream");

    declared.unwrap_or_else(|| {
        mime_guess::from_path(filename)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    })
}

/// Validate an uploaded image against the allowed types and size limit
pub fn validate_upload(
    filename: &str,
    declared_type: Option<&str>,
    data: &[u8],
    max_bytes: usize,
) -> Result<ValidatedUpload> {
    let content_type = match resolve_content_type(declared_type, filename).as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        other => other.to_string(),
    };

    if !ALLOWED_TYPES.contains(&content_type.as_str()) {
        return Err(AppError::UnsupportedMediaType(content_type));
    }

    if data.len() > max_bytes {
        return Err(AppError::PayloadTooLarge {
            size: data.len(),
            max: max_bytes,
        });
    }

    if data.is_empty() {
        return Err(AppError::BadRequest("Uploaded image is empty".to_string()));
    }

    Ok(ValidatedUpload {
        filename: filename.to_string(),
        content_type,
        natural_dimensions: decode_dimensions(data),
    })
}

/// Read pixel dimensions from the image header; `None` if undecodable
pub fn decode_dimensions(data: &[u8]) -> Option<ImageDimensions> {
    let reader = match ImageReader::new(Cursor::new(data)).with_guessed_format() {
        Ok(reader) => reader,
        Err(e) => {
            tracing::debug!("Could not guess image format: {}", e);
            return None;
        }
    };

    match reader.into_dimensions() {
        Ok((width, height)) => Some(ImageDimensions::new(width, height)).filter(ImageDimensions::is_valid),
        Err(e) => {
            tracing::warn!("Could not decode image dimensions: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, RgbImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        RgbImage::new(width, height)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_decode_dimensions() {
        assert_eq!(decode_dimensions(&png(40, 30)), Some(ImageDimensions::new(40, 30)));
        assert_eq!(decode_dimensions(b"definitely not an image"), None);
    }

    #[test]
    fn test_accepts_allowed_types() {
        let data = png(4, 2);
        let upload = validate_upload("scan.png", Some("image/png"), &data, 1024).unwrap();
        assert_eq!(upload.content_type, "image/png");
        assert_eq!(upload.natural_dimensions, Some(ImageDimensions::new(4, 2)));

        // Undecodable bytes are accepted; dimensions stay unknown
        let upload = validate_upload("photo.jpg", Some("image/jpeg"), b"jpeg?", 1024).unwrap();
        assert_eq!(upload.natural_dimensions, None);
    }

    #[test]
    fn test_rejects_other_types() {
        let err = validate_upload("doc.pdf", Some("application/pdf"), b"%PDF", 1024).unwrap_err();
        assert!(matches!(err, AppError::UnsupportedMediaType(ct) if ct == "application/pdf"));
    }

    #[test]
    fn test_rejects_oversized() {
        let err = validate_upload("big.gif", Some("image/gif"), &[0u8; 11], 10).unwrap_err();
        assert!(matches!(err, AppError::PayloadTooLarge { size: 11, max: 10 }));
    }

    #[test]
    fn test_content_type_falls_back_to_filename() {
        assert_eq!(resolve_content_type(None, "page.PNG"), "image/png");
        assert_eq!(
            resolve_content_type(Some("application/octet-stream"), "page.gif"),
            "image/gif"
        );
        assert_eq!(resolve_content_type(Some("IMAGE/JPEG; q=1"), "x"), "image/jpeg");
        assert_eq!(resolve_content_type(None, "noext"), "application/octet-stream");

        let upload = validate_upload("page.jpg", None, b"bytes", 1024).unwrap();
        assert_eq!(upload.content_type, "image/jpeg");
    }
}
