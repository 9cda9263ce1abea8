//! Image processing and encoding utilities.
//!
//! This module maps overlay coordinates to snapshot pixels, loads captured
//! images for display, and encodes them for transmission to a provider.
//!
//! # Coordinate Mapping
//!
//! The UI displays images at logical pixel sizes (e.g., 1920x1080) while
//! the actual captured image may be at a different resolution (e.g., 3840x2160).
//! This module handles the coordinate transformation between UI space and
//! image space.

use crate::error::{AppError, Result};
use crate::selection::Point;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use eframe::egui;
use image::{DynamicImage, ImageFormat};
use std::fs;
use std::path::Path;

/// An image file ready to be embedded in a provider request.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedImage {
    pub mime_type: &'static str,
    /// Base64 (standard alphabet, padded) of the file bytes.
    pub data: String,
}

impl EncodedImage {
    /// `data:` URL form used by OpenAI-compatible endpoints.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

/// Image processing utilities for the capture workflow.
pub struct ImageProcessor;

impl ImageProcessor {
    /// Maps a UI position to a pixel of the displayed snapshot.
    ///
    /// Accounts for HiDPI displays where the image resolution is higher than
    /// the UI resolution. The result is clamped to the image bounds, so the
    /// far edge maps to `width`/`height` (one past the last pixel).
    pub fn to_image_point(pos: egui::Pos2, ui_size: egui::Vec2, image_size: [u32; 2]) -> Point {
        let scale_x = image_size[0] as f32 / ui_size.x;
        let scale_y = image_size[1] as f32 / ui_size.y;

        let x = (pos.x * scale_x).round().clamp(0.0, image_size[0] as f32);
        let y = (pos.y * scale_y).round().clamp(0.0, image_size[1] as f32);

        Point::new(x as i32, y as i32)
    }

    /// Maps a snapshot pixel back to a UI position (inverse of [`Self::to_image_point`]).
    pub fn to_ui_pos(point: Point, ui_size: egui::Vec2, image_size: [u32; 2]) -> egui::Pos2 {
        egui::pos2(
            point.x as f32 * ui_size.x / image_size[0] as f32,
            point.y as f32 * ui_size.y / image_size[1] as f32,
        )
    }

    /// Converts an image into egui's texture input format.
    pub fn to_color_image(image: &DynamicImage) -> egui::ColorImage {
        let buffer = image.to_rgba8();
        let size = [image.width() as usize, image.height() as usize];
        egui::ColorImage::from_rgba_unmultiplied(size, buffer.as_flat_samples().as_slice())
    }

    /// Loads an image file from disk.
    pub fn load(path: &Path) -> Result<DynamicImage> {
        image::open(path)
            .map_err(|e| AppError::image(format!("Failed to open {}: {}", path.display(), e)))
    }

    /// Reads an image file fully and encodes it to Base64.
    ///
    /// The MIME type is derived from the file extension, defaulting to PNG.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] if the file cannot be read.
    pub fn encode_file(path: &Path) -> Result<EncodedImage> {
        let bytes = fs::read(path)?;
        let mime_type = ImageFormat::from_path(path)
            .map(|format| format.to_mime_type())
            .unwrap_or("image/png");

        Ok(EncodedImage {
            mime_type,
            data: BASE64.encode(bytes),
        })
    }
}
