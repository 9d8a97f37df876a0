/// Floor-plan coordinate system.
///
/// Stored graph coordinates live in image-pixel space: origin at the top-left
/// corner of the floor image, y growing downwards. The rendering surface uses
/// a flat geographic space: origin at the bottom-left corner, `lat` growing
/// upwards and `lng` growing to the right, one unit per pixel.
use serde::{Deserialize, Serialize};

/// A point on the rendering surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderCoord {
    pub lat: f64,
    pub lng: f64,
}

/// Native pixel dimensions of a floor image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Clamp a pixel position onto the image.
    pub fn clamp_pixel(&self, x_px: i64, y_px: i64) -> (i64, i64) {
        (
            x_px.clamp(0, self.width as i64),
            y_px.clamp(0, self.height as i64),
        )
    }
}

/// Image pixel -> render space. Exact.
pub fn to_render_space(x_px: f64, y_px: f64, image_height: f64) -> RenderCoord {
    RenderCoord {
        lat: image_height - y_px,
        lng: x_px,
    }
}

/// Render space -> image pixel, rounded to the nearest whole pixel.
///
/// `image_height` must be the height of the floor the coordinate belongs to.
/// Another floor's height still yields a valid pixel, just shifted vertically.
pub fn to_image_space(coord: RenderCoord, image_height: f64) -> (i64, i64) {
    let x_px = coord.lng.round() as i64;
    let y_px = (image_height - coord.lat).round() as i64;
    (x_px, y_px)
}

/// Render position of an integer image pixel.
pub fn pixel_to_render(x_px: i64, y_px: i64, image_height: u32) -> RenderCoord {
    to_render_space(x_px as f64, y_px as f64, image_height as f64)
}
