pub mod paint;

use thiserror::Error;

pub use paint::rasterize;

/// Rasterization failure. The save path recovers from every variant by
/// falling back to the unannotated source image.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to decode source image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("source image has a zero dimension")]
    EmptySource,
    #[error("failed to encode PNG: {0}")]
    Encode(#[source] image::ImageError),
}
