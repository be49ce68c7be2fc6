use std::path::Path;

/// Screenshot format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
    WebP,
}

impl ImageFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::WebP => "webp",
        }
    }

    /// Picks the format from the extension of `path`, falling back to PNG.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());

        match ext.as_deref() {
            Some("jpg") | Some("jpeg") => ImageFormat::Jpeg,
            Some("webp") => ImageFormat::WebP,
            _ => ImageFormat::Png,
        }
    }

    /// Whether the encoder for this format takes a quality parameter.
    pub fn is_lossy(&self) -> bool {
        matches!(self, ImageFormat::Jpeg | ImageFormat::WebP)
    }
}

/// Defines a rectangular region for clipping screenshots.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipRegion {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub scale: f64,
}

impl ClipRegion {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            scale: 1.0,
        }
    }

    /// Clip covering a whole document of the given CSS size, anchored at the origin.
    pub fn full_document(width: f64, height: f64) -> Self {
        Self::new(0.0, 0.0, width.ceil(), height.ceil())
    }
}

/// Configuration options for page screenshot capture.
#[derive(Debug, Clone, Default)]
pub struct CaptureOptions {
    pub(crate) format: ImageFormat,
    pub(crate) quality: Option<u8>,
    pub(crate) full_page: bool,
}

impl CaptureOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_format(mut self, format: ImageFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = Some(quality.min(100));
        self
    }

    pub fn with_full_page(mut self, full_page: bool) -> Self {
        self.full_page = full_page;
        self
    }

    /// Full-page capture in the format implied by the output file name.
    pub fn for_output(path: &Path) -> Self {
        Self::new()
            .with_format(ImageFormat::from_path(path))
            .with_full_page(true)
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn is_full_page(&self) -> bool {
        self.full_page
    }
}
