use crate::font::FontType;
use std::fmt;

/// Produces a subset font from the shared source buffer.
///
/// Implementations must not assume they run on any particular thread; the pool
/// may call `convert` from several threads at once against the same `font`.
pub trait FontCodec: Send + Sync {
    fn convert(
        &self,
        font: &[u8],
        codepoints: &[u32],
        font_type: FontType,
    ) -> Result<Vec<u8>, ConversionError>;
}

impl<F> FontCodec for F
where
    F: Fn(&[u8], &[u32], FontType) -> Result<Vec<u8>, ConversionError> + Send + Sync,
{
    fn convert(
        &self,
        font: &[u8],
        codepoints: &[u32],
        font_type: FontType,
    ) -> Result<Vec<u8>, ConversionError> {
        self(font, codepoints, font_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionError {
    message: String,
}

impl ConversionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ConversionError {}
