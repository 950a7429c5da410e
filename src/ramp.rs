//! Brightness ramp and luminance quantization.

/// An ordered, immutable sequence of glyphs from darkest to brightest.
///
/// Index 0 is the glyph drawn for black and the last index the glyph drawn
/// for white. The ramp is never empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlyphRamp {
    glyphs: &'static [char],
}

impl GlyphRamp {
    /// The ten-step ramp `" .:-=+*#%@"`.
    pub const STANDARD: GlyphRamp = GlyphRamp {
        glyphs: &[' ', '.', ':', '-', '=', '+', '*', '#', '%', '@'],
    };

    pub fn len(&self) -> usize {
        self.glyphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.glyphs.is_empty()
    }

    pub fn glyphs(&self) -> &'static [char] {
        self.glyphs
    }

    pub fn darkest(&self) -> char {
        self.glyphs[0]
    }

    pub fn brightest(&self) -> char {
        self.glyphs[self.glyphs.len() - 1]
    }
}

impl Default for GlyphRamp {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// Map a grayscale sample onto `0..ramp_len`.
///
/// Uses `floor(luma / 256 * ramp_len)` clamped to the last index, so the
/// buckets are equal width and 255 lands in the top bucket.
pub fn quantize(luma: u8, ramp_len: usize) -> usize {
    if ramp_len == 0 {
        return 0;
    }
    let idx = (luma as usize * ramp_len) / 256;
    idx.min(ramp_len - 1)
}
