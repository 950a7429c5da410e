//! Glyph fill colors.

use image::Rgb;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fill used for every glyph in [`ColorMode::AccentOnly`].
pub const ACCENT_GREEN: Rgb<u8> = Rgb([0, 255, 0]);

/// How glyphs are colored, fixed for a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColorMode {
    /// Green glyphs on black, terminal style.
    AccentOnly,
    /// Each glyph takes the average color of its source region.
    #[default]
    TrueColor,
}

impl ColorMode {
    /// Interpret the answer to the interactive color prompt.
    ///
    /// `1` selects the accent color; anything else, including an empty
    /// answer, keeps true color.
    pub fn from_prompt(answer: &str) -> Self {
        match answer.trim().parse() {
            Ok(mode) => mode,
            Err(_) => ColorMode::TrueColor,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ColorMode::AccentOnly => "accent",
            ColorMode::TrueColor => "true-color",
        }
    }
}

impl fmt::Display for ColorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ColorMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "accent" | "accent-only" | "green" => Ok(ColorMode::AccentOnly),
            "2" | "true-color" | "truecolor" | "rgb" => Ok(ColorMode::TrueColor),
            other => Err(format!("unknown color mode '{}' (expected accent or true-color)", other)),
        }
    }
}

/// Fill color for one cell.
pub fn resolve_color(mode: ColorMode, cell_color: Rgb<u8>) -> Rgb<u8> {
    match mode {
        ColorMode::AccentOnly => ACCENT_GREEN,
        ColorMode::TrueColor => cell_color,
    }
}
