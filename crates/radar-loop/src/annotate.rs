// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Observation time label burned into each frame.
//!
//! The label is light text with a dark outline so it stays legible over
//! both bright cloud cover and the dark base map. DejaVu Sans Mono is
//! embedded as the default face; a configured TrueType font replaces it.

use std::fs;
use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_text_mut;
use log::warn;

/// Label height in pixels.
pub const TEXT_SIZE: f32 = 30.0;
/// Distance from the left and bottom edges.
pub const TEXT_MARGIN: i32 = 10;
/// Outline reach in pixels on each side of the text.
const OUTLINE_REACH: i32 = 2;

const TEXT_COLOR: Rgba<u8> = Rgba([254, 255, 255, 255]);
const OUTLINE_COLOR: Rgba<u8> = Rgba([0, 0, 0, 255]);

static EMBEDDED_FONT: &[u8] = include_bytes!("../assets/DejaVuSansMono.ttf");

/// The font shipped with the crate.
#[must_use]
pub fn embedded_font() -> Option<FontArc> {
    FontArc::try_from_slice(EMBEDDED_FONT)
        .map_err(|e| warn!("Embedded font is unusable: {}", e))
        .ok()
}

/// Draws `HH:MM` labels in a fixed time zone.
#[derive(Clone)]
pub struct Annotator {
    time_zone: Tz,
    font: Option<FontArc>,
}

impl std::fmt::Debug for Annotator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Annotator")
            .field("time_zone", &self.time_zone)
            .field("font", &self.font.is_some())
            .finish()
    }
}

impl Annotator {
    /// Create an annotator drawing with `font`.
    #[must_use]
    pub fn new(time_zone: Tz, font: FontArc) -> Self {
        Self {
            time_zone,
            font: Some(font),
        }
    }

    /// Create an annotator with the embedded font.
    #[must_use]
    pub fn with_embedded_font(time_zone: Tz) -> Self {
        Self {
            time_zone,
            font: embedded_font(),
        }
    }

    /// Create an annotator, loading the font at `font_path` if given.
    /// An unreadable font is logged and the embedded face is used instead.
    #[must_use]
    pub fn with_font_file(time_zone: Tz, font_path: Option<&Path>) -> Self {
        let font = font_path
            .and_then(|path| {
                let bytes = fs::read(path)
                    .map_err(|e| warn!("Failed to read font {}: {}", path.display(), e))
                    .ok()?;
                FontArc::try_from_vec(bytes)
                    .map_err(|e| warn!("Failed to parse font {}: {}", path.display(), e))
                    .ok()
            })
            .or_else(embedded_font);
        Self { time_zone, font }
    }

    /// Local wall-clock label for an observation time.
    #[must_use]
    pub fn label(&self, time: DateTime<Utc>) -> String {
        time.with_timezone(&self.time_zone).format("%H:%M").to_string()
    }

    /// Burn the label for `time` into the lower-left corner of `img`.
    pub fn stamp(&self, img: &mut RgbaImage, time: DateTime<Utc>) {
        let Some(font) = &self.font else {
            return;
        };
        let text = self.label(time);
        let scale = PxScale::from(TEXT_SIZE);
        let x = TEXT_MARGIN;
        let y = img.height() as i32 - TEXT_SIZE as i32 - TEXT_MARGIN;

        for adj in -OUTLINE_REACH..=OUTLINE_REACH {
            draw_text_mut(img, OUTLINE_COLOR, x + adj, y, scale, font, &text);
            draw_text_mut(img, OUTLINE_COLOR, x, y + adj, scale, font, &text);
        }
        draw_text_mut(img, TEXT_COLOR, x, y, scale, font, &text);
    }
}
