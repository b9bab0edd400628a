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

//! Static artwork used when composing frames.
//!
//! The background map, the border decoration and the marker glyph are read
//! once from an assets directory. Missing files are replaced by generated
//! stand-ins so the pipeline keeps running on a bare install.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_filled_circle_mut;
use log::{debug, warn};

/// Width of the composition canvas in pixels.
pub const CANVAS_WIDTH: u32 = 1050;
/// Height of the composition canvas in pixels.
pub const CANVAS_HEIGHT: u32 = 1148;

pub const BACKGROUND_FILE: &str = "Radar-1050-v2.jpg";
pub const BORDERS_FILE: &str = "Radar-1050-borders-v2.png";
pub const MARKER_FILE: &str = "pointer-50.png";

const FALLBACK_BACKGROUND: Rgba<u8> = Rgba([28, 36, 44, 255]);
const FALLBACK_MARKER_SIZE: u32 = 50;

/// Decoded template images, all RGBA.
#[derive(Debug, Clone)]
pub struct Templates {
    /// Base map at canvas size.
    pub background: RgbaImage,
    /// Border decoration at canvas size, drawn over the weather layers.
    pub borders: Option<RgbaImage>,
    /// Glyph centred on the marker position.
    pub marker: RgbaImage,
}

impl Templates {
    /// Load templates from `dir`, falling back to generated artwork for any
    /// file that is missing or unreadable.
    #[must_use]
    pub fn load(dir: Option<&Path>) -> Self {
        let background = dir
            .and_then(|d| load_rgba(&d.join(BACKGROUND_FILE)))
            .map(fit_canvas)
            .unwrap_or_else(|| {
                warn!("Background map not found, using a plain canvas");
                plain_background()
            });

        let borders = dir
            .and_then(|d| load_rgba(&d.join(BORDERS_FILE)))
            .map(fit_canvas);
        if borders.is_none() {
            debug!("No border overlay found");
        }

        let marker = dir
            .and_then(|d| load_rgba(&d.join(MARKER_FILE)))
            .unwrap_or_else(generated_marker);

        Self {
            background,
            borders,
            marker,
        }
    }

    /// Generated artwork only.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            background: plain_background(),
            borders: None,
            marker: generated_marker(),
        }
    }
}

fn load_rgba(path: &Path) -> Option<RgbaImage> {
    if !path.is_file() {
        return None;
    }
    match image::open(path) {
        Ok(img) => Some(img.to_rgba8()),
        Err(e) => {
            warn!("Failed to load template {}: {}", path.display(), e);
            None
        }
    }
}

fn fit_canvas(img: RgbaImage) -> RgbaImage {
    if img.dimensions() == (CANVAS_WIDTH, CANVAS_HEIGHT) {
        img
    } else {
        imageops::resize(&img, CANVAS_WIDTH, CANVAS_HEIGHT, FilterType::Lanczos3)
    }
}

fn plain_background() -> RgbaImage {
    RgbaImage::from_pixel(CANVAS_WIDTH, CANVAS_HEIGHT, FALLBACK_BACKGROUND)
}

/// Red dot with a white ring on a transparent square.
fn generated_marker() -> RgbaImage {
    let size = FALLBACK_MARKER_SIZE;
    let centre = (size / 2) as i32;
    let mut marker = RgbaImage::from_pixel(size, size, Rgba([0, 0, 0, 0]));
    draw_filled_circle_mut(&mut marker, (centre, centre), 11, Rgba([255, 255, 255, 255]));
    draw_filled_circle_mut(&mut marker, (centre, centre), 8, Rgba([220, 30, 40, 255]));
    marker
}
