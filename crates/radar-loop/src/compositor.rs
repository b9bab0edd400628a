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

//! Frame composition.
//!
//! Turns a downloaded weather tile into a finished frame: the tile (and an
//! optional overlay tile) is scaled onto the background map, the border
//! decoration is laid on top, the canvas is rotated to line the projection up
//! with the display, cropped to the visible window and stamped with the
//! observation time.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use log::debug;

use crate::annotate::Annotator;
use crate::assets::Templates;
use crate::error::Result;

/// Tiles this narrow are low-resolution placeholders served before the HD
/// render is ready.
pub const MIN_SOURCE_WIDTH: u32 = 500;

/// Clockwise rotation applied to the composed canvas.
pub const ROTATION_DEGREES: f32 = 6.0;

/// Visible window of the rotated canvas: x, y, width, height.
pub const CROP_WINDOW: (u32, u32, u32, u32) = (157, 264, 776, 700);

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Composes weather tiles onto the background map.
#[derive(Debug, Clone)]
pub struct Compositor {
    templates: Templates,
    annotator: Annotator,
}

impl Compositor {
    #[must_use]
    pub fn new(templates: Templates, annotator: Annotator) -> Self {
        Self {
            templates,
            annotator,
        }
    }

    #[must_use]
    pub fn templates(&self) -> &Templates {
        &self.templates
    }

    /// Compose a frame in memory.
    ///
    /// Returns `None` when the primary tile is too small to be the HD render.
    #[must_use]
    pub fn compose(
        &self,
        primary: &DynamicImage,
        overlay: Option<&DynamicImage>,
        time: DateTime<Utc>,
    ) -> Option<RgbaImage> {
        if primary.width() <= MIN_SOURCE_WIDTH {
            debug!(
                "Tile is {} px wide, waiting for the HD render",
                primary.width()
            );
            return None;
        }

        let mut canvas = self.templates.background.clone();
        let (width, height) = canvas.dimensions();

        let layer = imageops::resize(primary, width, height, FilterType::Lanczos3);
        imageops::overlay(&mut canvas, &layer, 0, 0);

        if let Some(overlay) = overlay {
            let layer = imageops::resize(overlay, width, height, FilterType::Lanczos3);
            imageops::overlay(&mut canvas, &layer, 0, 0);
        }

        if let Some(borders) = &self.templates.borders {
            imageops::overlay(&mut canvas, borders, 0, 0);
        }

        let rotated = rotate_about_center(
            &canvas,
            ROTATION_DEGREES.to_radians(),
            Interpolation::Bilinear,
            TRANSPARENT,
        );

        let (x, y, w, h) = CROP_WINDOW;
        let mut frame = imageops::crop_imm(&rotated, x, y, w, h).to_image();

        self.annotator.stamp(&mut frame, time);
        Some(frame)
    }

    /// Decode raw tile bytes, compose them and write the frame to `dest`.
    ///
    /// The file's modification time is set to the observation time so
    /// directory listings sort chronologically. Returns `Ok(None)` and
    /// writes nothing when the tile is too small.
    pub fn render(
        &self,
        primary: &[u8],
        overlay: Option<&[u8]>,
        time: DateTime<Utc>,
        dest: &Path,
    ) -> Result<Option<PathBuf>> {
        let primary = image::load_from_memory(primary)?;
        let overlay = overlay.map(image::load_from_memory).transpose()?;

        let Some(frame) = self.compose(&primary, overlay.as_ref(), time) else {
            return Ok(None);
        };

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write under a temporary name so a crash never leaves a truncated
        // frame that would count as present.
        let partial = dest.with_extension("png.part");
        frame.save_with_format(&partial, ImageFormat::Png)?;
        fs::rename(&partial, dest)?;

        let file = fs::OpenOptions::new().write(true).open(dest)?;
        file.set_modified(SystemTime::from(time))?;

        debug!("Wrote frame {}", dest.display());
        Ok(Some(dest.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Cursor;

    fn compositor() -> Compositor {
        Compositor::new(
            Templates::builtin(),
            Annotator::with_embedded_font(chrono_tz::Europe::Amsterdam),
        )
    }

    fn png_bytes(width: u32, height: u32, color: Rgba<u8>) -> Vec<u8> {
        let mut buf = Vec::new();
        RgbaImage::from_pixel(width, height, color)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 5, 0).unwrap()
    }

    // Canvas centre (525, 574) is fixed by the rotation and lands here.
    const CENTRE: (u32, u32) = (525 - CROP_WINDOW.0, 574 - CROP_WINDOW.1);

    #[test]
    fn test_compose_output_size_and_layers() {
        let primary = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            600,
            600,
            Rgba([0, 0, 255, 255]),
        ));
        let frame = compositor().compose(&primary, None, time()).unwrap();
        assert_eq!(frame.dimensions(), (CROP_WINDOW.2, CROP_WINDOW.3));

        let p = frame.get_pixel(CENTRE.0, CENTRE.1);
        assert!(p[2] > 200 && p[0] < 50, "primary layer should cover the centre: {p:?}");

        let overlay = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            300,
            300,
            Rgba([255, 0, 0, 255]),
        ));
        let frame = compositor().compose(&primary, Some(&overlay), time()).unwrap();
        let p = frame.get_pixel(CENTRE.0, CENTRE.1);
        assert!(p[0] > 200 && p[2] < 50, "overlay should sit above the primary: {p:?}");
    }

    #[test]
    fn test_transparent_tile_keeps_background() {
        let primary = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            700,
            700,
            Rgba([0, 0, 0, 0]),
        ));
        let compositor = compositor();
        let frame = compositor.compose(&primary, None, time()).unwrap();
        let expected = compositor.templates().background.get_pixel(0, 0);
        assert_eq!(frame.get_pixel(CENTRE.0, CENTRE.1), expected);
    }

    #[test]
    fn test_small_tile_is_not_composed() {
        let primary = DynamicImage::ImageRgba8(RgbaImage::new(MIN_SOURCE_WIDTH, 800));
        assert!(compositor().compose(&primary, None, time()).is_none());
    }

    #[test]
    fn test_render_writes_png_with_observation_mtime() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("rain_radar").join("20250601-1205.png");

        let written = compositor()
            .render(&png_bytes(640, 640, Rgba([0, 255, 0, 128])), None, time(), &dest)
            .unwrap();

        assert_eq!(written.as_deref(), Some(dest.as_path()));
        let modified = fs::metadata(&dest).unwrap().modified().unwrap();
        assert_eq!(modified, SystemTime::from(time()));
        assert!(!dest.with_extension("png.part").exists());

        let decoded = image::open(&dest).unwrap();
        assert_eq!(decoded.width(), CROP_WINDOW.2);
    }

    #[test]
    fn test_render_skips_small_tile() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("20250601-1205.png");
        let written = compositor()
            .render(&png_bytes(256, 256, Rgba([0, 255, 0, 255])), None, time(), &dest)
            .unwrap();
        assert!(written.is_none());
        assert!(!dest.exists());
    }

    #[test]
    fn test_render_rejects_garbage() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("20250601-1205.png");
        assert!(compositor().render(b"not an image", None, time(), &dest).is_err());
        assert!(!dest.exists());
    }
}
