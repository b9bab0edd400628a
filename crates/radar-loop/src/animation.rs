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

//! Animated GIF assembly from a category's frames.

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use image::codecs::gif::{GifEncoder, Repeat};
use image::imageops::{self, FilterType};
use image::{Delay, Frame, ImageError, RgbaImage};
use log::{debug, warn};

use crate::error::Result;
use crate::projection::GeoBounds;

/// Display time of every frame but the last.
pub const FRAME_DELAY: Duration = Duration::from_millis(200);
/// Display time of the newest frame before the loop restarts.
pub const FINAL_FRAME_DELAY: Duration = Duration::from_millis(2000);

/// NeuQuant sampling factor; 10 is the encoder's recommended trade-off.
const GIF_SPEED: i32 = 10;

/// Builds the looping animation for a category.
#[derive(Debug, Clone)]
pub struct AnimationAssembler {
    marker: RgbaImage,
    frame_delay: Duration,
    final_frame_delay: Duration,
}

impl AnimationAssembler {
    /// Create an assembler that draws `marker` centred on the marker position.
    #[must_use]
    pub fn new(marker: RgbaImage) -> Self {
        Self {
            marker,
            frame_delay: FRAME_DELAY,
            final_frame_delay: FINAL_FRAME_DELAY,
        }
    }

    #[must_use]
    pub fn with_delays(mut self, frame_delay: Duration, final_frame_delay: Duration) -> Self {
        self.frame_delay = frame_delay;
        self.final_frame_delay = final_frame_delay;
        self
    }

    /// Encode `frames` (oldest first) into a looping GIF at `dest`.
    ///
    /// Frames that vanished from disk are skipped. When nothing is left to
    /// encode no file is written and `Ok(None)` is returned; otherwise the
    /// number of encoded frames.
    pub fn rebuild(
        &self,
        frames: &[PathBuf],
        marker: Option<(f64, f64)>,
        bounds: &GeoBounds,
        dest: &Path,
    ) -> Result<Option<usize>> {
        let mut images: Vec<RgbaImage> = frames
            .iter()
            .filter_map(|path| self.prepare_frame(path, marker, bounds))
            .collect();

        let Some((width, height)) = images.first().map(RgbaImage::dimensions) else {
            debug!("No frames to animate for {}", dest.display());
            return Ok(None);
        };

        // The GIF canvas is sized by the first frame.
        for img in &mut images {
            if img.dimensions() != (width, height) {
                debug!(
                    "Scaling {}x{} frame to {}x{}",
                    img.width(),
                    img.height(),
                    width,
                    height
                );
                *img = imageops::resize(&*img, width, height, FilterType::Triangle);
            }
        }

        let count = images.len();
        let partial = dest.with_extension("gif.part");
        self.encode(images, &partial)?;
        fs::rename(&partial, dest)?;

        debug!("Wrote animation {} ({} frames)", dest.display(), count);
        Ok(Some(count))
    }

    /// Decode one frame and draw the marker on it.
    fn prepare_frame(
        &self,
        path: &Path,
        marker: Option<(f64, f64)>,
        bounds: &GeoBounds,
    ) -> Option<RgbaImage> {
        let mut img = match image::open(path) {
            Ok(img) => img.to_rgba8(),
            Err(ImageError::IoError(e)) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Skipping unreadable frame {}: {}", path.display(), e);
                return None;
            }
        };

        if let Some((lat, lon)) = marker {
            self.draw_marker(&mut img, lat, lon, bounds);
        }
        Some(img)
    }

    fn draw_marker(&self, img: &mut RgbaImage, lat: f64, lon: f64, bounds: &GeoBounds) {
        let (x, y) = bounds.project(lat, lon, img.width());
        let left = i64::from(x) - i64::from(self.marker.width() / 2);
        let top = i64::from(y) - i64::from(self.marker.height() / 2);
        imageops::overlay(img, &self.marker, left, top);
    }

    fn encode(&self, images: Vec<RgbaImage>, dest: &Path) -> Result<()> {
        let last = images.len() - 1;
        let file = BufWriter::new(File::create(dest)?);
        let mut encoder = GifEncoder::new_with_speed(file, GIF_SPEED);
        encoder.set_repeat(Repeat::Infinite)?;

        for (index, img) in images.into_iter().enumerate() {
            let delay = if index == last {
                self.final_frame_delay
            } else {
                self.frame_delay
            };
            encoder.encode_frame(Frame::from_parts(
                img,
                0,
                0,
                Delay::from_saturating_duration(delay),
            ))?;
        }
        Ok(())
    }
}
