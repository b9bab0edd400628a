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

//! Weather radar loop library.
//!
//! Periodically fetches radar and satellite tiles from the Weerplaza splash
//! API, composites them onto a fixed background map, keeps a rolling window
//! of recent frames on disk per category and encodes them into a looping
//! animated GIF. The pipeline is split into layers that can be used on their
//! own:
//!
//! - **Projection**: Mercator lat/lon to pixel conversion ([`projection`])
//! - **Compositor**: tile to annotated frame ([`compositor`], [`assets`], [`annotate`])
//! - **Frame store**: bounded on-disk frame buffer ([`frame_store`])
//! - **Animation**: frames to GIF with marker overlay ([`animation`])
//! - **Orchestrator**: polling, novelty filtering and the consumer API ([`orchestrator`])
//!
//! # Quick Start
//!
//! ```no_run
//! use radar_loop::{Category, HttpConfig, HttpTileSource, RadarConfig, RadarLoop};
//! use std::time::Duration;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = HttpTileSource::new(HttpConfig::default())?;
//!     let radar = RadarLoop::new(source, RadarConfig {
//!         storage_root: "/var/lib/weerplaza".into(),
//!         ..Default::default()
//!     });
//!
//!     radar.register_category(Category::RainRadar).await?;
//!     loop {
//!         let report = radar.poll_all().await;
//!         println!("{report}");
//!         tokio::time::sleep(Duration::from_secs(300)).await;
//!     }
//! }
//! ```
//!
//! # Using Individual Layers
//!
//! ```
//! use radar_loop::projection::{project, GeoBounds};
//!
//! let bounds = GeoBounds { left_lon: 1.556, right_lon: 8.8, top_lat: 54.239 };
//! assert_eq!(project(52.0, 5.0, &bounds, 1050), (499, 541));
//! ```

pub mod animation;
pub mod annotate;
pub mod assets;
pub mod category;
pub mod compositor;
pub mod error;
pub mod frame_store;
pub mod orchestrator;
pub mod projection;
pub mod settings;
pub mod source;

use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;

pub use category::Category;
pub use error::{Error, FetchError, Result};
pub use orchestrator::{CategoryOutcome, PollReport, RadarLoop};
pub use settings::{MarkerSetting, Settings};
pub use source::{HttpConfig, HttpTileSource, TileEntry, TileSource};

/// Entries older than this are never fetched.
pub const DEFAULT_RECENCY_WINDOW: Duration = Duration::from_secs(12 * 60 * 60);

/// Configuration for [`RadarLoop`].
#[derive(Debug, Clone)]
pub struct RadarConfig {
    /// Directory holding one subdirectory per category.
    pub storage_root: PathBuf,
    /// Frames kept per category.
    pub retention: usize,
    /// How far back metadata entries are still worth fetching.
    pub recency_window: Duration,
    /// Time zone of the time stamp burned into frames.
    pub time_zone: Tz,
    /// Directory with the background, border and marker artwork.
    pub assets_dir: Option<PathBuf>,
    /// TrueType font overriding the built-in time stamp font.
    pub font_path: Option<PathBuf>,
    /// Display time of every frame but the last.
    pub frame_delay: Duration,
    /// Display time of the newest frame.
    pub final_frame_delay: Duration,
    /// Initial marker setting.
    pub marker: MarkerSetting,
}

impl Default for RadarConfig {
    fn default() -> Self {
        Self {
            storage_root: PathBuf::from("weerplaza"),
            retention: frame_store::DEFAULT_RETENTION,
            recency_window: DEFAULT_RECENCY_WINDOW,
            time_zone: chrono_tz::Europe::Amsterdam,
            assets_dir: None,
            font_path: None,
            frame_delay: animation::FRAME_DELAY,
            final_frame_delay: animation::FINAL_FRAME_DELAY,
            marker: MarkerSetting::default(),
        }
    }
}
