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

//! Application configuration management.
//!
//! Settings live in a TOML file managed by `confy`. Every field has a
//! default, so a missing or partial file is fine. The marker position is
//! written back here when it changes so it survives restarts.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use radar_loop::{Category, HttpConfig, MarkerSetting, RadarConfig};
use serde::{Deserialize, Serialize};

const APP_NAME: &str = "weerplaza-radar";
const CONFIG_NAME: &str = "config";

/// Application configuration stored in TOML format
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    /// Configuration schema version
    #[serde(default = "default_config_version")]
    pub config_version: u32,

    /// Directory for frames and animations (platform data dir when unset)
    #[serde(default)]
    pub storage_dir: Option<PathBuf>,

    /// Directory holding the background, border and marker images
    #[serde(default)]
    pub assets_dir: Option<PathBuf>,

    /// TrueType font overriding the built-in time stamp font
    #[serde(default)]
    pub font_path: Option<PathBuf>,

    /// IANA time zone of the frame time stamp
    #[serde(default = "default_time_zone")]
    pub time_zone: String,

    /// Frames kept per category
    #[serde(default = "default_retention")]
    pub retention: usize,

    /// Metadata entries older than this many hours are ignored
    #[serde(default = "default_recency_hours")]
    pub recency_hours: u64,

    /// Seconds between polls
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Splash API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Splash API access token
    #[serde(default = "default_access_token")]
    pub access_token: String,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Categories to poll, by directory name (e.g. "rain_radar")
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,

    /// Marker latitude
    #[serde(default)]
    pub marker_latitude: Option<f64>,

    /// Marker longitude
    #[serde(default)]
    pub marker_longitude: Option<f64>,

    /// Draw the marker on animations
    #[serde(default = "default_true")]
    pub show_marker: bool,
}

// Default value functions for serde
fn default_config_version() -> u32 {
    1
}

fn default_time_zone() -> String {
    "Europe/Amsterdam".to_string()
}

fn default_retention() -> usize {
    radar_loop::frame_store::DEFAULT_RETENTION
}

fn default_recency_hours() -> u64 {
    12
}

fn default_poll_interval_secs() -> u64 {
    300
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_base_url() -> String {
    radar_loop::category::SPLASH_BASE_URL.to_string()
}

fn default_access_token() -> String {
    "weerplaza".to_string()
}

fn default_user_agent() -> String {
    radar_loop::source::DEFAULT_USER_AGENT.to_string()
}

fn default_categories() -> Vec<String> {
    vec![Category::RainRadar.dir_name().to_string()]
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_version: default_config_version(),
            storage_dir: None,
            assets_dir: None,
            font_path: None,
            time_zone: default_time_zone(),
            retention: default_retention(),
            recency_hours: default_recency_hours(),
            poll_interval_secs: default_poll_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            base_url: default_base_url(),
            access_token: default_access_token(),
            user_agent: default_user_agent(),
            categories: default_categories(),
            marker_latitude: None,
            marker_longitude: None,
            show_marker: true,
        }
    }
}

impl AppConfig {
    /// Load configuration from `path`, or from the default location.
    pub fn load(path: Option<&Path>) -> Result<Self, confy::ConfyError> {
        match path {
            Some(path) => confy::load_path(path),
            None => confy::load(APP_NAME, CONFIG_NAME),
        }
    }

    /// Save configuration to `path`, or to the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<(), confy::ConfyError> {
        match path {
            Some(path) => confy::store_path(path, self),
            None => confy::store(APP_NAME, CONFIG_NAME, self),
        }
    }

    /// Get the config file path for display to user
    pub fn get_config_path() -> Result<PathBuf, confy::ConfyError> {
        confy::get_configuration_file_path(APP_NAME, CONFIG_NAME)
    }

    /// Directory holding the per-category frame directories.
    pub fn storage_root(&self) -> PathBuf {
        self.storage_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from(".local/share"))
                .join(APP_NAME)
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    /// Configured categories, in polling order and without duplicates.
    pub fn categories(&self) -> Result<Vec<Category>, radar_loop::Error> {
        let mut categories = self
            .categories
            .iter()
            .map(|name| name.parse::<Category>())
            .collect::<Result<Vec<Category>, _>>()?;
        categories.sort();
        categories.dedup();
        Ok(categories)
    }

    pub fn marker(&self) -> MarkerSetting {
        MarkerSetting {
            latitude: self.marker_latitude,
            longitude: self.marker_longitude,
            show: self.show_marker,
        }
    }

    /// Store a marker setting that has already been validated.
    pub fn set_marker(&mut self, marker: MarkerSetting) {
        self.marker_latitude = marker.latitude;
        self.marker_longitude = marker.longitude;
        self.show_marker = marker.show;
    }

    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            base_url: self.base_url.clone(),
            access_token: self.access_token.clone(),
            user_agent: self.user_agent.clone(),
            timeout: Duration::from_secs(self.request_timeout_secs.max(1)),
        }
    }

    pub fn radar_config(&self) -> Result<RadarConfig, radar_loop::Error> {
        let time_zone = self.time_zone.parse::<Tz>().map_err(|e| {
            radar_loop::Error::InvalidInput(format!("time zone '{}': {e}", self.time_zone))
        })?;

        Ok(RadarConfig {
            storage_root: self.storage_root(),
            retention: self.retention.max(1),
            recency_window: Duration::from_secs(self.recency_hours.saturating_mul(60 * 60)),
            time_zone,
            assets_dir: self.assets_dir.clone(),
            font_path: self.font_path.clone(),
            marker: self.marker(),
            ..RadarConfig::default()
        })
    }
}
