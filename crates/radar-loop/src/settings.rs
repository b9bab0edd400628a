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

//! Mutable runtime settings shared by the orchestrator and the assembler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Location-of-interest marker drawn on every animation frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarkerSetting {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub show: bool,
}

impl Default for MarkerSetting {
    fn default() -> Self {
        Self {
            latitude: None,
            longitude: None,
            show: true,
        }
    }
}

impl MarkerSetting {
    /// Create a visible marker at the given position.
    #[must_use]
    pub fn at(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude: Some(latitude),
            longitude: Some(longitude),
            show: true,
        }
    }

    /// The position to draw, if the marker is enabled and fully specified.
    #[must_use]
    pub fn visible_position(&self) -> Option<(f64, f64)> {
        if !self.show {
            return None;
        }
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }

    /// Update one or both coordinates.
    ///
    /// A request that carries neither coordinate, or a coordinate outside the
    /// valid range, is rejected and leaves the marker unchanged.
    pub fn set_location(&mut self, latitude: Option<f64>, longitude: Option<f64>) -> Result<()> {
        if latitude.is_none() && longitude.is_none() {
            return Err(Error::InvalidInput(
                "marker location requires a latitude or a longitude".to_string(),
            ));
        }
        if let Some(lat) = latitude {
            if !lat.is_finite() || lat <= -90.0 || lat >= 90.0 {
                return Err(Error::InvalidInput(format!(
                    "latitude {lat} must lie strictly between -90 and 90"
                )));
            }
        }
        if let Some(lon) = longitude {
            if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
                return Err(Error::InvalidInput(format!(
                    "longitude {lon} must lie between -180 and 180"
                )));
            }
        }

        if latitude.is_some() {
            self.latitude = latitude;
        }
        if longitude.is_some() {
            self.longitude = longitude;
        }
        Ok(())
    }
}

/// Settings owned by the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub marker: MarkerSetting,
    pub last_updated: Option<DateTime<Utc>>,
}
