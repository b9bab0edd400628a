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

//! Weather imagery categories offered by the splash API.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::projection::GeoBounds;

/// Base URL of the splash endpoints; the product name is appended.
pub const SPLASH_BASE_URL: &str = "https://api.meteoplaza.com/v2/splash/10728";

/// Real-world extent of the shared 1050 px background map.
const BENELUX_BOUNDS: GeoBounds = GeoBounds {
    left_lon: 1.556,
    right_lon: 8.8,
    top_lat: 54.239,
};

/// A weather imagery product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    RainRadar,
    Satellite,
    Thunder,
    Hail,
    DrizzleSnow,
    RadarSatellite,
}

impl Category {
    /// Every category, in the order they are polled.
    pub const ALL: [Category; 6] = [
        Category::RainRadar,
        Category::Satellite,
        Category::Thunder,
        Category::Hail,
        Category::DrizzleSnow,
        Category::RadarSatellite,
    ];

    /// Product name used in the splash endpoint path.
    #[must_use]
    pub fn product(self) -> &'static str {
        match self {
            Category::RainRadar => "obs",
            Category::Satellite => "sat",
            Category::Thunder => "thunder",
            Category::Hail => "hail",
            Category::DrizzleSnow => "preciptype",
            Category::RadarSatellite => "radsat",
        }
    }

    /// Storage subdirectory, also the name used in config files and the CLI.
    #[must_use]
    pub fn dir_name(self) -> &'static str {
        match self {
            Category::RainRadar => "rain_radar",
            Category::Satellite => "satellite",
            Category::Thunder => "thunder",
            Category::Hail => "hail",
            Category::DrizzleSnow => "drizzle_snow",
            Category::RadarSatellite => "radar_satellite",
        }
    }

    /// Geographic extent of the canvas frames of this category are drawn on.
    #[must_use]
    pub fn bounds(self) -> GeoBounds {
        BENELUX_BOUNDS
    }

    /// Metadata endpoint for this category.
    #[must_use]
    pub fn endpoint(self, base_url: &str, access_token: &str) -> String {
        format!(
            "{}/{}?access_token={}&usehd=1",
            base_url.trim_end_matches('/'),
            self.product(),
            access_token
        )
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace('-', "_");
        Category::ALL
            .into_iter()
            .find(|c| c.dir_name() == wanted || c.product() == wanted)
            .ok_or_else(|| Error::UnknownCategory(s.to_string()))
    }
}
