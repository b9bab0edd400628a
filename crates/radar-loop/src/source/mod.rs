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

//! Remote tile source layer.
//!
//! The orchestrator only talks to the map service through the [`TileSource`]
//! trait, so the HTTP client can be swapped for an in-memory source in tests.
//!
//! Metadata format returned by the splash endpoints:
//! ```text
//! { "data": [ { "dateTime": "2025-06-01T12:05:00Z",
//!               "layerNameHD": "https://.../radar.png;https://.../overlay.png" } ] }
//! ```

mod http;

pub use http::{HttpConfig, HttpTileSource, DEFAULT_USER_AGENT};

use std::future::Future;

use chrono::{DateTime, NaiveDateTime, Utc};
use log::debug;
use serde::Deserialize;

use crate::category::Category;
use crate::error::FetchError;

/// One observation advertised by the metadata endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileEntry {
    /// Observation time.
    pub observed_at: DateTime<Utc>,
    /// URL of the main tile.
    pub primary: String,
    /// URL of a tile to lay over the main one.
    pub overlay: Option<String>,
}

/// Access to the remote map service.
pub trait TileSource {
    /// Latest available observations for `category`.
    fn fetch_metadata(
        &self,
        category: Category,
    ) -> impl Future<Output = Result<Vec<TileEntry>, FetchError>> + Send;

    /// Raw bytes of the tile at `url`.
    fn fetch_tile(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send;
}

#[derive(Debug, Deserialize)]
struct MetadataResponse {
    #[serde(default)]
    data: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(rename = "dateTime")]
    date_time: Option<String>,
    #[serde(rename = "layerNameHD")]
    layer_name_hd: Option<String>,
}

/// Parse a metadata response body.
///
/// A missing or empty `data` array yields no entries. Entries without a
/// usable time stamp or tile name are dropped.
pub fn parse_metadata(body: &[u8]) -> Result<Vec<TileEntry>, FetchError> {
    let response: MetadataResponse =
        serde_json::from_slice(body).map_err(|e| FetchError::Body(e.to_string()))?;

    Ok(response
        .data
        .into_iter()
        .filter_map(|raw| {
            let entry = raw.into_entry();
            if entry.is_none() {
                debug!("Skipping incomplete metadata entry");
            }
            entry
        })
        .collect())
}

impl RawEntry {
    fn into_entry(self) -> Option<TileEntry> {
        let observed_at = parse_timestamp(self.date_time.as_deref()?)?;
        let (primary, overlay) = split_layers(self.layer_name_hd.as_deref()?)?;
        Some(TileEntry {
            observed_at,
            primary,
            overlay,
        })
    }
}

/// Parse an ISO-8601 time stamp. Values without an offset are taken as UTC.
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Split `primary[;overlay]` into its parts.
fn split_layers(value: &str) -> Option<(String, Option<String>)> {
    let mut parts = value.split(';').map(str::trim);
    let primary = parts.next().filter(|p| !p.is_empty())?.to_string();
    let overlay = parts.next().filter(|p| !p.is_empty()).map(str::to_string);
    Some((primary, overlay))
}
