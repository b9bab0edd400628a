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

//! Mercator projection for fixed-extent map canvases.
//!
//! Longitude maps linearly onto the canvas width. Latitude uses the Mercator
//! y-transform scaled so that the canvas width spans `right_lon - left_lon`.
//! The transform diverges at exactly ±90° latitude; callers never pass those.

/// Geographic extent of a Mercator-projected map canvas.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoBounds {
    /// Longitude at the left edge, in degrees.
    pub left_lon: f64,
    /// Longitude at the right edge, in degrees.
    pub right_lon: f64,
    /// Latitude at the top edge, in degrees.
    pub top_lat: f64,
}

/// Mercator ordinate of a latitude given in degrees.
fn mercator_y(lat: f64) -> f64 {
    let sin = lat.to_radians().sin();
    0.5 * ((1.0 + sin) / (1.0 - sin)).ln()
}

/// Convert a latitude/longitude pair to pixel coordinates on a canvas of
/// `width` pixels spanning `bounds`.
#[must_use]
pub fn project(lat: f64, lon: f64, bounds: &GeoBounds, width: u32) -> (i32, i32) {
    let width = f64::from(width);
    let span = bounds.right_lon - bounds.left_lon;

    let x = ((lon - bounds.left_lon) / span * width).round();

    let scale = width / span.to_radians();
    let top = scale * mercator_y(bounds.top_lat);
    let y = (top - scale * mercator_y(lat)).round();

    (x as i32, y as i32)
}

impl GeoBounds {
    /// Project a point onto a canvas of `width` pixels covering these bounds.
    #[must_use]
    pub fn project(&self, lat: f64, lon: f64, width: u32) -> (i32, i32) {
        project(lat, lon, self, width)
    }
}
