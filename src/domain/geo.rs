// Map geometry - bounding box and lat/lon to pixel projection
use serde::{Deserialize, Serialize};

/// Latitude at which the Mercator square ends; beyond it `y` diverges.
pub const MAX_MERCATOR_LAT: f64 = 85.051_128_78;

/// Geographic window rendered onto the basemap, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapBoundingBox {
    pub west: f64,
    pub east: f64,
    pub north: f64,
    pub south: f64,
}

impl MapBoundingBox {
    pub fn new(west: f64, east: f64, north: f64, south: f64) -> Self {
        Self {
            west,
            east,
            north,
            south,
        }
    }

    /// Project a coordinate onto an image `width` pixels wide.
    ///
    /// `x` is linear in longitude. `y` is Mercator at the same scale as `x`,
    /// anchored so that `north` lands on row 0. Results may fall outside the
    /// image; callers bounds-check before drawing. Latitudes past
    /// [`MAX_MERCATOR_LAT`] are pinned to it so `y` stays finite.
    pub fn project(&self, lat: f64, lon: f64, width: u32) -> (i64, i64) {
        let width = f64::from(width);
        let span = self.east - self.west;

        let x = ((lon - self.west) / span * width).round();

        let scale = width / span.to_radians();
        let top = mercator_factor(self.north) * scale;
        let y = (top - mercator_factor(lat) * scale).round();

        (x as i64, y as i64)
    }
}

fn mercator_factor(lat_deg: f64) -> f64 {
    let sin = lat_deg
        .clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT)
        .to_radians()
        .sin();
    0.5 * ((1.0 + sin) / (1.0 - sin)).ln()
}
