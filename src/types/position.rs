//! Geographic position and station-relative helpers

use serde::{Deserialize, Serialize};

const EARTH_RADIUS_KM: f64 = 6371.0088;

/// A decoded APRS position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    /// Latitude in decimal degrees, north positive
    pub latitude: f64,
    /// Longitude in decimal degrees, east positive
    pub longitude: f64,
    /// Symbol table identifier (`/`, `\` or overlay character)
    pub symbol_table: char,
    /// Symbol code within the table
    pub symbol_code: char,
}

impl Position {
    /// Great-circle distance to another position in kilometres (haversine).
    pub fn distance_km(&self, other: &Position) -> f64 {
        let (lat1, lat2) = (self.latitude.to_radians(), other.latitude.to_radians());
        let d_lat = lat2 - lat1;
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
    }

    /// Initial compass bearing towards another position, in degrees `[0, 360)`.
    pub fn bearing_deg(&self, other: &Position) -> f64 {
        let (lat1, lat2) = (self.latitude.to_radians(), other.latitude.to_radians());
        let d_lon = (other.longitude - self.longitude).to_radians();

        let x = d_lon.sin() * lat2.cos();
        let y = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lon.cos();
        (x.atan2(y).to_degrees() + 360.0) % 360.0
    }
}

/// Sixteen-point compass name for a bearing in degrees.
pub fn cardinal(bearing_deg: f64) -> &'static str {
    const POINTS: [&str; 16] = [
        "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW",
        "NNW",
    ];
    let normalized = bearing_deg.rem_euclid(360.0);
    let index = ((normalized / 22.5) + 0.5) as usize % POINTS.len();
    POINTS[index]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(latitude: f64, longitude: f64) -> Position {
        Position { latitude, longitude, symbol_table: '/', symbol_code: '>' }
    }

    #[test]
    fn distance_between_known_points() {
        // Boston to New York, roughly 306 km
        let boston = at(42.3601, -71.0589);
        let new_york = at(40.7128, -74.0060);
        let d = boston.distance_km(&new_york);
        assert!((d - 306.0).abs() < 5.0, "got {d}");
        assert!(boston.distance_km(&boston) < 1e-9);
    }

    #[test]
    fn bearing_and_cardinal() {
        let origin = at(0.0, 0.0);
        assert!((origin.bearing_deg(&at(1.0, 0.0)) - 0.0).abs() < 1e-6);
        assert!((origin.bearing_deg(&at(0.0, 1.0)) - 90.0).abs() < 1e-6);
        assert_eq!(cardinal(0.0), "N");
        assert_eq!(cardinal(359.0), "N");
        assert_eq!(cardinal(90.0), "E");
        assert_eq!(cardinal(202.5), "SSW");
    }
}
