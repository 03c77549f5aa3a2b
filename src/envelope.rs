use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

/// Meters per degree, applied the same way to latitude and longitude.
const METERS_PER_DEGREE: f64 = 111_111.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        LatLon { lat, lon }
    }
}

/// Buffer distance in kilometers, always within [`BufferKm::MIN`, `BufferKm::MAX`].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct BufferKm(f64);

impl BufferKm {
    pub const MIN: f64 = 0.5;
    pub const MAX: f64 = 10.0;
    pub const STEP: f64 = 0.5;

    pub fn new(km: f64) -> Option<Self> {
        if (Self::MIN..=Self::MAX).contains(&km) {
            Some(BufferKm(km))
        } else {
            None
        }
    }

    pub fn km(self) -> f64 {
        self.0
    }

    pub fn increase(self) -> Self {
        BufferKm((self.0 + Self::STEP).min(Self::MAX))
    }

    pub fn decrease(self) -> Self {
        BufferKm((self.0 - Self::STEP).max(Self::MIN))
    }

    /// Radius of the circular buffer in degrees. The buffer distance is
    /// treated as a diameter.
    pub fn radius_degrees(self) -> f64 {
        self.0 / 2.0 / METERS_PER_DEGREE * 1000.0
    }
}

impl Default for BufferKm {
    fn default() -> Self {
        BufferKm(3.0)
    }
}

impl fmt::Display for BufferKm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BufferKm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let km: f64 = s.trim().parse().map_err(|_| format!("{s:?} is not a number"))?;
        BufferKm::new(km).ok_or_else(|| {
            format!(
                "buffer must be between {} and {} km",
                BufferKm::MIN,
                BufferKm::MAX
            )
        })
    }
}

/// Axis aligned rectangle around a geocoded point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub center: LatLon,
    pub buffer: BufferKm,
    pub min: LatLon,
    pub max: LatLon,
}

impl Envelope {
    /// Envelope of the circular buffer around `center`, which is the square of
    /// side twice the radius.
    pub fn around(center: LatLon, buffer: BufferKm) -> Self {
        let r = buffer.radius_degrees();

        Envelope {
            center,
            buffer,
            min: LatLon::new(center.lat - r, center.lon - r),
            max: LatLon::new(center.lat + r, center.lon + r),
        }
    }

    /// Bounding box as `[min, max]` corners.
    pub fn bounds(&self) -> [LatLon; 2] {
        [self.min, self.max]
    }

    /// Closed exterior ring, counter-clockwise from the min corner.
    pub fn exterior(&self) -> [LatLon; 5] {
        [
            self.min,
            LatLon::new(self.min.lat, self.max.lon),
            self.max,
            LatLon::new(self.max.lat, self.min.lon),
            self.min,
        ]
    }

    /// Coordinates for an Overpass `poly:` filter: `lat lon` pairs separated
    /// by spaces.
    pub fn overpass_poly(&self) -> String {
        self.exterior()
            .iter()
            .map(|p| format!("{:.6} {:.6}", p.lat, p.lon))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_bounds() {
        assert!(BufferKm::new(0.4).is_none());
        assert!(BufferKm::new(10.5).is_none());
        assert_eq!(BufferKm::new(10.0).unwrap().increase().km(), 10.0);
        assert_eq!(BufferKm::new(0.5).unwrap().decrease().km(), 0.5);
        assert_eq!(BufferKm::default().increase().km(), 3.5);

        assert_eq!("2.5".parse::<BufferKm>().unwrap().km(), 2.5);
        assert!("11".parse::<BufferKm>().is_err());
        assert!("far".parse::<BufferKm>().is_err());
    }

    #[test]
    fn envelope_is_square_around_center() {
        let center = LatLon::new(-36.8485, 174.7633);
        let env = Envelope::around(center, BufferKm::default());
        let r = 3.0 / 2.0 / 111_111.0 * 1000.0;

        assert!((env.max.lat - env.min.lat - 2.0 * r).abs() < 1e-12);
        assert!((env.max.lon - env.min.lon - 2.0 * r).abs() < 1e-12);
        assert!(env.min.lat <= env.max.lat && env.min.lon <= env.max.lon);
        assert_eq!(env.bounds(), [env.min, env.max]);
    }

    #[test]
    fn poly_string() {
        let env = Envelope::around(LatLon::new(10.0, 20.0), BufferKm::new(2.0).unwrap());
        let poly = env.overpass_poly();

        let values = poly.split(' ').collect::<Vec<_>>();
        assert_eq!(values.len(), 10);
        assert_eq!(values[0], "9.991000");
        assert_eq!(values[1], "19.991000");
        assert_eq!(values[2], "9.991000");
        assert_eq!(values[3], "20.009000");
        assert_eq!(&values[8..], &values[..2]);
    }
}
