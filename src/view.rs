use geo::BoundingRect;

use crate::{
    envelope::Envelope,
    normalize::FeatureCollection,
    pipeline::ActiveEntry,
};

/// Camera position of a map panel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub lat: f64,
    pub lon: f64,
    pub zoom: u8,
}

impl Default for Viewport {
    fn default() -> Self {
        Viewport {
            lat: 0.0,
            lon: 0.0,
            zoom: 1,
        }
    }
}

impl Viewport {
    pub const MAX_ZOOM: u8 = 21;

    /// Centers on the box and picks the deepest zoom level showing its larger
    /// side. No box gives the default world view.
    pub fn fit(bounds: Option<geo::Rect<f64>>) -> Self {
        let Some(bounds) = bounds else {
            return Viewport::default();
        };

        let center = bounds.center();
        let max_side = bounds.width().max(bounds.height());

        let zoom = if max_side < 360.0 / 2f64.powi(20) {
            Self::MAX_ZOOM
        } else {
            let z = (360f64.log2() - max_side.log2()).floor();
            z.clamp(1.0, Self::MAX_ZOOM as f64) as u8
        };

        Viewport {
            lat: center.y,
            lon: center.x,
            zoom,
        }
    }

    pub fn for_envelope(envelope: &Envelope) -> Self {
        let [min, max] = envelope.bounds();
        Viewport::fit(Some(geo::Rect::new(
            geo::Coord {
                x: min.lon,
                y: min.lat,
            },
            geo::Coord {
                x: max.lon,
                y: max.lat,
            },
        )))
    }

    /// Degrees of longitude visible across the panel at this zoom.
    pub fn span_degrees(&self) -> f64 {
        360.0 / 2f64.powi(self.zoom as i32)
    }

    /// `[min, max]` longitude and latitude ranges around the center, the
    /// latitude range scaled by `aspect` (height over width).
    pub fn extent(&self, aspect: f64) -> ([f64; 2], [f64; 2]) {
        let half_w = self.span_degrees() / 2.0;
        let half_h = half_w * aspect;

        (
            [self.lon - half_w, self.lon + half_w],
            [self.lat - half_h, self.lat + half_h],
        )
    }
}

/// Combined bounding box of the entries' geometry, `None` when there is
/// nothing with coordinates.
pub fn active_bounds(
    collection: &FeatureCollection,
    entries: &[ActiveEntry],
) -> Option<geo::Rect<f64>> {
    entries
        .iter()
        .filter_map(|e| collection.features().get(e.index))
        .filter_map(|f| f.geometry.bounding_rect())
        .reduce(|a, b| {
            geo::Rect::new(
                geo::Coord {
                    x: a.min().x.min(b.min().x),
                    y: a.min().y.min(b.min().y),
                },
                geo::Coord {
                    x: a.max().x.max(b.max().x),
                    y: a.max().y.max(b.max().y),
                },
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        envelope::{BufferKm, LatLon},
        normalize::{Feature, FeatureId},
        overpass::ElementKind,
    };

    #[test]
    fn empty_set_gives_default_view() {
        let collection = FeatureCollection::default();
        let bounds = active_bounds(&collection, &[]);
        assert_eq!(bounds, None);
        assert_eq!(Viewport::fit(bounds), Viewport::default());
    }

    #[test]
    fn fits_the_bounds() {
        let collection = FeatureCollection::new(vec![
            Feature {
                id: FeatureId::new(ElementKind::Node, 1),
                geometry: geo::Point::new(174.0, -37.0).into(),
                tags: None,
                nodes: vec![],
            },
            Feature {
                id: FeatureId::new(ElementKind::Way, 1),
                geometry: geo::LineString::from(vec![(174.5, -36.5), (175.0, -36.0)]).into(),
                tags: None,
                nodes: vec![],
            },
        ]);
        let entries = [
            ActiveEntry {
                index: 0,
                name: String::new(),
            },
            ActiveEntry {
                index: 1,
                name: String::new(),
            },
        ];

        let bounds = active_bounds(&collection, &entries).unwrap();
        assert_eq!(bounds.min(), geo::Coord { x: 174.0, y: -37.0 });
        assert_eq!(bounds.max(), geo::Coord { x: 175.0, y: -36.0 });

        let view = Viewport::fit(Some(bounds));
        assert_eq!(view.lon, 174.5);
        assert_eq!(view.lat, -36.5);
        // log2(360) = 8.49
        assert_eq!(view.zoom, 8);
    }

    #[test]
    fn single_point_zooms_in_fully() {
        let point = geo::Coord { x: 1.0, y: 2.0 };
        let view = Viewport::fit(Some(geo::Rect::new(point, point)));
        assert_eq!(view.zoom, Viewport::MAX_ZOOM);
        assert_eq!((view.lat, view.lon), (2.0, 1.0));
    }

    #[test]
    fn whole_world_is_clamped() {
        let view = Viewport::fit(Some(geo::Rect::new(
            geo::Coord { x: -180.0, y: -85.0 },
            geo::Coord { x: 180.0, y: 85.0 },
        )));
        assert_eq!(view.zoom, 1);
    }

    #[test]
    fn envelope_view() {
        let env = Envelope::around(LatLon::new(-36.8485, 174.7633), BufferKm::default());
        let view = Viewport::for_envelope(&env);
        assert!((view.lat - -36.8485).abs() < 1e-9);
        assert!((view.lon - 174.7633).abs() < 1e-9);
        // 0.027 degrees wide
        assert_eq!(view.zoom, 13);

        let (x, y) = view.extent(0.5);
        assert!(x[0] < env.min.lon && x[1] > env.max.lon);
        assert!((y[1] - y[0]) * 2.0 - (x[1] - x[0]) < 1e-9);
    }
}
