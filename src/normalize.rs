use std::{
    collections::{hash_map::Entry, BTreeMap, HashMap, HashSet},
    fmt,
};

use geo::{Contains, CoordsIter};
use serde_json::Value;
use tracing::debug;

use crate::{
    error::MalformedTagError,
    overpass::{ElementKind, RawElement},
};

pub type Tags = BTreeMap<String, String>;

/// Keys that make a closed way an area.
pub const AREA_KEYS: [&str; 14] = [
    "building",
    "landuse",
    "amenity",
    "leisure",
    "natural",
    "place",
    "shop",
    "tourism",
    "boundary",
    "man_made",
    "aeroway",
    "military",
    "historic",
    "area:highway",
];

/// Unique within one fetch result: Overpass ids are only unique per element
/// kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureId {
    pub kind: ElementKind,
    pub id: i64,
}

impl FeatureId {
    pub fn new(kind: ElementKind, id: i64) -> Self {
        FeatureId { kind, id }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ElementKind::Node => "node",
            ElementKind::Way => "way",
            ElementKind::Relation => "relation",
            ElementKind::Other => "other",
        })
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: FeatureId,
    /// `x` is the longitude, `y` the latitude.
    pub geometry: geo::Geometry<f64>,
    pub tags: Option<Tags>,
    /// Node references, only set for ways.
    pub nodes: Vec<i64>,
}

impl Feature {
    /// Every (key, value) tag pair, none if the feature is untagged.
    pub fn tag_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tags
            .iter()
            .flatten()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[cfg(test)]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.as_ref()?.get(key).map(String::as_str)
    }

    pub fn table_row(&self, name: &str) -> TableRow {
        let cells = Column::ALL.map(|c| match c {
            Column::Type => self.id.kind.to_string(),
            Column::Id => self.id.id.to_string(),
            Column::Name => name.to_string(),
            Column::Tags => self
                .tag_pairs()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("; "),
            Column::Nodes => self
                .nodes
                .iter()
                .map(i64::to_string)
                .collect::<Vec<_>>()
                .join(","),
            Column::Geometry => format!(
                "{}({})",
                geometry_kind(&self.geometry),
                self.geometry.coords_count()
            ),
        });

        TableRow { id: self.id, cells }
    }
}

fn geometry_kind(g: &geo::Geometry<f64>) -> &'static str {
    match g {
        geo::Geometry::Point(_) => "Point",
        geo::Geometry::Line(_) => "Line",
        geo::Geometry::LineString(_) => "LineString",
        geo::Geometry::Polygon(_) => "Polygon",
        geo::Geometry::MultiPoint(_) => "MultiPoint",
        geo::Geometry::MultiLineString(_) => "MultiLineString",
        geo::Geometry::MultiPolygon(_) => "MultiPolygon",
        geo::Geometry::GeometryCollection(_) => "GeometryCollection",
        geo::Geometry::Rect(_) => "Rect",
        geo::Geometry::Triangle(_) => "Triangle",
    }
}

/// Columns of the tabular view, in display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Type,
    Id,
    Name,
    Tags,
    Nodes,
    Geometry,
}

impl Column {
    pub const ALL: [Column; 6] = [
        Column::Type,
        Column::Id,
        Column::Name,
        Column::Tags,
        Column::Nodes,
        Column::Geometry,
    ];

    pub fn title(self) -> &'static str {
        match self {
            Column::Type => "type",
            Column::Id => "id",
            Column::Name => "name",
            Column::Tags => "tags",
            Column::Nodes => "nodes",
            Column::Geometry => "geometry",
        }
    }

    pub fn hidden_by_default(self) -> bool {
        matches!(self, Column::Tags | Column::Nodes | Column::Geometry)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub id: FeatureId,
    /// One cell per entry of [`Column::ALL`].
    pub cells: [String; 6],
}

impl TableRow {
    pub fn cell(&self, column: Column) -> &str {
        let ix = Column::ALL.iter().position(|c| *c == column).unwrap_or(0);
        &self.cells[ix]
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureCollection {
    features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        FeatureCollection { features }
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// One row per feature, named from its tags.
    #[cfg(test)]
    pub fn table(&self) -> Vec<TableRow> {
        self.features
            .iter()
            .map(|f| f.table_row(&crate::pipeline::display_name(f.tags.as_ref())))
            .collect()
    }
}

/// Builds features out of raw Overpass elements.
///
/// Elements repeated in the response (a recursed query outputs members once
/// with their body and once as skeleton) are merged, keeping the tagged copy.
/// Untagged nodes and ways referenced by other elements only carry geometry
/// and do not become features of their own.
pub fn normalize(elements: Vec<RawElement>) -> FeatureCollection {
    let mut order = vec![];
    let mut by_id: HashMap<FeatureId, RawElement> = HashMap::new();

    for element in elements {
        if element.kind == ElementKind::Other {
            continue;
        }

        let id = FeatureId::new(element.kind, element.id);
        match by_id.entry(id) {
            Entry::Vacant(slot) => {
                order.push(id);
                slot.insert(element);
            }
            Entry::Occupied(mut slot) => {
                if slot.get().tags.is_none() && element.tags.is_some() {
                    slot.insert(element);
                }
            }
        }
    }

    let index = Index::new(&by_id);

    let features = order
        .into_iter()
        .filter_map(|id| {
            let mut element = by_id.remove(&id)?;
            let tags = convert_tags(id, element.tags.take());

            if tags.as_ref().map_or(true, |t| t.is_empty()) && index.referenced.contains(&id) {
                return None;
            }

            let geometry = match id.kind {
                ElementKind::Node => index
                    .nodes
                    .get(&id.id)
                    .map(|c| geo::Geometry::Point(geo::Point(*c))),
                ElementKind::Way => index.way_geometry(&element.nodes, tags.as_ref()),
                ElementKind::Relation => index.relation_geometry(&element, tags.as_ref()),
                ElementKind::Other => None,
            };

            let Some(geometry) = geometry else {
                debug!("dropping {id}, no geometry could be resolved");
                return None;
            };

            Some(Feature {
                id,
                geometry,
                tags,
                nodes: element.nodes,
            })
        })
        .collect();

    FeatureCollection::new(features)
}

/// Tags that are not a mapping are reported and treated as absent.
fn convert_tags(id: FeatureId, raw: Option<Value>) -> Option<Tags> {
    match raw? {
        Value::Object(map) => Some(
            map.into_iter()
                .map(|(k, v)| match v {
                    Value::String(s) => (k, s),
                    other => (k, other.to_string()),
                })
                .collect(),
        ),
        other => {
            let err = MalformedTagError {
                feature: id.to_string(),
                found: other.to_string(),
            };
            debug!("{err}");
            None
        }
    }
}

fn is_area(tags: Option<&Tags>) -> bool {
    let Some(tags) = tags else {
        return false;
    };

    match tags.get("area").map(String::as_str) {
        Some("no") => false,
        Some("yes") => true,
        _ => {
            tags.get("natural").map(String::as_str) != Some("coastline")
                && AREA_KEYS.iter().any(|k| tags.contains_key(*k))
        }
    }
}

struct Index {
    nodes: HashMap<i64, geo::Coord<f64>>,
    ways: HashMap<i64, Vec<i64>>,
    referenced: HashSet<FeatureId>,
}

impl Index {
    fn new(elements: &HashMap<FeatureId, RawElement>) -> Self {
        let mut nodes = HashMap::new();
        let mut ways = HashMap::new();
        let mut referenced = HashSet::new();

        for (id, e) in elements {
            match id.kind {
                ElementKind::Node => {
                    if let (Some(lat), Some(lon)) = (e.lat, e.lon) {
                        nodes.insert(id.id, geo::Coord { x: lon, y: lat });
                    }
                }
                ElementKind::Way => {
                    ways.insert(id.id, e.nodes.clone());
                    referenced.extend(e.nodes.iter().map(|n| FeatureId::new(ElementKind::Node, *n)));
                }
                ElementKind::Relation => {
                    referenced.extend(
                        e.members
                            .iter()
                            .filter(|m| m.kind != ElementKind::Relation)
                            .map(|m| FeatureId::new(m.kind, m.id)),
                    );
                }
                ElementKind::Other => {}
            }
        }

        Index {
            nodes,
            ways,
            referenced,
        }
    }

    fn coords(&self, node_ids: &[i64]) -> Vec<geo::Coord<f64>> {
        node_ids
            .iter()
            .filter_map(|n| self.nodes.get(n).copied())
            .collect()
    }

    fn way_coords(&self, way: i64) -> Option<Vec<geo::Coord<f64>>> {
        let coords = self.coords(self.ways.get(&way)?);
        (coords.len() >= 2).then_some(coords)
    }

    fn way_geometry(&self, node_ids: &[i64], tags: Option<&Tags>) -> Option<geo::Geometry<f64>> {
        let coords = self.coords(node_ids);
        if coords.len() < 2 {
            return None;
        }

        let closed = node_ids.first() == node_ids.last() && coords.first() == coords.last();
        let line = geo::LineString::new(coords);

        if closed && line.0.len() >= 4 && is_area(tags) {
            Some(geo::Polygon::new(line, vec![]).into())
        } else {
            Some(line.into())
        }
    }

    fn relation_geometry(
        &self,
        relation: &RawElement,
        tags: Option<&Tags>,
    ) -> Option<geo::Geometry<f64>> {
        let kind = tags.and_then(|t| t.get("type")).map(String::as_str);

        if matches!(kind, Some("multipolygon") | Some("boundary")) {
            if let Some(polygons) = self.assemble_multipolygon(relation) {
                return Some(polygons.into());
            }
            debug!(
                "relation/{} has no closed outer ring, keeping its members",
                relation.id
            );
        }

        let members = relation
            .members
            .iter()
            .filter_map(|m| match m.kind {
                ElementKind::Node => self
                    .nodes
                    .get(&m.id)
                    .map(|c| geo::Geometry::Point(geo::Point(*c))),
                ElementKind::Way => self
                    .way_coords(m.id)
                    .map(|c| geo::Geometry::LineString(geo::LineString::new(c))),
                _ => None,
            })
            .collect::<Vec<_>>();

        if members.is_empty() {
            return None;
        }
        Some(geo::Geometry::GeometryCollection(
            geo::GeometryCollection::new_from(members),
        ))
    }

    fn assemble_multipolygon(&self, relation: &RawElement) -> Option<geo::MultiPolygon<f64>> {
        let mut outer = vec![];
        let mut inner = vec![];

        for member in relation.members.iter().filter(|m| m.kind == ElementKind::Way) {
            let Some(coords) = self.way_coords(member.id) else {
                continue;
            };

            match member.role.as_str() {
                "inner" => inner.push(coords),
                _ => outer.push(coords),
            }
        }

        let outer = assemble_rings(outer);
        if outer.is_empty() {
            return None;
        }

        let mut polygons = outer
            .into_iter()
            .map(|ring| geo::Polygon::new(ring, vec![]))
            .collect::<Vec<_>>();

        for ring in assemble_rings(inner) {
            let Some(first) = ring.0.first().copied() else {
                continue;
            };

            let point = geo::Point(first);
            match polygons.iter_mut().find(|p| p.contains(&point)) {
                Some(polygon) => polygon.interiors_push(ring),
                None => debug!("relation/{}: inner ring outside every outer ring", relation.id),
            }
        }

        Some(geo::MultiPolygon::new(polygons))
    }
}

/// Joins way segments end to end into closed rings. Segments that cannot be
/// closed are dropped.
pub fn assemble_rings(mut segments: Vec<Vec<geo::Coord<f64>>>) -> Vec<geo::LineString<f64>> {
    let mut rings = vec![];

    while let Some(mut ring) = segments.pop() {
        while ring.first() != ring.last() {
            let Some(&end) = ring.last() else {
                break;
            };

            let next = segments
                .iter()
                .position(|s| s.first() == Some(&end) || s.last() == Some(&end));

            let Some(ix) = next else {
                break;
            };

            let mut segment = segments.swap_remove(ix);
            if segment.first() != Some(&end) {
                segment.reverse();
            }
            ring.extend(segment.into_iter().skip(1));
        }

        if ring.len() >= 4 && ring.first() == ring.last() {
            rings.push(geo::LineString::new(ring));
        }
    }

    rings
}
