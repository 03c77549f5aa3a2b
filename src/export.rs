use std::{fs, io, path::Path};

use geojson::{feature::Id, JsonObject};

use crate::normalize::Feature;

/// GeoJSON collection of the given features, each carrying its display name.
pub fn to_geojson<'a>(
    features: impl IntoIterator<Item = (&'a Feature, &'a str)>,
) -> geojson::FeatureCollection {
    let features = features
        .into_iter()
        .map(|(f, name)| {
            let mut properties = JsonObject::new();
            properties.insert("type".into(), f.id.kind.to_string().into());
            properties.insert("id".into(), f.id.id.into());
            properties.insert("name".into(), name.into());
            if let Some(tags) = &f.tags {
                properties.insert(
                    "tags".into(),
                    tags.iter()
                        .map(|(k, v)| (k.clone(), serde_json::Value::from(v.as_str())))
                        .collect::<JsonObject>()
                        .into(),
                );
            }

            geojson::Feature {
                bbox: None,
                geometry: Some(geojson::Geometry::new(geojson::Value::from(&f.geometry))),
                id: Some(Id::String(f.id.to_string())),
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect();

    geojson::FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

/// File name for an export of `place`, keeping only characters that are safe
/// on every filesystem.
pub fn file_name(place: &str) -> String {
    let stem = place
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect::<String>();
    let stem = stem.trim_matches('_');

    if stem.is_empty() {
        "features.geojson".to_string()
    } else {
        format!("{stem}.geojson")
    }
}

pub fn write<'a>(
    path: &Path,
    features: impl IntoIterator<Item = (&'a Feature, &'a str)>,
) -> io::Result<()> {
    let json = serde_json::to_string(&to_geojson(features)).map_err(io::Error::from)?;
    fs::write(path, json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{normalize::FeatureId, overpass::ElementKind};

    #[test]
    fn features_keep_name_and_tags() {
        let feature = Feature {
            id: FeatureId::new(ElementKind::Node, 42),
            geometry: geo::Point::new(174.7, -36.8).into(),
            tags: Some([("bus".to_string(), "yes".to_string())].into_iter().collect()),
            nodes: vec![],
        };

        let fc = to_geojson([(&feature, "Stop A")]);
        assert_eq!(fc.features.len(), 1);

        let f = &fc.features[0];
        assert_eq!(f.id, Some(Id::String("node/42".to_string())));
        assert_eq!(f.property("name"), Some(&serde_json::json!("Stop A")));
        assert_eq!(f.property("tags"), Some(&serde_json::json!({"bus": "yes"})));
        assert_eq!(
            f.geometry.as_ref().map(|g| &g.value),
            Some(&geojson::Value::Point(vec![174.7, -36.8]))
        );
    }

    #[test]
    fn file_names() {
        assert_eq!(file_name("Auckland, New Zealand"), "Auckland__New_Zealand.geojson");
        assert_eq!(file_name("../.."), "features.geojson");
        assert_eq!(file_name("Zürich"), "Zürich.geojson");
    }
}
