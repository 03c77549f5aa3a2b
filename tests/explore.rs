use osm_explorer::{
    envelope::LatLon,
    error::FetchError,
    export,
    normalize::{self, Column, FeatureCollection, FeatureId},
    overpass::{self, ElementKind},
    pipeline::TagRecord,
    session::{Command, Event, Session},
    view::Viewport,
};

const FIXTURE: &str = include_str!("data/overpass.json");

fn collection() -> FeatureCollection {
    normalize::normalize(overpass::parse_response(FIXTURE).unwrap())
}

fn loaded() -> Session {
    let mut session = Session::new("[out:json][timeout:10]");
    session.dispatch(Event::SetPlace("Auckland, New Zealand".to_string()));

    let cmd = session.dispatch(Event::Geocoded(Ok(LatLon::new(-36.8485, 174.7633))));
    let Some(Command::Fetch { query, .. }) = cmd else {
        panic!("expected a fetch, got {cmd:?}");
    };
    assert!(query.trim_start().starts_with("[out:json][timeout:10];"));
    assert!(query.contains("node[bus=yes](poly:'"));

    assert_eq!(session.dispatch(Event::Fetched(Ok(collection()))), None);
    session
}

fn names(session: &Session) -> Vec<String> {
    session.displayed().map(|(_, n)| n.to_string()).collect()
}

#[test]
fn skeleton_nodes_are_not_features() {
    let fc = collection();

    let ids = fc.features().iter().map(|f| f.id).collect::<Vec<_>>();
    assert_eq!(
        ids,
        vec![
            FeatureId::new(ElementKind::Way, 1),
            FeatureId::new(ElementKind::Way, 2),
            FeatureId::new(ElementKind::Way, 3),
        ]
    );
    assert!(fc
        .features()
        .iter()
        .all(|f| matches!(f.geometry, geo::Geometry::LineString(_))));
}

#[test]
fn vocabulary_skips_names_and_refs() {
    let session = loaded();

    assert_eq!(
        session.vocabulary(),
        &[
            TagRecord::new("highway", "residential"),
            TagRecord::new("highway", "primary"),
            TagRecord::new("railway", "rail"),
        ]
    );
}

#[test]
fn nothing_selected_shows_everything() {
    let session = loaded();

    assert_eq!(session.table_rows().len(), 3);
    assert_eq!(names(&session), ["Queen Street", "Karangahape Road", ""]);

    let rows = session.table_rows();
    assert_eq!(rows[1].cell(Column::Name), "Karangahape Road");
    assert_eq!(rows[2].cell(Column::Type), "way");
    assert_eq!(rows[2].cell(Column::Nodes), "105,106");
}

#[test]
fn tags_and_rows_narrow_the_map() {
    let mut session = loaded();

    session.dispatch(Event::ToggleTag(TagRecord::new("highway", "primary")));
    assert_eq!(names(&session), ["Karangahape Road"]);

    session.dispatch(Event::ToggleTag(TagRecord::new("railway", "rail")));
    assert_eq!(session.table_rows().len(), 2);
    assert_eq!(names(&session), ["Karangahape Road", ""]);

    // a checked row wins over the tag filter, the table keeps listing it
    session.dispatch(Event::ToggleRow(FeatureId::new(ElementKind::Way, 3)));
    assert_eq!(session.table_rows().len(), 2);
    let shown = session.displayed().map(|(f, _)| f.id).collect::<Vec<_>>();
    assert_eq!(shown, vec![FeatureId::new(ElementKind::Way, 3)]);

    let view = session.viewport();
    assert!((view.lon - 174.775).abs() < 1e-9);
    assert!((view.lat + 36.865).abs() < 1e-9);
    assert_eq!(view.zoom, 15);

    session.dispatch(Event::ClearSelection);
    assert_eq!(session.displayed().count(), 3);
}

#[test]
fn unchecking_a_tag_restores_everything() {
    let mut session = loaded();
    let residential = TagRecord::new("highway", "residential");

    session.dispatch(Event::ToggleTag(residential.clone()));
    assert_eq!(names(&session), ["Queen Street"]);
    assert_eq!(session.table_rows().len(), 1);

    session.dispatch(Event::ToggleTag(residential));
    assert!(session.selection().is_empty());
    assert_eq!(session.displayed().count(), 3);
    assert_eq!(session.table_rows().len(), 3);
}

#[test]
fn new_query_drops_the_previous_results() {
    let mut session = loaded();
    session.dispatch(Event::ToggleTag(TagRecord::new("highway", "primary")));

    session.dispatch(Event::SetQueryText("way[highway]".to_string()));
    let cmd = session.dispatch(Event::SubmitQuery);
    assert!(matches!(cmd, Some(Command::Fetch { query, .. }) if query.contains("way[highway](poly:'")));

    assert!(session.collection().is_none());
    assert!(session.selection().is_empty());
    assert_eq!(session.displayed().count(), 0);
}

#[test]
fn empty_result_resets_the_map() {
    let err = overpass::parse_response(r#"{"version": 0.6, "elements": []}"#).unwrap_err();
    assert!(matches!(err, FetchError::Empty));

    let mut session = loaded();
    session.dispatch(Event::SubmitQuery);
    session.dispatch(Event::Fetched(Err(err)));

    assert_eq!(session.viewport(), Viewport::default());
    assert!(session.vocabulary().is_empty());
    assert!(session.table_rows().is_empty());
    assert!(session.take_error().is_some());
}

#[test]
fn export_writes_the_displayed_features() {
    let mut session = loaded();
    session.dispatch(Event::ToggleTag(TagRecord::new("highway", "residential")));

    let path = std::env::temp_dir().join(format!(
        "osm-explorer-{}-{}",
        std::process::id(),
        export::file_name(session.place())
    ));
    export::write(&path, session.displayed()).unwrap();

    let written = std::fs::read_to_string(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    let fc = written.parse::<geojson::GeoJson>().unwrap();
    let geojson::GeoJson::FeatureCollection(fc) = fc else {
        panic!("expected a feature collection");
    };
    assert_eq!(fc.features.len(), 1);
    assert_eq!(
        fc.features[0].property("name"),
        Some(&serde_json::json!("Queen Street"))
    );
}
