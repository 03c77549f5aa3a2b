//! The explorer's state machine. Every user interaction and every finished
//! request is an [`Event`]; [`Session::dispatch`] recomputes what depends on
//! it and says which request, if any, has to run next.

use tracing::{debug, info, warn};

use crate::{
    envelope::{BufferKm, Envelope, LatLon},
    error::{FetchError, GeocodeError},
    normalize::{Feature, FeatureCollection, FeatureId, TableRow},
    pipeline::{self, Filtered, Selection, TagRecord},
    query::{self, Endpoint, TEMPLATES},
    view::{self, Viewport},
};

pub const DEFAULT_PLACE: &str = "Auckland, New Zealand";

#[derive(Debug)]
pub enum Event {
    SelectEndpoint(Endpoint),
    SetPlace(String),
    SetBuffer(BufferKm),
    /// Replaces the query text with the template's filter and runs it.
    SelectTemplate(usize),
    SetQueryText(String),
    SubmitQuery,
    Geocoded(Result<LatLon, GeocodeError>),
    Fetched(Result<FeatureCollection, FetchError>),
    ToggleTag(TagRecord),
    ToggleRow(FeatureId),
    ClearSelection,
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::SelectEndpoint(_) => "select-endpoint",
            Event::SetPlace(_) => "set-place",
            Event::SetBuffer(_) => "set-buffer",
            Event::SelectTemplate(_) => "select-template",
            Event::SetQueryText(_) => "set-query-text",
            Event::SubmitQuery => "submit-query",
            Event::Geocoded(_) => "geocoded",
            Event::Fetched(_) => "fetched",
            Event::ToggleTag(_) => "toggle-tag",
            Event::ToggleRow(_) => "toggle-row",
            Event::ClearSelection => "clear-selection",
        }
    }
}

/// Blocking work the front end must run and report back as an [`Event`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Geocode { place: String },
    Fetch { endpoint: Endpoint, query: String },
}

pub struct Session {
    settings: String,

    endpoint: Endpoint,
    place: String,
    buffer: BufferKm,
    template: usize,
    query_text: String,

    center: Option<LatLon>,
    envelope: Option<Envelope>,
    area_viewport: Viewport,
    query: Option<String>,

    collection: Option<FeatureCollection>,
    vocabulary: Vec<TagRecord>,
    selection: Selection,
    filtered: Filtered,
    viewport: Viewport,

    error: Option<String>,
}

impl Session {
    /// `settings` is the global settings line queries are built with.
    pub fn new(settings: impl Into<String>) -> Self {
        Session {
            settings: settings.into(),
            endpoint: Endpoint::default(),
            place: DEFAULT_PLACE.to_string(),
            buffer: BufferKm::default(),
            template: 0,
            query_text: TEMPLATES[0].filter.to_string(),
            center: None,
            envelope: None,
            area_viewport: Viewport::default(),
            query: None,
            collection: None,
            vocabulary: vec![],
            selection: Selection::default(),
            filtered: Filtered::default(),
            viewport: Viewport::default(),
            error: None,
        }
    }

    pub fn dispatch(&mut self, event: Event) -> Option<Command> {
        debug!("dispatching {}", event.name());

        match event {
            Event::SelectEndpoint(endpoint) => {
                if endpoint == self.endpoint {
                    return None;
                }
                self.endpoint = endpoint;
                self.rebuild_query()
            }
            Event::SetPlace(place) => {
                self.place = place.trim().to_string();
                self.clear_area();

                if self.place.is_empty() {
                    return None;
                }
                Some(Command::Geocode {
                    place: self.place.clone(),
                })
            }
            Event::SetBuffer(buffer) => {
                if buffer == self.buffer {
                    return None;
                }
                self.buffer = buffer;
                self.update_envelope();
                self.rebuild_query()
            }
            Event::SelectTemplate(ix) => {
                let template = TEMPLATES.get(ix)?;
                self.template = ix;
                self.query_text = template.filter.to_string();
                self.rebuild_query()
            }
            Event::SetQueryText(text) => {
                self.query_text = text;
                None
            }
            Event::SubmitQuery => self.rebuild_query(),
            Event::Geocoded(Ok(center)) => {
                self.center = Some(center);
                self.update_envelope();
                self.rebuild_query()
            }
            Event::Geocoded(Err(e)) => {
                warn!("geocoding {:?} failed: {e}", self.place);
                self.error = Some(e.to_string());
                self.clear_area();
                None
            }
            Event::Fetched(Ok(collection)) => {
                info!("fetched {} features", collection.len());
                if collection.is_empty() {
                    self.error = Some(FetchError::Empty.to_string());
                    self.set_collection(None);
                } else {
                    self.set_collection(Some(collection));
                }
                None
            }
            Event::Fetched(Err(e)) => {
                warn!("fetch failed: {e}");
                self.error = Some(e.to_string());
                self.set_collection(None);
                None
            }
            Event::ToggleTag(tag) => {
                self.selection.toggle_tag(tag);
                self.refilter();
                None
            }
            Event::ToggleRow(id) => {
                self.selection.toggle_row(id);
                self.refilter();
                None
            }
            Event::ClearSelection => {
                self.selection = Selection::default();
                self.refilter();
                None
            }
        }
    }

    /// Last failure, cleared once taken.
    pub fn take_error(&mut self) -> Option<String> {
        self.error.take()
    }

    fn clear_area(&mut self) {
        self.center = None;
        self.envelope = None;
        self.area_viewport = Viewport::default();
        self.query = None;
        self.set_collection(None);
    }

    fn update_envelope(&mut self) {
        self.envelope = self.center.map(|c| Envelope::around(c, self.buffer));
        self.area_viewport = self
            .envelope
            .as_ref()
            .map(Viewport::for_envelope)
            .unwrap_or_default();
    }

    /// Rebuilds the query from the current envelope and text. Results of the
    /// previous query are dropped right away so they never outlive it.
    fn rebuild_query(&mut self) -> Option<Command> {
        self.query = self
            .envelope
            .as_ref()
            .and_then(|env| query::build(&self.settings, &self.query_text, env));
        self.set_collection(None);

        Some(Command::Fetch {
            endpoint: self.endpoint,
            query: self.query.clone()?,
        })
    }

    /// Replaces the fetched collection, resetting the selection.
    fn set_collection(&mut self, collection: Option<FeatureCollection>) {
        self.vocabulary = collection
            .as_ref()
            .map(|c| pipeline::tag_vocabulary(c.features()))
            .unwrap_or_default();
        self.collection = collection;
        self.selection = Selection::default();
        self.refilter();
    }

    fn refilter(&mut self) {
        let Some(collection) = &self.collection else {
            self.filtered = Filtered::default();
            self.viewport = Viewport::default();
            return;
        };

        self.filtered = pipeline::apply(collection, &self.selection);
        self.viewport = Viewport::fit(view::active_bounds(collection, &self.filtered.displayed));
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    pub fn place(&self) -> &str {
        &self.place
    }

    pub fn buffer(&self) -> BufferKm {
        self.buffer
    }

    pub fn template(&self) -> usize {
        self.template
    }

    pub fn query_text(&self) -> &str {
        &self.query_text
    }

    pub fn envelope(&self) -> Option<&Envelope> {
        self.envelope.as_ref()
    }

    pub fn area_viewport(&self) -> Viewport {
        self.area_viewport
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    pub fn collection(&self) -> Option<&FeatureCollection> {
        self.collection.as_ref()
    }

    pub fn vocabulary(&self) -> &[TagRecord] {
        &self.vocabulary
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn filtered(&self) -> &Filtered {
        &self.filtered
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Rows of the feature table: the tag filtered set.
    pub fn table_rows(&self) -> Vec<TableRow> {
        let Some(collection) = &self.collection else {
            return vec![];
        };

        self.filtered
            .tag_filtered
            .iter()
            .map(|e| collection.features()[e.index].table_row(&e.name))
            .collect()
    }

    /// Features shown on the result map with their display names.
    pub fn displayed(&self) -> impl Iterator<Item = (&Feature, &str)> {
        let features = self
            .collection
            .as_ref()
            .map(|c| c.features())
            .unwrap_or_default();

        self.filtered
            .displayed
            .iter()
            .filter_map(move |e| Some((features.get(e.index)?, e.name.as_str())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SETTINGS: &str = "[out:json][timeout:10]";

    fn located() -> Session {
        let mut session = Session::new(SETTINGS);
        let cmd = session.dispatch(Event::SetPlace("Auckland".to_string()));
        assert_eq!(
            cmd,
            Some(Command::Geocode {
                place: "Auckland".to_string()
            })
        );

        let cmd = session.dispatch(Event::Geocoded(Ok(LatLon::new(-36.8485, 174.7633))));
        assert!(matches!(cmd, Some(Command::Fetch { .. })));
        session
    }

    #[test]
    fn geocoding_failure_clears_the_area() {
        let mut session = located();
        assert!(session.envelope().is_some());

        session.dispatch(Event::SetPlace("Nowhere".to_string()));
        let cmd = session.dispatch(Event::Geocoded(Err(GeocodeError::NoMatch(
            "Nowhere".to_string(),
        ))));

        assert_eq!(cmd, None);
        assert!(session.envelope().is_none());
        assert!(session.query().is_none());
        assert!(session.take_error().unwrap().contains("Nowhere"));
        assert!(session.take_error().is_none());
    }

    #[test]
    fn buffer_change_reuses_the_point() {
        let mut session = located();
        let before = *session.envelope().unwrap();

        let cmd = session.dispatch(Event::SetBuffer(BufferKm::new(6.0).unwrap()));
        let Some(Command::Fetch { query, endpoint }) = cmd else {
            panic!("expected a fetch");
        };

        let after = *session.envelope().unwrap();
        assert_eq!(before.center, after.center);
        assert!(after.max.lat - after.min.lat > before.max.lat - before.min.lat);
        assert!(query.contains(&after.overpass_poly()));
        assert_eq!(endpoint, Endpoint::Kumi);
    }

    #[test]
    fn templates_replace_the_query_text() {
        let mut session = located();

        let cmd = session.dispatch(Event::SelectTemplate(3));
        assert_eq!(session.query_text(), "way[railway]");
        assert!(matches!(cmd, Some(Command::Fetch { query, .. }) if query.contains("way[railway](poly:")));

        assert_eq!(session.dispatch(Event::SelectTemplate(42)), None);
        assert_eq!(session.template(), 3);
    }

    #[test]
    fn editing_only_runs_on_submit() {
        let mut session = located();

        assert_eq!(
            session.dispatch(Event::SetQueryText("way[leisure=park]".to_string())),
            None
        );
        let cmd = session.dispatch(Event::SubmitQuery);
        assert!(matches!(cmd, Some(Command::Fetch { query, .. }) if query.contains("way[leisure=park]")));

        session.dispatch(Event::SetQueryText("  ".to_string()));
        assert_eq!(session.dispatch(Event::SubmitQuery), None);
    }

    #[test]
    fn nothing_to_query_without_an_area() {
        let mut session = Session::new(SETTINGS);
        assert_eq!(session.dispatch(Event::SubmitQuery), None);
        assert_eq!(session.dispatch(Event::SetPlace(" ".to_string())), None);
    }

    #[test]
    fn endpoint_change_refetches() {
        let mut session = located();
        assert_eq!(session.dispatch(Event::SelectEndpoint(Endpoint::Kumi)), None);

        let cmd = session.dispatch(Event::SelectEndpoint(Endpoint::OverpassApi));
        assert!(matches!(
            cmd,
            Some(Command::Fetch {
                endpoint: Endpoint::OverpassApi,
                ..
            })
        ));
    }

    #[test]
    fn failed_fetch_means_no_features() {
        let mut session = located();
        session.dispatch(Event::Fetched(Err(FetchError::Empty)));

        assert!(session.collection().is_none());
        assert!(session.vocabulary().is_empty());
        assert_eq!(session.displayed().count(), 0);
        assert_eq!(session.viewport(), Viewport::default());
        assert!(session.take_error().is_some());
    }
}
