use std::{fmt, time::Duration};

use crate::envelope::Envelope;

/// The Overpass instances the explorer can talk to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endpoint {
    #[default]
    Kumi,
    OverpassApi,
}

impl Endpoint {
    pub const ALL: [Endpoint; 2] = [Endpoint::Kumi, Endpoint::OverpassApi];

    pub fn base_url(self) -> &'static str {
        match self {
            Endpoint::Kumi => "https://overpass.kumi.systems/api/",
            Endpoint::OverpassApi => "https://overpass-api.de/api/",
        }
    }

    pub fn interpreter_url(self) -> String {
        format!("{}interpreter", self.base_url())
    }

    pub fn status_url(self) -> String {
        format!("{}status", self.base_url())
    }

    /// Only the main instance enforces query slots.
    pub fn rate_limited(self) -> bool {
        self == Endpoint::OverpassApi
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.base_url())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Template {
    pub label: &'static str,
    pub filter: &'static str,
}

pub const TEMPLATES: [Template; 4] = [
    Template {
        label: "Bus Stops",
        filter: "node[bus=yes]",
    },
    Template {
        label: "Roads",
        filter: "way[highway]",
    },
    Template {
        label: "Admin Boundaries",
        filter: "relation[admin_level]",
    },
    Template {
        label: "Rail",
        filter: "way[railway]",
    },
];

/// Global settings line of the query, without the trailing `;`.
pub fn settings(timeout: Duration, memory: Option<u64>) -> String {
    let mut s = format!("[out:json][timeout:{}]", timeout.as_secs());
    if let Some(memory) = memory {
        s += &format!("[maxsize:{memory}]");
    }
    s
}

/// Builds the full query for `filter` restricted to the envelope. Members of
/// ways and relations are recursed so their geometry can be resolved.
///
/// The filter is passed through untouched, the endpoint is the one reporting
/// syntax errors. Returns `None` for a blank filter.
pub fn build(settings: &str, filter: &str, envelope: &Envelope) -> Option<String> {
    let filter = filter.trim();
    if filter.is_empty() {
        return None;
    }

    Some(format!(
        r#"
{settings};
(
    {filter}(poly:'{poly}');
    >;
);
out body;
>;
out skel qt;
"#,
        poly = envelope.overpass_poly(),
    ))
}
