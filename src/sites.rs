/// Site directory for the Taranaki monitoring network.
///
/// Holds the site list of every provider collection the catalog refers to,
/// loaded once at startup. Sites keep their provider order; sites without
/// coordinates stay in the directory (they can still be exported) but are
/// left out of anything map-shaped.

use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};

use crate::model::Site;

// ---------------------------------------------------------------------------
// Fallback sites
// ---------------------------------------------------------------------------

/// Minimal site metadata compiled into the binary.
pub struct FallbackSite {
    pub name: &'static str,
    pub latitude: f64,
    pub longitude: f64,
}

/// Rainfall sites used when the provider cannot be reached at startup.
pub static FALLBACK_RAINFALL_SITES: &[FallbackSite] = &[
    FallbackSite {
        name: "Stratford (Rain)",
        latitude: -39.333,
        longitude: 174.283,
    },
    FallbackSite {
        name: "New Plymouth (Rain)",
        latitude: -39.066,
        longitude: 174.073,
    },
    FallbackSite {
        name: "Hawera (Rain)",
        latitude: -39.599,
        longitude: 174.281,
    },
];

/// Flow sites used when the provider cannot be reached at startup.
pub static FALLBACK_FLOW_SITES: &[FallbackSite] = &[
    FallbackSite {
        name: "Manganui River (Flow)",
        latitude: -39.300,
        longitude: 174.350,
    },
    FallbackSite {
        name: "Waingongoro River (Flow)",
        latitude: -39.450,
        longitude: 174.200,
    },
];

/// Converts an embedded fallback list into owned sites.
pub fn fallback_sites(list: &[FallbackSite]) -> Vec<Site> {
    list.iter()
        .map(|s| Site::new(s.name, Some(s.latitude), Some(s.longitude)))
        .collect()
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

/// Site lists keyed by provider collection name.
#[derive(Debug, Clone, Default)]
pub struct SiteDirectory {
    collections: HashMap<String, Vec<Site>>,
}

impl SiteDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a collection's sites. Repeated names keep the first entry.
    pub fn insert_collection(&mut self, collection: impl Into<String>, sites: Vec<Site>) {
        let mut seen = HashSet::new();
        let unique: Vec<Site> = sites
            .into_iter()
            .filter(|s| seen.insert(s.name.clone()))
            .collect();
        self.collections.insert(collection.into(), unique);
    }

    /// Sites of a collection in provider order; empty if unknown.
    pub fn sites_for_collection(&self, collection: &str) -> &[Site] {
        self.collections
            .get(collection)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Looks a site up in one collection.
    pub fn find_site(&self, collection: &str, site: &str) -> Option<&Site> {
        self.sites_for_collection(collection)
            .iter()
            .find(|s| s.name == site)
    }

    /// Coordinates of a site from any collection that locates it.
    pub fn coordinates_of(&self, site: &str) -> Option<(f64, f64)> {
        self.collections
            .values()
            .flat_map(|sites| sites.iter())
            .filter(|s| s.name == site)
            .find_map(|s| s.coordinates())
    }

    pub fn collection_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.collections.keys().map(|k| k.as_str()).collect();
        names.sort_unstable();
        names
    }
}

/// Sites with both coordinates, in input order.
pub fn map_ready(sites: &[Site]) -> Vec<&Site> {
    sites.iter().filter(|s| s.coordinates().is_some()).collect()
}

/// GeoJSON `FeatureCollection` of the given sites. Sites without
/// coordinates are skipped; points are `[longitude, latitude]`.
pub fn site_geojson(sites: &[Site]) -> Value {
    let features: Vec<Value> = map_ready(sites)
        .into_iter()
        .filter_map(|site| {
            site.coordinates().map(|(lat, lon)| {
                json!({
                    "type": "Feature",
                    "geometry": {
                        "type": "Point",
                        "coordinates": [lon, lat],
                    },
                    "properties": {
                        "name": site.name,
                    },
                })
            })
        })
        .collect();

    json!({
        "type": "FeatureCollection",
        "features": features,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
