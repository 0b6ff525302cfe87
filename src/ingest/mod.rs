/// Provider-side data access.
///
/// Submodules:
/// - `hilltop`  - Hilltop server client: URL construction + XML parsing
/// - `fixtures` (test only) - representative Hilltop XML responses
///
/// The rest of the service only sees the `Provider` trait, so the engine
/// can be driven by an in-memory provider in tests.

pub mod hilltop;

#[cfg(test)]
pub(crate) mod fixtures;

use crate::model::{DataRequest, DataTable, ProviderError, Site};

/// Contract of the hydrological time-series server.
pub trait Provider: Send + Sync {
    /// Sites of a named provider collection, with coordinates when known.
    fn site_list(&self, collection: &str) -> Result<Vec<Site>, ProviderError>;

    /// Readings for every requested site and measurement in one call.
    fn fetch_table(&self, request: &DataRequest) -> Result<DataTable, ProviderError>;
}
