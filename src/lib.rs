/// hydromon_service: Taranaki hydrology dashboard service.
///
/// # Module structure
///
/// ```text
/// hydromon_service
/// ├── model       - shared data types (Site, Reading, DataTable, QueryError, …)
/// ├── config      - service configuration loader (hydromon.toml)
/// ├── logging     - tracing setup and provider failure classification
/// ├── sites       - site directory, fallback sites, GeoJSON
/// ├── catalog     - measurement catalog, startup fallback, time periods
/// ├── ingest
/// │   ├── hilltop - Hilltop SiteList/GetData: URL construction + XML parsing
/// │   └── fixtures (test only) - representative Hilltop responses
/// ├── analysis
/// │   ├── normalize - multi-column tables to one value per site and time
/// │   └── reduce    - latest values, window totals, resampling
/// ├── alert
/// │   └── thresholds - status tier classification
/// ├── engine      - snapshot, period summary, series and dataset operations
/// ├── export      - dataset CSV export
/// ├── quick_reference - fixed rainfall and flow status pages
/// └── endpoint    - JSON/CSV HTTP API for the dashboard front end
/// ```

pub mod alert;
pub mod analysis;
pub mod catalog;
pub mod config;
pub mod endpoint;
pub mod engine;
pub mod export;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod quick_reference;
pub mod sites;
