/// HTTP endpoint for the dashboard front end.
///
/// A small JSON/CSV API over the engine. Every request is a single
/// synchronous pipeline run; requests are handed to a worker pool and share
/// the read-only engine through an `Arc`.
///
/// Endpoints:
/// - GET /health
/// - GET /measurements
/// - GET /sites?measurement=
/// - GET /sites.geojson?measurement=
/// - GET /snapshot?measurement=
/// - GET /summary?measurement=&period=
/// - GET /markers?measurement=[&period=]
/// - GET /series?measurement=&site=&from=&to=
/// - GET /dataset?measurement=&sites=a,b&from=&to=[&format=csv]
/// - GET /quick-reference/{page}
///
/// Failures come back as `{"error": "..."}` with a neutral message: 404 for
/// unknown selections and empty results, 502 when the provider failed.

use chrono::{Duration, Local, NaiveDateTime};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use threadpool::ThreadPool;
use tracing::{error, info, warn};

use crate::catalog::TimePeriod;
use crate::config::{QuickReferenceConfig, ServiceConfig};
use crate::engine::Engine;
use crate::export::{export_filename, write_dataset_csv};
use crate::ingest::hilltop::parse_timestamp;
use crate::model::QueryError;
use crate::quick_reference::{self, QuickReferencePage};
use crate::sites::site_geojson;

/// Default series/dataset window when `from` is not given.
const DEFAULT_WINDOW_DAYS: i64 = 7;

const ENDPOINTS: &[&str] = &[
    "/health",
    "/measurements",
    "/sites?measurement=",
    "/sites.geojson?measurement=",
    "/snapshot?measurement=",
    "/summary?measurement=&period=",
    "/markers?measurement=&period=",
    "/series?measurement=&site=&from=&to=",
    "/dataset?measurement=&sites=&from=&to=&format=",
    "/quick-reference/{page}",
];

#[derive(Debug, thiserror::Error)]
pub enum EndpointError {
    #[error("failed to start HTTP server: {0}")]
    Bind(String),
}

/// Shared, read-only state behind every request.
pub struct AppState {
    pub engine: Engine,
    pub quick_reference: QuickReferenceConfig,
    /// Longest `from`..`to` window accepted by `/series` and `/dataset`.
    pub max_query_days: i64,
}

impl AppState {
    pub fn new(engine: Engine, config: &ServiceConfig) -> Self {
        Self {
            engine,
            quick_reference: config.quick_reference.clone(),
            max_query_days: config.provider.max_query_days,
        }
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Transport-independent response produced by `route`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
    /// Download name, sent as `Content-Disposition`.
    pub filename: Option<String>,
}

impl ApiResponse {
    fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_vec_pretty(value) {
            Ok(body) => Self {
                status,
                content_type: "application/json",
                body,
                filename: None,
            },
            Err(e) => {
                error!(error = %e, "failed to serialize response");
                Self::error(500, "Internal error.")
            }
        }
    }

    fn error(status: u16, message: &str) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: json!({ "error": message }).to_string().into_bytes(),
            filename: None,
        }
    }

    fn from_query_error(err: &QueryError) -> Self {
        let status = match err {
            QueryError::ProviderUnavailable { .. } => 502,
            QueryError::UnknownMeasurement(_)
            | QueryError::UnknownSite { .. }
            | QueryError::EmptyResult(_) => 404,
        };
        Self::error(status, err.user_message())
    }

    fn bad_request(message: String) -> Self {
        Self::error(400, &message)
    }

    fn into_http(self) -> tiny_http::Response<Cursor<Vec<u8>>> {
        let mut response = tiny_http::Response::from_data(self.body)
            .with_status_code(tiny_http::StatusCode::from(self.status));

        if let Ok(header) = tiny_http::Header::from_bytes(&b"Content-Type"[..], self.content_type.as_bytes()) {
            response = response.with_header(header);
        }
        if let Some(name) = self.filename {
            let value = format!("attachment; filename=\"{}\"", name);
            if let Ok(header) = tiny_http::Header::from_bytes(&b"Content-Disposition"[..], value.as_bytes()) {
                response = response.with_header(header);
            }
        }
        response
    }
}

// ---------------------------------------------------------------------------
// Query decoding
// ---------------------------------------------------------------------------

/// Splits a request URL into its path and decoded query parameters.
pub fn parse_query(url: &str) -> (String, HashMap<String, String>) {
    let (path, query) = match url.split_once('?') {
        Some((p, q)) => (p, q),
        None => (url, ""),
    };

    let params = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = urlencoding::decode(&key.replace('+', " ")).ok()?.into_owned();
            let value = urlencoding::decode(&value.replace('+', " ")).ok()?.into_owned();
            Some((key, value))
        })
        .collect();

    let path = urlencoding::decode(path)
        .map(|p| p.into_owned())
        .unwrap_or_else(|_| path.to_string());

    (path, params)
}

fn required<'a>(params: &'a HashMap<String, String>, name: &str) -> Result<&'a str, ApiResponse> {
    params
        .get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiResponse::bad_request(format!("missing parameter '{}'", name)))
}

fn time_param(
    params: &HashMap<String, String>,
    name: &str,
) -> Result<Option<NaiveDateTime>, ApiResponse> {
    match params.get(name).map(|v| v.trim()).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(text) => parse_timestamp(text)
            .map(Some)
            .ok_or_else(|| ApiResponse::bad_request(format!("invalid timestamp for '{}'", name))),
    }
}

/// Resolves `from`/`to`, defaulting to the week before `to` (or `now`).
/// Windows longer than `max_days` are rejected.
fn window(
    params: &HashMap<String, String>,
    now: NaiveDateTime,
    max_days: i64,
) -> Result<(NaiveDateTime, NaiveDateTime), ApiResponse> {
    let to = time_param(params, "to")?.unwrap_or(now);
    let from = match time_param(params, "from")? {
        Some(from) => from,
        None => to
            .checked_sub_signed(Duration::days(DEFAULT_WINDOW_DAYS))
            .ok_or_else(|| ApiResponse::bad_request("'to' is out of range".to_string()))?,
    };
    if from > to {
        return Err(ApiResponse::bad_request("'from' is after 'to'".to_string()));
    }
    if to.signed_duration_since(from) > Duration::days(max_days) {
        return Err(ApiResponse::bad_request(format!(
            "window is longer than {} days",
            max_days
        )));
    }
    Ok((from, to))
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

/// Routes one GET request.
pub fn route(state: &AppState, url: &str, now: NaiveDateTime) -> ApiResponse {
    let (path, params) = parse_query(url);

    let result = match path.as_str() {
        "/health" => Ok(handle_health(state)),
        "/measurements" => Ok(handle_measurements(state)),
        "/sites" => handle_sites(state, &params, false),
        "/sites.geojson" => handle_sites(state, &params, true),
        "/snapshot" => handle_snapshot(state, &params, now),
        "/summary" => handle_summary(state, &params, now),
        "/markers" => handle_markers(state, &params, now),
        "/series" => handle_series(state, &params, now),
        "/dataset" => handle_dataset(state, &params, now),
        p if p.starts_with("/quick-reference/") => {
            handle_quick_reference(state, p.trim_start_matches("/quick-reference/"), now)
        }
        _ => Ok(ApiResponse::json(
            404,
            &json!({
                "error": "Not found",
                "available_endpoints": ENDPOINTS,
            }),
        )),
    };

    result.unwrap_or_else(|response| response)
}

type Handled = Result<ApiResponse, ApiResponse>;

fn query<T>(result: Result<T, QueryError>) -> Result<T, ApiResponse> {
    result.map_err(|e| ApiResponse::from_query_error(&e))
}

fn handle_health(state: &AppState) -> ApiResponse {
    ApiResponse::json(
        200,
        &json!({
            "status": "ok",
            "service": "hydromon_service",
            "version": env!("CARGO_PKG_VERSION"),
            "catalog": state.engine.catalog().health(),
            "collections": state.engine.catalog().directory().collection_names(),
        }),
    )
}

fn handle_measurements(state: &AppState) -> ApiResponse {
    let measurements: Vec<serde_json::Value> = state
        .engine
        .catalog()
        .definitions()
        .iter()
        .map(|def| {
            let periods: Vec<serde_json::Value> = TimePeriod::options_for(def.cumulative)
                .iter()
                .map(|p| json!({ "value": p.slug(), "label": p.label() }))
                .collect();
            json!({
                "label": def.label,
                "unit": def.unit,
                "cumulative": def.cumulative,
                "periods": periods,
                "default_period": TimePeriod::default_for(def.cumulative).slug(),
            })
        })
        .collect();

    ApiResponse::json(200, &measurements)
}

fn handle_sites(state: &AppState, params: &HashMap<String, String>, geojson: bool) -> Handled {
    let label = required(params, "measurement")?;
    let sites = query(state.engine.catalog().sites_for(label))?;

    if geojson {
        Ok(ApiResponse::json(200, &site_geojson(sites)))
    } else {
        Ok(ApiResponse::json(200, &sites))
    }
}

fn handle_snapshot(state: &AppState, params: &HashMap<String, String>, now: NaiveDateTime) -> Handled {
    let label = required(params, "measurement")?;
    let snapshot = query(state.engine.latest_snapshot_at(label, now))?;
    let markers = query(state.engine.markers_for(label, &snapshot))?;
    Ok(ApiResponse::json(
        200,
        &json!({ "snapshot": snapshot, "markers": markers }),
    ))
}

fn handle_summary(state: &AppState, params: &HashMap<String, String>, now: NaiveDateTime) -> Handled {
    let label = required(params, "measurement")?;
    let def = query(state.engine.catalog().resolve(label))?;

    let period = match params.get("period").filter(|p| !p.is_empty()) {
        Some(p) => p.parse::<TimePeriod>().map_err(ApiResponse::bad_request)?,
        None => TimePeriod::default_for(def.cumulative),
    };

    let summary = query(state.engine.period_summary_at(label, period, now))?;
    let markers = query(state.engine.markers_for(label, &summary))?;
    Ok(ApiResponse::json(
        200,
        &json!({ "period": period.slug(), "summary": summary, "markers": markers }),
    ))
}

/// Markers alone: the latest reading, or a period's values when
/// `period` is given.
fn handle_markers(state: &AppState, params: &HashMap<String, String>, now: NaiveDateTime) -> Handled {
    let label = required(params, "measurement")?;
    let markers = match params.get("period").filter(|p| !p.is_empty()) {
        Some(p) => {
            let period = p.parse::<TimePeriod>().map_err(ApiResponse::bad_request)?;
            query(state.engine.period_markers_at(label, period, now))?
        }
        None => query(state.engine.map_markers_at(label, now))?,
    };
    Ok(ApiResponse::json(200, &markers))
}

fn handle_series(state: &AppState, params: &HashMap<String, String>, now: NaiveDateTime) -> Handled {
    let label = required(params, "measurement")?;
    let site = required(params, "site")?;
    let (from, to) = window(params, now, state.max_query_days)?;
    let cumulative = query(state.engine.catalog().resolve(label))?.cumulative;

    let series = query(state.engine.series_for(label, site, from, to, cumulative))?;
    Ok(ApiResponse::json(200, &series))
}

fn handle_dataset(state: &AppState, params: &HashMap<String, String>, now: NaiveDateTime) -> Handled {
    let label = required(params, "measurement")?;
    let sites: Vec<String> = required(params, "sites")?
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    let (from, to) = window(params, now, state.max_query_days)?;

    let dataset = query(state.engine.dataset_for(label, &sites, from, to))?;

    if params.get("format").map(String::as_str) == Some("csv") {
        let mut body = Vec::new();
        if let Err(e) = write_dataset_csv(&dataset, &mut body) {
            error!(measurement = label, error = %e, "CSV export failed");
            return Err(ApiResponse::error(500, "Export failed."));
        }
        return Ok(ApiResponse {
            status: 200,
            content_type: "text/csv",
            body,
            filename: Some(export_filename(label)),
        });
    }

    Ok(ApiResponse::json(200, &dataset))
}

fn handle_quick_reference(state: &AppState, slug: &str, now: NaiveDateTime) -> Handled {
    let page = slug
        .parse::<QuickReferencePage>()
        .map_err(|_| ApiResponse::error(404, "Page not found."))?;
    let data = query(quick_reference::render(
        page,
        &state.engine,
        &state.quick_reference,
        now,
    ))?;
    Ok(ApiResponse::json(200, &data))
}

// ---------------------------------------------------------------------------
// HTTP Server
// ---------------------------------------------------------------------------

/// Serves the API until the listener closes.
pub fn start_endpoint_server(
    port: u16,
    state: Arc<AppState>,
    workers: usize,
) -> Result<(), EndpointError> {
    let server = tiny_http::Server::http(format!("0.0.0.0:{}", port))
        .map_err(|e| EndpointError::Bind(e.to_string()))?;
    let pool = ThreadPool::new(workers.max(1));

    info!(port, workers, "HTTP endpoint listening");

    for request in server.incoming_requests() {
        let state = Arc::clone(&state);
        pool.execute(move || {
            let url = request.url().to_string();
            let response = if *request.method() == tiny_http::Method::Get {
                route(&state, &url, Local::now().naive_local())
            } else {
                ApiResponse::error(405, "Method not allowed.")
            };

            if response.status >= 500 {
                warn!(url = %url, status = response.status, "request failed");
            }
            if let Err(e) = request.respond(response.into_http()) {
                warn!(error = %e, "failed to send response");
            }
        });
    }

    pool.join();
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_query_decodes_values() {
        let (path, params) =
            parse_query("/series?measurement=River%20Flow%20(m%C2%B3%2Fs)&site=Patea+at+Skinner+Rd");
        assert_eq!(path, "/series");
        assert_eq!(params["measurement"], "River Flow (m³/s)");
        assert_eq!(params["site"], "Patea at Skinner Rd");
    }

    #[test]
    fn test_parse_query_without_parameters() {
        let (path, params) = parse_query("/health");
        assert_eq!(path, "/health");
        assert!(params.is_empty());
    }

    #[test]
    fn test_query_error_status_codes() {
        let unavailable = QueryError::ProviderUnavailable {
            context: "River Flow (m³/s)".into(),
            source: crate::model::ProviderError::HttpStatus(503),
        };
        assert_eq!(ApiResponse::from_query_error(&unavailable).status, 502);
        assert_eq!(
            ApiResponse::from_query_error(&QueryError::EmptyResult("x".into())).status,
            404
        );
        assert_eq!(
            ApiResponse::from_query_error(&QueryError::UnknownMeasurement("x".into())).status,
            404
        );
    }

    #[test]
    fn test_error_body_is_neutral() {
        let response = ApiResponse::from_query_error(&QueryError::ProviderUnavailable {
            context: "River Flow (m³/s)".into(),
            source: crate::model::ProviderError::Server("Unable to open file boo.hts".into()),
        });
        let body = String::from_utf8(response.body).unwrap();
        assert!(!body.contains("boo.hts"), "raw provider text stays in the logs");
    }

    fn noon() -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2025, 7, 10)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_window_defaults_to_last_week() {
        let now = noon();
        let (from, to) = window(&HashMap::new(), now, 366).unwrap();
        assert_eq!(to, now);
        assert_eq!(from, now - Duration::days(7));

        let inverted = params(&[("from", "2025-07-11")]);
        assert_eq!(window(&inverted, now, 366).unwrap_err().status, 400);
    }

    #[test]
    fn test_window_longer_than_limit_rejected() {
        let long = params(&[("from", "1000-01-01"), ("to", "9999-12-31")]);
        assert_eq!(window(&long, noon(), 366).unwrap_err().status, 400);

        let year = params(&[("from", "2024-07-10T12:00:00"), ("to", "2025-07-10T12:00:00")]);
        assert!(window(&year, noon(), 366).is_ok());
    }

    #[test]
    fn test_window_at_start_of_calendar_is_bad_request() {
        let earliest = chrono::NaiveDate::MIN
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string();

        let response = window(&params(&[("to", earliest.as_str())]), noon(), 366).unwrap_err();
        assert_eq!(response.status, 400, "to = {}", earliest);
    }
}
