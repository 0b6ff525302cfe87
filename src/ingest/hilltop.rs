/// Hilltop server client.
///
/// Handles URL construction and XML response parsing for the two Hilltop
/// requests the service uses:
///   {base}{hts}?Service=Hilltop&Request=SiteList&Location=LatLong&Collection=...
///   {base}{hts}?Service=Hilltop&Request=GetData&Site=...&Measurement=...
///
/// GetData responses are flattened into a `DataTable` whose value columns
/// are labelled positionally (`M1`, `M2`, ...) in requested-measure order,
/// then by sensor item number. See `fixtures.rs` for annotated payloads.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::ingest::Provider;
use crate::model::{
    AggregationInterval, AggregationMethod, DataRequest, DataTable, ProviderError, Site, TableRow,
};

/// Timestamp format Hilltop accepts for `From=` / `To=`.
const QUERY_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// URL construction
// ---------------------------------------------------------------------------

fn service_root(base_url: &str, hts_file: &str) -> String {
    if base_url.ends_with('/') {
        format!("{}{}", base_url, hts_file)
    } else {
        format!("{}/{}", base_url, hts_file)
    }
}

/// Builds a SiteList URL for one collection, asking for coordinates.
pub fn build_site_list_url(base_url: &str, hts_file: &str, collection: &str) -> String {
    format!(
        "{}?Service=Hilltop&Request=SiteList&Location=LatLong&Collection={}",
        service_root(base_url, hts_file),
        urlencoding::encode(collection)
    )
}

/// Builds a GetData URL. Sites and measures are comma-joined so one call
/// covers the whole request; `Method`/`Interval` are only sent when set.
pub fn build_get_data_url(base_url: &str, hts_file: &str, request: &DataRequest) -> String {
    let mut url = format!(
        "{}?Service=Hilltop&Request=GetData&Site={}&Measurement={}&From={}&To={}",
        service_root(base_url, hts_file),
        urlencoding::encode(&request.sites.join(",")),
        urlencoding::encode(&request.measures.join(",")),
        request.from.format(QUERY_TIME_FORMAT),
        request.to.format(QUERY_TIME_FORMAT),
    );

    if request.method != AggregationMethod::None {
        url.push_str("&Method=");
        url.push_str(request.method.as_provider_str());
    }
    if request.interval != AggregationInterval::None {
        url.push_str("&Interval=");
        url.push_str(&urlencoding::encode(request.interval.as_provider_str()));
    }

    url
}

// ---------------------------------------------------------------------------
// Scalar parsing
// ---------------------------------------------------------------------------

/// Parses a provider timestamp into naive local time.
///
/// Offsets are dropped rather than converted: the provider reports the
/// gauge's wall clock and the dashboard shows it as-is.
pub fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_local());
    }

    const FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    for format in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }

    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Parses an item value. Blank, junk and non-finite values are gaps.
pub fn parse_value(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

// ---------------------------------------------------------------------------
// XML helpers
// ---------------------------------------------------------------------------

fn xml_err(err: quick_xml::Error) -> ProviderError {
    ProviderError::Parse(format!("XML error: {}", err))
}

fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Result<Option<String>, ProviderError> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| ProviderError::Parse(format!("bad attribute: {}", err)))?;
        if attr.key.as_ref() == name {
            let value = attr.unescape_value().map_err(xml_err)?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn is_root(name: &[u8]) -> bool {
    name == b"Hilltop" || name == b"HilltopServer"
}

/// `I1`, `I2`, ... item element number.
fn item_number(name: &[u8]) -> Option<u32> {
    let digits = name.strip_prefix(b"I")?;
    std::str::from_utf8(digits).ok()?.parse().ok()
}

/// Maps an `<Error>` body to a result: "No data" is an empty answer,
/// anything else is a server failure.
fn error_is_empty(text: &str) -> Result<(), ProviderError> {
    if text.to_ascii_lowercase().contains("no data") {
        Ok(())
    } else {
        Err(ProviderError::Server(text.trim().to_string()))
    }
}

// ---------------------------------------------------------------------------
// SiteList
// ---------------------------------------------------------------------------

/// Parses a SiteList response. Sites keep provider order; unparsable or
/// missing coordinates leave the site unlocated.
pub fn parse_site_list(xml: &str) -> Result<Vec<Site>, ProviderError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut sites = Vec::new();
    let mut current: Option<Site> = None;
    let mut saw_root = false;

    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) => match e.name().as_ref() {
                name if is_root(name) => saw_root = true,
                b"Site" => {
                    let name = attribute(&e, b"Name")?.unwrap_or_default();
                    current = Some(Site::new(name, None, None));
                }
                b"Latitude" => {
                    let text = reader.read_text(e.name()).map_err(xml_err)?;
                    if let Some(site) = current.as_mut() {
                        site.latitude = parse_value(&text);
                    }
                }
                b"Longitude" => {
                    let text = reader.read_text(e.name()).map_err(xml_err)?;
                    if let Some(site) = current.as_mut() {
                        site.longitude = parse_value(&text);
                    }
                }
                b"Error" => {
                    let text = reader.read_text(e.name()).map_err(xml_err)?;
                    error_is_empty(&text)?;
                    return Ok(Vec::new());
                }
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                name if is_root(name) => saw_root = true,
                b"Site" => {
                    if let Some(name) = attribute(&e, b"Name")? {
                        sites.push(Site::new(name, None, None));
                    }
                }
                _ => {}
            },
            Event::End(e) if e.name().as_ref() == b"Site" => {
                if let Some(site) = current.take() {
                    if !site.name.trim().is_empty() {
                        sites.push(site);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(ProviderError::Parse("response is not a Hilltop document".to_string()));
    }
    Ok(sites)
}

// ---------------------------------------------------------------------------
// GetData
// ---------------------------------------------------------------------------

/// One `<I{n}>` value before columns are assigned.
struct RawValue {
    site: Option<String>,
    timestamp: NaiveDateTime,
    column: (usize, u32),
    value: Option<f64>,
}

/// Strips a trailing " [..]" qualifier Hilltop adds to some names.
fn base_measure_name(name: &str) -> &str {
    match name.find(" [") {
        Some(i) => name[..i].trim(),
        None => name.trim(),
    }
}

/// Resolves DataSource names to requested-measure positions. Names the
/// request did not list are placed after the requested ones.
struct MeasureIndex<'a> {
    requested: &'a [String],
    extra: Vec<String>,
}

impl<'a> MeasureIndex<'a> {
    fn new(requested: &'a [String]) -> Self {
        Self {
            requested,
            extra: Vec::new(),
        }
    }

    fn resolve(&mut self, name: &str) -> usize {
        let base = base_measure_name(name);
        if let Some(i) = self
            .requested
            .iter()
            .position(|m| base_measure_name(m).eq_ignore_ascii_case(base))
        {
            return i;
        }
        if self.requested.len() == 1 {
            return 0;
        }
        let extra = match self.extra.iter().position(|m| m.eq_ignore_ascii_case(base)) {
            Some(i) => i,
            None => {
                self.extra.push(base.to_string());
                self.extra.len() - 1
            }
        };
        self.requested.len() + extra
    }
}

/// Parses a GetData response into a table.
///
/// Each `<Measurement>` block contributes one column per sensor item.
/// Values for the same site and timestamp land on the same row; if that
/// row already has a value in the column, a new row is started so
/// repeated timestamps keep their response order.
///
/// Rows with an unparsable `<T>` are dropped. A "No data" `<Error>` is an
/// empty table; any other `<Error>` is `ProviderError::Server`.
pub fn parse_get_data(xml: &str, measures: &[String]) -> Result<DataTable, ProviderError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut index = MeasureIndex::new(measures);
    let mut raw: Vec<RawValue> = Vec::new();
    let mut saw_root = false;

    let mut site: Option<String> = None;
    let mut measure: Option<usize> = None;
    let mut in_row = false;
    let mut row_time: Option<String> = None;
    let mut row_items: Vec<(u32, Option<f64>)> = Vec::new();

    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) => match e.name().as_ref() {
                name if is_root(name) => saw_root = true,
                b"Measurement" => {
                    site = attribute(&e, b"SiteName")?;
                    measure = None;
                }
                b"DataSource" => {
                    let name = attribute(&e, b"Name")?.unwrap_or_default();
                    measure = Some(index.resolve(&name));
                }
                b"E" => {
                    in_row = true;
                    row_time = None;
                    row_items.clear();
                }
                b"T" if in_row => {
                    row_time = Some(reader.read_text(e.name()).map_err(xml_err)?.into_owned());
                }
                b"Error" => {
                    let text = reader.read_text(e.name()).map_err(xml_err)?;
                    error_is_empty(&text)?;
                    return Ok(DataTable::default());
                }
                name if in_row => {
                    if let Some(n) = item_number(name) {
                        let text = reader.read_text(e.name()).map_err(xml_err)?;
                        row_items.push((n, parse_value(&text)));
                    }
                }
                _ => {}
            },
            Event::Empty(e) => match e.name().as_ref() {
                name if is_root(name) => saw_root = true,
                b"DataSource" => {
                    let name = attribute(&e, b"Name")?.unwrap_or_default();
                    measure = Some(index.resolve(&name));
                }
                name if in_row => {
                    if let Some(n) = item_number(name) {
                        row_items.push((n, None));
                    }
                }
                _ => {}
            },
            Event::End(e) => match e.name().as_ref() {
                b"E" => {
                    in_row = false;
                    let Some(timestamp) = row_time.as_deref().and_then(parse_timestamp) else {
                        debug!(time = ?row_time, "skipping row with unparsable timestamp");
                        continue;
                    };
                    let m = match measure {
                        Some(m) => m,
                        None => {
                            let m = index.resolve("");
                            measure = Some(m);
                            m
                        }
                    };
                    for (n, value) in row_items.drain(..) {
                        raw.push(RawValue {
                            site: site.clone(),
                            timestamp,
                            column: (m, n),
                            value,
                        });
                    }
                }
                b"Measurement" => {
                    site = None;
                    measure = None;
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    if !saw_root {
        return Err(ProviderError::Parse("response is not a Hilltop document".to_string()));
    }

    Ok(assemble_table(raw))
}

/// Assigns positional column labels and joins values into rows.
fn assemble_table(raw: Vec<RawValue>) -> DataTable {
    let mut keys: Vec<(usize, u32)> = raw.iter().map(|r| r.column).collect();
    keys.sort_unstable();
    keys.dedup();

    let position: HashMap<(usize, u32), usize> =
        keys.iter().enumerate().map(|(i, k)| (*k, i)).collect();
    let columns: Vec<String> = (1..=keys.len()).map(|i| format!("M{}", i)).collect();

    let mut rows: Vec<TableRow> = Vec::new();
    let mut filled: Vec<Vec<bool>> = Vec::new();
    let mut open: HashMap<(Option<String>, NaiveDateTime), usize> = HashMap::new();

    for value in raw {
        let col = position[&value.column];
        let key = (value.site.clone(), value.timestamp);

        let row = match open.get(&key) {
            Some(&r) if !filled[r][col] => r,
            _ => {
                rows.push(TableRow {
                    site: value.site,
                    timestamp: value.timestamp,
                    values: vec![None; columns.len()],
                });
                filled.push(vec![false; columns.len()]);
                open.insert(key, rows.len() - 1);
                rows.len() - 1
            }
        };

        rows[row].values[col] = value.value;
        filled[row][col] = true;
    }

    DataTable { columns, rows }
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// Blocking Hilltop client over `reqwest`.
pub struct HilltopClient {
    client: reqwest::blocking::Client,
    base_url: String,
    hts_file: String,
}

impl HilltopClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            hts_file: config.hts_file.clone(),
        })
    }

    fn get_text(&self, url: &str) -> Result<String, ProviderError> {
        debug!(url, "hilltop request");

        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| ProviderError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::HttpStatus(status.as_u16()));
        }

        response
            .text()
            .map_err(|e| ProviderError::Http(e.to_string()))
    }
}

impl Provider for HilltopClient {
    fn site_list(&self, collection: &str) -> Result<Vec<Site>, ProviderError> {
        let url = build_site_list_url(&self.base_url, &self.hts_file, collection);
        parse_site_list(&self.get_text(&url)?)
    }

    fn fetch_table(&self, request: &DataRequest) -> Result<DataTable, ProviderError> {
        let url = build_get_data_url(&self.base_url, &self.hts_file, request);
        parse_get_data(&self.get_text(&url)?, &request.measures)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
