/// Test fixtures: representative XML payloads from a Hilltop server.
///
/// These are structurally complete but truncated to the minimum needed to
/// exercise the parsers. They follow the envelopes returned by:
///   {base}boo.hts?Service=Hilltop&Request=SiteList&Location=LatLong&Collection=...
///   {base}boo.hts?Service=Hilltop&Request=GetData&Site=...&Measurement=...
///
/// GetData response shape:
///   Hilltop
///     .Measurement[SiteName]         : one block per (site, measurement)
///       .DataSource[Name, NumItems]  : measurement name, sensor item count
///         .ItemInfo[ItemNumber].ItemName
///       .Data
///         .E                         : one row
///           .T  : naive local timestamp
///           .I1, .I2, ...: item values as text (may be empty or junk)
///
/// Errors come back as a 200 response with an `<Error>` element; "No data"
/// errors are an empty result, everything else is a server failure.

/// Collection listing with one unlocated site.
pub(crate) fn fixture_site_list_rivers_xml() -> &'static str {
    r#"<?xml version="1.0" encoding="utf-8" ?>
<HilltopServer>
  <Agency>TRC</Agency>
  <Site Name="Patea at Skinner Rd">
    <Latitude>-39.3302</Latitude>
    <Longitude>174.4721</Longitude>
  </Site>
  <Site Name="Waiwhakaiho at Egmont Village">
    <Latitude>-39.1424</Latitude>
    <Longitude>174.1438</Longitude>
  </Site>
  <Site Name="Mangaehu at Raupuha Rd">
  </Site>
  <Site Name="Kapoaiaia at Cape Egmont">
    <Latitude>unknown</Latitude>
    <Longitude>173.7911</Longitude>
  </Site>
</HilltopServer>"#
}

/// Single site, single measurement, single sensor. The third row has an
/// unparsable value and must come through as a null.
pub(crate) fn fixture_patea_flow_xml() -> &'static str {
    r#"<?xml version="1.0" encoding="utf-8" ?>
<Hilltop>
  <Agency>TRC</Agency>
  <Measurement SiteName="Patea at Skinner Rd">
    <DataSource Name="Flow" NumItems="1">
      <TSType>StdSeries</TSType>
      <DataType>SimpleTimeSeries</DataType>
      <Interpolation>Instant</Interpolation>
      <ItemInfo ItemNumber="1">
        <ItemName>Flow</ItemName>
        <Units>m3/sec</Units>
      </ItemInfo>
    </DataSource>
    <Data DateFormat="Calendar" NumItems="1">
      <E><T>2025-07-10T10:00:00</T><I1>12.402</I1></E>
      <E><T>2025-07-10T10:15:00</T><I1>12.511</I1></E>
      <E><T>2025-07-10T10:30:00</T><I1>---</I1></E>
    </Data>
  </Measurement>
</Hilltop>"#
}

/// Two sites, two rainfall measurements (gauge + SCADA) in one request.
/// Everett Park's gauge misses 11:00 and SCADA fills it; Kaimiro only has
/// SCADA data.
pub(crate) fn fixture_rainfall_multi_site_xml() -> &'static str {
    r#"<?xml version="1.0" encoding="utf-8" ?>
<Hilltop>
  <Agency>TRC</Agency>
  <Measurement SiteName="Manganui at Everett Park">
    <DataSource Name="Rainfall" NumItems="1">
      <ItemInfo ItemNumber="1"><ItemName>Rainfall</ItemName></ItemInfo>
    </DataSource>
    <Data DateFormat="Calendar" NumItems="1">
      <E><T>2025-07-10T10:00:00</T><I1>3</I1></E>
      <E><T>2025-07-10T11:00:00</T><I1/></E>
    </Data>
  </Measurement>
  <Measurement SiteName="Manganui at Everett Park">
    <DataSource Name="Rainfall SCADA" NumItems="1">
      <ItemInfo ItemNumber="1"><ItemName>Rainfall SCADA</ItemName></ItemInfo>
    </DataSource>
    <Data DateFormat="Calendar" NumItems="1">
      <E><T>2025-07-10T10:00:00</T><I1>2.5</I1></E>
      <E><T>2025-07-10T11:00:00</T><I1>5</I1></E>
    </Data>
  </Measurement>
  <Measurement SiteName="Kaimiro at Kaimiro Rd">
    <DataSource Name="Rainfall SCADA" NumItems="1">
      <ItemInfo ItemNumber="1"><ItemName>Rainfall SCADA</ItemName></ItemInfo>
    </DataSource>
    <Data DateFormat="Calendar" NumItems="1">
      <E><T>2025-07-10T10:00:00</T><I1>0.5</I1></E>
    </Data>
  </Measurement>
</Hilltop>"#
}

/// Gauge measurement with two sensor items, both empty, requested
/// together with the SCADA measurement that did record.
pub(crate) fn fixture_two_item_rainfall_with_scada_xml() -> &'static str {
    r#"<?xml version="1.0" encoding="utf-8" ?>
<Hilltop>
  <Measurement SiteName="Manganui at Everett Park">
    <DataSource Name="Rainfall" NumItems="2">
      <ItemInfo ItemNumber="1"><ItemName>Rainfall</ItemName></ItemInfo>
      <ItemInfo ItemNumber="2"><ItemName>Rainfall Backup</ItemName></ItemInfo>
    </DataSource>
    <Data DateFormat="Calendar" NumItems="2">
      <E><T>2025-07-10T10:00:00</T><I1></I1><I2></I2></E>
    </Data>
  </Measurement>
  <Measurement SiteName="Manganui at Everett Park">
    <DataSource Name="Rainfall SCADA" NumItems="1">
      <ItemInfo ItemNumber="1"><ItemName>Rainfall SCADA</ItemName></ItemInfo>
    </DataSource>
    <Data DateFormat="Calendar" NumItems="1">
      <E><T>2025-07-10T10:00:00</T><I1>4.5</I1></E>
    </Data>
  </Measurement>
</Hilltop>"#
}

/// One measurement reported by two sensors at the same site.
pub(crate) fn fixture_two_sensor_xml() -> &'static str {
    r#"<?xml version="1.0" encoding="utf-8" ?>
<Hilltop>
  <Measurement SiteName="Stratford at TRC">
    <DataSource Name="Rainfall" NumItems="2">
      <ItemInfo ItemNumber="1"><ItemName>Rainfall</ItemName></ItemInfo>
      <ItemInfo ItemNumber="2"><ItemName>Rainfall Backup</ItemName></ItemInfo>
    </DataSource>
    <Data DateFormat="Calendar" NumItems="2">
      <E><T>2025-07-10T10:00:00</T><I1>1.0</I1><I2>1.5</I2></E>
      <E><T>2025-07-10T11:00:00</T><I1></I1><I2>2.0</I2></E>
    </Data>
  </Measurement>
</Hilltop>"#
}

/// Same timestamp reported twice for one site and column.
pub(crate) fn fixture_duplicate_timestamp_xml() -> &'static str {
    r#"<?xml version="1.0" encoding="utf-8" ?>
<Hilltop>
  <Measurement SiteName="Patea at Skinner Rd">
    <DataSource Name="Stage" NumItems="1"/>
    <Data DateFormat="Calendar" NumItems="1">
      <E><T>2025-07-10T10:00:00</T><I1>1.10</I1></E>
      <E><T>2025-07-10T10:00:00</T><I1>1.25</I1></E>
    </Data>
  </Measurement>
</Hilltop>"#
}

/// Timezone-aware timestamps and a row with a broken timestamp.
pub(crate) fn fixture_offset_timestamps_xml() -> &'static str {
    r#"<?xml version="1.0" encoding="utf-8" ?>
<Hilltop>
  <Measurement SiteName="Patea at Skinner Rd">
    <DataSource Name="Stage" NumItems="1"/>
    <Data DateFormat="Calendar" NumItems="1">
      <E><T>2025-07-10T10:00:00+12:00</T><I1>1.10</I1></E>
      <E><T>not a time</T><I1>9.99</I1></E>
      <E><T>2025-07-10 10:15:00</T><I1>1.12</I1></E>
    </Data>
  </Measurement>
</Hilltop>"#
}

/// Well-formed "nothing in range" response.
pub(crate) fn fixture_no_data_error_xml() -> &'static str {
    r#"<?xml version="1.0" encoding="utf-8" ?>
<Hilltop>
  <Error>No data for Patea at Skinner Rd, Flow in the requested period.</Error>
</Hilltop>"#
}

/// Server-side failure.
pub(crate) fn fixture_server_error_xml() -> &'static str {
    r#"<?xml version="1.0" encoding="utf-8" ?>
<HilltopServer>
  <Error>Unable to open file boo.hts</Error>
</HilltopServer>"#
}
