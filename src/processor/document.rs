//! Renders feed warnings into the fixed-schema exchange document.

use chrono::{DateTime, Datelike, Utc};
use quick_xml::escape::escape;
use thiserror::Error;

use crate::models::{Geometry, GeometryError, Position, RawWarning};

pub const IDENTIFIER_PREFIX: &str = "NW.FI.FTA.L";
pub const UNKNOWN_CATEGORY: &str = "[UNKNOWN]";

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%SZ";

// Fixed envelope around Nordic waters, "lat lon".
const LOWER_CORNER: &str = "-6.0000 40.0000";
const UPPER_CORNER: &str = "45.0000 65.0000";

#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error("stored payload of warning {id} is unreadable: {source}")]
    StoredPayload {
        id: i64,
        source: serde_json::Error,
    },
}

/// `"<prefix>.<id>.<yy>"`.
pub fn warning_identifier(id: i64, year: i32) -> String {
    format!("{}.{}.{}", IDENTIFIER_PREFIX, id, two_digit_year(year))
}

fn two_digit_year(year: i32) -> String {
    format!("{:02}", year.rem_euclid(100))
}

/// Feed positions are `[lon, lat]`; the document wants space separated
/// `lat lon` pairs. Polygons contribute their outer ring only.
pub fn gml_coordinates(geometry: &Geometry) -> String {
    match geometry {
        Geometry::Point(p) => p.to_gml(),
        Geometry::LineString(line) => join_positions(line),
        Geometry::Polygon(rings) => rings.first().map(|r| join_positions(r)).unwrap_or_default(),
    }
}

fn join_positions(positions: &[Position]) -> String {
    positions
        .iter()
        .map(|p| p.to_gml())
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn warning_category(type_en: &str) -> &'static str {
    match type_en.trim() {
        "NAVIGATIONAL WARNING" => "local",
        "COASTAL" | "NAVTEX COASTAL" => "coastal",
        _ => UNKNOWN_CATEGORY,
    }
}

/// Date part of an ISO-8601 timestamp: everything before the `T`.
fn date_part(iso: &str) -> &str {
    iso.split('T').next().unwrap_or(iso)
}

/// Escapes text for embedding as XML character data, dropping characters
/// XML 1.0 cannot carry at all.
pub fn xml_text(text: &str) -> String {
    let valid: String = text
        .chars()
        .filter(|&c| matches!(c, '\t' | '\n' | '\r') || (c >= '\u{20}' && c != '\u{FFFE}' && c != '\u{FFFF}'))
        .collect();
    escape(valid.as_str()).into_owned()
}

/// Field values substituted into the document.
#[derive(Debug, Clone, PartialEq)]
struct DocumentFields {
    id: String,
    warning_number: String,
    year: String,
    general_area: String,
    geometry: Geometry,
    creation_date: String,
    publishing_date: String,
    validity_start_date: String,
    validity_start_time: String,
    expiry: Option<(String, String)>,
    title: String,
    subject: String,
    category: &'static str,
}

impl DocumentFields {
    fn collect(warning: &RawWarning, area: &str, now: DateTime<Utc>) -> Result<Self, BuildError> {
        let geometry = Geometry::parse(&warning.geometry)?;
        let creation_date = match &warning.creation_time {
            Some(created) => date_part(created).to_string(),
            None => now.format(DATE_FORMAT).to_string(),
        };

        Ok(Self {
            id: warning_identifier(warning.id, now.year()),
            warning_number: warning.number.map(|n| n.to_string()).unwrap_or_default(),
            year: two_digit_year(now.year()),
            general_area: xml_text(area),
            geometry,
            creation_date,
            publishing_date: date_part(&warning.publishing_time).to_string(),
            validity_start_date: now.format(DATE_FORMAT).to_string(),
            validity_start_time: now.format(TIME_FORMAT).to_string(),
            expiry: None,
            title: xml_text(&warning.location_en),
            subject: xml_text(&warning.contents_en),
            category: warning_category(&warning.type_en),
        })
    }

    /// Validity start and identifier come from the original creation moment,
    /// expiry from `now`.
    fn expired(mut self, created: DateTime<Utc>, id: i64, now: DateTime<Utc>) -> Self {
        self.id = warning_identifier(id, created.year());
        self.year = two_digit_year(created.year());
        self.validity_start_date = created.format(DATE_FORMAT).to_string();
        self.validity_start_time = created.format(TIME_FORMAT).to_string();
        self.expiry = Some((
            now.format(DATE_FORMAT).to_string(),
            now.format(TIME_FORMAT).to_string(),
        ));
        self
    }
}

/// Document for a warning currently present in the feed.
pub fn build(warning: &RawWarning, area: &str, now: DateTime<Utc>) -> Result<String, BuildError> {
    let fields = DocumentFields::collect(warning, area, now)?;
    Ok(render(&fields))
}

/// Document for a warning that has disappeared from the feed. `created` is
/// the stored creation time of the record.
pub fn build_expired(
    warning: &RawWarning,
    area: &str,
    created: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<String, BuildError> {
    let fields = DocumentFields::collect(warning, area, now)?.expired(created, warning.id, now);
    Ok(render(&fields))
}

fn render_geometry(fields: &DocumentFields) -> String {
    let coords = gml_coordinates(&fields.geometry);
    let gid = format!("G.{}.1", fields.id);
    match fields.geometry {
        Geometry::Point(_) => format!(
            r#"<S100:pointProperty>
            <S100:Point gml:id="{gid}" srsName="EPSG:4326">
              <gml:pos>{coords}</gml:pos>
            </S100:Point>
          </S100:pointProperty>"#
        ),
        Geometry::LineString(_) => format!(
            r#"<S100:curveProperty>
            <S100:Curve gml:id="{gid}" srsName="EPSG:4326">
              <gml:segments>
                <gml:LineStringSegment>
                  <gml:posList>{coords}</gml:posList>
                </gml:LineStringSegment>
              </gml:segments>
            </S100:Curve>
          </S100:curveProperty>"#
        ),
        Geometry::Polygon(_) => format!(
            r#"<S100:surfaceProperty>
            <S100:Surface gml:id="{gid}" srsName="EPSG:4326">
              <gml:patches>
                <gml:PolygonPatch>
                  <gml:exterior>
                    <gml:LinearRing>
                      <gml:posList>{coords}</gml:posList>
                    </gml:LinearRing>
                  </gml:exterior>
                </gml:PolygonPatch>
              </gml:patches>
            </S100:Surface>
          </S100:surfaceProperty>"#
        ),
    }
}

fn render(fields: &DocumentFields) -> String {
    let id = &fields.id;
    let (time_end, date_end) = match &fields.expiry {
        Some((date, time)) => (
            format!("\n          <timeOfDayEnd>{time}</timeOfDayEnd>"),
            format!("\n          <dateEnd><date>{date}</date></dateEnd>"),
        ),
        None => (String::new(), String::new()),
    };
    let geometry = render_geometry(fields);

    format!(
        r##"<?xml version="1.0" encoding="UTF-8"?>
<S124:DataSet xmlns:S124="http://www.iho.int/S124/gml/1.0" xmlns:S100="http://www.iho.int/s100gml/1.0" xmlns:gml="http://www.opengis.net/gml/3.2" xmlns:xlink="http://www.w3.org/1999/xlink" gml:id="DS.{id}">
  <gml:boundedBy>
    <gml:Envelope srsName="EPSG:4326">
      <gml:lowerCorner>{lower}</gml:lowerCorner>
      <gml:upperCorner>{upper}</gml:upperCorner>
    </gml:Envelope>
  </gml:boundedBy>
  <imember>
    <S124:S124_NWPreamble gml:id="PR.{id}">
      <id>urn:mrn:s124:{id}</id>
      <messageSeriesIdentifier>
        <NameOfSeries>Finnish Nautical Warning</NameOfSeries>
        <typeOfWarning>{category}</typeOfWarning>
        <warningNumber>{number}</warningNumber>
        <year>{year}</year>
        <productionAgency>
          <language>eng</language>
          <text>Finnish Transport Infrastructure Agency</text>
        </productionAgency>
        <country>FI</country>
      </messageSeriesIdentifier>
      <sourceDate>{creation_date}</sourceDate>
      <publicationTime>{publishing_date}</publicationTime>
      <generalArea>{area}</generalArea>
      <locality>
        <text>{title}</text>
      </locality>
      <title>
        <text>{title}</text>
      </title>
      <fixedDateRange>
          <timeOfDayStart>{time_start}</timeOfDayStart>{time_end}
          <dateStart><date>{date_start}</date></dateStart>{date_end}
      </fixedDateRange>
      <theWarningPart xlink:href="#NW.{id}.1"/>
    </S124:S124_NWPreamble>
  </imember>
  <member>
    <S124:S124_NavigationalWarningPart gml:id="NW.{id}.1">
      <id>urn:mrn:s124:{id}.1</id>
      <geometry>
          {geometry}
      </geometry>
      <geometryType>{geometry_type}</geometryType>
      <Subject>
        <language>eng</language>
        <text>{subject}</text>
      </Subject>
      <header xlink:href="#PR.{id}"/>
    </S124:S124_NavigationalWarningPart>
  </member>
</S124:DataSet>
"##,
        lower = LOWER_CORNER,
        upper = UPPER_CORNER,
        category = fields.category,
        number = fields.warning_number,
        year = fields.year,
        creation_date = fields.creation_date,
        publishing_date = fields.publishing_date,
        area = fields.general_area,
        title = fields.title,
        time_start = fields.validity_start_time,
        date_start = fields.validity_start_date,
        geometry_type = fields.geometry.type_name(),
        subject = fields.subject,
    )
}
