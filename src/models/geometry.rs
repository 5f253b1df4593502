use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use thiserror::Error;

/// Geometry exactly as the feed ships it: a type tag plus nested coordinates.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawGeometry {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub coordinates: Value,
}

#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("unsupported geometry type encountered: {0}")]
    Unsupported(String),
    #[error("malformed {kind} coordinates: {reason}")]
    Malformed { kind: &'static str, reason: String },
}

/// A `[longitude, latitude]` pair. The JSON numbers are kept so the original
/// textual form survives into the exchange document.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    lon: Number,
    lat: Number,
}

impl Position {
    pub fn lon(&self) -> f64 {
        self.lon.as_f64().unwrap_or(f64::NAN)
    }

    pub fn lat(&self) -> f64 {
        self.lat.as_f64().unwrap_or(f64::NAN)
    }

    /// `"lat lon"`, the order GML positions use.
    pub fn to_gml(&self) -> String {
        format!("{} {}", self.lat, self.lon)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(Position),
    LineString(Vec<Position>),
    /// Rings, outer ring first.
    Polygon(Vec<Vec<Position>>),
}

impl Geometry {
    pub fn parse(raw: &RawGeometry) -> Result<Self, GeometryError> {
        match raw.kind.as_str() {
            "Point" => Ok(Geometry::Point(position(&raw.coordinates, "Point")?)),
            "LineString" => Ok(Geometry::LineString(positions(&raw.coordinates, "LineString")?)),
            "Polygon" => {
                let rings = array(&raw.coordinates, "Polygon")?
                    .iter()
                    .map(|ring| positions(ring, "Polygon"))
                    .collect::<Result<Vec<_>, _>>()?;
                if rings.is_empty() {
                    return Err(GeometryError::Malformed {
                        kind: "Polygon",
                        reason: "no rings".to_string(),
                    });
                }
                Ok(Geometry::Polygon(rings))
            }
            other => Err(GeometryError::Unsupported(other.to_string())),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Geometry::Point(_) => "Point",
            Geometry::LineString(_) => "LineString",
            Geometry::Polygon(_) => "Polygon",
        }
    }

    /// Vertices that must all fall inside an area for the geometry to be
    /// contained by it. Polygons contribute their outer ring only.
    pub fn vertices(&self) -> Vec<&Position> {
        match self {
            Geometry::Point(p) => vec![p],
            Geometry::LineString(line) => line.iter().collect(),
            Geometry::Polygon(rings) => rings.first().map(|r| r.iter().collect()).unwrap_or_default(),
        }
    }
}

fn array<'a>(value: &'a Value, kind: &'static str) -> Result<&'a Vec<Value>, GeometryError> {
    value.as_array().ok_or_else(|| GeometryError::Malformed {
        kind,
        reason: format!("expected an array, got {}", value),
    })
}

fn position(value: &Value, kind: &'static str) -> Result<Position, GeometryError> {
    let pair = array(value, kind)?;
    match (pair.first(), pair.get(1)) {
        (Some(Value::Number(lon)), Some(Value::Number(lat))) => Ok(Position {
            lon: lon.clone(),
            lat: lat.clone(),
        }),
        _ => Err(GeometryError::Malformed {
            kind,
            reason: format!("expected [lon, lat], got {}", value),
        }),
    }
}

fn positions(value: &Value, kind: &'static str) -> Result<Vec<Position>, GeometryError> {
    array(value, kind)?
        .iter()
        .map(|v| position(v, kind))
        .collect()
}
