//! General sea-area classification.
//!
//! Exchange documents may only name a small fixed set of sea areas, so the
//! area is derived from the warning geometry rather than taken from the feed.
//! A geometry belongs to an area when every one of its vertices lies inside
//! that area's polygon. No match, or more than one, falls back to
//! [`DEFAULT_AREA_NAME`].

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::models::{Geometry, Position, RawGeometry};

pub const DEFAULT_AREA_NAME: &str = "Baltic sea";

const BUNDLED_SEA_AREAS: &str = include_str!("../../data/sea_areas.json");

#[derive(Debug, Error)]
pub enum AreaLoadError {
    #[error("cannot read reference areas from {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("malformed reference area data: {0}")]
    Json(#[from] serde_json::Error),
    #[error("reference area '{name}' has unsupported geometry type {kind}")]
    UnsupportedGeometry { name: String, kind: String },
    #[error("reference area '{0}' has an empty polygon")]
    EmptyPolygon(String),
    #[error("reference area set is empty")]
    Empty,
}

type Ring = Vec<(f64, f64)>;

#[derive(Debug, Clone)]
struct AreaPolygon {
    exterior: Ring,
    holes: Vec<Ring>,
}

impl AreaPolygon {
    fn contains(&self, x: f64, y: f64) -> bool {
        ring_contains(&self.exterior, x, y) && !self.holes.iter().any(|h| ring_contains(h, x, y))
    }
}

/// A named polygon (or multipolygon) the classifier matches against.
#[derive(Debug, Clone)]
pub struct ReferenceArea {
    name: String,
    polygons: Vec<AreaPolygon>,
}

impl ReferenceArea {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn contains_point(&self, p: &Position) -> bool {
        let (x, y) = (p.lon(), p.lat());
        self.polygons.iter().any(|poly| poly.contains(x, y))
    }

    fn contains(&self, geometry: &Geometry) -> bool {
        let vertices = geometry.vertices();
        !vertices.is_empty() && vertices.iter().all(|p| self.contains_point(p))
    }
}

#[derive(Deserialize)]
struct AreaCollection {
    features: Vec<AreaFeature>,
}

#[derive(Deserialize)]
struct AreaFeature {
    properties: AreaProperties,
    geometry: AreaGeometry,
}

#[derive(Deserialize)]
struct AreaProperties {
    // Published sea-area files key the name as ENG_UID.
    #[serde(alias = "ENG_UID")]
    name: String,
}

#[derive(Deserialize)]
struct AreaGeometry {
    #[serde(rename = "type")]
    kind: String,
    coordinates: serde_json::Value,
}

/// Read-only classifier over the reference-area set loaded at startup.
#[derive(Debug, Clone)]
pub struct AreaClassifier {
    areas: Vec<ReferenceArea>,
}

impl AreaClassifier {
    /// The reference areas shipped with the service.
    pub fn bundled() -> Result<Self, AreaLoadError> {
        Self::from_geojson(BUNDLED_SEA_AREAS)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, AreaLoadError> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path).map_err(|source| AreaLoadError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_geojson(&data)
    }

    pub fn from_geojson(data: &str) -> Result<Self, AreaLoadError> {
        let collection: AreaCollection = serde_json::from_str(data)?;

        let areas = collection
            .features
            .into_iter()
            .map(|feature| -> Result<ReferenceArea, AreaLoadError> {
                let name = feature.properties.name;
                let geometry = feature.geometry;
                let polygons = match geometry.kind.as_str() {
                    "Polygon" => {
                        let rings: Vec<Vec<Vec<f64>>> = serde_json::from_value(geometry.coordinates)?;
                        vec![to_polygon(&name, rings)?]
                    }
                    "MultiPolygon" => {
                        let polys: Vec<Vec<Vec<Vec<f64>>>> =
                            serde_json::from_value(geometry.coordinates)?;
                        polys
                            .into_iter()
                            .map(|rings| to_polygon(&name, rings))
                            .collect::<Result<Vec<_>, _>>()?
                    }
                    other => {
                        return Err(AreaLoadError::UnsupportedGeometry {
                            name,
                            kind: other.to_string(),
                        })
                    }
                };
                Ok(ReferenceArea { name, polygons })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if areas.is_empty() {
            return Err(AreaLoadError::Empty);
        }

        Ok(Self { areas })
    }

    pub fn areas(&self) -> &[ReferenceArea] {
        &self.areas
    }

    /// Name of the single area containing the geometry, or the default area.
    pub fn classify(&self, raw: &RawGeometry) -> &str {
        let geometry = match Geometry::parse(raw) {
            Ok(g) => g,
            Err(e) => {
                debug!("Cannot classify geometry ({}), using default area", e);
                return DEFAULT_AREA_NAME;
            }
        };

        let mut matches = self.areas.iter().filter(|area| area.contains(&geometry));
        match (matches.next(), matches.next()) {
            (Some(area), None) => area.name(),
            (None, _) => DEFAULT_AREA_NAME,
            (Some(first), Some(second)) => {
                debug!(
                    "Geometry matches several areas ({}, {}, ...), using default area",
                    first.name(),
                    second.name()
                );
                DEFAULT_AREA_NAME
            }
        }
    }
}

fn to_polygon(name: &str, rings: Vec<Vec<Vec<f64>>>) -> Result<AreaPolygon, AreaLoadError> {
    let mut rings = rings.into_iter().map(|ring| {
        ring.into_iter()
            .filter_map(|pos| match pos.as_slice() {
                [x, y, ..] => Some((*x, *y)),
                _ => None,
            })
            .collect::<Ring>()
    });

    let exterior = rings
        .next()
        .filter(|r| r.len() >= 3)
        .ok_or_else(|| AreaLoadError::EmptyPolygon(name.to_string()))?;
    Ok(AreaPolygon {
        exterior,
        holes: rings.collect(),
    })
}

/// Even-odd ray casting test.
fn ring_contains(ring: &[(f64, f64)], x: f64, y: f64) -> bool {
    if ring.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let (xi, yi) = ring[i];
        let (xj, yj) = ring[j];
        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }
    inside
}
