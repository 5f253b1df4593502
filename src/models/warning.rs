use serde::{Deserialize, Deserializer};
use serde_json::Value;

use super::geometry::RawGeometry;

/// One feature of the upstream feed, as received.
#[derive(Debug, Clone)]
pub struct RawWarning {
    pub id: i64,
    pub type_en: String,
    pub location_en: String,
    pub contents_en: String,
    pub publishing_time: String,
    pub creation_time: Option<String>,
    pub number: Option<i64>,
    pub geometry: RawGeometry,
    /// The untouched feature JSON, stored as the record's raw payload.
    pub payload: Value,
}

#[derive(Debug, Deserialize)]
struct Feature {
    properties: Properties,
    geometry: RawGeometry,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Properties {
    id: i64,
    #[serde(default)]
    type_en: Option<String>,
    #[serde(default)]
    location_en: Option<String>,
    #[serde(default)]
    contents_en: Option<String>,
    publishing_time: String,
    #[serde(default)]
    creation_time: Option<String>,
    #[serde(default, deserialize_with = "parse_i64_option")]
    number: Option<i64>,
}

impl RawWarning {
    pub fn from_feature(payload: Value) -> Result<Self, serde_json::Error> {
        let feature = Feature::deserialize(&payload)?;
        let props = feature.properties;
        Ok(Self {
            id: props.id,
            type_en: props.type_en.unwrap_or_default(),
            location_en: props.location_en.unwrap_or_default(),
            contents_en: props.contents_en.unwrap_or_default(),
            publishing_time: props.publishing_time,
            creation_time: props.creation_time.filter(|s| !s.trim().is_empty()),
            number: props.number,
            geometry: feature.geometry,
            payload,
        })
    }

    /// Re-reads a feature previously stored as a record's raw payload.
    pub fn from_stored(raw_payload: &str) -> Result<Self, serde_json::Error> {
        let payload: Value = serde_json::from_str(raw_payload)?;
        Self::from_feature(payload)
    }
}

fn parse_i64_option<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrInt {
        String(String),
        Int(i64),
    }

    let v: Option<StringOrInt> = Option::deserialize(deserializer)?;
    match v {
        Some(StringOrInt::Int(n)) => Ok(Some(n)),
        Some(StringOrInt::String(s)) => {
            if s.trim().is_empty() {
                Ok(None)
            } else {
                s.trim().parse::<i64>().map(Some).map_err(serde::de::Error::custom)
            }
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parsing_feed_feature() {
        let feature = json!({
            "type": "Feature",
            "geometry": { "type": "Point", "coordinates": [24.5, 60.1] },
            "properties": {
                "id": 12345,
                "areasEn": "GULF OF FINLAND",
                "number": "108",
                "locationEn": "GULF OF FINLAND, Helsinki",
                "contentsEn": "Buoy Kustaanmiekka missing.",
                "typeEn": "COASTAL",
                "creationTime": "2024-05-02T08:13:00+03:00",
                "publishingTime": "2024-05-02T09:00:00+03:00"
            }
        });

        let warning = RawWarning::from_feature(feature).unwrap();
        assert_eq!(warning.id, 12345);
        assert_eq!(warning.type_en, "COASTAL");
        assert_eq!(warning.number, Some(108));
        assert_eq!(warning.creation_time.as_deref(), Some("2024-05-02T08:13:00+03:00"));
        assert_eq!(warning.geometry.kind, "Point");
        assert_eq!(warning.payload["properties"]["areasEn"], "GULF OF FINLAND");
    }

    #[test]
    fn test_null_optional_fields() {
        let feature = json!({
            "geometry": { "type": "Point", "coordinates": [21.0, 63.0] },
            "properties": {
                "id": 7,
                "number": null,
                "locationEn": null,
                "contentsEn": "x",
                "typeEn": "NAVIGATIONAL WARNING",
                "creationTime": null,
                "publishingTime": "2024-01-01T00:00:00Z"
            }
        });

        let warning = RawWarning::from_feature(feature).unwrap();
        assert_eq!(warning.number, None);
        assert_eq!(warning.location_en, "");
        assert!(warning.creation_time.is_none());
    }

    #[test]
    fn test_missing_id_is_rejected() {
        let feature = json!({
            "geometry": { "type": "Point", "coordinates": [21.0, 63.0] },
            "properties": { "publishingTime": "2024-01-01T00:00:00Z" }
        });
        assert!(RawWarning::from_feature(feature).is_err());
    }

    #[test]
    fn test_round_trip_from_stored_payload() {
        let feature = json!({
            "geometry": { "type": "LineString", "coordinates": [[21.0, 63.0], [21.5, 63.2]] },
            "properties": { "id": 99, "typeEn": "COASTAL", "publishingTime": "2024-01-01T00:00:00Z" }
        });
        let stored = feature.to_string();
        let warning = RawWarning::from_stored(&stored).unwrap();
        assert_eq!(warning.id, 99);
        assert_eq!(warning.geometry.kind, "LineString");
    }
}
