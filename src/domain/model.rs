use crate::domain::postcode::Postcode;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// One CSV row keyed by header name.
pub type RawRow = HashMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    const EARTH_RADIUS_M: f64 = 6_371_008.8;

    /// Great-circle distance in metres.
    pub fn distance_to(&self, other: &LatLon) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = (other.lat - self.lat).to_radians();
        let dlon = (other.lon - self.lon).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        2.0 * Self::EARTH_RADIUS_M * a.sqrt().asin()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostcodeDocument {
    pub pcds: Postcode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pcd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pcd2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dointr: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doterm: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usertype: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oseast1m: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub osnrth1m: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub osgrdind: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imd: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub long: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<LatLon>,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub hash_prefix: String,
    #[serde(default)]
    pub postcode_area: String,
    #[serde(default)]
    pub postcode_district: String,
    #[serde(default)]
    pub postcode_sector: String,
    /// Area codes and any other source columns (`laua`, `ward`, `ctry`, ...).
    #[serde(flatten)]
    pub codes: BTreeMap<String, String>,
}

impl PostcodeDocument {
    pub fn id(&self) -> &str {
        self.pcds.as_str()
    }

    pub fn is_terminated(&self) -> bool {
        self.doterm.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AreaEquivalents {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ons: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mhclg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nhs: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scottish_government: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub welsh_government: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AreaDocument {
    pub code: String,
    pub name: Option<String>,
    pub name_welsh: Option<String>,
    pub statutory_instrument_id: Option<String>,
    pub statutory_instrument_title: Option<String>,
    pub date_start: Option<NaiveDate>,
    pub date_end: Option<NaiveDate>,
    pub parent: Option<String>,
    pub entity: Option<String>,
    pub owner: Option<String>,
    pub active: bool,
    pub areaehect: Option<f64>,
    pub areachect: Option<f64>,
    pub areaihect: Option<f64>,
    pub arealhect: Option<f64>,
    pub sort_order: Option<String>,
    pub predecessor: Vec<String>,
    pub successor: Vec<String>,
    pub equivalents: AreaEquivalents,
    #[serde(rename = "type")]
    pub area_type: Option<String>,
    pub has_boundary: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityDocument {
    pub code: String,
    pub name: Option<String>,
    pub abbreviation: Option<String>,
    pub theme: Option<String>,
    pub coverage: Option<String>,
    pub related_codes: Vec<String>,
    pub status: Option<String>,
    pub live_instances: Option<i64>,
    pub archived_instances: Option<i64>,
    pub crossborder_instances: Option<i64>,
    pub last_modified: Option<NaiveDate>,
    pub current_code_first: Option<String>,
    pub current_code_last: Option<String>,
    pub reserved_code: Option<String>,
    pub owner: Option<String>,
    pub date_introduced: Option<NaiveDate>,
    pub date_start: Option<NaiveDate>,
    #[serde(rename = "type")]
    pub area_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacenameDocument {
    pub place18cd: String,
    pub place18nm: String,
    pub splitind: bool,
    pub descnm: Option<String>,
    #[serde(rename = "type")]
    pub place_type: Option<String>,
    pub country: Option<String>,
    pub ctyhistnm: Option<String>,
    pub ctyltnm: Option<String>,
    pub popcnt: Option<i64>,
    pub gridgb1e: Option<i64>,
    pub gridgb1n: Option<i64>,
    pub grid1km: Option<String>,
    pub lat: Option<f64>,
    pub long: Option<f64>,
    pub location: Option<LatLon>,
    /// Area type (`laua`, `ward`, ...) to GSS code.
    pub areas: BTreeMap<String, String>,
    pub alternative_names: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_between_points() {
        let palace = LatLon {
            lat: 51.501009,
            lon: -0.141588,
        };
        let parliament = LatLon {
            lat: 51.499479,
            lon: -0.124809,
        };
        let d = palace.distance_to(&parliament);
        assert!((1150.0..1200.0).contains(&d), "distance was {}", d);
        assert_eq!(palace.distance_to(&palace), 0.0);
    }

    #[test]
    fn test_postcode_document_keeps_extra_codes_flat() {
        let json = serde_json::json!({
            "pcds": "SW1A 1AA",
            "hash": "abc",
            "hash_prefix": "abc",
            "postcode_area": "SW",
            "postcode_district": "SW1A",
            "postcode_sector": "SW1A 1",
            "laua": "E09000033",
            "lat": 51.501009
        });
        let doc: PostcodeDocument = serde_json::from_value(json).unwrap();
        assert_eq!(doc.codes.get("laua").map(String::as_str), Some("E09000033"));
        assert_eq!(doc.lat, Some(51.501009));

        let back = serde_json::to_value(&doc).unwrap();
        assert_eq!(back["laua"], "E09000033");
        assert!(back.get("doterm").is_none());
    }

    #[test]
    fn test_area_document_tolerates_partial_source() {
        let doc: AreaDocument =
            serde_json::from_value(serde_json::json!({"code": "E14000639", "has_boundary": true}))
                .unwrap();
        assert_eq!(doc.code, "E14000639");
        assert!(doc.has_boundary);
        assert!(doc.predecessor.is_empty());
    }
}
