//! Projection fields for postcode, nearest-point and area responses.

use crate::utils::error::{EtlError, Result};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

pub const POSTCODE_FIELDS: &[&str] = &[
    "pcds", "pcd", "pcd2", "dointr", "doterm", "usertype", "oseast1m", "osnrth1m", "osgrdind",
    "oa11", "oa21", "cty", "ced", "laua", "ward", "parish", "hlthau", "nhser", "ctry", "rgn",
    "pcon", "eer", "ttwa", "nuts", "npark", "lsoa11", "lsoa21", "msoa11", "msoa21", "wz11",
    "ccg", "sicbl", "icb", "bua11", "buasd11", "ru11ind", "oac11", "lat", "long", "lep1",
    "lep2", "pfa", "imd", "stp", "calncv", "location", "hash", "hash_prefix", "postcode_area",
    "postcode_district", "postcode_sector",
];

/// Postcode fields holding an area code with a display name, exposed as
/// `<field>_name`.
pub const NAMED_FIELDS: &[&str] = &[
    "cty", "ced", "laua", "ward", "parish", "nhser", "ctry", "rgn", "pcon", "eer", "ttwa",
    "npark", "lsoa11", "lsoa21", "msoa11", "msoa21", "wz11", "ccg", "sicbl", "icb", "bua11",
    "lep1", "lep2", "pfa",
];

pub const POINT_FIELDS: &[&str] = &["point_lat", "point_long", "distance_from_postcode"];

pub const AREA_FIELDS: &[&str] = &[
    "code", "name", "name_welsh", "statutory_instrument_id", "statutory_instrument_title",
    "date_start", "date_end", "parent", "entity", "owner", "active", "areaehect", "areachect",
    "areaihect", "arealhect", "sort_order", "predecessor", "successor", "equivalents", "type",
    "has_boundary", "areatype",
];

/// The response shape a field list is checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Postcode,
    NearestPoint,
    Area,
}

impl Shape {
    pub fn is_valid_field(&self, name: &str) -> bool {
        match self {
            Self::Postcode => is_postcode_field(name),
            Self::NearestPoint => is_postcode_field(name) || POINT_FIELDS.contains(&name),
            Self::Area => AREA_FIELDS.contains(&name),
        }
    }

    /// Always returned so results stay identifiable.
    fn key_field(&self) -> &'static str {
        match self {
            Self::Postcode | Self::NearestPoint => "pcds",
            Self::Area => "code",
        }
    }
}

fn is_postcode_field(name: &str) -> bool {
    POSTCODE_FIELDS.contains(&name)
        || name
            .strip_suffix("_name")
            .is_some_and(|code| NAMED_FIELDS.contains(&code))
}

/// Whether `name` is a postcode projection field.
pub fn is_valid_field(name: &str) -> bool {
    Shape::Postcode.is_valid_field(name)
}

/// `lauaName` -> `laua_name`, `pointLat` -> `point_lat`.
pub fn camel_to_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// A validated selection of response fields. `None` selects everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSet {
    shape: Shape,
    selected: Option<BTreeSet<String>>,
}

impl FieldSet {
    pub fn all(shape: Shape) -> Self {
        Self {
            shape,
            selected: None,
        }
    }

    /// Accepts snake_case or camelCase names. Unknown names are rejected.
    pub fn from_names<I, S>(shape: Shape, names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut selected = BTreeSet::new();
        let mut unknown = Vec::new();
        for name in names {
            let name = camel_to_snake(name.as_ref().trim());
            if name.is_empty() {
                continue;
            }
            if shape.is_valid_field(&name) {
                selected.insert(name);
            } else {
                unknown.push(name);
            }
        }
        if !unknown.is_empty() {
            return Err(EtlError::InvalidQuery {
                message: format!("Unknown fields: {}", unknown.join(", ")),
            });
        }
        if selected.is_empty() {
            return Ok(Self::all(shape));
        }
        selected.insert(shape.key_field().to_string());
        Ok(Self {
            shape,
            selected: Some(selected),
        })
    }

    /// Comma separated list, as in a `fields=` query parameter.
    pub fn parse(shape: Shape, list: Option<&str>) -> Result<Self> {
        match list {
            Some(list) => Self::from_names(shape, list.split(',')),
            None => Ok(Self::all(shape)),
        }
    }

    pub fn shape(&self) -> Shape {
        self.shape
    }

    pub fn is_all(&self) -> bool {
        self.selected.is_none()
    }

    pub fn contains(&self, name: &str) -> bool {
        match &self.selected {
            Some(selected) => selected.contains(name),
            None => self.shape.is_valid_field(name),
        }
    }

    /// Whether `<code_field>_name` should be looked up.
    pub fn wants_name(&self, code_field: &str) -> bool {
        match &self.selected {
            Some(selected) => selected.contains(&format!("{}_name", code_field)),
            None => true,
        }
    }

    /// Drop every top level key outside the selection.
    pub fn project(&self, value: Value) -> Value {
        let Some(selected) = &self.selected else {
            return value;
        };
        match value {
            Value::Object(map) => Value::Object(
                map.into_iter()
                    .filter(|(k, _)| selected.contains(k))
                    .collect::<Map<String, Value>>(),
            ),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_is_valid_field() {
        assert!(is_valid_field("laua"));
        assert!(is_valid_field("laua_name"));
        assert!(!is_valid_field("pcds_name"));
        assert!(!is_valid_field("point_lat"));
        assert!(Shape::NearestPoint.is_valid_field("point_lat"));
        assert!(Shape::Area.is_valid_field("has_boundary"));
    }

    #[test]
    fn test_camel_case_names() {
        assert_eq!(camel_to_snake("lauaName"), "laua_name");
        assert_eq!(camel_to_snake("distanceFromPostcode"), "distance_from_postcode");
        assert_eq!(camel_to_snake("oseast1m"), "oseast1m");
        let fields = FieldSet::from_names(Shape::Postcode, ["lauaName", "lat"]).unwrap();
        assert!(fields.contains("laua_name"));
        assert!(fields.contains("pcds"));
        assert!(!fields.contains("laua"));
        assert!(fields.wants_name("laua"));
        assert!(!fields.wants_name("ward"));
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let err = FieldSet::parse(Shape::Postcode, Some("pcds,password")).unwrap_err();
        assert!(matches!(err, EtlError::InvalidQuery { .. }));
    }

    #[test]
    fn test_project() {
        let fields = FieldSet::parse(Shape::Postcode, Some("laua")).unwrap();
        let projected = fields.project(json!({"pcds": "SW1A 1AA", "laua": "E09000033", "ward": "E05013806"}));
        assert_eq!(projected, json!({"pcds": "SW1A 1AA", "laua": "E09000033"}));

        let all = FieldSet::parse(Shape::Postcode, None).unwrap();
        assert!(all.is_all());
        assert_eq!(all.project(json!({"x": 1})), json!({"x": 1}));
    }
}
