//! Reference tables for GSS area types and place-name types.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AreaType {
    pub code: &'static str,
    pub name: &'static str,
    pub full_name: &'static str,
    pub theme: &'static str,
    /// Three character GSS entity prefixes belonging to this type.
    pub entities: &'static [&'static str],
}

const fn entry(
    code: &'static str,
    name: &'static str,
    full_name: &'static str,
    theme: &'static str,
    entities: &'static [&'static str],
) -> AreaType {
    AreaType {
        code,
        name,
        full_name,
        theme,
        entities,
    }
}

pub const AREA_TYPES: &[AreaType] = &[
    entry("ctry", "Country", "Country", "Administrative", &["E92", "W92", "S92", "N92", "L93", "M83"]),
    entry("rgn", "Region", "Region", "Administrative", &["E12"]),
    entry("cty", "County", "County", "Administrative", &["E10", "E11", "E13"]),
    entry("laua", "Local Authority", "Local Authority", "Administrative", &["E06", "E07", "E08", "E09", "W06", "S12", "N09"]),
    entry("ward", "Ward", "Electoral Ward", "Administrative", &["E05", "W05", "S13", "N08"]),
    entry("ced", "County Electoral Division", "County Electoral Division", "Electoral", &["E58"]),
    entry("parish", "Parish", "Civil Parish or Community", "Administrative", &["E04", "W04"]),
    entry("pcon", "Westminster parliamentary constituency", "Westminster parliamentary constituency", "Electoral", &["E14", "N06", "S14", "W07"]),
    entry("eer", "European Electoral Region", "European Electoral Region", "Electoral", &["E15", "N07", "S15", "W08"]),
    entry("ttwa", "Travel to Work Area", "Travel to Work Area", "Economic", &["E30", "K01", "N12", "S22", "W22"]),
    entry("npark", "National Park", "National Park", "Other", &["E26", "S21", "W18"]),
    entry("oa11", "Output Area", "Census Output Area (2011)", "Census", &["E00", "N00", "S00", "W00"]),
    entry("lsoa11", "LSOA", "Lower Layer Super Output Area (2011)", "Census", &["E01", "S01", "W01"]),
    entry("msoa11", "MSOA", "Middle Layer Super Output Area (2011)", "Census", &["E02", "S02", "W02"]),
    entry("wz11", "Workplace Zone", "Workplace Zone (2011)", "Census", &["E33", "N19", "S34", "W35"]),
    entry("bua11", "Built-up Area", "Built-up Area (2011)", "Census", &["E34", "K05", "W37"]),
    entry("buasd11", "Built-up Area Sub-division", "Built-up Area Sub-division (2011)", "Census", &["E35", "K06", "W38"]),
    entry("ccg", "Clinical Commissioning Group", "Clinical Commissioning Group", "Health", &["E38"]),
    entry("nhser", "NHS England Region", "NHS England Region", "Health", &["E40"]),
    entry("lhb", "Local Health Board", "Local Health Board", "Health", &["W11"]),
    entry("pfa", "Police Force Area", "Police Force Area", "Other", &["E23", "N24", "S32", "W15"]),
    entry("lep", "Local Enterprise Partnership", "Local Enterprise Partnership", "Economic", &["E37"]),
];

/// Area types grouped the way postcode pages present them.
pub const KEY_AREA_TYPES: &[(&str, &[&str])] = &[
    ("Key", &["ctry", "rgn", "cty", "laua", "ward", "msoa11", "pcon"]),
    ("Secondary", &["ttwa", "pfa", "lep", "lsoa11", "oa11", "npark"]),
    ("Health", &["ccg", "nhser", "lhb"]),
    ("Other", &["bua11", "wz11"]),
];

pub fn area_type(code: &str) -> Option<&'static AreaType> {
    AREA_TYPES.iter().find(|t| t.code == code)
}

/// Area type for a GSS entity code such as `E06`.
pub fn area_type_for_entity(entity: &str) -> Option<&'static AreaType> {
    AREA_TYPES
        .iter()
        .find(|t| t.entities.iter().any(|e| *e == entity))
}

/// Area type for a full GSS area code such as `E06000001`.
pub fn area_type_for_code(code: &str) -> Option<&'static AreaType> {
    code.get(0..3).and_then(area_type_for_entity)
}

/// GSS codes are one letter followed by eight digits.
pub fn is_gss_code(value: &str) -> bool {
    let mut chars = value.chars();
    value.len() == 9
        && chars.next().is_some_and(|c| c.is_ascii_uppercase())
        && chars.all(|c| c.is_ascii_digit())
}

/// `(type, country)` for an Index of Place Names `descnm` value.
pub fn place_type(descnm: &str) -> Option<(&'static str, &'static str)> {
    let found = match descnm {
        "BUA" => ("Built-up Area", "England and Wales"),
        "BUASD" => ("Built-up Area Sub-Division", "England and Wales"),
        "CA" => ("Council Area", "Scotland"),
        "CED" => ("County Electoral Division", "England"),
        "COM" => ("Community", "Wales"),
        "CTY" => ("County", "England"),
        "CTYHIST" => ("Historic County", "Great Britain"),
        "CTYLT" => ("Lieutenancy County", "Great Britain"),
        "LOC" => ("Locality", "Great Britain"),
        "LONB" => ("London Borough", "England"),
        "MD" => ("Metropolitan District", "England"),
        "NMD" => ("Non-metropolitan District", "England"),
        "NPARK" => ("National Park", "Great Britain"),
        "PAR" => ("Civil Parish", "England and Scotland"),
        "RGN" => ("Region", "England"),
        "UA" => ("Unitary Authority", "England and Wales"),
        "WD" => ("Electoral Ward/Division", "Great Britain"),
        _ => return None,
    };
    Some(found)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_entity_and_code() {
        assert_eq!(area_type_for_entity("E09").map(|t| t.code), Some("laua"));
        assert_eq!(area_type_for_code("E14000639").map(|t| t.code), Some("pcon"));
        assert!(area_type_for_code("X").is_none());
        assert_eq!(area_type("pcon").map(|t| t.entities[3]), Some("W07"));
    }

    #[test]
    fn test_entity_prefixes_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for t in AREA_TYPES {
            for e in t.entities {
                assert!(seen.insert(*e), "duplicate entity {}", e);
            }
        }
    }

    #[test]
    fn test_key_area_types_exist() {
        for (_, codes) in KEY_AREA_TYPES {
            for code in *codes {
                assert!(area_type(code).is_some(), "missing area type {}", code);
            }
        }
    }

    #[test]
    fn test_is_gss_code() {
        assert!(is_gss_code("E09000033"));
        assert!(!is_gss_code("E0900003"));
        assert!(!is_gss_code("e09000033"));
        assert!(!is_gss_code("SW1A 1AA"));
    }

    #[test]
    fn test_place_type() {
        assert_eq!(place_type("LOC"), Some(("Locality", "Great Britain")));
        assert_eq!(place_type("XYZ"), None);
    }
}
