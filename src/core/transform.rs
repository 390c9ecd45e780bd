//! Row-level transformers from government CSV releases to store documents.
//!
//! Every function here is pure: a [`RawRow`] goes in, a document (or a
//! partial update) comes out. Blank cells and "not applicable" sentinels
//! become absent values; malformed non-blank cells are errors.

use crate::domain::areatypes::{area_type_for_entity, place_type};
use crate::domain::model::{
    AreaDocument, EntityDocument, LatLon, PlacenameDocument, PostcodeDocument, RawRow,
};
use crate::domain::postcode::Postcode;
use crate::utils::error::{EtlError, Result};
use chrono::NaiveDate;
use md5::{Digest, Md5};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};

pub const HASH_PREFIX_LEN: usize = 5;

/// Government files use this for "no valid coordinate".
const INVALID_COORDINATE: f64 = 99.999999;

pub const DMY: &str = "%d/%m/%Y";
pub const YM: &str = "%Y%m";

const POSTCODE_INT_FIELDS: &[&str] = &["oseast1m", "osnrth1m", "usertype", "osgrdind", "imd"];
const POSTCODE_RESERVED_FIELDS: &[&str] = &[
    "pcds", "pcd", "pcd2", "dointr", "doterm", "lat", "long", "hash", "hash_prefix",
    "location", "postcode_area", "postcode_district", "postcode_sector",
];

/// `(source column, area type)`; later releases overwrite earlier ones.
const PLACENAME_AREA_COLUMNS: &[(&str, &str)] = &[
    ("cty15cd", "cty"),
    ("lad15cd", "laua"),
    ("wd15cd", "ward"),
    ("par15cd", "parish"),
    ("hlth12cd", "hlth"),
    ("regd15cd", "rgd"),
    ("rgn15cd", "rgn"),
    ("npark15cd", "npark"),
    ("bua11cd", "bua11"),
    ("pcon15cd", "pcon"),
    ("eer15cd", "eer"),
    ("pfa15cd", "pfa"),
    ("cty18cd", "cty"),
    ("lad18cd", "laua"),
    ("wd18cd", "ward"),
    ("par18cd", "parish"),
    ("regd18cd", "rgd"),
    ("rgn18cd", "rgn"),
    ("npark17cd", "npark"),
    ("pcon18cd", "pcon"),
    ("eer18cd", "eer"),
    ("pfa18cd", "pfa"),
];

const EQUIVALENT_COLUMNS: &[(&str, &str)] = &[
    ("ons", "GEOGCDO"),
    ("mhclg", "GEOGCDD"),
    ("nhs", "GEOGCDH"),
    ("scottish_government", "GEOGCDS"),
    ("welsh_government", "GEOGCDWG"),
];

fn is_blank(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value == "n/a"
}

/// Cleaned cell value, `None` when blank or "n/a".
pub fn clean(value: Option<&String>) -> Option<String> {
    value
        .map(|v| v.trim())
        .filter(|v| !is_blank(v))
        .map(str::to_string)
}

/// Area codes ending in eight nines mean "not applicable".
fn clean_code(value: Option<&String>) -> Option<String> {
    clean(value).filter(|v| !v.ends_with("99999999"))
}

fn required<'a>(row: &'a RawRow, field: &str) -> Result<&'a str> {
    row.get(field)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| EtlError::transform(field, "", "required column is missing or blank"))
}

/// Parse a date in `format`. Formats without a day (`%Y%m`) resolve to the
/// first of the month.
pub fn process_date(value: &str, format: &str) -> Result<Option<NaiveDate>> {
    if is_blank(value) {
        return Ok(None);
    }
    let value = value.trim();
    let parsed = if format.contains("%d") {
        NaiveDate::parse_from_str(value, format)
    } else {
        NaiveDate::parse_from_str(&format!("{}01", value), &format!("{}%d", format))
    };
    parsed
        .map(Some)
        .map_err(|e| EtlError::transform("date", value, e.to_string()))
}

pub fn process_int(value: &str) -> Result<Option<i64>> {
    if is_blank(value) {
        return Ok(None);
    }
    let cleaned = value.trim().replace(',', "");
    cleaned
        .parse()
        .map(Some)
        .map_err(|_| EtlError::transform("integer", value, "not a whole number"))
}

pub fn process_float(value: &str) -> Result<Option<f64>> {
    if is_blank(value) {
        return Ok(None);
    }
    let cleaned = value.trim().replace(',', "");
    cleaned
        .parse()
        .map(Some)
        .map_err(|_| EtlError::transform("float", value, "not a number"))
}

fn process_coordinate(value: Option<&String>, zero_is_missing: bool) -> Result<Option<f64>> {
    let Some(value) = value else {
        return Ok(None);
    };
    Ok(process_float(value)?
        .filter(|v| (v - INVALID_COORDINATE).abs() > f64::EPSILON)
        .filter(|v| !(zero_is_missing && *v == 0.0)))
}

fn with_field<T>(field: &str, result: Result<T>) -> Result<T> {
    result.map_err(|e| match e {
        EtlError::Transform { value, reason, .. } => EtlError::Transform {
            field: field.to_string(),
            value,
            reason,
        },
        other => other,
    })
}

fn int_field(row: &RawRow, field: &str) -> Result<Option<i64>> {
    match row.get(field) {
        Some(value) => with_field(field, process_int(value)),
        None => Ok(None),
    }
}

fn float_field(row: &RawRow, field: &str) -> Result<Option<f64>> {
    match row.get(field) {
        Some(value) => with_field(field, process_float(value)),
        None => Ok(None),
    }
}

fn date_field(row: &RawRow, field: &str, format: &str) -> Result<Option<NaiveDate>> {
    match row.get(field) {
        Some(value) => with_field(field, process_date(value, format)),
        None => Ok(None),
    }
}

/// MD5 hex digest of the lower case, space free postcode.
pub fn postcode_hash(postcode: &Postcode) -> String {
    format!("{:x}", Md5::digest(postcode.hash_key().as_bytes()))
}

/// NSPL / ONSPD / NHSPD row to a postcode document.
pub fn postcode_from_row(row: &RawRow) -> Result<PostcodeDocument> {
    let raw_pcds = required(row, "pcds")?;
    let pcds = Postcode::parse(raw_pcds)?;

    let mut ints = HashMap::new();
    for field in POSTCODE_INT_FIELDS {
        let value = match clean_code(row.get(*field)) {
            Some(v) => with_field(field, process_int(&v))?,
            None => None,
        };
        ints.insert(*field, value);
    }

    let lat = with_field("lat", process_coordinate(row.get("lat"), false))?;
    let long = with_field("long", process_coordinate(row.get("long"), false))?;
    let location = match (lat, long) {
        (Some(lat), Some(lon)) => Some(LatLon { lat, lon }),
        _ => None,
    };

    let codes: BTreeMap<String, String> = row
        .iter()
        .filter(|(k, _)| {
            !POSTCODE_RESERVED_FIELDS.contains(&k.as_str())
                && !POSTCODE_INT_FIELDS.contains(&k.as_str())
        })
        .filter_map(|(k, v)| clean_code(Some(v)).map(|v| (k.clone(), v)))
        .collect();

    let hash = postcode_hash(&pcds);
    Ok(PostcodeDocument {
        pcd: clean(row.get("pcd")),
        pcd2: clean(row.get("pcd2")),
        dointr: date_field(row, "dointr", YM)?,
        doterm: date_field(row, "doterm", YM)?,
        usertype: ints["usertype"],
        oseast1m: ints["oseast1m"],
        osnrth1m: ints["osnrth1m"],
        osgrdind: ints["osgrdind"],
        imd: ints["imd"],
        lat,
        long,
        location,
        hash_prefix: hash[..HASH_PREFIX_LEN].to_string(),
        hash,
        postcode_area: pcds.area().to_string(),
        postcode_district: pcds.district().to_string(),
        postcode_sector: pcds.sector().to_string(),
        codes,
        pcds,
    })
}

/// Postcode to Westminster constituency lookup row: a partial postcode update.
pub fn pcon_update_from_row(row: &RawRow) -> Result<(Postcode, Value)> {
    let pcds = Postcode::parse(required(row, "pcd")?)?;
    let mut doc = json!({ "pcds": pcds });
    if let Some(pcon) = clean_code(row.get("pconcd")) {
        doc["pcon"] = Value::String(pcon);
    }
    Ok((pcds, doc))
}

/// Register of Geographic Codes row.
pub fn entity_from_row(row: &RawRow) -> Result<EntityDocument> {
    let code = required(row, "Entity code")?.to_string();
    let related_codes = clean(row.get("Related entity codes"))
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|c| !is_blank(c))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(EntityDocument {
        name: clean(row.get("Entity name")),
        abbreviation: clean(row.get("Entity abbreviation")),
        theme: clean(row.get("Entity theme")),
        coverage: clean(row.get("Entity coverage")),
        related_codes,
        status: clean(row.get("Status")),
        live_instances: int_field(row, "Number of live instances")?,
        archived_instances: int_field(row, "Number of archived instances")?,
        crossborder_instances: int_field(row, "Number of cross-border instances")?,
        last_modified: date_field(row, "Date of last instance change", DMY)?,
        current_code_first: clean(row.get("Current code (first in range)")),
        current_code_last: clean(row.get("Current code (last in range)")),
        reserved_code: clean(row.get("Reserved code (for CHD use)")),
        owner: clean(row.get("Entity owner")),
        date_introduced: date_field(row, "Date entity introduced on RGC", DMY)?,
        date_start: date_field(row, "Entity start date", DMY)?,
        area_type: area_type_for_entity(&code).map(|t| t.code.to_string()),
        code,
    })
}

/// CHD dates carry a time suffix; only the leading `DD/MM/YYYY` matters.
fn chd_date(row: &RawRow, field: &str) -> Result<Option<NaiveDate>> {
    let Some(value) = row.get(field) else {
        return Ok(None);
    };
    let day = value.get(0..10).unwrap_or(value);
    with_field(field, process_date(day, DMY))
}

/// Code History Database `ChangeHistory` row.
pub fn area_from_change_history(row: &RawRow) -> Result<AreaDocument> {
    let code = required(row, "GEOGCD")?.to_string();
    let entity = clean(row.get("ENTITYCD"));
    Ok(AreaDocument {
        name: clean(row.get("GEOGNM")),
        name_welsh: clean(row.get("GEOGNMW")),
        statutory_instrument_id: clean(row.get("SI_ID")),
        statutory_instrument_title: clean(row.get("SI_TITLE")),
        date_start: chd_date(row, "OPER_DATE")?,
        date_end: chd_date(row, "TERM_DATE")?,
        parent: clean(row.get("PARENTCD")),
        owner: clean(row.get("OWNER")),
        active: row.get("STATUS").is_some_and(|s| s.trim() == "live"),
        areaehect: float_field(row, "AREAEHECT")?,
        areachect: float_field(row, "AREACHECT")?,
        areaihect: float_field(row, "AREAIHECT")?,
        arealhect: float_field(row, "AREALHECT")?,
        sort_order: Some(code.clone()),
        area_type: entity
            .as_deref()
            .and_then(area_type_for_entity)
            .map(|t| t.code.to_string()),
        entity,
        code,
        ..AreaDocument::default()
    })
}

/// CHD `Changes` row: links a code to its predecessor.
pub fn apply_change(areas: &mut HashMap<String, AreaDocument>, row: &RawRow) {
    let (Some(code), Some(previous)) = (clean(row.get("GEOGCD")), clean(row.get("GEOGCD_P")))
    else {
        return;
    };
    if let Some(area) = areas.get_mut(&code) {
        area.predecessor.push(previous.clone());
    }
    if let Some(area) = areas.get_mut(&previous) {
        area.successor.push(code);
    }
}

/// CHD `Equivalents` row: codes used for the same area by other bodies.
pub fn apply_equivalents(areas: &mut HashMap<String, AreaDocument>, row: &RawRow) {
    let Some(code) = clean(row.get("GEOGCD")) else {
        return;
    };
    let Some(area) = areas.get_mut(&code) else {
        return;
    };
    for (body, column) in EQUIVALENT_COLUMNS {
        let value = clean(row.get(*column));
        if value.is_none() {
            continue;
        }
        let slot = match *body {
            "ons" => &mut area.equivalents.ons,
            "mhclg" => &mut area.equivalents.mhclg,
            "nhs" => &mut area.equivalents.nhs,
            "scottish_government" => &mut area.equivalents.scottish_government,
            _ => &mut area.equivalents.welsh_government,
        };
        *slot = value;
    }
}

/// House of Commons Library MSOA names row: a partial area update.
pub fn msoa_name_update(row: &RawRow) -> Result<(String, Value)> {
    let code = required(row, "msoa11cd")?.to_string();
    let doc = json!({
        "name": clean(row.get("msoa11hclnm")),
        "name_welsh": clean(row.get("msoa11hclnmw")),
    });
    Ok((code, doc))
}

/// Index of Place Names row.
pub fn placename_from_row(row: &RawRow) -> Result<PlacenameDocument> {
    let code = required(row, "place18cd")?.to_string();
    let name = required(row, "place18nm")?.to_string();

    let lat = with_field("lat", process_coordinate(row.get("lat"), true))?;
    let long = with_field("long", process_coordinate(row.get("long"), true))?;
    let location = match (lat, long) {
        (Some(lat), Some(lon)) => Some(LatLon { lat, lon }),
        _ => None,
    };

    let mut areas = BTreeMap::new();
    for (column, area_type) in PLACENAME_AREA_COLUMNS {
        if let Some(value) = clean(row.get(*column)) {
            areas.insert(area_type.to_string(), value);
        }
    }

    let descnm = clean(row.get("descnm"));
    let (kind, country) = match descnm.as_deref() {
        Some(d) => match place_type(d) {
            Some((t, c)) => (t.to_string(), c.to_string()),
            None => (d.to_string(), "United Kingdom".to_string()),
        },
        None => ("Place".to_string(), "United Kingdom".to_string()),
    };

    Ok(PlacenameDocument {
        alternative_names: vec![name.clone()],
        place18cd: code,
        place18nm: name,
        splitind: clean(row.get("splitind")).is_some_and(|v| v != "0"),
        descnm,
        place_type: Some(kind),
        country: Some(country),
        ctyhistnm: clean(row.get("ctyhistnm")),
        ctyltnm: clean(row.get("ctyltnm")),
        popcnt: int_field(row, "popcnt")?,
        gridgb1e: int_field(row, "gridgb1e")?,
        gridgb1n: int_field(row, "gridgb1n")?,
        grid1km: clean(row.get("grid1km")),
        lat,
        long,
        location,
        areas,
    })
}

/// Place names appear once per split part; keep the first row per code and
/// collect every distinct name.
pub fn group_placenames(rows: Vec<PlacenameDocument>) -> Vec<PlacenameDocument> {
    let mut order: Vec<String> = Vec::new();
    let mut grouped: HashMap<String, PlacenameDocument> = HashMap::new();
    for row in rows {
        match grouped.get_mut(&row.place18cd) {
            Some(existing) => {
                if !existing.alternative_names.contains(&row.place18nm) {
                    existing.alternative_names.push(row.place18nm);
                }
            }
            None => {
                order.push(row.place18cd.clone());
                grouped.insert(row.place18cd.clone(), row);
            }
        }
    }
    order
        .into_iter()
        .filter_map(|code| grouped.remove(&code))
        .collect()
}

/// The property of a boundary feature holding the area code: the single key
/// ending in `cd`.
pub fn find_code_field(properties: &serde_json::Map<String, Value>) -> Result<String> {
    let candidates: Vec<&String> = properties
        .keys()
        .filter(|k| k.to_lowercase().ends_with("cd"))
        .collect();
    match candidates.as_slice() {
        [single] => Ok((*single).clone()),
        [] => Err(EtlError::source_format("No code field found in boundary file")),
        many => Err(EtlError::source_format(format!(
            "Too many code fields found in boundary file: {}",
            many.iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join("; ")
        ))),
    }
}
