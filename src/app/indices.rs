//! Index definitions for `init-db`.

use crate::config::settings::IndexNames;
use crate::domain::ports::DocumentStore;
use crate::utils::error::Result;
use serde_json::{json, Value};

/// Unlisted string fields (area codes on postcodes) are stored as keywords.
fn keyword_strings() -> Value {
    json!([{
        "strings_as_keywords": {
            "match_mapping_type": "string",
            "mapping": {"type": "keyword"}
        }
    }])
}

pub fn postcode_mapping() -> Value {
    json!({
        "mappings": {
            "dynamic_templates": keyword_strings(),
            "properties": {
                "pcds": {"type": "keyword"},
                "pcd": {"type": "keyword"},
                "pcd2": {"type": "keyword"},
                "dointr": {"type": "date"},
                "doterm": {"type": "date"},
                "usertype": {"type": "integer"},
                "oseast1m": {"type": "integer"},
                "osnrth1m": {"type": "integer"},
                "osgrdind": {"type": "integer"},
                "imd": {"type": "integer"},
                "lat": {"type": "float"},
                "long": {"type": "float"},
                "location": {"type": "geo_point"},
                "hash": {"type": "keyword"},
                "hash_prefix": {"type": "keyword"},
                "postcode_area": {"type": "keyword"},
                "postcode_district": {"type": "keyword"},
                "postcode_sector": {"type": "keyword"}
            }
        }
    })
}

pub fn area_mapping() -> Value {
    json!({
        "mappings": {
            "dynamic_templates": keyword_strings(),
            "properties": {
                "code": {"type": "keyword"},
                "name": {"type": "text", "fields": {"keyword": {"type": "keyword"}}},
                "name_welsh": {"type": "text"},
                "statutory_instrument_title": {"type": "text"},
                "date_start": {"type": "date"},
                "date_end": {"type": "date"},
                "active": {"type": "boolean"},
                "areaehect": {"type": "float"},
                "areachect": {"type": "float"},
                "areaihect": {"type": "float"},
                "arealhect": {"type": "float"},
                "has_boundary": {"type": "boolean"}
            }
        }
    })
}

pub fn entity_mapping() -> Value {
    json!({
        "mappings": {
            "dynamic_templates": keyword_strings(),
            "properties": {
                "code": {"type": "keyword"},
                "name": {"type": "text"},
                "live_instances": {"type": "integer"},
                "archived_instances": {"type": "integer"},
                "crossborder_instances": {"type": "integer"},
                "last_modified": {"type": "date"},
                "date_introduced": {"type": "date"},
                "date_start": {"type": "date"}
            }
        }
    })
}

pub fn placename_mapping() -> Value {
    json!({
        "mappings": {
            "dynamic_templates": keyword_strings(),
            "properties": {
                "place18cd": {"type": "keyword"},
                "place18nm": {"type": "text"},
                "splitind": {"type": "boolean"},
                "popcnt": {"type": "integer"},
                "gridgb1e": {"type": "integer"},
                "gridgb1n": {"type": "integer"},
                "lat": {"type": "float"},
                "long": {"type": "float"},
                "location": {"type": "geo_point"},
                "alternative_names": {"type": "text"}
            }
        }
    })
}

/// Create every index. With `reset`, existing indices and their documents
/// are dropped first.
pub async fn create_indices(
    store: &dyn DocumentStore,
    indices: &IndexNames,
    reset: bool,
) -> Result<()> {
    let definitions = [
        (&indices.area, area_mapping()),
        (&indices.entity, entity_mapping()),
        (&indices.postcode, postcode_mapping()),
        (&indices.placename, placename_mapping()),
    ];
    for (index, mapping) in definitions {
        tracing::info!(index = %index, reset, "Creating index");
        store.create_index(index, &mapping, reset).await?;
    }
    Ok(())
}
