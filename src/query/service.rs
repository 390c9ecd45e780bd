//! Read-side lookups: postcodes, points, areas, places, hashes and search.
//!
//! Store documents are mapped onto typed results here; the API layer only
//! serialises and projects them.

use crate::adapters::blob::boundary_key;
use crate::config::settings::IndexNames;
use crate::domain::areatypes::{area_type, area_type_for_code, is_gss_code, AreaType, AREA_TYPES};
use crate::domain::model::{AreaDocument, LatLon, PlacenameDocument, PostcodeDocument};
use crate::domain::ports::{BlobStore, DocumentStore, SearchQuery};
use crate::domain::postcode::Postcode;
use crate::query::cache::SharedAreaNames;
use crate::query::fields::{FieldSet, Shape, NAMED_FIELDS};
use crate::utils::error::{EtlError, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

pub const HASH_LOOKUP_LEN: usize = 5;
pub const MAX_HASH_LEN: usize = 32;
/// Upper bound on postcodes returned for one hash lookup.
const HASH_RESULT_LIMIT: usize = 10_000;
pub const DEFAULT_SEARCH_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostcodeResult {
    #[serde(flatten)]
    pub postcode: PostcodeDocument,
    /// `<field>_name` display names for the area codes.
    #[serde(flatten)]
    pub names: BTreeMap<String, Option<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearestPoint {
    #[serde(flatten)]
    pub postcode: PostcodeResult,
    pub point_lat: f64,
    pub point_long: f64,
    /// Metres from the requested point.
    pub distance_from_postcode: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AreaResult {
    #[serde(flatten)]
    pub area: AreaDocument,
    pub areatype: Option<&'static AreaType>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SearchItem {
    Postcode(PostcodeResult),
    Area(AreaResult),
    Place(PlacenameDocument),
}

impl SearchItem {
    pub fn code(&self) -> &str {
        match self {
            Self::Postcode(p) => p.postcode.id(),
            Self::Area(a) => &a.area.code,
            Self::Place(p) => &p.place18cd,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Postcode(p) => p.postcode.id(),
            Self::Area(a) => a.area.name.as_deref().unwrap_or(&a.area.code),
            Self::Place(p) => &p.place18nm,
        }
    }
}

/// `scores` line up with `result`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchOutcome {
    pub result_count: u64,
    pub result: Vec<SearchItem>,
    pub scores: Vec<f64>,
}

#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn DocumentStore>,
    blobs: Option<Arc<dyn BlobStore>>,
    indices: IndexNames,
    names: SharedAreaNames,
}

fn from_doc<T: serde::de::DeserializeOwned>(doc: Value) -> Result<T> {
    Ok(serde_json::from_value(doc)?)
}

impl QueryService {
    pub fn new(store: Arc<dyn DocumentStore>, indices: IndexNames, names: SharedAreaNames) -> Self {
        Self {
            store,
            blobs: None,
            indices,
            names,
        }
    }

    pub fn with_blobs(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    pub fn indices(&self) -> &IndexNames {
        &self.indices
    }

    /// Drop every cached area name.
    pub fn invalidate_names(&self) {
        self.names
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .invalidate();
    }

    /// Names for `codes`, from the cache where possible and one `multi_get`
    /// for the rest.
    async fn area_names(&self, codes: BTreeSet<String>) -> Result<HashMap<String, Option<String>>> {
        let mut found = HashMap::new();
        let mut missing = Vec::new();
        {
            let mut cache = self.names.lock().unwrap_or_else(|p| p.into_inner());
            for code in codes {
                match cache.get(&code) {
                    Some(name) => {
                        found.insert(code, name);
                    }
                    None => missing.push(code),
                }
            }
        }
        if missing.is_empty() {
            return Ok(found);
        }

        tracing::debug!("Fetching {} area names", missing.len());
        let docs = self.store.multi_get(&self.indices.area, &missing).await?;
        let mut cache = self.names.lock().unwrap_or_else(|p| p.into_inner());
        for (code, doc) in missing.into_iter().zip(docs) {
            let name = doc
                .as_ref()
                .and_then(|d| d.get("name"))
                .and_then(Value::as_str)
                .map(str::to_string);
            cache.insert(code.clone(), name.clone());
            found.insert(code, name);
        }
        Ok(found)
    }

    fn wanted_names<'a>(
        postcode: &'a PostcodeDocument,
        fields: &'a FieldSet,
    ) -> impl Iterator<Item = (&'static str, &'a String)> + 'a {
        NAMED_FIELDS
            .iter()
            .copied()
            .filter(|field| fields.wants_name(field))
            .filter_map(|field| postcode.codes.get(field).map(|code| (field, code)))
    }

    async fn decorate(
        &self,
        postcodes: Vec<PostcodeDocument>,
        fields: &FieldSet,
    ) -> Result<Vec<PostcodeResult>> {
        let codes: BTreeSet<String> = postcodes
            .iter()
            .flat_map(|p| Self::wanted_names(p, fields).map(|(_, code)| code.clone()))
            .collect();
        let names = self.area_names(codes).await?;

        Ok(postcodes
            .into_iter()
            .map(|postcode| {
                let resolved = Self::wanted_names(&postcode, fields)
                    .map(|(field, code)| {
                        (
                            format!("{}_name", field),
                            names.get(code).cloned().flatten(),
                        )
                    })
                    .collect();
                PostcodeResult {
                    postcode,
                    names: resolved,
                }
            })
            .collect())
    }

    pub async fn get_postcode(&self, raw: &str, fields: &FieldSet) -> Result<PostcodeResult> {
        let postcode = Postcode::parse(raw)?;
        let doc = self
            .store
            .get(&self.indices.postcode, postcode.as_str())
            .await?
            .ok_or_else(|| EtlError::not_found("postcode", postcode.as_str()))?;
        let mut decorated = self.decorate(vec![from_doc(doc)?], fields).await?;
        decorated
            .pop()
            .ok_or_else(|| EtlError::not_found("postcode", postcode.as_str()))
    }

    /// Invalid and unknown postcodes are left out.
    pub async fn get_postcodes(&self, raws: &[String], fields: &FieldSet) -> Result<Vec<PostcodeResult>> {
        let ids: Vec<String> = raws
            .iter()
            .filter_map(|raw| match Postcode::parse(raw) {
                Ok(p) => Some(p.as_str().to_string()),
                Err(e) => {
                    tracing::debug!("Ignoring {}", e);
                    None
                }
            })
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let docs = self.store.multi_get(&self.indices.postcode, &ids).await?;
        let postcodes = docs
            .into_iter()
            .flatten()
            .map(from_doc)
            .collect::<Result<Vec<PostcodeDocument>>>()?;
        self.decorate(postcodes, fields).await
    }

    pub async fn nearest_postcode(&self, lat: f64, lon: f64, fields: &FieldSet) -> Result<NearestPoint> {
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return Err(EtlError::InvalidQuery {
                message: format!("Invalid point {},{}", lat, lon),
            });
        }
        let results = self
            .store
            .search(&self.indices.postcode, &SearchQuery::Nearest { lat, lon }, 1)
            .await?;
        let hit = results
            .hits
            .into_iter()
            .next()
            .ok_or_else(|| EtlError::not_found("point", format!("{},{}", lat, lon)))?;

        let postcode: PostcodeDocument = from_doc(hit.source)?;
        let distance = postcode
            .location
            .map(|location| location.distance_to(&LatLon { lat, lon }))
            .unwrap_or(hit.score);
        let mut decorated = self.decorate(vec![postcode], fields).await?;
        let postcode = decorated
            .pop()
            .ok_or_else(|| EtlError::not_found("point", format!("{},{}", lat, lon)))?;
        Ok(NearestPoint {
            postcode,
            point_lat: lat,
            point_long: lon,
            distance_from_postcode: distance,
        })
    }

    pub async fn get_area(&self, code: &str) -> Result<AreaResult> {
        let code = code.trim().to_uppercase();
        let doc = self
            .store
            .get(&self.indices.area, &code)
            .await?
            .ok_or_else(|| EtlError::not_found("area", code.as_str()))?;
        let area: AreaDocument = from_doc(doc)?;
        let areatype = area
            .area_type
            .as_deref()
            .and_then(area_type)
            .or_else(|| area_type_for_code(&area.code));
        Ok(AreaResult { area, areatype })
    }

    /// Boundary GeoJSON stored by the boundaries import.
    pub async fn area_boundary(&self, code: &str) -> Result<Vec<u8>> {
        let code = code.trim().to_uppercase();
        let blobs = self.blobs.as_ref().ok_or_else(|| EtlError::BlobNotFound {
            key: boundary_key(&code),
        })?;
        blobs.download(&boundary_key(&code)).await
    }

    pub async fn get_place(&self, code: &str) -> Result<PlacenameDocument> {
        let code = code.trim().to_uppercase();
        let doc = self
            .store
            .get(&self.indices.placename, &code)
            .await?
            .ok_or_else(|| EtlError::not_found("place", code.as_str()))?;
        from_doc(doc)
    }

    pub fn area_types(&self) -> &'static [AreaType] {
        AREA_TYPES
    }

    pub fn area_type(&self, code: &str) -> Result<&'static AreaType> {
        area_type(code).ok_or_else(|| EtlError::not_found("area type", code))
    }

    /// Postcodes whose hash starts with any of `prefixes` (5 to 32 hex
    /// characters each).
    pub async fn postcodes_by_hash(&self, prefixes: &[String], fields: &FieldSet) -> Result<Vec<PostcodeResult>> {
        let mut wanted = Vec::with_capacity(prefixes.len());
        for prefix in prefixes {
            let prefix = prefix.trim().to_lowercase();
            let valid = (HASH_LOOKUP_LEN..=MAX_HASH_LEN).contains(&prefix.len())
                && prefix.chars().all(|c| c.is_ascii_hexdigit());
            if !valid {
                return Err(EtlError::InvalidQuery {
                    message: format!(
                        "Hash {:?} must be {} to {} hex characters",
                        prefix, HASH_LOOKUP_LEN, MAX_HASH_LEN
                    ),
                });
            }
            wanted.push(prefix);
        }
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let lookup: BTreeSet<String> = wanted
            .iter()
            .map(|p| p[..HASH_LOOKUP_LEN].to_string())
            .collect();
        let query = SearchQuery::Terms {
            field: "hash_prefix".to_string(),
            values: lookup.into_iter().collect(),
        };
        let results = self
            .store
            .search(&self.indices.postcode, &query, HASH_RESULT_LIMIT)
            .await?;

        let mut postcodes = Vec::new();
        for hit in results.hits {
            let postcode: PostcodeDocument = from_doc(hit.source)?;
            if wanted.iter().any(|p| postcode.hash.starts_with(p.as_str())) {
                postcodes.push(postcode);
            }
        }
        postcodes.sort_by(|a, b| a.pcds.cmp(&b.pcds));
        self.decorate(postcodes, fields).await
    }

    /// A postcode or GSS code goes straight to that record; anything else is
    /// a ranked text search over area and place names.
    pub async fn search(&self, q: &str, size: usize) -> Result<SearchOutcome> {
        let q = q.trim();
        if q.is_empty() {
            return Err(EtlError::InvalidQuery {
                message: "Empty search".to_string(),
            });
        }

        if let Ok(postcode) = Postcode::parse(q) {
            match self.get_postcode(postcode.as_str(), &FieldSet::all(Shape::Postcode)).await {
                Ok(found) => return Ok(single(SearchItem::Postcode(found))),
                Err(EtlError::RecordNotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        let upper = q.to_uppercase();
        if is_gss_code(&upper) {
            match self.get_area(&upper).await {
                Ok(area) => return Ok(single(SearchItem::Area(area))),
                Err(EtlError::RecordNotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        let areas = self
            .store
            .search(
                &self.indices.area,
                &SearchQuery::Text {
                    query: q.to_string(),
                    fields: vec!["name".to_string(), "name_welsh".to_string()],
                },
                size,
            )
            .await?;
        let places = self
            .store
            .search(
                &self.indices.placename,
                &SearchQuery::Text {
                    query: q.to_string(),
                    fields: vec!["place18nm".to_string(), "alternative_names".to_string()],
                },
                size,
            )
            .await?;

        let mut scored: Vec<(f64, SearchItem)> = Vec::new();
        for hit in areas.hits {
            let area: AreaDocument = from_doc(hit.source)?;
            let areatype = area.area_type.as_deref().and_then(area_type);
            scored.push((hit.score, SearchItem::Area(AreaResult { area, areatype })));
        }
        for hit in places.hits {
            scored.push((hit.score, SearchItem::Place(from_doc(hit.source)?)));
        }
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored.truncate(size);

        let (scores, result) = scored.into_iter().unzip();
        Ok(SearchOutcome {
            result_count: areas.total + places.total,
            result,
            scores,
        })
    }
}

fn single(item: SearchItem) -> SearchOutcome {
    SearchOutcome {
        result_count: 1,
        result: vec![item],
        scores: vec![1.0],
    }
}
