use super::{pages, ApiError, ApiResult, AppState};
use crate::query::service::DEFAULT_SEARCH_SIZE;
use crate::query::{FieldSet, Shape};
use crate::utils::error::EtlError;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Extension of the last path segment, if it is one we serve.
fn split_format(segment: &str) -> (&str, Option<&'static str>) {
    for ext in ["json", "html", "geojson"] {
        if let Some(stem) = segment
            .strip_suffix(ext)
            .and_then(|s| s.strip_suffix('.'))
        {
            return (stem, Some(ext));
        }
    }
    (segment, None)
}

fn unsupported(segment: &str) -> ApiError {
    ApiError(EtlError::not_found("resource", segment))
}

#[derive(Debug, Default, Deserialize)]
pub struct FieldsParam {
    pub fields: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParam {
    #[serde(default)]
    pub q: String,
    pub size: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct HashesRequest {
    pub hashes: Vec<String>,
    #[serde(default)]
    pub fields: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /health
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /postcodes/{code}.json and /postcodes/{code}.html
pub async fn postcode(
    State(state): State<AppState>,
    Path(segment): Path<String>,
    Query(params): Query<FieldsParam>,
) -> ApiResult<Response> {
    match split_format(&segment) {
        (code, Some("html")) => Ok(pages::postcode(&state, code).await),
        (code, Some("json") | None) => {
            let fields = FieldSet::parse(Shape::Postcode, params.fields.as_deref())?;
            let result = state.service.get_postcode(code, &fields).await?;
            Ok(Json(fields.project(serde_json::to_value(result).map_err(EtlError::from)?)).into_response())
        }
        _ => Err(unsupported(&segment)),
    }
}

/// GET /points/{lat},{long}.json
pub async fn nearest_point(
    State(state): State<AppState>,
    Path(segment): Path<String>,
    Query(params): Query<FieldsParam>,
) -> ApiResult<Json<Value>> {
    let (point, ext) = split_format(&segment);
    if !matches!(ext, Some("json") | None) {
        return Err(unsupported(&segment));
    }
    let invalid = || {
        ApiError(EtlError::InvalidQuery {
            message: format!("Expected lat,long but got {:?}", point),
        })
    };
    let (lat, lon) = point.split_once(',').ok_or_else(invalid)?;
    let lat: f64 = lat.trim().parse().map_err(|_| invalid())?;
    let lon: f64 = lon.trim().parse().map_err(|_| invalid())?;

    let fields = FieldSet::parse(Shape::NearestPoint, params.fields.as_deref())?;
    let result = state.service.nearest_postcode(lat, lon, &fields).await?;
    Ok(Json(fields.project(serde_json::to_value(result).map_err(EtlError::from)?)))
}

/// GET /areas/{code}.json and /areas/{code}.geojson
pub async fn area(
    State(state): State<AppState>,
    Path(segment): Path<String>,
) -> ApiResult<Response> {
    match split_format(&segment) {
        (code, Some("geojson")) => {
            let body = state.service.area_boundary(code).await?;
            Ok(([(header::CONTENT_TYPE, "application/geo+json")], body).into_response())
        }
        (code, Some("json") | None) => {
            let result = state.service.get_area(code).await?;
            Ok(Json(result).into_response())
        }
        _ => Err(unsupported(&segment)),
    }
}

/// GET /places/{code}.json
pub async fn place(
    State(state): State<AppState>,
    Path(segment): Path<String>,
) -> ApiResult<Response> {
    match split_format(&segment) {
        (code, Some("json") | None) => Ok(Json(state.service.get_place(code).await?).into_response()),
        _ => Err(unsupported(&segment)),
    }
}

async fn hash_lookup(state: &AppState, prefixes: &[String], fields: FieldSet) -> ApiResult<Json<Value>> {
    let results = state.service.postcodes_by_hash(prefixes, &fields).await?;
    let data = results
        .into_iter()
        .map(|r| serde_json::to_value(r).map(|v| fields.project(v)))
        .collect::<Result<Vec<Value>, _>>()
        .map_err(EtlError::from)?;
    Ok(Json(json!({ "data": data })))
}

/// GET /hash/{prefix}.json
pub async fn hash(
    State(state): State<AppState>,
    Path(segment): Path<String>,
    Query(params): Query<FieldsParam>,
) -> ApiResult<Json<Value>> {
    let (prefix, ext) = split_format(&segment);
    if !matches!(ext, Some("json") | None) {
        return Err(unsupported(&segment));
    }
    let fields = FieldSet::parse(Shape::Postcode, params.fields.as_deref())?;
    hash_lookup(&state, &[prefix.to_string()], fields).await
}

/// POST /hashes.json
pub async fn hashes(
    State(state): State<AppState>,
    Json(request): Json<HashesRequest>,
) -> ApiResult<Json<Value>> {
    let fields = FieldSet::from_names(Shape::Postcode, &request.fields)?;
    hash_lookup(&state, &request.hashes, fields).await
}

/// GET /areatypes.json
pub async fn area_types(State(state): State<AppState>) -> Json<Value> {
    Json(json!(state.service.area_types()))
}

/// GET /areatypes/{code}.json
pub async fn area_type(
    State(state): State<AppState>,
    Path(segment): Path<String>,
) -> ApiResult<Json<Value>> {
    let (code, ext) = split_format(&segment);
    if !matches!(ext, Some("json") | None) {
        return Err(unsupported(&segment));
    }
    Ok(Json(json!(state.service.area_type(code)?)))
}

/// GET /search.json?q=
pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParam>,
) -> ApiResult<Json<Value>> {
    let size = params.size.unwrap_or(DEFAULT_SEARCH_SIZE).clamp(1, 100);
    let outcome = state.service.search(&params.q, size).await?;
    Ok(Json(json!(outcome)))
}
