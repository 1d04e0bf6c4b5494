//! JSON API handlers.
//!
//! The HTTP surface mirrors the store operations one to one; handlers only
//! translate payloads and never contain workflow logic.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use super::error::{ApiError, ApiResult};
use super::SharedStore;
use crate::compensation;
use crate::entity::{
    Documents, NewPermit, Permit, PermitStatus, RequestType, RulingInput, SiteVisit, Species,
};
use crate::error::ArboreaError;

/// GET /health
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}

#[derive(Deserialize)]
pub struct SpeciesQuery {
    pub q: Option<String>,
    pub limit: Option<usize>,
}

/// GET /api/species
pub async fn list_species(
    State(store): State<SharedStore>,
    Query(query): Query<SpeciesQuery>,
) -> ApiResult<Json<Vec<Species>>> {
    let store = store.lock().await;
    let species = match query.q {
        Some(q) => store.search_species(&q, query.limit.unwrap_or(50))?,
        None => store.list_species()?,
    };
    Ok(Json(species))
}

/// GET /api/species/{name}
pub async fn get_species(
    State(store): State<SharedStore>,
    Path(name): Path<String>,
) -> ApiResult<Json<Species>> {
    let store = store.lock().await;
    match store.get_species(&name)? {
        Some(species) => Ok(Json(species)),
        None => Err(ArboreaError::SpeciesNotFound(name).into()),
    }
}

/// POST /api/permits
pub async fn file_permit(
    State(store): State<SharedStore>,
    Json(new): Json<NewPermit>,
) -> ApiResult<(StatusCode, Json<Permit>)> {
    let mut store = store.lock().await;
    let permit = store.file_request(new)?;
    Ok((StatusCode::CREATED, Json(permit)))
}

#[derive(Deserialize)]
pub struct PermitQuery {
    pub status: Option<String>,
    pub request_type: Option<String>,
}

/// GET /api/permits
pub async fn list_permits(
    State(store): State<SharedStore>,
    Query(query): Query<PermitQuery>,
) -> ApiResult<Json<Vec<Permit>>> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<PermitStatus>)
        .transpose()
        .map_err(|e| ApiError::from(ArboreaError::validation("status", e)))?;
    let request_type = query
        .request_type
        .as_deref()
        .map(str::parse::<RequestType>)
        .transpose()
        .map_err(|e| ApiError::from(ArboreaError::validation("request_type", e)))?;

    let store = store.lock().await;
    Ok(Json(store.list_permits(status, request_type)?))
}

/// GET /api/permits/{id}
///
/// Accepts either a numeric id or a full tracking number.
pub async fn get_permit(
    State(store): State<SharedStore>,
    Path(id): Path<String>,
) -> ApiResult<Json<Permit>> {
    let store = store.lock().await;
    let permit = match id.parse::<i64>() {
        Ok(id) => store.get_permit(id)?,
        Err(_) => store.get_by_tracking_number(&id)?,
    };
    Ok(Json(permit))
}

#[derive(Deserialize)]
pub struct VisitRequest {
    pub date: Option<DateTime<Utc>>,
    pub technician: String,
    pub final_risk: Option<String>,
    pub observations: Option<String>,
    pub recommendations: Option<String>,
}

/// POST /api/permits/{id}/visit
pub async fn record_visit(
    State(store): State<SharedStore>,
    Path(id): Path<i64>,
    Json(req): Json<VisitRequest>,
) -> ApiResult<Json<Permit>> {
    let final_risk = req
        .final_risk
        .as_deref()
        .map(str::parse)
        .transpose()
        .map_err(|e: String| ApiError::from(ArboreaError::validation("final_risk", e)))?;
    let visit = SiteVisit {
        date: req.date.unwrap_or_else(Utc::now),
        technician: req.technician,
        final_risk,
        observations: req.observations,
        recommendations: req.recommendations,
    };

    let mut store = store.lock().await;
    Ok(Json(store.record_visit(id, visit)?))
}

/// POST /api/permits/{id}/decision
pub async fn record_decision(
    State(store): State<SharedStore>,
    Path(id): Path<i64>,
    Json(input): Json<RulingInput>,
) -> ApiResult<Json<Permit>> {
    let mut store = store.lock().await;
    Ok(Json(store.record_decision(id, input)?))
}

/// POST /api/permits/{id}/close
pub async fn close_permit(
    State(store): State<SharedStore>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Permit>> {
    let mut store = store.lock().await;
    Ok(Json(store.close(id)?))
}

/// POST /api/permits/{id}/documents
pub async fn attach_documents(
    State(store): State<SharedStore>,
    Path(id): Path<i64>,
    Json(documents): Json<Documents>,
) -> ApiResult<Json<Permit>> {
    let mut store = store.lock().await;
    Ok(Json(store.attach_documents(id, &documents)?))
}

#[derive(Deserialize)]
pub struct CompensationRequest {
    pub dbh_cm: f64,
    pub coefficient: Option<f64>,
}

/// POST /api/compensation
///
/// Stateless calculator endpoint; nothing is persisted.
pub async fn compute_compensation(
    Json(req): Json<CompensationRequest>,
) -> ApiResult<Json<Value>> {
    if req.dbh_cm <= 0.0 {
        return Err(ArboreaError::validation("dbh_cm", "must be positive").into());
    }
    let coefficient = req.coefficient.unwrap_or(1.0);
    if coefficient <= 0.0 {
        return Err(ArboreaError::validation("coefficient", "must be positive").into());
    }

    let trees = compensation::trees_to_plant(req.dbh_cm, coefficient);
    Ok(Json(json!({
        "dbh_cm": req.dbh_cm,
        "coefficient": coefficient,
        "formula": compensation::FORMULA,
        "trees_to_plant": trees,
    })))
}
