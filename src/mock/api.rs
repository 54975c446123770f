use crate::core::ent::*;
use crate::mock::store::MockStore;

use axum::Json;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use std::sync::Arc;

const DEFAULT_LIMIT: u32 = 20;

type Rejection = (StatusCode, String);

// The query parameters for services index
#[derive(Debug, Deserialize, Default)]
pub struct ListParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<ServiceStatus>,
    pub name_like: Option<String>,
    #[serde(rename = "type")]
    pub service_type: Option<ServiceType>,
}

#[derive(Debug, Deserialize, Default)]
pub struct Pagination {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

fn window(page: Option<u32>, limit: Option<u32>) -> Result<(u32, u32), Rejection> {
    let page = page.unwrap_or(1);
    let limit = limit.unwrap_or(DEFAULT_LIMIT);
    if page == 0 || limit == 0 {
        return Err((
            StatusCode::BAD_REQUEST,
            "page and limit must be at least 1".to_string(),
        ));
    }
    Ok((page, limit))
}

fn required_type(input: &ServiceInput) -> Result<ServiceType, Rejection> {
    input.service_type.ok_or_else(|| {
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            "type is required".to_string(),
        )
    })
}

pub async fn services_index(
    Query(params): Query<ListParams>,
    State(db): State<Arc<MockStore>>,
) -> Result<Json<Page<Service>>, Rejection> {
    let (page, limit) = window(params.page, params.limit)?;
    let filters = ServiceFilters {
        status: params.status,
        name_like: params.name_like,
        service_type: params.service_type,
    };
    Ok(Json(db.list(page, limit, &filters)))
}

pub async fn service_show(
    Path(id): Path<String>,
    State(db): State<Arc<MockStore>>,
) -> Result<Json<Service>, StatusCode> {
    db.get(&id).map(Json).ok_or(StatusCode::NOT_FOUND)
}

pub async fn service_create(
    State(db): State<Arc<MockStore>>,
    Json(input): Json<ServiceInput>,
) -> Result<(StatusCode, Json<ServiceId>), Rejection> {
    let service_type = required_type(&input)?;
    let service = db.create(input.name, service_type);
    tracing::debug!("created service {}", service.id);
    Ok((StatusCode::CREATED, Json(ServiceId { id: service.id })))
}

pub async fn service_update(
    Path(id): Path<String>,
    State(db): State<Arc<MockStore>>,
    Json(input): Json<ServiceInput>,
) -> Result<Json<ServiceId>, Rejection> {
    let service_type = required_type(&input)?;
    if db.update(&id, input.name, service_type) {
        Ok(Json(ServiceId { id }))
    } else {
        Err((StatusCode::NOT_FOUND, String::new()))
    }
}

pub async fn service_delete(
    Path(id): Path<String>,
    State(db): State<Arc<MockStore>>,
) -> Result<Json<ServiceId>, StatusCode> {
    if db.delete(&id) {
        Ok(Json(ServiceId { id }))
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

pub async fn events_index(
    Path(id): Path<String>,
    Query(pagination): Query<Pagination>,
    State(db): State<Arc<MockStore>>,
) -> Result<Json<Page<Event>>, Rejection> {
    let (page, limit) = window(pagination.page, pagination.limit)?;
    db.events(&id, page, limit)
        .map(Json)
        .ok_or((StatusCode::NOT_FOUND, String::new()))
}
