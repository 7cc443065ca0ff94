use axum::{
    body::Bytes,
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    response::Json,
};
use log::error;
use serde::Serialize;
use std::sync::Arc;

use crate::error::CrudError;
use crate::logic::CrudService;
use crate::model::{Created, Envelope, Record, RequestContext};
use crate::store::traits::Store;

pub type AppState<S> = Arc<S>;

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        Self {
            error: message.to_string(),
        }
    }
}

/// Field a field-addressed route was mounted for, as it appears in the path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressField(pub String);

type HandlerError = (StatusCode, Json<ErrorResponse>);

pub fn status_for(err: &CrudError) -> StatusCode {
    match err {
        CrudError::Bind(_) => StatusCode::BAD_REQUEST,
        CrudError::Resolution(_) => StatusCode::NOT_FOUND,
        CrudError::Hook(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CrudError::Persistence(_) | CrudError::Schema { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn error_response(err: CrudError) -> HandlerError {
    let status = status_for(&err);
    if status.is_server_error() {
        error!("{}", err);
    }
    (status, Json(ErrorResponse::new(&err.to_string())))
}

fn service<T: Record, S: Store + 'static>(
    store: AppState<S>,
) -> Result<CrudService<T, S>, HandlerError> {
    CrudService::new(store).map_err(error_response)
}

pub async fn list_records<T: Record, S: Store + 'static>(
    State(store): State<AppState<S>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Json<Envelope<T>>, (StatusCode, Json<ErrorResponse>)> {
    let service = service::<T, S>(store)?;
    match service.list(&params).await {
        Ok(envelope) => Ok(Json(envelope)),
        Err(e) => Err(error_response(e)),
    }
}

/// Body is a single object or an array of objects
pub async fn create_records<T: Record, S: Store + 'static>(
    State(store): State<AppState<S>>,
    ctx: RequestContext,
    body: Bytes,
) -> Result<Json<Created<T>>, (StatusCode, Json<ErrorResponse>)> {
    let service = service::<T, S>(store)?;
    match service.create(&ctx, &body).await {
        Ok(created) => Ok(Json(created)),
        Err(e) => Err(error_response(e)),
    }
}

/// Responds with `null` when nothing matches
pub async fn read_record<T: Record, S: Store + 'static>(
    State(store): State<AppState<S>>,
    Extension(AddressField(field)): Extension<AddressField>,
    Path(value): Path<String>,
) -> Result<Json<Option<T>>, (StatusCode, Json<ErrorResponse>)> {
    let service = service::<T, S>(store)?;
    match service.read_one(&field, &value).await {
        Ok(record) => Ok(Json(record)),
        Err(e) => Err(error_response(e)),
    }
}

pub async fn update_record<T: Record, S: Store + 'static>(
    State(store): State<AppState<S>>,
    Extension(AddressField(field)): Extension<AddressField>,
    Path(value): Path<String>,
    ctx: RequestContext,
    body: Bytes,
) -> Result<Json<u64>, (StatusCode, Json<ErrorResponse>)> {
    let service = service::<T, S>(store)?;
    match service.update_one(&ctx, &field, &value, &body).await {
        Ok(affected) => Ok(Json(affected)),
        Err(e) => Err(error_response(e)),
    }
}

/// Body is an array of objects, each carrying the addressing field
pub async fn update_records<T: Record, S: Store + 'static>(
    State(store): State<AppState<S>>,
    Extension(AddressField(field)): Extension<AddressField>,
    ctx: RequestContext,
    body: Bytes,
) -> Result<Json<u64>, (StatusCode, Json<ErrorResponse>)> {
    let service = service::<T, S>(store)?;
    match service.update_many(&ctx, &field, &body).await {
        Ok(affected) => Ok(Json(affected)),
        Err(e) => Err(error_response(e)),
    }
}

pub async fn delete_record<T: Record, S: Store + 'static>(
    State(store): State<AppState<S>>,
    Extension(AddressField(field)): Extension<AddressField>,
    Path(value): Path<String>,
) -> Result<Json<u64>, (StatusCode, Json<ErrorResponse>)> {
    let service = service::<T, S>(store)?;
    match service.delete_one(&field, &value).await {
        Ok(affected) => Ok(Json(affected)),
        Err(e) => Err(error_response(e)),
    }
}

/// Body is an array of addressing values
pub async fn delete_records<T: Record, S: Store + 'static>(
    State(store): State<AppState<S>>,
    Extension(AddressField(field)): Extension<AddressField>,
    body: Bytes,
) -> Result<Json<u64>, (StatusCode, Json<ErrorResponse>)> {
    let service = service::<T, S>(store)?;
    match service.delete_many(&field, &body).await {
        Ok(affected) => Ok(Json(affected)),
        Err(e) => Err(error_response(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HookError;

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(status_for(&CrudError::bind("x")), StatusCode::BAD_REQUEST);
        assert_eq!(status_for(&CrudError::resolution("x")), StatusCode::NOT_FOUND);
        assert_eq!(
            status_for(&CrudError::Hook(HookError::new("x"))),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_for(&CrudError::Persistence(anyhow::anyhow!("x"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_body() {
        let (status, Json(body)) = error_response(CrudError::bind("page must be a number"));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "bind error: page must be a number");
    }
}
