use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Json;
use axum::Router;
use serde::Serialize;
use uuid::Uuid;

use crate::api::rest::extract::{Authenticated, JsonBody, PathParam};
use crate::engine::fleet::{self, DocumentInput, TruckInput, TruckPatch};
use crate::error::AppError;
use crate::models::document::DriverDocument;
use crate::models::truck::Truck;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/trucks", get(list_trucks).post(create_truck))
        .route(
            "/trucks/:id",
            get(get_truck)
                .put(replace_truck)
                .patch(patch_truck)
                .delete(delete_truck),
        )
        .route("/driver/documents", get(list_documents).post(create_document))
        .route(
            "/driver/documents/:id",
            get(get_document).put(replace_document).delete(delete_document),
        )
}

#[derive(Serialize)]
pub struct DocumentView {
    #[serde(flatten)]
    pub document: DriverDocument,
    pub document_type_display: &'static str,
}

impl From<DriverDocument> for DocumentView {
    fn from(document: DriverDocument) -> Self {
        Self {
            document_type_display: document.document_type.display_name(),
            document,
        }
    }
}

async fn list_trucks(
    State(state): State<Arc<AppState>>,
    _caller: Authenticated,
) -> Json<Vec<Truck>> {
    Json(fleet::list_trucks(&state))
}

async fn get_truck(
    State(state): State<Arc<AppState>>,
    _caller: Authenticated,
    PathParam(id): PathParam<Uuid>,
) -> Result<Json<Truck>, AppError> {
    Ok(Json(fleet::get_truck(&state, id)?))
}

async fn create_truck(
    State(state): State<Arc<AppState>>,
    Authenticated { actor, .. }: Authenticated,
    JsonBody(payload): JsonBody<TruckInput>,
) -> Result<(StatusCode, Json<Truck>), AppError> {
    let truck = fleet::create_truck(&state, &actor, payload)?;
    Ok((StatusCode::CREATED, Json(truck)))
}

async fn replace_truck(
    State(state): State<Arc<AppState>>,
    Authenticated { actor, .. }: Authenticated,
    PathParam(id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<TruckInput>,
) -> Result<Json<Truck>, AppError> {
    Ok(Json(fleet::update_truck(&state, &actor, id, payload.into())?))
}

async fn patch_truck(
    State(state): State<Arc<AppState>>,
    Authenticated { actor, .. }: Authenticated,
    PathParam(id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<TruckPatch>,
) -> Result<Json<Truck>, AppError> {
    Ok(Json(fleet::update_truck(&state, &actor, id, payload)?))
}

async fn delete_truck(
    State(state): State<Arc<AppState>>,
    Authenticated { actor, .. }: Authenticated,
    PathParam(id): PathParam<Uuid>,
) -> Result<StatusCode, AppError> {
    fleet::delete_truck(&state, &actor, id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_documents(
    State(state): State<Arc<AppState>>,
    Authenticated { actor, .. }: Authenticated,
) -> Result<Json<Vec<DocumentView>>, AppError> {
    let documents = fleet::list_documents(&state, &actor)?;
    Ok(Json(documents.into_iter().map(DocumentView::from).collect()))
}

async fn create_document(
    State(state): State<Arc<AppState>>,
    Authenticated { actor, .. }: Authenticated,
    JsonBody(payload): JsonBody<DocumentInput>,
) -> Result<(StatusCode, Json<DocumentView>), AppError> {
    let document = fleet::create_document(&state, &actor, payload)?;
    Ok((StatusCode::CREATED, Json(document.into())))
}

async fn get_document(
    State(state): State<Arc<AppState>>,
    Authenticated { actor, .. }: Authenticated,
    PathParam(id): PathParam<Uuid>,
) -> Result<Json<DocumentView>, AppError> {
    Ok(Json(fleet::get_document(&state, &actor, id)?.into()))
}

async fn replace_document(
    State(state): State<Arc<AppState>>,
    Authenticated { actor, .. }: Authenticated,
    PathParam(id): PathParam<Uuid>,
    JsonBody(payload): JsonBody<DocumentInput>,
) -> Result<Json<DocumentView>, AppError> {
    Ok(Json(fleet::replace_document(&state, &actor, id, payload)?.into()))
}

async fn delete_document(
    State(state): State<Arc<AppState>>,
    Authenticated { actor, .. }: Authenticated,
    PathParam(id): PathParam<Uuid>,
) -> Result<StatusCode, AppError> {
    fleet::delete_document(&state, &actor, id)?;
    Ok(StatusCode::NO_CONTENT)
}
