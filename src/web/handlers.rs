use axum::{
    Json,
    body::Bytes,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
};

use super::{
    AppState,
    error::{ApiError, ApiResult},
    models::{
        ApiResponse, AssignDeceasedRequest, ChamberListing, ChamberQuery, CreateChamberRequest,
        CreateDeceasedRequest, DeceasedListing, DeceasedQuery, DeceasedResponse, HealthStatus,
        UpdateChamberRequest, UpdateDeceasedRequest,
    },
};
use crate::core::Chamber;
use crate::occupancy::ChamberView;

pub async fn healthcheck(State(state): State<AppState>) -> Json<ApiResponse<HealthStatus>> {
    let db = state.manager.database();
    Json(ApiResponse {
        data: HealthStatus {
            status: "ok",
            version: db.version().await,
            persistent: db.is_persistent().await,
            transactions: db.stats(),
        },
    })
}

// ----------------------------------------------------------------------
// Chambers
// ----------------------------------------------------------------------

pub async fn create_chamber(
    State(state): State<AppState>,
    payload: Result<Json<CreateChamberRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ApiResponse<ChamberView>>)> {
    let Json(payload) = payload?;
    let view = state.manager.create_chamber(payload.into_command()?).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse { data: view })))
}

pub async fn list_chambers(
    State(state): State<AppState>,
    query: Result<Query<ChamberQuery>, QueryRejection>,
) -> ApiResult<Json<ApiResponse<ChamberListing>>> {
    let Query(query) = query?;
    let data = match query.name()? {
        Some(name) => ChamberListing::One(state.manager.get_chamber(name).await?),
        None => ChamberListing::All(state.manager.list_chambers().await),
    };
    Ok(Json(ApiResponse { data }))
}

pub async fn find_available_chamber(
    State(state): State<AppState>,
) -> ApiResult<Json<ApiResponse<ChamberView>>> {
    let view = state.manager.find_available_chamber().await?;
    Ok(Json(ApiResponse { data: view }))
}

pub async fn update_chamber(
    State(state): State<AppState>,
    query: Result<Query<ChamberQuery>, QueryRejection>,
    payload: Result<Json<UpdateChamberRequest>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<ChamberView>>> {
    let Query(query) = query?;
    let Json(payload) = payload?;
    let name = query.required_name()?;
    let view = state
        .manager
        .update_chamber(name, payload.into_changes()?)
        .await?;
    Ok(Json(ApiResponse { data: view }))
}

pub async fn delete_chamber(
    State(state): State<AppState>,
    query: Result<Query<ChamberQuery>, QueryRejection>,
) -> ApiResult<Json<ApiResponse<Chamber>>> {
    let Query(query) = query?;
    let removed = state.manager.delete_chamber(query.required_name()?).await?;
    Ok(Json(ApiResponse { data: removed }))
}

pub async fn reconcile_chambers(
    State(state): State<AppState>,
) -> ApiResult<Json<ApiResponse<Vec<Chamber>>>> {
    let corrected = state.manager.reconcile().await?;
    Ok(Json(ApiResponse { data: corrected }))
}

// ----------------------------------------------------------------------
// Deceased records
// ----------------------------------------------------------------------

pub async fn create_deceased(
    State(state): State<AppState>,
    payload: Result<Json<CreateDeceasedRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ApiResponse<DeceasedResponse>>)> {
    let Json(payload) = payload?;
    let record = state
        .manager
        .create_deceased(payload.into_command()?)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse {
            data: record.into(),
        }),
    ))
}

pub async fn get_deceased(
    State(state): State<AppState>,
    query: Result<Query<DeceasedQuery>, QueryRejection>,
) -> ApiResult<Json<ApiResponse<DeceasedListing>>> {
    let Query(query) = query?;
    let data = match query.id()? {
        Some(id) => DeceasedListing::One(state.manager.get_deceased(id).await?.into()),
        None => {
            let records = state.manager.list_deceased(query.filter()?).await;
            DeceasedListing::All(records.into_iter().map(DeceasedResponse::from).collect())
        }
    };
    Ok(Json(ApiResponse { data }))
}

pub async fn update_deceased(
    State(state): State<AppState>,
    query: Result<Query<DeceasedQuery>, QueryRejection>,
    payload: Result<Json<UpdateDeceasedRequest>, JsonRejection>,
) -> ApiResult<Json<ApiResponse<DeceasedResponse>>> {
    let Query(query) = query?;
    let Json(payload) = payload?;
    let id = query.required_id()?;
    let record = state
        .manager
        .update_deceased(id, payload.into_changes()?)
        .await?;
    Ok(Json(ApiResponse {
        data: record.into(),
    }))
}

/// The body is optional: an empty body assigns to any available chamber.
pub async fn assign_deceased(
    State(state): State<AppState>,
    query: Result<Query<DeceasedQuery>, QueryRejection>,
    body: Bytes,
) -> ApiResult<Json<ApiResponse<DeceasedResponse>>> {
    let Query(query) = query?;
    let id = query.required_id()?;
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        AssignDeceasedRequest::default()
    } else {
        serde_json::from_slice::<AssignDeceasedRequest>(&body)
            .map_err(|err| ApiError::BadRequest(format!("invalid assignment body: {err}")))?
    };

    let record = state.manager.assign(id, request.target()?).await?;
    Ok(Json(ApiResponse {
        data: record.into(),
    }))
}

pub async fn delete_deceased(
    State(state): State<AppState>,
    query: Result<Query<DeceasedQuery>, QueryRejection>,
) -> ApiResult<Json<ApiResponse<DeceasedResponse>>> {
    let Query(query) = query?;
    let removed = state.manager.delete_deceased(query.required_id()?).await?;
    Ok(Json(ApiResponse {
        data: removed.into(),
    }))
}
