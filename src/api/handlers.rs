use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};

use super::AppState;
use super::models::*;
use crate::candidates::{self, CandidateSet};
use crate::error::{ApiError, AppError};
use crate::imagery::{ImageRegion, ImageryRequest, ReductionPolicy, encode_data_uri};
use crate::vision::ValidationResult;

pub const DEFAULT_BUFFER_M: f64 = 500.0;

const SATELLITE_FAILED: &str = "Failed to fetch satellite imagery";
const VALIDATE_FAILED: &str = "Failed to validate image";

fn parse_number(name: &str, raw: &str) -> Result<f64, AppError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| AppError::Validation(format!("{} must be a number, got '{}'", name, raw)))
}

pub async fn get_satellite(
    State(state): State<Arc<AppState>>,
    query: Result<Query<SatelliteQuery>, QueryRejection>,
) -> Result<Json<SatelliteResponse>, ApiError> {
    let fail = |e: AppError| ApiError::new(SATELLITE_FAILED, e);

    // 重複キーなどクエリ自体が読めない場合も共通のエラー形式で返す
    let Query(query) = query.map_err(|rejection| {
        fail(AppError::Validation(format!(
            "Invalid query string: {}",
            rejection.body_text()
        )))
    })?;

    let (Some(lat), Some(lon)) = (
        query.lat.as_deref().filter(|s| !s.trim().is_empty()),
        query.lon.as_deref().filter(|s| !s.trim().is_empty()),
    ) else {
        return Err(fail(AppError::Validation(
            "Latitude and longitude are required".to_string(),
        )));
    };

    let latitude = parse_number("lat", lat).map_err(fail)?;
    let longitude = parse_number("lon", lon).map_err(fail)?;
    let buffer = match query.buffer.as_deref() {
        Some(raw) => parse_number("buffer", raw).map_err(fail)?,
        None => DEFAULT_BUFFER_M,
    };
    let policy = match query.policy.as_deref() {
        Some(raw) => raw
            .parse::<ReductionPolicy>()
            .map_err(|e| fail(e.into()))?,
        None => ReductionPolicy::default(),
    };

    let region = ImageRegion::around(latitude, longitude, buffer).map_err(|e| fail(e.into()))?;
    let request = ImageryRequest::builder(region)
        .reduction(policy)
        .build()
        .map_err(|e| fail(e.into()))?;

    let client = state.imagery().map_err(fail)?;
    let bytes = client.fetch_image(&request).await.map_err(fail)?;

    Ok(Json(SatelliteResponse {
        image: encode_data_uri(&bytes),
        coordinates: Coordinates {
            lat: latitude,
            lon: longitude,
        },
        source: request.source_label(),
    }))
}

pub async fn validate_image(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ValidateRequest>, JsonRejection>,
) -> Result<Json<ValidationResult>, ApiError> {
    let Json(payload) = payload.map_err(|rejection| {
        ApiError::terse(
            VALIDATE_FAILED,
            AppError::Validation(format!("Invalid request body: {}", rejection.body_text())),
        )
    })?;

    let image_url = payload
        .image_url
        .filter(|url| !url.trim().is_empty())
        .ok_or_else(|| {
            ApiError::terse(
                VALIDATE_FAILED,
                AppError::Validation("Image URL is required".to_string()),
            )
        })?;

    let result = state
        .vision
        .classify(&image_url)
        .await
        .map_err(|e| ApiError::terse(VALIDATE_FAILED, e))?;

    Ok(Json(result))
}

pub async fn get_candidates(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CandidateSet>, ApiError> {
    let fail = |e: AppError| ApiError::new("Failed to load candidates", e);

    let path = state
        .candidates_path
        .clone()
        .ok_or_else(|| fail(AppError::Configuration("CANDIDATES_PATH is not set".into())))?;

    let set = tokio::task::spawn_blocking(move || candidates::load_candidates(&path))
        .await
        .map_err(|e| fail(AppError::Configuration(format!("candidate loader stopped: {}", e))))?
        .map_err(|e| fail(AppError::Configuration(format!("cannot read candidates: {}", e))))?;

    Ok(Json(set))
}
