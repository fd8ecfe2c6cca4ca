use axum::{
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use base64::Engine;
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::asset::{AssetError, ImageAsset, PARAMETERS_KEY};
use crate::models::{LoadImageRequest, LoadImageResponse, SaveImageRequest};
use crate::params;

const INDEX_HTML: &str = include_str!("../templates/index.html");

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    BadRequest(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Asset(AssetError::Decode(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Asset(AssetError::Encode(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };
        warn!(%status, "request failed: {self}");
        (status, Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}

pub async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

pub async fn load_image(
    Json(body): Json<LoadImageRequest>,
) -> Result<Json<LoadImageResponse>, ApiError> {
    let bytes = decode_data_uri(&body.image)?;
    let asset = ImageAsset::decode(&bytes)?;
    info!(
        filename = %body.filename,
        width = asset.width(),
        height = asset.height(),
        bytes = bytes.len(),
        "image loaded"
    );

    let parsed = asset
        .text(PARAMETERS_KEY)
        .map(params::parse)
        .unwrap_or_default();

    Ok(Json(LoadImageResponse {
        width: asset.width(),
        height: asset.height(),
        metadata: asset.metadata_dump(),
        parsed,
    }))
}

pub async fn save_image(Json(body): Json<SaveImageRequest>) -> Result<Response, ApiError> {
    let bytes = decode_data_uri(&body.image)?;
    let asset = ImageAsset::decode(&bytes)?;

    let parameters = match (body.parameters, body.record) {
        (Some(raw), _) => {
            // The page sends newlines as the literal two-character sequence.
            let text = raw.replace("\\n", "\n");
            if text.trim().is_empty() {
                return Err(ApiError::Validation("Prompt is required for Civitai".into()));
            }
            text
        }
        (None, Some(mut record)) => {
            if body.autofill {
                params::autofill(&mut record);
            }
            if record.prompt.trim().is_empty() {
                return Err(ApiError::Validation("Prompt is required for Civitai".into()));
            }
            if record.width.is_none() {
                record.width = Some(asset.width());
            }
            if record.height.is_none() {
                record.height = Some(asset.height());
            }
            params::compose(&record)
        }
        (None, None) => {
            return Err(ApiError::BadRequest(
                "either parameters or record must be supplied".into(),
            ))
        }
    };

    let png_bytes = asset.write_png(&parameters)?;
    info!(filename = %body.filename, bytes = png_bytes.len(), "image saved with fixed metadata");

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("image/png"));
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_static("attachment; filename=\"fixed_image.png\""),
    );
    Ok((StatusCode::OK, headers, Bytes::from(png_bytes)).into_response())
}

/// Pull the raw bytes out of a `data:image/...;base64,<payload>` URI.
fn decode_data_uri(data: &str) -> Result<Vec<u8>, ApiError> {
    let (_, encoded) = data
        .split_once(',')
        .ok_or_else(|| ApiError::BadRequest("malformed data URI".into()))?;
    base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|err| ApiError::BadRequest(format!("invalid base64 image data: {err}")))
}
