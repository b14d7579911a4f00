use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::sync::Arc;

use messenger_shared::errors::{AppError, AppResult, ErrorCode};

use crate::store::Store;
use crate::AppState;

/// Raw bytes of a stored image. Images are kept base64 encoded, exactly as
/// the client sent them.
pub fn load_image<S: Store>(store: &S, id: i64) -> AppResult<Vec<u8>> {
    let image = store
        .read(|repo| repo.find_image(id))?
        .ok_or_else(|| AppError::new(ErrorCode::ImageNotFound, format!("image {id} not found")))?;

    STANDARD.decode(image.data.trim()).map_err(|e| {
        tracing::error!(image_id = id, error = %e, "stored image is not valid base64");
        AppError::Internal(e.into())
    })
}

pub async fn get_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> AppResult<impl IntoResponse> {
    let bytes = load_image(state.store.as_ref(), id)?;
    Ok(([(header::CONTENT_TYPE, "image/png")], bytes))
}
