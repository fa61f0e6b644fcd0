use crate::error::{ServerError, ServerResult};
use crate::state::ServerState;
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use axum::Json;
use embedding::pad_to_standard;
use index::ImageRecord;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One image to insert into the library
#[derive(Debug, Clone, Deserialize)]
pub struct ImageBody {
    pub image_id: i64,
    pub set_name: String,
    /// Description text, embedded server-side to produce the stored vector
    pub description: String,
    #[serde(default = "default_file_format")]
    pub file_format: String,
}

fn default_file_format() -> String {
    "jpg".to_string()
}

/// Insert request: a single image or a batch of them
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum LibraryInsertRequest {
    One(ImageBody),
    Many(Vec<ImageBody>),
}

/// Response from library insert
#[derive(Debug, Serialize)]
pub struct LibraryInsertResponse {
    pub inserted: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<LibraryInsertError>,
}

#[derive(Debug, Serialize)]
pub struct LibraryInsertError {
    pub image_id: i64,
    pub error: String,
}

/// Insert images into the library.
///
/// Descriptions are embedded with the configured provider and padded to the
/// index width before storage. A failing item is reported per-id; the rest
/// of the batch still goes in.
pub async fn insert_images(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<LibraryInsertRequest>,
) -> ServerResult<impl IntoResponse> {
    let images = match request {
        LibraryInsertRequest::One(image) => vec![image],
        LibraryInsertRequest::Many(images) => images,
    };
    if images.is_empty() {
        return Err(ServerError::BadRequest("no images to insert".to_string()));
    }

    let texts: Vec<String> = images.iter().map(|i| i.description.clone()).collect();
    let (embeddings, _cache_hits) =
        embedding::embed_texts_cached(&state.provider, &state.cache, &texts).await;

    let width = state.matcher.config().standard_width;
    let mut records = Vec::new();
    let mut errors = Vec::new();

    for (image, embedded) in images.into_iter().zip(embeddings) {
        match embedded {
            Ok(e) => {
                let (padded, original_dim) = pad_to_standard(e.vector, width);
                records.push(
                    ImageRecord::new(
                        image.image_id,
                        image.set_name,
                        image.description,
                        padded,
                        original_dim,
                    )
                    .with_model(state.provider.provider_name(), state.provider.model_name())
                    .with_file_format(image.file_format),
                );
            }
            Err(e) => errors.push(LibraryInsertError {
                image_id: image.image_id,
                error: e.to_string(),
            }),
        }
    }

    let inserted = records.len();
    state.index.batch_insert(&records)?;
    metrics::counter!("picweave_library_inserts_total").increment(inserted as u64);

    Ok(Json(LibraryInsertResponse {
        inserted,
        failed: errors.len(),
        errors,
    }))
}

/// Library statistics: total images and per-set counts
pub async fn library_stats(
    State(state): State<Arc<ServerState>>,
) -> ServerResult<impl IntoResponse> {
    let stats = state.index.stats()?;
    Ok(Json(stats))
}

/// Delete one image from the library
pub async fn delete_image(
    State(state): State<Arc<ServerState>>,
    Path(image_id): Path<i64>,
) -> ServerResult<impl IntoResponse> {
    if state.index.get(image_id)?.is_none() {
        return Err(ServerError::NotFound);
    }
    state.index.delete(image_id)?;

    Ok(Json(serde_json::json!({
        "image_id": image_id,
        "status": "deleted",
    })))
}
