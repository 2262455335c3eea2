//! File operation handlers. Each one authenticates through
//! [`AuthenticatedNamespace`] and hands the untrusted path to [`FileTree`].
//!
//! [`FileTree`]: stash_fs::FileTree

use axum::Json;
use axum::body::Body;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::response::IntoResponse;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use stash_core::{Entry, StashError};
use stash_fs::content::OCTET_STREAM;
use stash_fs::{NamespaceRoot, UploadBatch};
use tokio_util::io::StreamReader;

use crate::AppState;
use crate::auth::AuthenticatedNamespace;
use crate::error::{ApiError, ApiResult};

/// Multipart field carrying file content.
const FILE_FIELD: &str = "file";

/// `?download=true` (any case) forces an attachment. Any other value, or
/// none, leaves the choice to the content type.
#[derive(Debug, Default, Deserialize)]
pub struct DownloadParams {
    #[serde(default)]
    pub download: Option<String>,
}

impl DownloadParams {
    pub fn forced(&self) -> bool {
        self.download
            .as_deref()
            .is_some_and(|value| value.eq_ignore_ascii_case("true"))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub deleted: String,
    pub success: bool,
}

pub async fn list_root(
    State(state): State<AppState>,
    AuthenticatedNamespace(root): AuthenticatedNamespace,
) -> ApiResult<Json<Vec<Entry>>> {
    Ok(Json(state.tree.list(&root, "").await?))
}

pub async fn list(
    State(state): State<AppState>,
    AuthenticatedNamespace(root): AuthenticatedNamespace,
    Path(path): Path<String>,
) -> ApiResult<Json<Vec<Entry>>> {
    Ok(Json(state.tree.list(&root, &path).await?))
}

pub async fn mkdir(
    State(state): State<AppState>,
    AuthenticatedNamespace(root): AuthenticatedNamespace,
    Path(path): Path<String>,
) -> ApiResult<(StatusCode, Json<Entry>)> {
    let entry = state
        .tree
        .mkdir(&root, &path)
        .await
        .map_err(|err| ApiError::from(err).forbidding_invalid_path())?;
    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn upload_root(
    State(state): State<AppState>,
    AuthenticatedNamespace(root): AuthenticatedNamespace,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<Vec<Entry>>> {
    store_parts(&state, &root, "", multipart?).await
}

pub async fn upload(
    State(state): State<AppState>,
    AuthenticatedNamespace(root): AuthenticatedNamespace,
    Path(path): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<Vec<Entry>>> {
    store_parts(&state, &root, &path, multipart?).await
}

/// Streams every `file` part straight to disk. The destination directory is
/// only created once the first file part arrives.
async fn store_parts(
    state: &AppState,
    root: &NamespaceRoot,
    path: &str,
    mut multipart: Multipart,
) -> ApiResult<Json<Vec<Entry>>> {
    let mut batch: Option<UploadBatch> = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_owned();
        if batch.is_none() {
            batch = Some(state.tree.begin_upload(root, path).await?);
        }
        if let Some(batch) = batch.as_mut() {
            let content = StreamReader::new(field.map_err(std::io::Error::other));
            batch.store(&name, content).await?;
        }
    }

    let batch = batch.ok_or_else(|| StashError::InvalidInput("no file provided".into()))?;
    Ok(Json(batch.finish()))
}

pub async fn download(
    State(state): State<AppState>,
    AuthenticatedNamespace(root): AuthenticatedNamespace,
    Path(path): Path<String>,
    params: Result<Query<DownloadParams>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(params) = params?;
    let download = state.tree.download(&root, &path, params.forced()).await?;

    let content_type = HeaderValue::from_str(&download.content_type)
        .unwrap_or(HeaderValue::from_static(OCTET_STREAM));
    let disposition = content_disposition(download.disposition.as_str(), &download.file_name);
    let headers: [(HeaderName, HeaderValue); 6] = [
        (header::CONTENT_TYPE, content_type),
        (header::CONTENT_DISPOSITION, disposition),
        (header::CONTENT_LENGTH, HeaderValue::from(download.len)),
        (
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        ),
        (header::PRAGMA, HeaderValue::from_static("no-cache")),
        (header::EXPIRES, HeaderValue::from_static("0")),
    ];
    Ok((headers, Body::from_stream(download.into_stream())))
}

pub async fn delete_path(
    State(state): State<AppState>,
    AuthenticatedNamespace(root): AuthenticatedNamespace,
    Path(path): Path<String>,
) -> ApiResult<Json<DeleteResponse>> {
    let deleted = state.tree.delete(&root, &path).await?;
    Ok(Json(DeleteResponse {
        deleted,
        success: true,
    }))
}

/// `<kind>; filename="<name>"` with the name reduced to printable ASCII.
fn content_disposition(kind: &str, file_name: &str) -> HeaderValue {
    let safe: String = file_name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();
    HeaderValue::from_str(&format!("{kind}; filename=\"{safe}\""))
        .unwrap_or(HeaderValue::from_static("attachment"))
}
