use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use tracing::{error, warn};

use super::AppState;
use crate::error::{CatalogError, ErrorKind};
use crate::models::{FolderList, FolderPage, PageRequest};

/// JSON body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Raw paging parameters. Kept as strings so malformed values fall back to
/// defaults instead of rejecting the request.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    page: Option<String>,
    #[serde(rename = "pageSize")]
    page_size: Option<String>,
}

pub async fn list_folders(State(state): State<AppState>) -> Result<Json<FolderList>, CatalogError> {
    let folders = state.scanner.list_folders().await?;
    Ok(Json(FolderList { folders }))
}

pub async fn list_images(
    State(state): State<AppState>,
    Path(folder_name): Path<String>,
    Query(query): Query<PageQuery>,
) -> Result<Json<FolderPage>, CatalogError> {
    let request = PageRequest::from_query(
        query.page.as_deref(),
        query.page_size.as_deref(),
        state.default_page_size,
    );
    let page = state.scanner.list_images(&folder_name, request).await?;
    Ok(Json(page))
}

pub async fn get_image(
    State(state): State<AppState>,
    Path((folder_name, image_name)): Path<(String, String)>,
) -> Result<Response, CatalogError> {
    let image = state.scanner.open_image(&folder_name, &image_name).await?;
    let body = Body::from_stream(ReaderStream::new(image.file));
    Ok((
        [
            (CONTENT_TYPE, image.content_type.to_string()),
            (CONTENT_LENGTH, image.len.to_string()),
        ],
        body,
    )
        .into_response())
}

impl IntoResponse for CatalogError {
    fn into_response(self) -> Response {
        let status = match self.kind() {
            ErrorKind::NotFound => {
                warn!(error = %self, "Catalog lookup failed");
                StatusCode::NOT_FOUND
            }
            _ => {
                error!(error = ?self, "Catalog operation failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(ErrorBody::new(self.public_message()))).into_response()
    }
}
