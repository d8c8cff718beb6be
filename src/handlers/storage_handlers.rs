//! HTTP handlers for the storage surface.
//!
//! Thin by design: parse the path, validate conditional headers, call the
//! coordinator, translate the outcome into status + headers. Document
//! bodies stream in both directions. ETag header values are always
//! double-quoted; `If-Match`/`If-None-Match` accept a comma-separated
//! quoted list or the literal `*`.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::Response,
};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::io;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::{
    errors::AppError,
    models::path::StoragePath,
    services::storage::{DocumentGet, FolderGet, RemoteStorage},
};

/// GET `/storage/{*path}`: a document body or a folder listing.
pub async fn get_storage(
    State(storage): State<RemoteStorage>,
    Path(raw): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    fetch_storage(storage, &raw, &headers, true).await
}

/// HEAD `/storage/{*path}`: same headers as GET but no body.
pub async fn head_storage(
    State(storage): State<RemoteStorage>,
    Path(raw): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    fetch_storage(storage, &raw, &headers, false).await
}

async fn fetch_storage(
    storage: RemoteStorage,
    raw: &str,
    headers: &HeaderMap,
    with_body: bool,
) -> Result<Response, AppError> {
    let path = parse_request_path(raw)?;
    let if_none_match = condition(headers, header::IF_NONE_MATCH)?;
    debug!(
        user = %path.user_id(),
        module = ?path.module_name(),
        public = path.is_public(),
        "fetch {}", path
    );

    if path.is_folder() {
        match storage.get_folder(&path, if_none_match.as_deref()).await? {
            FolderGet::NotModified { etag } => Ok(not_modified(&etag)),
            FolderGet::Listing { etag, listing } => {
                let json = serde_json::to_string(&listing)
                    .map_err(|err| AppError::internal(format!("encoding listing: {}", err)))?;
                let body = if with_body {
                    Body::from(json)
                } else {
                    Body::empty()
                };
                let mut response = Response::new(body);
                let resp_headers = response.headers_mut();
                resp_headers.insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/ld+json"),
                );
                resp_headers.insert(header::ETAG, quoted_etag(&etag));
                Ok(response)
            }
        }
    } else {
        match storage
            .get_document(&path, if_none_match.as_deref())
            .await?
        {
            DocumentGet::NotModified { etag } => Ok(not_modified(&etag)),
            DocumentGet::Found {
                etag,
                content_type,
                length,
                updated_at,
                file,
            } => {
                let body = if with_body {
                    Body::from_stream(ReaderStream::new(file))
                } else {
                    Body::empty()
                };
                let mut response = Response::new(body);
                document_headers(
                    response.headers_mut(),
                    &etag,
                    content_type.as_deref(),
                    length,
                    updated_at,
                );
                Ok(response)
            }
        }
    }
}

/// PUT `/storage/{*path}`: store a document, honoring If-Match and
/// If-None-Match. Responds 200 with the new version's ETag.
pub async fn put_storage(
    State(storage): State<RemoteStorage>,
    Path(raw): Path<String>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, AppError> {
    let path = parse_request_path(&raw)?;
    if path.is_folder() {
        return Err(AppError::bad_request("cannot write to a folder path"));
    }
    let if_match = condition(&headers, header::IF_MATCH)?;
    let if_none_match = condition(&headers, header::IF_NONE_MATCH)?;
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    debug!(
        user = %path.user_id(),
        module = ?path.module_name(),
        public = path.is_public(),
        "put {}", path
    );

    let stream = body
        .into_data_stream()
        .map(|chunk| chunk.map_err(|err| io::Error::new(io::ErrorKind::Other, err)));

    let version = storage
        .put_document(
            &path,
            content_type.as_deref(),
            stream,
            if_match.as_deref(),
            if_none_match.as_deref(),
        )
        .await?;

    let mut response = Response::new(Body::empty());
    response
        .headers_mut()
        .insert(header::ETAG, quoted_etag(&version.to_string()));
    Ok(response)
}

/// DELETE `/storage/{*path}`: remove a document. Responds 200 with the
/// ETag the document had before the delete.
pub async fn delete_storage(
    State(storage): State<RemoteStorage>,
    Path(raw): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let path = parse_request_path(&raw)?;
    if path.is_folder() {
        return Err(AppError::bad_request("cannot delete a folder path"));
    }
    let if_match = condition(&headers, header::IF_MATCH)?;

    let version = storage
        .delete_document(&path, if_match.as_deref())
        .await?;

    let mut response = Response::new(Body::empty());
    response
        .headers_mut()
        .insert(header::ETAG, quoted_etag(&version.to_string()));
    Ok(response)
}

/// GET `/usage/{user}`: human-readable total size of a user's tree.
/// Display-only, not part of the protocol surface.
pub async fn get_usage(
    State(storage): State<RemoteStorage>,
    Path(user): Path<String>,
) -> Result<Response, AppError> {
    let root = StoragePath::parse(&format!("/{}/", user))?;
    let human = storage.folder_size_human(&root).await?;

    let mut response = Response::new(Body::from(human));
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    Ok(response)
}

fn parse_request_path(raw: &str) -> Result<StoragePath, AppError> {
    Ok(StoragePath::parse(&format!("/{}", raw))?)
}

/// Pull and validate a conditional header. `None` when absent; 400 when
/// present but malformed.
fn condition(headers: &HeaderMap, name: HeaderName) -> Result<Option<Vec<String>>, AppError> {
    match headers.get(&name) {
        None => Ok(None),
        Some(value) => {
            let raw = value
                .to_str()
                .map_err(|_| AppError::bad_request(format!("{} is not valid ascii", name)))?;
            strip_quotes(raw)
                .map(Some)
                .map_err(AppError::bad_request)
        }
    }
}

/// Parse `"v1","v2"` or `*` into bare version tokens. Each token is
/// trimmed and must start and end with exactly one double quote; anything
/// else rejects the whole header.
fn strip_quotes(input: &str) -> Result<Vec<String>, String> {
    if input.trim() == "*" {
        return Ok(vec!["*".to_string()]);
    }

    let mut tags = Vec::new();
    for token in input.split(',') {
        let token = token.trim();
        let inner = token
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
            .ok_or_else(|| format!("malformed entity tag `{}`", token))?;
        if inner.contains('"') {
            return Err(format!("malformed entity tag `{}`", token));
        }
        tags.push(inner.to_string());
    }
    Ok(tags)
}

fn quoted_etag(etag: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("\"{}\"", etag))
        .unwrap_or_else(|_| HeaderValue::from_static("\"\""))
}

fn not_modified(etag: &str) -> Response {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = StatusCode::NOT_MODIFIED;
    response.headers_mut().insert(header::ETAG, quoted_etag(etag));
    response
}

fn document_headers(
    headers: &mut HeaderMap,
    etag: &str,
    content_type: Option<&str>,
    length: u64,
    updated_at: DateTime<Utc>,
) {
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(content_type.unwrap_or("application/octet-stream"))
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&length.to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("0")),
    );
    headers.insert(header::ETAG, quoted_etag(etag));
    headers.insert(
        header::LAST_MODIFIED,
        HeaderValue::from_str(&updated_at.to_rfc2822())
            .unwrap_or_else(|_| HeaderValue::from_static("")),
    );
}
