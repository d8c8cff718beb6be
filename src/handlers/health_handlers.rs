//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks ledger connectivity and disk I/O

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;
use tokio::fs;
use uuid::Uuid;

use crate::services::storage::RemoteStorage;

/// `GET /healthz`
///
/// Very small liveness probe — always returns 200 OK with a plain JSON
/// body. This endpoint should be cheap and never perform I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Readiness probe that:
/// 1. Runs a lightweight query against the metadata ledger (`SELECT 1`).
/// 2. Performs a best-effort write/read/delete under the document base dir.
///
/// Returns JSON describing each check. HTTP 200 when all checks pass,
/// HTTP 503 when any check fails.
pub async fn readyz(State(storage): State<RemoteStorage>) -> impl IntoResponse {
    let ledger_check = check_ledger(&storage).await;
    let disk_check = check_disk(&storage).await;

    let overall_ok = ledger_check.ok && disk_check.ok;

    let mut checks = HashMap::new();
    checks.insert("ledger", ledger_check);
    checks.insert("disk", disk_check);

    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

async fn check_ledger(storage: &RemoteStorage) -> CheckStatus {
    match sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(storage.metadata().pool())
        .await
    {
        Ok(1) => CheckStatus {
            ok: true,
            error: None,
        },
        Ok(v) => CheckStatus {
            ok: false,
            error: Some(format!("unexpected result: {}", v)),
        },
        Err(e) => CheckStatus {
            ok: false,
            error: Some(format!("error: {}", e)),
        },
    }
}

async fn check_disk(storage: &RemoteStorage) -> CheckStatus {
    let tmp_path = storage
        .documents()
        .base_path()
        .join(format!(".readyz-{}", Uuid::new_v4()));

    if let Err(e) = fs::write(&tmp_path, b"readyz").await {
        return CheckStatus {
            ok: false,
            error: Some(format!("could not write tmp file: {}", e)),
        };
    }
    let read_back = fs::read(&tmp_path).await;
    let cleanup = fs::remove_file(&tmp_path).await;

    match read_back {
        Ok(bytes) if bytes == b"readyz" => match cleanup {
            Ok(_) => CheckStatus {
                ok: true,
                error: None,
            },
            Err(e) => CheckStatus {
                ok: true,
                error: Some(format!("could not remove tmp file: {}", e)),
            },
        },
        Ok(_) => CheckStatus {
            ok: false,
            error: Some("file content mismatch".to_string()),
        },
        Err(e) => CheckStatus {
            ok: false,
            error: Some(format!("could not read tmp file: {}", e)),
        },
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}
