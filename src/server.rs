use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::SUPPORTED_API_VERSION;
use crate::routes;
use crate::state::AppState;

pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route(
            "/libraries",
            get(routes::libraries::list_libraries).post(routes::libraries::create_library),
        )
        .route(
            "/libraries/{id}",
            get(routes::libraries::get_library)
                .patch(routes::libraries::update_library)
                .delete(routes::libraries::delete_library),
        )
        .route("/libraries/{id}/index", post(routes::libraries::trigger_index))
        .route(
            "/libraries/{id}/index/status",
            get(routes::libraries::index_status),
        )
        .route(
            "/index/descriptions",
            get(routes::libraries::list_indexer_descriptions),
        )
        .route("/libraries/{id}/search", post(routes::libraries::search))
        .route(
            "/documents",
            post(routes::documents::create_document),
        )
        .route(
            "/documents/{id}",
            get(routes::documents::get_document)
                .patch(routes::documents::update_document)
                .delete(routes::documents::delete_document),
        )
        .route(
            "/documents/library/{id}",
            get(routes::documents::list_documents_by_library),
        )
        .route("/chunks", post(routes::chunks::create_chunk))
        .route("/chunks/batch", post(routes::chunks::create_chunks_batch))
        .route(
            "/chunks/{id}",
            get(routes::chunks::get_chunk)
                .patch(routes::chunks::update_chunk)
                .delete(routes::chunks::delete_chunk),
        )
        .route(
            "/chunks/document/{id}",
            get(routes::chunks::list_chunks_by_document),
        )
        .route_layer(axum::middleware::from_fn(api_version_middleware));

    Router::new()
        .route("/health", get(routes::health::health_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

/// Rejects any `X-API-Version` other than the one this build supports.
/// An absent header is accepted, matching the negotiation rule in the
/// external interface contract.
async fn api_version_middleware(req: Request, next: Next) -> Result<Response, Response> {
    if let Some(version) = req.headers().get("x-api-version") {
        let version = version.to_str().unwrap_or("");
        if version != SUPPORTED_API_VERSION {
            return Err((
                StatusCode::BAD_REQUEST,
                axum::Json(serde_json::json!({
                    "error": format!("unsupported X-API-Version: {version}"),
                    "status": 400,
                })),
            )
                .into_response());
        }
    }
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use tower::ServiceExt;

    fn test_state() -> (AppState, tempfile::TempDir) {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut config = AppConfig::from_env();
        config.data_dir = tmp.path().to_string_lossy().to_string();
        config.cohere_api_key = None;
        (AppState::new(config).unwrap(), tmp)
    }

    #[tokio::test]
    async fn health_check_responds_ok() {
        let (state, _tmp) = test_state();
        let app = create_app(state);
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/health")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unsupported_api_version_is_rejected() {
        let (state, _tmp) = test_state();
        let app = create_app(state);
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri("/api/libraries")
                    .header("x-api-version", "2.0")
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
