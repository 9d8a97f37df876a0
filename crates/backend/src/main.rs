mod assets;
mod cache;
mod graphql;
mod hub;
mod service;
mod storage;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_graphql_axum::{GraphQLRequest, GraphQLResponse};
use axum::http::HeaderValue;
use axum::{extract::State, response::Html, routing::get, Router};
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing_subscriber::EnvFilter;

use graphql::Schema;
use service::GraphService;

async fn graphql_handler(State(schema): State<Schema>, req: GraphQLRequest) -> GraphQLResponse {
    schema.execute(req.into_inner()).await.into()
}

async fn graphiql() -> Html<String> {
    Html(
        async_graphql::http::GraphiQLSource::build()
            .endpoint("/graphql")
            .finish(),
    )
}

/// Build a cache-controlled static file router.
///
/// Separated so tests can exercise the caching layer with arbitrary directories.
fn cached_static_router(dir: &Path, cache_header: &'static str) -> Router {
    let layer = SetResponseHeaderLayer::overriding(
        axum::http::header::CACHE_CONTROL,
        HeaderValue::from_static(cache_header),
    );
    Router::new()
        .fallback_service(ServeDir::new(dir))
        .layer(layer)
}

const CACHE_1DAY: &str = "public, max-age=86400, must-revalidate";

/// Build the full application router.
fn build_app(service: Arc<GraphService>, image_dir: &Path) -> Router {
    let schema = graphql::build_schema(Arc::clone(&service));

    let realtime = Router::new()
        .route("/ws", get(hub::ws_handler))
        .with_state(service);

    Router::new()
        .route("/graphql", get(graphiql).post(graphql_handler))
        .with_state(schema)
        .merge(realtime)
        .nest("/static", cached_static_router(image_dir, CACHE_1DAY))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
}

fn open_service(
    assets_dir: &Path,
    db_path: &Path,
    export_dir: &Path,
) -> Result<Arc<GraphService>, String> {
    let loaded_assets = Arc::new(assets::Assets::load(assets_dir)?);
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
    }
    let storage = storage::Storage::open(db_path)?;
    Ok(GraphService::new(
        loaded_assets,
        storage,
        hub::Hub::new(),
        export_dir,
    ))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let assets_dir =
        PathBuf::from(std::env::var("ASSETS_DIR").unwrap_or_else(|_| "assets".to_string()));
    let db_path =
        PathBuf::from(std::env::var("DB_PATH").unwrap_or_else(|_| "data/graph.redb".to_string()));
    let export_dir =
        PathBuf::from(std::env::var("EXPORT_DIR").unwrap_or_else(|_| "data/json".to_string()));

    let service = match open_service(&assets_dir, &db_path, &export_dir) {
        Ok(service) => service,
        Err(e) => {
            tracing::error!(error = %e, "Startup failed");
            std::process::exit(1);
        }
    };
    let app = build_app(service, &assets_dir.join("img"));

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("0.0.0.0:{}", port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "Failed to bind");
            std::process::exit(1);
        }
    };
    tracing::info!(%port, "Server running at http://localhost:{}/graphql (websocket on /ws)", port);

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "Server stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    /// Create a temp dir with a test file and return the dir path.
    fn temp_dir_with_file(file_name: &str, content: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(file_name), content).unwrap();
        dir
    }

    fn test_app() -> (tempfile::TempDir, Router) {
        let (dir, service) = service::tests::test_service();
        let img = dir.path().join("img");
        std::fs::create_dir_all(&img).unwrap();
        std::fs::write(img.join("floor1.png"), b"png").unwrap();
        let app = build_app(service, &img);
        (dir, app)
    }

    #[tokio::test]
    async fn test_static_assets_have_1day_cache() {
        let dir = temp_dir_with_file("floor1.png", "png");
        let app = Router::new().nest("/static", cached_static_router(dir.path(), CACHE_1DAY));

        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/static/floor1.png")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get("cache-control").unwrap(),
            "public, max-age=86400, must-revalidate"
        );
    }

    #[tokio::test]
    async fn test_missing_static_file_returns_404() {
        let (_dir, app) = test_app();

        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/static/floor9.png")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_app_serves_floor_images() {
        let (_dir, app) = test_app();

        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/static/floor1.png")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().get("cache-control").is_some());
    }

    #[tokio::test]
    async fn test_graphql_endpoint_answers_post() {
        let (_dir, app) = test_app();

        let resp = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/graphql")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"query":"{ images { floor } }"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["data"]["images"], serde_json::json!([{"floor": 0}, {"floor": 1}]));
    }

    #[tokio::test]
    async fn test_ws_route_requires_upgrade() {
        let (_dir, app) = test_app();

        let resp = app
            .oneshot(Request::builder().uri("/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn test_open_service_reports_missing_assets() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_service(
            dir.path(),
            &dir.path().join("db/graph.redb"),
            &dir.path().join("json"),
        )
            .err()
            .unwrap();
        assert!(err.contains("floors.json"));
    }
}
