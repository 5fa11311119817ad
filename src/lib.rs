pub mod api;
pub mod config;
pub mod infrastructure;
pub mod services;
pub mod utils;

use crate::config::PipelineConfig;
use crate::services::orchestrator::Orchestrator;
use axum::{
    Router,
    middleware::from_fn,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::health::health_check,
        api::handlers::cutout::cutout,
        api::handlers::upload::upload_url_to_s3,
        api::handlers::jobs::submit_job,
        api::handlers::jobs::get_job_status,
    ),
    components(
        schemas(
            api::handlers::health::HealthResponse,
            api::handlers::cutout::CutoutRequest,
            api::handlers::jobs::SubmitJobRequest,
            api::handlers::jobs::JobStatusResponse,
            services::jobs::CutoutOptions,
            services::jobs::JobHandle,
            services::uploader::UploadRequest,
            services::uploader::UploadResult,
            services::orchestrator::FinalResult,
        )
    ),
    tags(
        (name = "system", description = "Service health"),
        (name = "jobs", description = "Background removal jobs"),
        (name = "storage", description = "Streaming URL to S3 uploads")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub config: PipelineConfig,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route("/cutout", post(api::handlers::cutout::cutout))
        .route(
            "/upload-url-to-s3",
            post(api::handlers::upload::upload_url_to_s3),
        )
        .route("/jobs", post(api::handlers::jobs::submit_job))
        .route("/jobs/:job_id", get(api::handlers::jobs::get_job_status))
        .layer(from_fn(
            api::middleware::request_id::request_id_middleware,
        ))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
                .expose_headers(Any),
        )
        .with_state(state)
}
