// crates/server/src/openapi.rs
//! OpenAPI document for the §6 HTTP API, served at `/api-docs/openapi.json`
//! with a Swagger UI at `/swagger-ui` behind the `swagger` feature.

use utoipa::OpenApi;

use crate::routes::{health, job, search};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        job::get_job,
        job::stream_job,
        search::search,
        search::category,
        search::similar,
        search::pipeline,
        search::pipeline_brightdata,
        search::pipeline_llm,
        search::by_username,
    ),
    components(schemas(
        health::HealthResponse,
        scoutline_types::JobRecord,
        scoutline_types::JobStatus,
        scoutline_types::ProgressEvent,
        scoutline_types::StageIo,
        scoutline_types::EnqueueResponse,
        scoutline_types::SearchRequest,
        scoutline_types::SearchFilters,
        scoutline_types::SearchMethod,
        scoutline_types::LexicalScope,
        scoutline_types::RerankMode,
        scoutline_types::Range,
        scoutline_types::SimilarRequest,
        scoutline_types::CategoryRequest,
        scoutline_types::PipelineRequest,
        scoutline_types::BrightdataOnlyRequest,
        scoutline_types::LlmOnlyRequest,
        scoutline_types::CanonicalProfile,
        scoutline_types::ProfileRef,
        scoutline_types::Platform,
        search::UsernameResponse,
    )),
    tags((name = "scoutline", description = "Creator-discovery search, pipeline, and job API"))
)]
pub struct ApiDoc;

#[cfg(feature = "swagger")]
pub fn swagger_ui() -> utoipa_swagger_ui::SwaggerUi {
    utoipa_swagger_ui::SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi())
}
