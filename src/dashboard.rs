use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::get,
    Router,
};
use handlebars::Handlebars;
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::{
    config::{Config, ConfigError},
    report::{Report, ReportGenerator},
};

const INDEX_TEMPLATE: &str = include_str!("../templates/index.html");

#[derive(Debug, thiserror::Error)]
pub enum DashboardError {
    #[error("template error: {0}")]
    Template(#[from] handlebars::TemplateError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub struct AppState {
    generator: ReportGenerator,
    templates: Handlebars<'static>,
}

#[derive(Serialize)]
pub struct ApiResponse<T> {
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub success: bool,
}

#[derive(Debug, Serialize)]
struct PageContext {
    agent_status: String,
    agent_text: String,
    image_src: Option<String>,
    generated_at: String,
}

impl From<&Report> for PageContext {
    fn from(report: &Report) -> Self {
        Self {
            agent_status: if report.is_success() { "success" } else { "error" }.to_string(),
            agent_text: report.text.clone(),
            image_src: report.visualization.as_ref().map(|v| v.data_uri()),
            generated_at: report.generated_at.to_rfc3339(),
        }
    }
}

pub fn router(generator: ReportGenerator) -> Result<Router, DashboardError> {
    let mut templates = Handlebars::new();
    templates.register_template_string("index", INDEX_TEMPLATE)?;

    let state = Arc::new(AppState { generator, templates });

    Ok(Router::new()
        .route("/", get(index))
        .route("/api/report", get(api_report))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

pub async fn serve(config: &Config) -> Result<(), DashboardError> {
    let app = router(config.report_generator()?)?;

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    tracing::info!("dashboard listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index(State(state): State<Arc<AppState>>) -> Response {
    let (status, context) = match state.generator.generate().await {
        Ok(report) => (StatusCode::OK, PageContext::from(&report)),
        Err(error) => {
            tracing::error!(%error, "report generation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                PageContext {
                    agent_status: "error".to_string(),
                    agent_text: format!("Report generation failed: {error}"),
                    image_src: None,
                    generated_at: chrono::Utc::now().to_rfc3339(),
                },
            )
        }
    };

    match state.templates.render("index", &context) {
        Ok(page) => (status, Html(page)).into_response(),
        Err(error) => {
            tracing::error!(%error, "failed to render dashboard");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Failed to render page: {error}")).into_response()
        }
    }
}

async fn api_report(State(state): State<Arc<AppState>>) -> Response {
    match state.generator.generate().await {
        Ok(report) => Json(ApiResponse {
            data: report,
            message: None,
            success: true,
        })
        .into_response(),
        Err(error) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse {
                data: (),
                message: Some(error.to_string()),
                success: false,
            }),
        )
            .into_response(),
    }
}

async fn healthz() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{Visualization, TOOL_FAILURE_TEXT};

    #[test]
    fn page_context_from_success() {
        let report = Report::success("looks good", Visualization::png("AAAA"));
        let context = PageContext::from(&report);
        assert_eq!(context.agent_status, "success");
        assert_eq!(context.image_src.as_deref(), Some("data:image/png;base64,AAAA"));
    }

    #[test]
    fn template_renders_placeholder_without_image() {
        let mut templates = Handlebars::new();
        templates
            .register_template_string("index", INDEX_TEMPLATE)
            .expect("template");

        let page = templates
            .render("index", &PageContext::from(&Report::error(TOOL_FAILURE_TEXT)))
            .expect("render");
        assert!(page.contains("status-error"));
        assert!(page.contains("No visualization available."));
        assert!(!page.contains("<img"));
    }

    #[test]
    fn template_escapes_agent_text() {
        let mut templates = Handlebars::new();
        templates
            .register_template_string("index", INDEX_TEMPLATE)
            .expect("template");

        let report = Report::error("<script>alert(1)</script>");
        let page = templates.render("index", &PageContext::from(&report)).expect("render");
        assert!(!page.contains("<script>"));
        assert!(page.contains("&lt;script&gt;"));
    }
}
