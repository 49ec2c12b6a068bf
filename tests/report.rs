use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine};
use plotwerk::{
    config::{Config, ProviderKind},
    data::mock_points,
    plot::PlotOptions,
    plugins::plot::{plot_agent, PLOT_FUNCTION_NAME},
    providers::scripted::ScriptedProvider,
    report::TOOL_FAILURE_TEXT,
    ReportGenerator, ReportStatus,
};
use serde_json::json;

fn generator(provider: ScriptedProvider) -> ReportGenerator {
    ReportGenerator::new(
        Arc::new(provider),
        plot_agent("Plotter", "Plot the data.", PlotOptions::default()),
    )
}

#[tokio::test]
async fn offline_pipeline_produces_png_report() {
    let config = Config {
        provider: ProviderKind::Scripted,
        ..Config::default()
    };
    let report = config
        .report_generator()
        .expect("generator")
        .generate()
        .await
        .expect("report");

    assert_eq!(report.status, ReportStatus::Success);
    assert!(report.text.contains("ranging from 10 to 25"));
    assert!(report.text.contains("17.43"));

    let visualization = report.visualization.as_ref().expect("visualization");
    assert_eq!(visualization.encoding, "base64");
    let png = STANDARD.decode(&visualization.data).expect("base64");
    let image = image::load_from_memory(&png).expect("png");
    assert_eq!((image.width(), image.height()), (800, 500));

    let value = serde_json::to_value(&report).expect("json");
    assert_eq!(value["status"], "success");
    assert_eq!(value["visualization"]["mime_type"], "image/png");
}

#[tokio::test]
async fn configured_query_limits_plotted_rows() {
    let config = Config {
        provider: ProviderKind::Scripted,
        query: "SELECT x, y FROM metrics WHERE x <= 3".to_string(),
        ..Config::default()
    };
    let report = config
        .report_generator()
        .expect("generator")
        .generate()
        .await
        .expect("report");

    assert!(report.is_success());
    assert!(report.text.contains("ranging from 10 to 15"));
}

#[tokio::test]
async fn invalid_tool_arguments_give_error_report() {
    let provider = ScriptedProvider::new()
        .with_tool_call(PLOT_FUNCTION_NAME, json!({ "data": "not a list" }))
        .with_text("The plotting tool failed.");

    let report = generator(provider).generate().await.expect("report");
    assert_eq!(report.status, ReportStatus::Error);
    assert_eq!(report.text, TOOL_FAILURE_TEXT);
    assert!(report.visualization.is_none());
}

#[tokio::test]
async fn text_only_reply_gives_error_report() {
    let provider = ScriptedProvider::new().with_text("I would rather describe the data in words.");

    let report = generator(provider).generate().await.expect("report");
    assert_eq!(report.status, ReportStatus::Error);
}

#[tokio::test]
async fn model_can_recover_from_a_failed_call() {
    let provider = ScriptedProvider::new()
        .with_tool_call(PLOT_FUNCTION_NAME, json!({ "data": [] }))
        .with_tool_call(PLOT_FUNCTION_NAME, json!({ "data": mock_points() }));

    let report = generator(provider).generate().await.expect("report");
    assert!(report.is_success());
}
