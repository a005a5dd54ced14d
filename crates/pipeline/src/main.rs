//! AnswerForge Pipeline Driver
//!
//! Usage: `pipeline-driver <config-file>`
//!
//! 1. Loads and validates the configuration
//! 2. Builds the configured pipeline through the registry
//! 3. Trains when a training set is configured
//! 4. Answers the test set and writes results
//! 5. Logs a run summary

use answerforge_common::{metrics, AppConfig, VERSION};
use answerforge_pipeline::{dataset, Orchestrator, PipelineContext, PipelineRegistry};
use futures::StreamExt;
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_new(&config.observability.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: pipeline-driver <config-file>");
        std::process::exit(2);
    }

    // Load configuration
    let config = AppConfig::load(&args[1]).map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;

    init_tracing(&config);
    info!("Starting AnswerForge Pipeline Driver v{}", VERSION);

    if config.observability.metrics_port != 0 {
        PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], config.observability.metrics_port))
            .set_buckets_for_metric(
                Matcher::Full(format!("{}_question_duration_seconds", metrics::METRICS_PREFIX)),
                metrics::QUESTION_BUCKETS,
            )?
            .install()?;
        info!(port = config.observability.metrics_port, "Prometheus exporter listening");
    }
    metrics::register_metrics();

    let started = Instant::now();
    let source = config.data.source.clone();
    let kind = config.pipeline.kind.clone().unwrap_or_default();

    // Build the pipeline
    let context = PipelineContext::new(config)?;
    let stages = PipelineRegistry::with_defaults().build(&kind, &context)?;
    let mut orchestrator = Orchestrator::new(stages);
    orchestrator.initialize(&context.config).await.map_err(|e| {
        error!(error = %e, "Failed to initialize pipeline");
        e
    })?;

    let data = &context.config.data;

    // Training
    if let Some(train_path) = &data.train_path {
        let train_set = dataset::load_question_set(train_path, &source)?;
        let component_set = data
            .validation_path
            .as_ref()
            .map(|path| dataset::load_question_set(path, &source))
            .transpose()?;

        let report = orchestrator
            .train(&train_set, component_set.as_ref())
            .await
            .map_err(|e| {
                error!(error = %e, "Training failed");
                e
            })?;
        info!(
            folds = report.folds,
            questions = report.questions,
            failures = report.failures,
            "Training finished"
        );
    }

    // Apply
    let mut answered = 0usize;
    let mut failures = 0usize;
    match &data.test_path {
        Some(test_path) => {
            let test_set = dataset::load_question_set(test_path, &source)?;
            let mut outcomes = orchestrator.apply(&test_set)?;

            while let Some(outcome) = outcomes.next().await {
                match outcome.result {
                    Ok(answered_question) => {
                        answered += 1;
                        let top = answered_question.top();
                        info!(
                            question_id = %outcome.question_id,
                            answers = answered_question.answers.len(),
                            top_label = top.map(|a| a.label.as_str()).unwrap_or(""),
                            top_confidence = top.and_then(|a| a.confidence).unwrap_or(0.0),
                            "Question answered"
                        );
                    }
                    Err(e) if e.is_fatal() => {
                        error!(question_id = %outcome.question_id, error = %e, "Apply aborted");
                        // Close the results file before bailing out
                        if let Err(finish_error) = orchestrator.finish().await {
                            warn!(error = %finish_error, "Finish after abort failed");
                        }
                        return Err(e.into());
                    }
                    Err(_) => failures += 1,
                }
            }
        }
        None => warn!("No test set configured, nothing to answer"),
    }

    orchestrator.finish().await?;

    info!(
        answered,
        failures,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Run complete"
    );
    Ok(())
}
