//! `smartflow run`: assemble a workflow and execute it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{Value, json};

use smartflow_core::llm::box_provider::BoxLlmProvider;
use smartflow_core::memory::box_embedder::BoxEmbedder;
use smartflow_core::retrieval::index::BoxRetrievalIndex;
use smartflow_core::workflow::definition::{
    WorkflowBuilder, load_workflow_file, required_models, sample_workflow, uses_rag,
};
use smartflow_core::workflow::executor::Workflow;
use smartflow_core::workflow::transform::TransformRegistry;
use smartflow_infra::embedding::create_embedder;
use smartflow_infra::llm::create_provider;
use smartflow_infra::retrieval::build_index;
use smartflow_infra::store::AnyStateStore;
use smartflow_types::workflow::{ExecutionResult, WorkflowDefinition};

use crate::state::AppState;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Literal input text, passed to the workflow as `input_data`.
    #[arg(long, conflicts_with = "input_file")]
    pub input_text: Option<String>,

    /// JSON file holding the workflow input.
    #[arg(long)]
    pub input_file: Option<PathBuf>,

    /// Write the result JSON here instead of stdout.
    #[arg(long)]
    pub output_file: Option<PathBuf>,

    /// Workflow definition (YAML, or JSON by extension). Defaults to the
    /// built-in sample workflow.
    #[arg(long)]
    pub workflow: Option<PathBuf>,

    /// Run id for checkpoints and telemetry. Defaults to the definition's
    /// `id`, then a fresh UUID.
    #[arg(long)]
    pub workflow_id: Option<String>,

    /// Retries per step after the first attempt.
    #[arg(long, default_value_t = 1)]
    pub max_retries: u32,

    /// Skip the steps before this one.
    #[arg(long)]
    pub resume_from: Option<String>,
}

/// Handle `smartflow run`.
pub async fn run_workflow(state: &AppState, args: &RunArgs, json: bool, quiet: bool) -> Result<()> {
    let input = read_input(args)?;
    let mut workflow = assemble(state, args).await?;
    let workflow_id = workflow.workflow_id().to_string();

    let spinner = (!quiet && !json).then(|| {
        let spinner = ProgressBar::new_spinner();
        if let Ok(template) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            spinner.set_style(template);
        }
        spinner.set_message(format!("Running workflow {workflow_id}..."));
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        spinner
    });

    let result = workflow
        .execute(input, args.max_retries, args.resume_from.as_deref())
        .await;

    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    let payload = result_payload(&result, json)?;
    let rendered = serde_json::to_string_pretty(&payload)?;
    match &args.output_file {
        Some(path) => tokio::fs::write(path, rendered)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => println!("{rendered}"),
    }

    if !quiet {
        if result.is_success() {
            eprintln!(
                "{} Workflow {} completed successfully!",
                style("✓").green().bold(),
                style(&result.run_id).cyan()
            );
        } else {
            eprintln!(
                "{} Workflow {} failed: {}",
                style("✗").red().bold(),
                style(&result.run_id).cyan(),
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    Ok(())
}

/// Workflow input from `--input-text` or `--input-file`.
fn read_input(args: &RunArgs) -> Result<Value> {
    if let Some(path) = &args.input_file {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read input file {}", path.display()))?;
        return serde_json::from_str(&content)
            .with_context(|| format!("input file {} is not valid JSON", path.display()));
    }
    if let Some(text) = &args.input_text {
        return Ok(json!({ "input_data": text }));
    }
    bail!("either --input-text or --input-file must be provided")
}

/// `--json` emits the full execution result; otherwise just the output.
fn result_payload(result: &ExecutionResult, json: bool) -> Result<Value> {
    if json {
        Ok(serde_json::to_value(result)?)
    } else {
        Ok(result.output.clone())
    }
}

fn load_definition(path: Option<&Path>) -> Result<WorkflowDefinition> {
    match path {
        Some(path) => load_workflow_file(path)
            .with_context(|| format!("failed to load workflow {}", path.display())),
        None => sample_workflow().context("built-in sample workflow is invalid"),
    }
}

/// Build the runnable workflow: providers, steps, and the retrieval index.
pub async fn assemble(state: &AppState, args: &RunArgs) -> Result<Workflow<AnyStateStore>> {
    let def = load_definition(args.workflow.as_deref())?;
    let llm_settings = &state.config.llm;

    let llm = Arc::new(
        create_provider(llm_settings, None, &state.credentials)
            .with_context(|| format!("failed to create {} provider", llm_settings.provider))?,
    );

    let registry = TransformRegistry::with_builtins();
    let mut builder = WorkflowBuilder::new(&registry, Arc::clone(&llm));
    for model in required_models(&def) {
        let provider: BoxLlmProvider = create_provider(llm_settings, Some(&model), &state.credentials)
            .with_context(|| format!("failed to create provider for model {model}"))?;
        builder = builder.with_model(model, Arc::new(provider));
    }

    let needs_embedder = uses_rag(&def)
        || def
            .steps
            .iter()
            .flat_map(|s| &s.substeps)
            .any(|s| s.use_past_outputs);
    let embedder: Option<Arc<BoxEmbedder>> = if needs_embedder {
        let embedder = create_embedder(&state.config.embedding, llm_settings, &state.credentials)
            .with_context(|| {
                format!("failed to create {} embedder", state.config.embedding.provider)
            })?;
        Some(Arc::new(embedder))
    } else {
        None
    };
    if let Some(embedder) = &embedder {
        builder = builder.with_embedder(Arc::clone(embedder));
    }

    let steps = builder.build(&def).context("failed to build workflow steps")?;
    let workflow_id = args
        .workflow_id
        .clone()
        .or_else(|| def.id.clone())
        .unwrap_or_else(|| uuid::Uuid::now_v7().to_string());

    let workflow = Workflow::new(state.store.clone(), workflow_id, steps);

    match embedder {
        Some(embedder) if uses_rag(&def) && !def.documents.is_empty() => {
            let index = build_index(embedder, &def.documents)
                .await
                .context("failed to build retrieval index")?;
            let attached = workflow.attach_index(Arc::new(BoxRetrievalIndex::new(index)));
            tracing::info!(substeps = attached, "attached retrieval index");
        }
        _ if uses_rag(&def) => {
            tracing::warn!("retrieval enabled but the workflow has no documents");
        }
        _ => {}
    }

    tracing::info!(
        workflow_id = workflow.workflow_id(),
        steps = workflow.step_count(),
        "workflow assembled"
    );
    Ok(workflow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use smartflow_core::repository::state::StateStore;
    use smartflow_infra::config::Credentials;
    use smartflow_types::config::{GlobalConfig, StorageKind};
    use smartflow_types::llm::ProviderType;
    use smartflow_types::workflow::RunStatus;

    fn run_args() -> RunArgs {
        RunArgs {
            input_text: Some("hello".to_string()),
            input_file: None,
            output_file: None,
            workflow: None,
            workflow_id: None,
            max_retries: 0,
            resume_from: None,
        }
    }

    async fn mock_state(dir: &Path) -> AppState {
        let mut config = GlobalConfig::default();
        config.llm.provider = ProviderType::Mock;
        config.embedding.provider = ProviderType::Mock;
        config.storage.kind = StorageKind::Json;
        AppState::open(dir.to_path_buf(), config, Credentials::default())
            .await
            .unwrap()
    }

    const UPPER_WORKFLOW: &str = r#"
id: upper-run
steps:
  - id: shout
    substeps:
      - id: upper
        kind: transform
        function: uppercase
        success_criteria:
          keywords: [HELLO]
"#;

    #[test]
    fn test_read_input_text_and_file() {
        let args = run_args();
        assert_eq!(read_input(&args).unwrap(), json!({"input_data": "hello"}));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.json");
        std::fs::write(&path, r#"{"input_data": "from file", "lang": "en"}"#).unwrap();
        let args = RunArgs {
            input_text: None,
            input_file: Some(path),
            ..run_args()
        };
        assert_eq!(read_input(&args).unwrap()["lang"], "en");
    }

    #[test]
    fn test_read_input_missing_or_invalid() {
        let args = RunArgs {
            input_text: None,
            ..run_args()
        };
        assert!(read_input(&args).is_err());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "not json").unwrap();
        let args = RunArgs {
            input_text: None,
            input_file: Some(path),
            ..run_args()
        };
        assert!(read_input(&args).is_err());
    }

    #[tokio::test]
    async fn test_assemble_sample_workflow_offline() {
        let dir = tempfile::tempdir().unwrap();
        let state = mock_state(dir.path()).await;
        let args = RunArgs {
            workflow_id: Some("sample-1".to_string()),
            ..run_args()
        };

        let workflow = assemble(&state, &args).await.unwrap();
        assert_eq!(workflow.workflow_id(), "sample-1");
        assert_eq!(workflow.step_ids(), ["analysis_step"]);
        let analysis = workflow.step("analysis_step").unwrap();
        assert!(analysis.substeps().iter().any(|s| s.has_index()));
    }

    #[tokio::test]
    async fn test_transform_workflow_runs_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let state = mock_state(dir.path()).await;
        let wf_path = dir.path().join("upper.yaml");
        std::fs::write(&wf_path, UPPER_WORKFLOW).unwrap();
        let args = RunArgs {
            workflow: Some(wf_path),
            ..run_args()
        };

        let mut workflow = assemble(&state, &args).await.unwrap();
        assert_eq!(workflow.workflow_id(), "upper-run");

        let result = workflow
            .execute(read_input(&args).unwrap(), args.max_retries, None)
            .await;
        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.completed_steps, ["shout"]);

        let snapshot = state.store.load_state("upper-run").await.unwrap();
        assert_eq!(snapshot["upper"]["result"], "HELLO");
        assert!(!state.store.get_logs("upper-run").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_run_payload_has_error() {
        let dir = tempfile::tempdir().unwrap();
        let state = mock_state(dir.path()).await;
        // The mock echo is not JSON, so the sample sentiment substep fails.
        let mut workflow = assemble(&state, &run_args()).await.unwrap();
        let result = workflow
            .execute(json!({"input_data": "hello"}), 0, None)
            .await;

        assert_eq!(result.status, RunStatus::Failed);
        let payload = result_payload(&result, false).unwrap();
        assert!(payload["error"].as_str().unwrap().contains("analysis_step"));

        let full = result_payload(&result, true).unwrap();
        assert_eq!(full["status"], "failed");
    }

    #[tokio::test]
    async fn test_unknown_workflow_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let state = mock_state(dir.path()).await;
        let args = RunArgs {
            workflow: Some(dir.path().join("missing.yaml")),
            ..run_args()
        };
        assert!(assemble(&state, &args).await.is_err());
    }

    #[tokio::test]
    async fn test_openai_without_key_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = GlobalConfig::default();
        config.storage.kind = StorageKind::Json;
        let state = AppState::open(dir.path().to_path_buf(), config, Credentials::default())
            .await
            .unwrap();
        let err = assemble(&state, &run_args()).await.err().unwrap();
        assert!(format!("{err:#}").contains("authentication failed"));
    }
}
