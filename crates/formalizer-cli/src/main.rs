//! CLI binary for formalizing edit-check rules and managing clarifications.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};

use formalizer_causal::{CausalGraphEngine, EdgeMetadata};
use formalizer_llm::{ReasoningBackend, ReasoningConfig, UsageTracker};
use formalizer_pipeline::extraction::extract_candidate_edges;
use formalizer_pipeline::validation::{self, validate_rule};
use formalizer_pipeline::{
    collect_feedback, ConsoleReviewer, FeedbackStore, FormalizationPipeline, JsonRuleFile,
    JsonSpecificationFile, PipelineConfig, RuleSource, RunStatus, SpecificationSource,
};
use formalizer_types::Rule;

#[derive(Parser)]
#[command(name = "edc-formalize", version, about = "Formalize clinical edit-check rules")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the formalization pipeline over a rule file
    Run {
        /// JSON array of rule records
        #[arg(long)]
        rules: PathBuf,

        /// Study specification (rows or structured forms)
        #[arg(long)]
        spec: PathBuf,

        /// Pipeline configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Feedback store; loaded before the run and saved after it
        #[arg(short, long)]
        feedback: Option<PathBuf>,

        /// Reasoning provider (openai, anthropic, local, none). Overrides the config file.
        #[arg(long)]
        provider: Option<String>,

        /// Model name passed to the reasoning provider
        #[arg(long)]
        model: Option<String>,

        /// Write the run state here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Check rules against the study specification without formalizing
    Validate {
        #[arg(long)]
        rules: PathBuf,

        #[arg(long)]
        spec: PathBuf,
    },

    /// Record a clarification for one rule
    Feedback {
        /// Feedback store file
        #[arg(long)]
        store: PathBuf,

        #[arg(long)]
        rule: String,

        #[arg(long)]
        text: String,

        #[arg(long, default_value = "cli")]
        author: String,
    },

    /// Answer pending clarification requests interactively
    Review {
        #[arg(long)]
        store: PathBuf,

        #[arg(long, default_value = "cli")]
        author: String,
    },

    /// Show the causal graph implied by a rule file and its confounders
    Graph {
        #[arg(long)]
        rules: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            rules,
            spec,
            config,
            feedback,
            provider,
            model,
            output,
        } => {
            cmd_run(
                &rules,
                &spec,
                config.as_deref(),
                feedback.as_deref(),
                provider.as_deref(),
                model.as_deref(),
                output.as_deref(),
            )
            .await?;
        }
        Commands::Validate { rules, spec } => {
            cmd_validate(&rules, &spec).await?;
        }
        Commands::Feedback {
            store,
            rule,
            text,
            author,
        } => {
            cmd_feedback(&store, &rule, &text, &author).await?;
        }
        Commands::Review { store, author } => {
            cmd_review(&store, &author).await?;
        }
        Commands::Graph { rules } => {
            cmd_graph(&rules).await?;
        }
    }

    Ok(())
}

async fn cmd_run(
    rules: &Path,
    spec: &Path,
    config: Option<&Path>,
    feedback: Option<&Path>,
    provider: Option<&str>,
    model: Option<&str>,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let mut config = match config {
        Some(path) => PipelineConfig::load(path).await?,
        None => PipelineConfig::default(),
    };
    if let Some(provider) = provider {
        config.reasoning_provider = provider.to_string();
    }
    config.validate()?;

    let mut reasoning = ReasoningConfig::from_env(&config.reasoning_provider)?;
    if let Some(model) = model {
        reasoning = reasoning.with_model(model);
    }
    let usage = UsageTracker::new();
    let backend = ReasoningBackend::from_config(&reasoning)?.with_middleware(usage.clone());
    tracing::debug!(provider = %reasoning.provider, model = ?reasoning.model, "Reasoning backend ready");

    let store = match feedback {
        Some(path) => FeedbackStore::load(path).await?,
        None => FeedbackStore::new(),
    };

    let mut pipeline = FormalizationPipeline::new(
        config,
        JsonRuleFile::new(rules),
        JsonSpecificationFile::new(spec),
        Arc::new(backend),
    )
    .with_feedback_store(Arc::new(store));

    let state = pipeline.run().await;

    if let Some(path) = feedback {
        pipeline.feedback_store().save(path).await?;
        eprintln!("Feedback store: {}", path.display());
    }

    let json = serde_json::to_string_pretty(&state)?;
    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, json)?;
            eprintln!("Run state: {}", path.display());
        }
        None => println!("{json}"),
    }

    let pending = pipeline.feedback_store().pending_requests().await.len();
    eprintln!(
        "Status: {:?} ({} rules, {} errors, {} pending clarifications)",
        state.status,
        state.rules.len(),
        state.errors.len(),
        pending
    );
    if usage.calls() > 0 {
        eprintln!(
            "Reasoning: {} calls, {} input tokens, {} output tokens",
            usage.calls(),
            usage.total_input_tokens(),
            usage.total_output_tokens()
        );
    }

    if state.status == RunStatus::Failed {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_validate(rules: &Path, spec: &Path) -> anyhow::Result<()> {
    let records = JsonRuleFile::new(rules).load_rules().await?;
    let spec = JsonSpecificationFile::new(spec).load_specification().await?;

    let mut has_error = false;
    let mut count = 0;
    for record in records {
        let rule = Rule::from(record);
        for diag in validate_rule(&rule, &spec) {
            count += 1;
            let severity = match diag.severity {
                validation::Severity::Error => {
                    has_error = true;
                    "ERROR"
                }
                validation::Severity::Warning => "WARN",
            };
            println!("[{}] {} {}: {}", severity, diag.rule_id, diag.lint, diag.message);
        }
    }

    if count == 0 {
        println!("All rules match the specification");
    }
    if has_error {
        std::process::exit(1);
    }
    Ok(())
}

async fn cmd_feedback(store_path: &Path, rule: &str, text: &str, author: &str) -> anyhow::Result<()> {
    if text.trim().is_empty() {
        anyhow::bail!("Feedback text must not be empty");
    }
    let store = FeedbackStore::load(store_path).await?;
    let record = store.record_feedback(rule, text.trim(), author).await;
    store.save(store_path).await?;
    println!(
        "Recorded feedback #{} for {} by {}",
        record.sequence, record.rule_id, record.author
    );
    Ok(())
}

async fn cmd_review(store_path: &Path, author: &str) -> anyhow::Result<()> {
    let store = FeedbackStore::load(store_path).await?;
    let pending = store.pending_requests().await.len();
    if pending == 0 {
        println!("No pending clarification requests");
        return Ok(());
    }

    let recorded = collect_feedback(&store, &ConsoleReviewer, author).await?;
    store.save(store_path).await?;
    println!("\nRecorded {} of {} clarifications", recorded.len(), pending);
    Ok(())
}

async fn cmd_graph(rules: &Path) -> anyhow::Result<()> {
    let records = JsonRuleFile::new(rules).load_rules().await?;

    let mut engine = CausalGraphEngine::new();
    for record in records {
        let rule = Rule::from(record);
        for (cause, effect) in extract_candidate_edges(&rule).pairs() {
            let mut metadata = EdgeMetadata::new();
            metadata.insert("rule_id".into(), serde_json::json!(rule.id));
            engine.add_causal_relation(&cause, &effect, Some(metadata));
        }
    }

    println!("Variables: {}", engine.node_count());
    println!("Edges: {}", engine.edge_count());
    for edge in engine.edges() {
        let origin = edge
            .metadata
            .get("rule_id")
            .and_then(|v| v.as_str())
            .unwrap_or("-");
        println!("  {} -> {} ({})", edge.cause, edge.effect, origin);
    }

    let confounders = engine.detect_confounders();
    if confounders.is_empty() {
        println!("No confounders");
    } else {
        println!("\nConfounders:");
        for var in &confounders {
            let parents: Vec<String> = engine.parents(var).into_iter().collect();
            println!("  {} <- {}", var, parents.join(", "));
        }
    }
    Ok(())
}
