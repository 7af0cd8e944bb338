//! Lattice - CI build matrix and lifecycle CLI
//!
//! ## Commands
//!
//! - `expand`: show the child builds a build config expands into
//! - `ingest`: create a build from a push payload and drive it through its
//!   lifecycle, printing every notification and the final projection
//!
//! Builds live in an in-memory store for the duration of one invocation.

mod telemetry;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use lattice_core::{
    BuildService, DispatchOutcome, LatticeConfig, LogPublisher, MemoryPublisher, Published,
    Publisher, WebhookPublisher,
};
use lattice_domain::{child_number, AxisVocabulary, MatrixAxes, View};
use lattice_state::{BuildConfig, MemoryStore};
use serde::Serialize;
use serde_json::Value;
use tracing::info;

#[derive(Parser)]
#[command(name = "lattice")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "CI build matrix expansion and lifecycle sync", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Settings file
    #[arg(long, global = true, default_value = "lattice.toml", env = "LATTICE_SETTINGS")]
    settings: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the child builds a config expands into
    Expand {
        /// Build config (JSON object)
        #[arg(short, long)]
        config: PathBuf,

        /// Parent build number used for child numbering
        #[arg(short, long, default_value = "1")]
        number: String,
    },

    /// Create a build from a push payload and run it through its lifecycle
    Ingest {
        /// Push payload (JSON)
        #[arg(short, long)]
        payload: PathBuf,

        /// Build config (JSON object) applied after creation
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Mark the build started
        #[arg(long)]
        start: bool,

        /// Append a log chunk (repeatable)
        #[arg(long = "log")]
        logs: Vec<String>,

        /// Finish the build with this status code
        #[arg(long, allow_negative_numbers = true)]
        finish: Option<i32>,

        /// Write notifications to the log instead of publishing them
        #[arg(long)]
        log_only: bool,
    },
}

#[derive(Debug, Serialize)]
struct ExpandedChild {
    number: String,
    config: Value,
}

#[derive(Debug, Serialize)]
struct ExpandReport {
    is_matrix: bool,
    width: usize,
    axes: Vec<String>,
    children: Vec<ExpandedChild>,
}

#[derive(Debug, Serialize)]
struct StepReport {
    step: String,
    notification: DispatchOutcome,
    summary_synced: bool,
}

#[derive(Debug, Serialize)]
struct IngestReport {
    steps: Vec<StepReport>,
    /// Empty when notifications went to a webhook or the log
    published: Vec<Published>,
    build: Value,
}

/// What `ingest` should do after creating the build.
#[derive(Debug, Default)]
struct Lifecycle {
    config: Option<BuildConfig>,
    start: bool,
    logs: Vec<String>,
    finish: Option<i32>,
}

fn read_config(path: &Path) -> Result<BuildConfig> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read build config: {}", path.display()))?;
    match serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse build config: {}", path.display()))?
    {
        Value::Object(map) => Ok(map),
        _ => bail!("build config must be a JSON object: {}", path.display()),
    }
}

fn cmd_expand(config: &BuildConfig, number: &str, vocabulary: &AxisVocabulary) -> ExpandReport {
    let axes = MatrixAxes::extract(config, vocabulary);
    let children = if axes.is_matrix() {
        axes.rows()
            .iter()
            .enumerate()
            .map(|(ix, row)| ExpandedChild {
                number: child_number(Some(number), ix + 1),
                config: Value::Object(lattice_domain::row_config(row)),
            })
            .collect()
    } else {
        Vec::new()
    };

    ExpandReport {
        is_matrix: axes.is_matrix(),
        width: axes.width(),
        axes: axes.keys().to_vec(),
        children,
    }
}

async fn cmd_ingest(
    settings: &LatticeConfig,
    payload: &str,
    lifecycle: Lifecycle,
    log_only: bool,
) -> Result<IngestReport> {
    let store = Arc::new(MemoryStore::new());
    let memory = Arc::new(MemoryPublisher::new());
    let publisher: Arc<dyn Publisher> = match &settings.notifications.webhook_url {
        _ if log_only => Arc::new(LogPublisher),
        Some(url) => {
            info!(endpoint = %url, "publishing notifications to webhook");
            Arc::new(WebhookPublisher::new(url.clone())?)
        }
        None => memory.clone(),
    };
    let service = BuildService::with_store(store, publisher, settings);

    let mut steps = Vec::new();
    let mut record = |step: &str, outcome: &lattice_core::SaveOutcome| {
        steps.push(StepReport {
            step: step.to_string(),
            notification: outcome.notification.clone(),
            summary_synced: outcome.summary_synced,
        });
    };

    let created = service.create_from_payload(payload).await?;
    let id = created.build.id;
    record("create", &created);
    info!(build_id = %id, number = ?created.build.number, "created build");

    if let Some(config) = lifecycle.config {
        let outcome = service.configure_build(id, config).await?;
        record("configure", &outcome);
    }
    if lifecycle.start {
        let outcome = service.start_build(id, Utc::now()).await?;
        record("start", &outcome);
    }
    for chunk in &lifecycle.logs {
        let msg_id = uuid::Uuid::new_v4().to_string();
        let outcome = service.append_log(id, chunk, &msg_id).await?;
        record("log", &outcome);
    }
    if let Some(status) = lifecycle.finish {
        let outcome = service.finish_build(id, status, Utc::now()).await?;
        record("finish", &outcome);
    }

    Ok(IngestReport {
        steps,
        published: memory.published(),
        build: service.project(id, View::Default).await?,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    telemetry::init(cli.json, cli.verbose);

    let settings = LatticeConfig::load_or_default(&cli.settings)?;

    match cli.command {
        Commands::Expand { config, number } => {
            let config = read_config(&config)?;
            print_json(&cmd_expand(&config, &number, &settings.matrix.axis_keys))
        }
        Commands::Ingest {
            payload,
            config,
            start,
            logs,
            finish,
            log_only,
        } => {
            let raw = std::fs::read_to_string(&payload)
                .with_context(|| format!("Failed to read payload: {}", payload.display()))?;
            let lifecycle = Lifecycle {
                config: config.as_deref().map(read_config).transpose()?,
                start,
                logs,
                finish,
            };
            print_json(&cmd_ingest(&settings, &raw, lifecycle, log_only).await?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PAYLOAD: &str = r#"{
        "repository": { "url": "https://github.com/svenfuchs/minimal" },
        "commits": [{ "id": "62aae5f70ceee39123ef", "message": "the commit message" }]
    }"#;

    fn object(value: Value) -> BuildConfig {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn parses_ingest_flags() {
        let cli = Cli::try_parse_from([
            "lattice", "--json", "ingest", "--payload", "push.json", "--start", "--log", "a",
            "--log", "b", "--finish", "-1",
        ])
        .unwrap();

        assert!(cli.json);
        match cli.command {
            Commands::Ingest {
                start, logs, finish, config, ..
            } => {
                assert!(start);
                assert_eq!(logs, ["a", "b"]);
                assert_eq!(finish, Some(-1));
                assert!(config.is_none());
            }
            _ => panic!("expected ingest"),
        }
    }

    #[test]
    fn parses_log_only() {
        let cli =
            Cli::try_parse_from(["lattice", "ingest", "--payload", "push.json", "--log-only"])
                .unwrap();

        match cli.command {
            Commands::Ingest { log_only, .. } => assert!(log_only),
            _ => panic!("expected ingest"),
        }
    }

    #[test]
    fn expand_requires_config() {
        assert!(Cli::try_parse_from(["lattice", "expand"]).is_err());
    }

    #[test]
    fn expand_numbers_children() {
        let config = object(json!({"rvm": ["1.9.3", "2.0.0"], "env": "FOO=1"}));
        let report = cmd_expand(&config, "4", &AxisVocabulary::default());

        assert!(report.is_matrix);
        assert_eq!(report.width, 2);
        assert_eq!(report.axes, ["rvm", "env"]);
        assert_eq!(report.children[1].number, "4.2");
        assert_eq!(
            report.children[1].config,
            json!({"rvm": "2.0.0", "env": "FOO=1"})
        );
    }

    #[test]
    fn expand_of_plain_config_is_empty() {
        let report = cmd_expand(&object(json!({"script": "rake"})), "1", &AxisVocabulary::default());

        assert!(!report.is_matrix);
        assert!(report.children.is_empty());
    }

    #[test]
    fn read_config_rejects_arrays() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "[1, 2]").unwrap();

        assert!(read_config(&path).is_err());
    }

    #[tokio::test]
    async fn ingest_runs_full_lifecycle() {
        let lifecycle = Lifecycle {
            config: Some(object(json!({"rvm": ["1.9.3", "2.0.0"]}))),
            start: true,
            logs: vec!["$ rake\n".into()],
            finish: Some(0),
        };

        let report = cmd_ingest(&LatticeConfig::default(), PAYLOAD, lifecycle, false)
            .await
            .unwrap();

        let steps: Vec<_> = report.steps.iter().map(|s| s.step.as_str()).collect();
        assert_eq!(steps, ["create", "configure", "start", "log", "finish"]);
        let events: Vec<_> = report.published.iter().map(|p| p.event.as_str()).collect();
        assert_eq!(events, ["build:started", "build:log", "build:finished"]);
        assert_eq!(report.build["status"], json!(0));
        assert_eq!(report.build["log"], json!("$ rake\n"));
        assert_eq!(report.build["matrix"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn log_only_ingest_delivers_without_recording() {
        let mut settings = LatticeConfig::default();
        settings.notifications.webhook_url = Some("http://127.0.0.1:1/hooks".into());
        let lifecycle = Lifecycle {
            start: true,
            finish: Some(1),
            ..Default::default()
        };

        let report = cmd_ingest(&settings, PAYLOAD, lifecycle, true).await.unwrap();

        assert!(report.published.is_empty());
        let finish = report.steps.last().unwrap();
        assert_eq!(finish.step, "finish");
        assert_eq!(
            finish.notification,
            DispatchOutcome::Delivered {
                event: "build:finished".into(),
                attempts: 1
            }
        );
        assert_eq!(report.build["status"], json!(1));
    }
}
