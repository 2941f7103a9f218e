use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::Parser;
use serde_json::json;
use tracing::{info, warn};

use projectsmith::observability::{init_tracing, LogFormat};
use projectsmith::prelude::*;

#[derive(Debug, Parser)]
#[command(
    name = "projectsmith",
    about = "Generate a multi-file project from a free-text objective"
)]
pub struct Cli {
    /// What to build.
    #[arg(value_name = "OBJECTIVE", required = true)]
    objective: Vec<String>,
    /// Augment prompts with web-search results (needs TAVILY_API_KEY).
    #[arg(long)]
    search: bool,
    /// File whose content is attached to the objective.
    #[arg(long, value_name = "FILE")]
    attach: Option<PathBuf>,
    /// TOML configuration file.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Where run directories are created.
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,
    /// Upper bound on decomposed sub-tasks.
    #[arg(long)]
    max_tasks: Option<usize>,
    /// Emit console logs as JSON.
    #[arg(long)]
    json_logs: bool,
    /// Log at debug level unless RUST_LOG is set.
    #[arg(long, short)]
    verbose: bool,
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        dotenv::dotenv().ok();
        let format = if self.json_logs {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        };
        init_tracing(format, if self.verbose { "debug" } else { "info" });

        let mut config = PipelineConfig::load(self.config.as_deref())
            .context("failed to load configuration")?;
        if let Some(dir) = self.output_dir {
            config = config.with_output_dir(dir);
        }
        if let Some(max_tasks) = self.max_tasks {
            config = config.with_max_tasks(max_tasks);
        }

        let mut objective = Objective::new(self.objective.join(" ")).with_search(self.search);
        if let Some(path) = &self.attach {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read attachment {}", path.display()))?;
            objective = objective.with_attachment(content);
        }

        let search: Option<Arc<dyn SearchClient>> = if self.search {
            match TavilySearchClient::from_env(config.search.clone()) {
                Ok(client) => Some(Arc::new(client)),
                Err(e) => {
                    warn!(error = %e, "Web search disabled");
                    None
                }
            }
        } else {
            None
        };

        let llm = OpenAiClient::from_env().context("failed to configure the model client")?;
        let pipeline = Pipeline::builder(Arc::new(llm))
            .with_search(search)
            .with_config(config)
            .build()
            .context("invalid configuration")?;

        info!(objective = %objective.text, "Starting run");
        match pipeline.run(objective).await {
            Ok(result) => {
                println!("{}", serde_json::to_string_pretty(&result)?);
                Ok(())
            }
            Err(failure) => {
                let mut body = failure.error.to_dict();
                body.insert("state".to_string(), json!(failure.state));
                println!("{}", serde_json::to_string_pretty(&body)?);
                bail!(failure)
            }
        }
    }
}
