use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use repo_fanout::config::AppConfig;
use repo_fanout::error::AppError;
use repo_fanout::orchestrator::{run_pipelines, FanoutLimits};
use repo_fanout::pipeline::{Pipeline, PipelineSettings, ScriptMutation};
use repo_fanout::platform::github::GitHubPlatform;
use repo_fanout::scripts::verify_scripts;
use repo_fanout::select::{allowed::read_allowed_repos, resolve_repos};
use repo_fanout::shutdown::cancel_on_shutdown;
use repo_fanout::stats::RunStats;
use repo_fanout::workspace::{git, Git2Transport, WorkspaceManager};

#[derive(Parser)]
#[command(
    name = "repo-fanout",
    version,
    about = "Run scripts against many GitHub repositories and open a pull request for each"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// GitHub organization whose repositories should all be targeted
    #[arg(short = 'o', long)]
    github_org: Option<String>,

    /// File of `org/name` lines; takes precedence over --github-org
    #[arg(short = 'a', long)]
    allowed_repos_filepath: Option<PathBuf>,

    /// Scripts to run, by path or by name under --scripts-dir
    #[arg(short = 's', long, value_delimiter = ',')]
    scripts: Vec<String>,

    /// Directory bare script names are resolved against
    #[arg(long)]
    scripts_dir: Option<PathBuf>,

    #[arg(short = 'b', long)]
    branch_name: Option<String>,

    #[arg(short = 'm', long)]
    commit_message: Option<String>,

    #[arg(short = 't', long)]
    pull_request_title: Option<String>,

    #[arg(short = 'e', long)]
    pull_request_description: Option<String>,

    /// Commit locally but skip pushing and opening pull requests
    #[arg(short = 'd', long)]
    dry_run: bool,

    /// Upper bound on repositories processed at once
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Also write the run report as JSON to this path
    #[arg(long)]
    report_json: Option<PathBuf>,
}

impl Cli {
    fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(dir) = &self.scripts_dir {
            config.run.scripts_dir = dir.clone();
        }
        if let Some(branch) = &self.branch_name {
            config.run.branch_name = branch.clone();
        }
        if let Some(message) = &self.commit_message {
            config.run.commit_message = message.clone();
        }
        if let Some(title) = &self.pull_request_title {
            config.run.pull_request_title = title.clone();
        }
        if let Some(description) = &self.pull_request_description {
            config.run.pull_request_description = description.clone();
        }
        if self.dry_run {
            config.run.dry_run = true;
        }
        if let Some(max) = self.max_concurrent {
            config.run.max_concurrent = max;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);

    if cli.github_org.as_deref().unwrap_or("").is_empty() && cli.allowed_repos_filepath.is_none() {
        return Err(AppError::NoRepoSelector.into());
    }

    let scripts = Arc::new(verify_scripts(&cli.scripts, &config.run.scripts_dir)?);
    let token = config.github_token()?;
    git::configure_network_timeouts(config.run.repo_timeout())?;

    tracing::info!(
        scripts = scripts.len(),
        branch = %config.run.branch_name,
        dry_run = config.run.dry_run,
        "Starting repo-fanout run"
    );

    let platform = Arc::new(GitHubPlatform::new(&config.github, &token)?);
    let stats = Arc::new(RunStats::new());
    stats.set_dry_run(config.run.dry_run);

    let allowed = match &cli.allowed_repos_filepath {
        Some(path) => read_allowed_repos(path)
            .await
            .with_context(|| format!("reading allowed repos from {}", path.display()))?,
        None => Vec::new(),
    };
    stats.set_file_provided_repos(&allowed);

    let repos = resolve_repos(platform.as_ref(), cli.github_org.as_deref(), &allowed, &stats).await?;

    let pipeline = Arc::new(Pipeline::new(
        platform,
        Arc::new(Git2Transport::new(token)),
        Arc::new(ScriptMutation::new(scripts, config.run.script_timeout())),
        WorkspaceManager::new(&config.workspace),
        PipelineSettings::from_config(&config),
        Arc::clone(&stats),
    ));

    let cancel = CancellationToken::new();
    let listener = cancel_on_shutdown(cancel.clone());

    let limits = FanoutLimits {
        max_concurrent: config.run.max_concurrent,
        repo_timeout: config.run.repo_timeout(),
    };
    run_pipelines(pipeline, repos, limits, cancel.clone()).await;

    // Stop the signal listener.
    cancel.cancel();
    let _ = listener.await;

    let report = stats.snapshot();
    println!("{}", report.render());

    if let Some(path) = &cli.report_json {
        tokio::fs::write(path, report.to_json()?)
            .await
            .with_context(|| format!("writing JSON report to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Wrote JSON report");
    }

    Ok(())
}
