//! Hookwire CLI entry point.
//!
//! This binary is the composition root. Responsibilities:
//!
//! 1. **Parse configuration**: build a [`pipeline::DeployConfig`] from flags
//!    and their environment fallbacks, and validate it.
//! 2. **Wire observability**: `tracing-subscriber` with a pretty or JSON layer,
//!    plus an OpenTelemetry OTLP exporter when one is configured.
//! 3. **Construct infrastructure**: the sandbox account (loaded from and saved
//!    back to its state file) and the selected event source, injected into the
//!    [`provisioners::Orchestrator`].
//! 4. **Dispatch** the requested workflow and render its result.

mod output;
mod telemetry;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Args, Parser, Subcommand, ValueEnum};
use pipeline::{
    AccountId, BasePath, DeployConfig, EnvVars, EventKinds, EventSource, FunctionName, GatewayId,
    LayerArn, Region, RoleName, StageName, SubscriptionId,
};
use provisioners::{
    BundleBuilder, DeleteTarget, DeployRequest, Orchestrator, Providers, Skeleton, UpdateRequest,
};
use sandbox::{SandboxCloud, SandboxOptions};
use stripe::{StripeConfig, StripeEventSource};
use tracing::info;

use crate::output::OutputFormat;
use crate::telemetry::LogFormat;

#[derive(Parser)]
#[command(name = "hookwire")]
#[command(about = "Provision webhook pipelines: role, function, gateway and event subscription")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    /// Log line format (logs go to stderr)
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    /// Result format (results go to stdout)
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EventProvider {
    /// The simulated event source inside the sandbox account
    Sandbox,
    /// Stripe webhook endpoints (needs STRIPE_API_KEY)
    Stripe,
}

#[derive(Args)]
struct Settings {
    /// File the simulated account is persisted in between runs
    #[arg(long, global = true, env = "HOOKWIRE_STATE", default_value = ".hookwire/sandbox.json")]
    state: PathBuf,

    /// Where webhook subscriptions are registered
    #[arg(long, global = true, value_enum, env = "HOOKWIRE_EVENT_SOURCE", default_value_t = EventProvider::Sandbox)]
    event_source: EventProvider,

    #[arg(long, global = true, env = "STRIPE_API_KEY", hide_env_values = true)]
    stripe_api_key: Option<String>,

    #[arg(long, global = true, env = "STRIPE_API_BASE", default_value = stripe::DEFAULT_BASE_URL)]
    stripe_api_base: String,

    /// Execution role, reused if it exists
    #[arg(long, global = true, env = "HOOKWIRE_ROLE_NAME", default_value = "hookwire-function-role")]
    role_name: String,

    /// Layers attached to every function, comma separated
    #[arg(long, global = true, env = "HOOKWIRE_LAYERS", value_delimiter = ',')]
    layers: Vec<String>,

    #[arg(long, global = true, env = "HOOKWIRE_ACCOUNT_ID", default_value = "000000000000")]
    account_id: String,

    #[arg(long, global = true, env = "HOOKWIRE_REGION", default_value = "us-east-1")]
    region: String,

    /// Path segment the gateway route is mounted at
    #[arg(long, global = true, default_value = "webhook")]
    base_path: String,

    #[arg(long, global = true, default_value = "prod")]
    stage: String,

    /// Seconds to wait after creating a role before using it
    #[arg(long, global = true, env = "HOOKWIRE_SETTLE_DELAY_SECS", default_value_t = 5)]
    settle_delay_secs: u64,

    /// Directory replacing the built-in runtime skeleton
    #[arg(long, global = true, env = "HOOKWIRE_SKELETON")]
    skeleton: Option<PathBuf>,

    /// Directory to stage package builds in (defaults to the system temp dir)
    #[arg(long, global = true, env = "HOOKWIRE_STAGING_DIR")]
    staging_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Deploy a handler as a new webhook pipeline
    Deploy {
        /// Handler source file
        #[arg(short, long)]
        file: PathBuf,

        /// Function name (defaults to the handler's file stem)
        #[arg(short, long)]
        name: Option<String>,

        /// Event type to subscribe to; repeat for several, `*` for all
        #[arg(short, long = "event")]
        events: Vec<String>,
    },

    /// List every resource this tool owns
    List,

    /// Delete resources, by id or all at once
    #[command(group(
        ArgGroup::new("target")
            .required(true)
            .multiple(true)
            .args(["all", "function", "gateway", "subscription"])
    ))]
    Delete {
        /// Delete every owned function, gateway and subscription
        #[arg(long, conflicts_with_all = ["function", "gateway", "subscription"])]
        all: bool,

        #[arg(long)]
        function: Option<String>,

        #[arg(long)]
        gateway: Option<String>,

        #[arg(long)]
        subscription: Option<String>,
    },

    /// Replace the code (and optionally environment) of a deployed function
    Update {
        #[arg(short, long)]
        name: String,

        /// Handler source file
        #[arg(short, long)]
        file: PathBuf,

        /// Environment variable to set; repeat for several
        #[arg(short, long = "env", value_parser = parse_key_value)]
        env: Vec<(String, String)>,
    },
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_owned(), value.to_owned())),
        _ => Err(format!("expected KEY=VALUE, got {raw:?}")),
    }
}

fn function_name(name: Option<&str>, handler: &Path) -> Result<FunctionName> {
    let name = match name {
        Some(name) => name.to_owned(),
        None => handler
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_owned)
            .with_context(|| format!("cannot derive a function name from {}", handler.display()))?,
    };
    FunctionName::new(name).context("function name must not be empty")
}

fn required<T>(value: Option<T>, what: &str) -> Result<T> {
    value.with_context(|| format!("{what} must not be empty"))
}

/// Rejects empty ids instead of silently dropping them from the target.
fn delete_target(
    all: bool,
    function: Option<String>,
    gateway: Option<String>,
    subscription: Option<String>,
) -> Result<DeleteTarget> {
    if all {
        return Ok(DeleteTarget::All);
    }
    Ok(DeleteTarget::Targeted {
        function: function
            .map(|v| required(FunctionName::new(v), "--function"))
            .transpose()?,
        gateway: gateway
            .map(|v| required(GatewayId::new(v), "--gateway"))
            .transpose()?,
        subscription: subscription
            .map(|v| required(SubscriptionId::new(v), "--subscription"))
            .transpose()?,
    })
}

impl Settings {
    fn deploy_config(&self) -> Result<DeployConfig> {
        let mut config = DeployConfig::new(
            required(AccountId::new(&self.account_id), "account id")?,
            required(Region::new(&self.region), "region")?,
        );
        config.role_name = required(RoleName::new(&self.role_name), "role name")?;
        config.layers = self
            .layers
            .iter()
            .filter_map(|l| LayerArn::new(l.trim()))
            .collect();
        config.base_path = required(BasePath::new(&self.base_path), "base path")?;
        config.stage = required(StageName::new(&self.stage), "stage")?;
        config.settle_delay = Duration::from_secs(self.settle_delay_secs);
        if let Some(key) = &self.stripe_api_key {
            // Read by the runtime skeleton's Stripe client.
            config.environment.insert("API_KEY".to_owned(), key.clone());
        }
        Ok(config)
    }

    fn sandbox_options(&self) -> Result<SandboxOptions> {
        Ok(SandboxOptions {
            account_id: required(AccountId::new(&self.account_id), "account id")?,
            region: required(Region::new(&self.region), "region")?,
            ..SandboxOptions::default()
        })
    }

    fn event_source(&self, cloud: &Arc<SandboxCloud>) -> Result<Arc<dyn EventSource>> {
        let source: Arc<dyn EventSource> = match self.event_source {
            EventProvider::Sandbox => cloud.clone(),
            EventProvider::Stripe => {
                let key = self
                    .stripe_api_key
                    .clone()
                    .context("STRIPE_API_KEY is required for the stripe event source")?;
                let config = StripeConfig::new(key).with_base_url(&self.stripe_api_base);
                Arc::new(StripeEventSource::new(config).context("configuring Stripe client")?)
            }
        };
        Ok(source)
    }

    fn bundler(&self) -> BundleBuilder {
        let bundler = match &self.skeleton {
            Some(dir) => BundleBuilder::new(Skeleton::Directory(dir.clone())),
            None => BundleBuilder::default(),
        };
        match &self.staging_dir {
            Some(dir) => bundler.with_staging_root(dir),
            None => bundler,
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let settings = &cli.settings;
    let config = settings.deploy_config()?;

    let cloud = Arc::new(
        SandboxCloud::load(&settings.state, settings.sandbox_options()?)
            .await
            .with_context(|| format!("loading sandbox state from {}", settings.state.display()))?,
    );
    let providers = Providers::uniform(cloud.clone()).with_events(settings.event_source(&cloud)?);
    let orchestrator = Orchestrator::new(config, providers, settings.bundler())
        .context("invalid deploy configuration")?;

    let outcome = execute(&orchestrator, cli.command, cli.output).await;

    cloud
        .save(&settings.state)
        .await
        .with_context(|| format!("saving sandbox state to {}", settings.state.display()))?;
    outcome
}

async fn execute(orchestrator: &Orchestrator, command: Command, format: OutputFormat) -> Result<()> {
    match command {
        Command::Deploy { file, name, events } => {
            let name = function_name(name.as_deref(), &file)?;
            let events = if events.is_empty() {
                None
            } else {
                Some(EventKinds::parse(events).map_err(anyhow::Error::msg)?)
            };
            let request = DeployRequest {
                name,
                handler: file,
                events,
            };
            match orchestrator.deploy(&request).await {
                Ok(deployment) => {
                    output::deployment(format, &deployment);
                    Ok(())
                }
                Err(e) => {
                    output::deploy_failure(format, &e);
                    Err(e.into())
                }
            }
        }

        Command::List => {
            let inventory = orchestrator.list().await;
            output::inventory(format, &inventory);
            if !inventory.is_complete() {
                bail!("listing was incomplete");
            }
            Ok(())
        }

        Command::Delete {
            all,
            function,
            gateway,
            subscription,
        } => {
            let target = delete_target(all, function, gateway, subscription)?;
            let report = orchestrator.delete(&target).await;
            output::deletion(format, &report);
            if !report.is_success() {
                bail!("{} deletion(s) failed", report.failures.len());
            }
            Ok(())
        }

        Command::Update { name, file, env } => {
            let request = UpdateRequest {
                name: FunctionName::new(name).context("function name must not be empty")?,
                handler: file,
                environment: (!env.is_empty()).then(|| env.into_iter().collect::<EnvVars>()),
            };
            let function = orchestrator.update(&request).await?;
            output::function(format, &function);
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let provider = telemetry::init(cli.log_format);
    info!(version = env!("CARGO_PKG_VERSION"), "hookwire starting");

    let result = run(cli).await;
    telemetry::shutdown(provider);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
