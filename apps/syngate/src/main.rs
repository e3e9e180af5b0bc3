use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::error;

use syntropy_core::HealthMode;
use syntropy_gateway::{logging, Gateway, GatewaySettings};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeChoice {
    Quick,
    Full,
}

impl From<ModeChoice> for HealthMode {
    fn from(mode: ModeChoice) -> Self {
        match mode {
            ModeChoice::Quick => HealthMode::Quick,
            ModeChoice::Full => HealthMode::Full,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "syngate")]
#[command(version)]
#[command(about = "Unified tool gateway over a pool of MCP backend servers")]
struct Args {
    /// Path to the gateway configuration file
    #[arg(short, long, global = true, default_value = "syntropy.json")]
    config: PathBuf,

    /// Path to the tool policy file (defaults to the user config dir)
    #[arg(long, global = true)]
    policy_file: Option<PathBuf>,

    /// Log gateway internals to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Probe backend servers and print a health report
    ///
    /// Exits 0 when every probed backend is healthy, 1 when the pool
    /// is degraded, 2 when a critical backend has failed.
    Health {
        /// Probe scope: quick covers critical backends, full covers all
        #[arg(long, value_enum, default_value = "quick")]
        mode: ModeChoice,

        /// Override the per-probe budget in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Call a namespaced tool and print its output
    Call {
        /// Namespaced tool name, e.g. mcp__syntropy__serena_find_symbol
        name: String,

        /// Tool arguments as a JSON object
        #[arg(long)]
        args: Option<String>,

        /// Override the call budget in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Enable or disable tools in the persisted policy
    Policy {
        /// Tool name to enable (repeatable)
        #[arg(long = "enable")]
        enable: Vec<String>,

        /// Tool name to disable (repeatable)
        #[arg(long = "disable")]
        disable: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    logging::init(if args.verbose { "debug" } else { "warn" });

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let gateway = Gateway::bootstrap(&args.config, args.policy_file, GatewaySettings::default())
        .await
        .with_context(|| format!("loading configuration from {}", args.config.display()))?;

    let code = match args.command {
        Command::Health { mode, timeout_ms } => {
            let budget = timeout_ms.map(Duration::from_millis);
            let report = gateway.health_check(mode.into(), budget).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            ExitCode::from(report.overall_status.exit_code())
        }
        Command::Call {
            name,
            args: tool_args,
            timeout_ms,
        } => {
            let arguments = tool_args
                .as_deref()
                .map(serde_json::from_str)
                .transpose()
                .context("--args must be a JSON object")?;

            let output = match timeout_ms {
                Some(ms) => {
                    gateway
                        .call_tool_with_timeout(&name, arguments, Duration::from_millis(ms))
                        .await?
                }
                None => gateway.call_tool(&name, arguments).await?,
            };

            println!("{}", serde_json::to_string_pretty(&output.content)?);
            if output.is_error {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            }
        }
        Command::Policy { enable, disable } => {
            if !enable.is_empty() || !disable.is_empty() {
                gateway.set_tool_policy(&enable, &disable).await?;
            }
            println!(
                "{}",
                serde_json::to_string_pretty(&gateway.policy().snapshot())?
            );
            ExitCode::SUCCESS
        }
    };

    gateway.shutdown().await;
    Ok(code)
}
