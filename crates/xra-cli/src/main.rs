use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;
use xra_anchor::FeatureRegistry;
use xra_config::{LoadedConfig, UnusedKeyPolicy, XraConfig};
use xra_testkit::{Orchestrator, OrchestratorConfig, ReplayScript};

#[derive(Parser)]
#[command(name = "xra")]
#[command(about = "XR anchor tracking tools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scripted session against the anchor system
    Replay {
        /// Replay script (.yaml or .json)
        #[arg(long)]
        script: PathBuf,

        /// Layered config paths in merge order
        #[arg(long = "config")]
        config_paths: Vec<String>,

        /// Print one JSON object per notification instead of a summary
        #[arg(long, default_value_t = false)]
        jsonl: bool,

        /// Treat unknown config keys as an error
        #[arg(long, default_value_t = false)]
        strict_config: bool,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> overrides...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// List the registered session features
    Features,
}

/// `RUST_LOG` wins, then the configured filter, then `info`.
fn init_tracing(configured: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(configured.unwrap_or("info")))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(paths: &[String]) -> Result<Option<LoadedConfig>> {
    if paths.is_empty() {
        return Ok(None);
    }
    let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    xra_config::load_layered_yaml(&path_refs).map(Some)
}

fn check_unused_keys(loaded: &LoadedConfig, strict: bool) -> Result<()> {
    let policy = if strict {
        UnusedKeyPolicy::Fail
    } else {
        UnusedKeyPolicy::Warn
    };
    let report = xra_config::report_unused_keys(&loaded.config_json, policy)?;
    for pointer in &report.unused_leaf_pointers {
        warn!(key = %pointer, "config key is not used");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Silent if the file does not exist.
    let _ = dotenvy::from_filename(".env.local");

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Replay {
            script,
            config_paths,
            jsonl,
            strict_config,
        } => {
            let loaded = load_config(&config_paths)?;
            let typed = match &loaded {
                Some(l) => XraConfig::from_json(&l.config_json)?,
                None => XraConfig::default(),
            };
            init_tracing(typed.logging.filter.as_deref());
            if let Some(l) = &loaded {
                check_unused_keys(l, strict_config)?;
            }

            let script = ReplayScript::load(&script)?;
            let mut orch = Orchestrator::from_script(
                OrchestratorConfig::test_defaults(),
                &script,
                loaded.as_ref(),
            )?;
            let report = orch.run_script(&script).await?;

            if jsonl {
                for ev in &report.events {
                    println!("{}", serde_json::to_string(ev).context("serialize event")?);
                }
            } else {
                println!("run_id={}", report.run_id);
                if let Some(hash) = &report.config_hash {
                    println!("config_hash={hash}");
                }
                println!("frames_pumped={}", report.frames_pumped);
                println!("selects_delivered={}", report.selects_delivered);
                println!("creations_requested={}", report.creations_requested);
                println!("events={}", report.events.len());
                for ev in &report.events {
                    let a = ev.event.anchor();
                    println!(
                        "  frame={} ts_us={} {} {} {}",
                        ev.frame,
                        ev.timestamp_us,
                        ev.event.kind(),
                        a.id,
                        a.handle
                    );
                }
                println!("tracked={}", report.tracked.len());
            }
        }

        Commands::ConfigHash { paths } => {
            init_tracing(None);
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = xra_config::load_layered_yaml(&path_refs)?;
            check_unused_keys(&loaded, false)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Features => {
            init_tracing(None);
            let reg = FeatureRegistry::with_builtin();
            for meta in reg.list() {
                println!("{} v{}  {}", meta.name, meta.version, meta.description);
            }
        }
    }

    Ok(())
}
