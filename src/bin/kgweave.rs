//! kgweave CLI: run and check graph transforms.
//!
//! Usage:
//!   kgweave run --config run.yaml [--report report.json]
//!   kgweave validate --config run.yaml

use clap::{Parser, Subcommand};
use kgweave::{SchemaResolver, TransformConfig, TransformState, Transformer, YamlSchemaResolver};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "kgweave",
    version,
    about = "Knowledge graph exchange engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read the configured sources, merge, validate and write the sinks
    Run {
        /// Path to the YAML run configuration
        #[arg(long)]
        config: PathBuf,
        /// Write the run report as JSON to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Check a run configuration and its schema without reading any data
    Validate {
        /// Path to the YAML run configuration
        #[arg(long)]
        config: PathBuf,
    },
}

fn load_config(path: &Path) -> Result<TransformConfig, i32> {
    TransformConfig::from_yaml_file(path).map_err(|e| {
        eprintln!("Error: {}", e);
        2
    })
}

fn cmd_validate(config_path: &Path) -> i32 {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(code) => return code,
    };
    if let Some(schema) = &config.schema {
        match YamlSchemaResolver::new(schema).resolve() {
            Ok(resolved) => println!(
                "Schema: {} categories, {} predicates",
                resolved.category_count(),
                resolved.predicate_count()
            ),
            Err(e) => {
                eprintln!("Error: {}", e);
                return 2;
            }
        }
    }
    println!("Sources:");
    for source in &config.sources {
        println!("  {}", source.label());
    }
    println!("Sinks:");
    for sink in &config.sinks {
        println!("  {} ({:?})", sink.resource.label(), sink.mode);
    }
    println!("Configuration OK");
    0
}

fn cmd_run(config_path: &Path, report_path: Option<&Path>) -> i32 {
    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(code) => return code,
    };
    let mut transformer = match Transformer::from_config(&config) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 2;
        }
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to create tokio runtime: {}", e);
            return 1;
        }
    };

    let report = rt.block_on(async {
        let cancel = transformer.cancellation_token();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling");
                cancel.cancel();
            }
        });
        transformer.run().await
    });
    let report = match report {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    if let Some(path) = report_path {
        let written = report
            .to_json()
            .map_err(|e| e.to_string())
            .and_then(|json| std::fs::write(path, json).map_err(|e| e.to_string()));
        if let Err(e) = written {
            eprintln!("Error: cannot write report to {}: {}", path.display(), e);
            return 1;
        }
    }

    let summary = &report.summary;
    println!(
        "{}: {} nodes, {} edges, {} dangling, {} conflicts, {} issues",
        report.state,
        summary.node_count,
        summary.edge_count,
        summary.dangling_edges,
        summary.merge_conflicts,
        report.issues.issues.len()
    );
    for failure in &report.failures {
        eprintln!("  {:?} {}: {}", failure.role, failure.adapter, failure.message);
    }
    match report.state {
        TransformState::Done => 0,
        TransformState::Cancelled => 130,
        _ => {
            if let Some(error) = &report.error {
                eprintln!("Error: {}", error);
            }
            1
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let code = match cli.command {
        Commands::Run { config, report } => cmd_run(&config, report.as_deref()),
        Commands::Validate { config } => cmd_validate(&config),
    };
    std::process::exit(code);
}
