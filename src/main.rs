use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use subdo::cli::Args;
use subdo::engine::{ScanEngine, ScanOptions};
use subdo::output::{OutputManager, OutputSettings};
use subdo::prober::{AvailabilityProbe, CommandProbe};
use subdo::runner::ProcessRunner;
use subdo::tools::INSTALL_HINTS;
use subdo::types::{Config, SubdoError};
use subdo::{config, is_valid_subdomain};
use tokio_util::sync::CancellationToken;

const BANNER: &str = r#"
   _____       __    ____  ____
  / ___/__  __/ /_  / __ \/ __ \
  \__ \/ / / / __ \/ / / / / / /
 ___/ / /_/ / /_/ / /_/ / /_/ /
/____/\__,_/_.___/_____/\____/

   Subdomain Discovery Orchestrator
"#;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);
    dotenv::dotenv().ok();

    if !args.no_banner && args.show_decorations() {
        println!("{}", BANNER);
    }

    let config = match config::from_args(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    if args.list_tools {
        list_tools(&config).await;
        return Ok(());
    }

    let target = args.target.clone().unwrap_or_default().trim().to_lowercase();
    if !is_valid_subdomain(&target) {
        error!("{}", SubdoError::InvalidDomain(target));
        process::exit(1);
    }

    let include_stderr = config::include_stderr(&config, args.silent);
    let options = ScanOptions {
        concurrency: config.threads,
        base_timeout: config.base_timeout,
        allow_list: args.tools.clone(),
    };

    let cancel = CancellationToken::new();
    let abort = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone(), abort.clone());

    let runner = ProcessRunner::new(include_stderr).with_abort(abort);
    let mut engine = ScanEngine::new(config.tools.clone(), options).with_executor(Arc::new(runner));
    if args.show_decorations() {
        engine = engine.with_progress(progress_bar());
    }

    info!("Starting comprehensive reconnaissance for: {}", target);
    let results = match engine.execute(&target, cancel).await {
        Ok(results) => results,
        Err(e @ SubdoError::NoToolsAvailable(_)) => {
            error!("Reconnaissance failed - {}", e);
            print_install_hints(&args);
            process::exit(1);
        }
        Err(e) => return Err(anyhow::anyhow!("Scan failed: {}", e)),
    };

    let manager = OutputManager::new(OutputSettings {
        parent_dir: config.output_dir.clone().unwrap_or_else(|| PathBuf::from(".")),
        silent: args.silent,
        verbose: args.verbose,
    });

    let output_dir = if args.no_save {
        None
    } else {
        Some(manager.save(&results)?)
    };
    manager.print_summary(&results, output_dir.as_deref());

    Ok(())
}

fn init_logging(args: &Args) {
    let level = if args.verbose {
        "debug"
    } else if args.silent {
        "warn"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:30} {pos}/{len} {msg}") {
        pb.set_style(style);
    }
    pb
}

// First Ctrl-C stops new submissions and lets running tools finish;
// a second one kills them so the partial results can be written out
fn spawn_interrupt_handler(cancel: CancellationToken, abort: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        warn!("Interrupt received, waiting for running tools to finish (Ctrl-C again to abort them)");
        cancel.cancel();

        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Second interrupt received, killing running tools");
            abort.cancel();
        }
    });
}

async fn list_tools(config: &Config) {
    let probe = CommandProbe::new();
    let mut by_category: BTreeMap<&str, Vec<String>> = BTreeMap::new();

    for tool in &config.tools {
        let installed = match tool.binary() {
            Some(binary) => probe.is_available(binary).await,
            None => false,
        };
        let marker = if installed { "+" } else { "-" };
        by_category
            .entry(tool.category.as_str())
            .or_default()
            .push(format!("  [{}] {:<12} {}", marker, tool.name, tool.description));
    }

    println!("Registered tools:\n");
    for (category, lines) in by_category {
        println!("{} ({})", category.to_uppercase(), lines.len());
        for line in lines {
            println!("{}", line);
        }
        println!();
    }
    println!("+ = installed, - = not found in PATH");
}

fn print_install_hints(args: &Args) {
    if args.silent {
        return;
    }
    println!("\nInstallation guide:");
    for (platform, commands) in INSTALL_HINTS {
        println!("\n{}:", platform);
        for command in *commands {
            println!("  {}", command);
        }
    }
}
