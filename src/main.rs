// leakroot: root causes for Valgrind-reported memory leaks

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use leakroot::config::AnalysisConfig;
use leakroot::pipeline::LeakAnalyzer;
use leakroot::render::{Renderer, DEFAULT_THEME};
use leakroot::report::{parse_report, runner};

#[derive(Debug, Parser)]
#[command(name = "leakroot", version, about = "Explain why a C program leaks memory")]
struct Cli {
    /// Program to analyse (built with -g)
    executable: PathBuf,

    /// Arguments passed to the program
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,

    /// Analyse an existing Valgrind log instead of running Valgrind
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Never run the debugger
    #[arg(long)]
    static_only: bool,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    /// Directory searched for sources whose recorded path is stale
    #[arg(long, value_name = "DIR")]
    source_root: Option<PathBuf>,

    #[arg(long, value_name = "PATH")]
    gdb: Option<PathBuf>,

    #[arg(long, value_name = "PATH")]
    valgrind: Option<PathBuf>,

    /// Debugger step cap
    #[arg(long, value_name = "N")]
    max_steps: Option<usize>,

    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn config(&self) -> AnalysisConfig {
        let mut config = AnalysisConfig::default();
        config.dynamic_tracing = !self.static_only;
        if let Some(root) = &self.source_root {
            config.source_root = root.clone();
        }
        if let Some(gdb) = &self.gdb {
            config.gdb = gdb.clone();
        }
        if let Some(valgrind) = &self.valgrind {
            config.valgrind = valgrind.clone();
        }
        if let Some(steps) = self.max_steps {
            config.max_trace_steps = steps;
        }
        config
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "leakroot=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<()> {
    let config = cli.config();

    let raw = match &cli.report {
        Some(path) => runner::read_report(path)?,
        None => runner::run_valgrind(&config, &cli.executable, &cli.args)
            .with_context(|| format!("running valgrind on {}", cli.executable.display()))?,
    };
    let report = parse_report(&raw);
    info!(leaks = report.leaks.len(), "report parsed");

    let mut analyzer = LeakAnalyzer::new(config);
    let analyses = analyzer.analyze_report(&report, Some(&cli.executable), &cli.args);

    let mut out = io::stdout().lock();
    if cli.json {
        serde_json::to_writer_pretty(&mut out, &analyses).context("writing JSON output")?;
        writeln!(out)?;
        return Ok(());
    }

    let renderer = Renderer::new(&DEFAULT_THEME, io::stdout().is_terminal());
    renderer.summary(&mut out, &report)?;
    for (i, analysis) in analyses.iter().enumerate() {
        renderer.analysis(&mut out, i + 1, analysis)?;
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
