//! subint command-line front end
//!
//! Loads method bodies from JSON, resolves the integer type of every
//! integer-family local and reports the result per method.
//!
//! # Usage
//!
//! ```bash
//! # Resolve every method of a program and print the chosen types
//! subint resolve program.json
//!
//! # Machine-readable output, four worker threads
//! subint resolve program.json --format json --jobs 4
//!
//! # Fail instead of retrying when the optimistic pass is rejected
//! subint resolve program.json --no-fallback
//!
//! # Write the typed program back out
//! subint resolve program.json --output typed.json
//!
//! # Show the lattice with its join and meet tables
//! subint lattice
//! ```

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use serde_json::json;
use std::path::{Path, PathBuf};
use subint_core::ir::{MethodBody, Program};
use subint_core::typing::render_tables;
use subint_core::{IntegerTypeResolver, ResolveError, Resolution, ResolverConfig};
use tracing::{debug, info};

#[derive(Parser)]
#[command(
    name = "subint",
    version = env!("CARGO_PKG_VERSION"),
    about = "Integer sub-type resolution for bytecode method bodies",
    long_about = r#"
subint recovers the precise boolean/byte/short/char/int type of local slots
that the bytecode verifier folds into a single integer category.

EXAMPLES:
    subint resolve program.json                  # Resolve and print types
    subint resolve program.json --format json    # JSON report
    subint lattice                               # Show the type lattice
    "#
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (use multiple times for increased verbosity)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve the integer locals of every method in a JSON program
    Resolve(ResolveArgs),

    /// Print the lattice order and its join/meet tables
    Lattice,
}

#[derive(Args)]
struct ResolveArgs {
    /// JSON file holding `{"methods": [...]}`
    input: PathBuf,

    /// Resolver configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Report an optimistic-pass rejection instead of retrying
    #[arg(long)]
    no_fallback: bool,

    /// Log constraint-graph snapshots at trace level
    #[arg(long)]
    dump_graph: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// Worker threads; methods are independent
    #[arg(short, long, default_value_t = 1)]
    jobs: usize,

    /// Write the program with resolved local types to this file
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    match cli.command {
        Commands::Resolve(args) => resolve_command(args),
        Commands::Lattice => {
            print!("{}", render_tables());
            Ok(())
        }
    }
}

fn setup_logging(verbose: u8, quiet: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    let formatter = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .with_level(true);

    tracing_subscriber::registry().with(formatter).with(filter).init();
}

fn load_config(args: &ResolveArgs) -> Result<ResolverConfig> {
    let mut config = match &args.config {
        Some(path) => ResolverConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => ResolverConfig::default(),
    };
    if args.no_fallback {
        config.fallback = false;
    }
    if args.dump_graph {
        config.dump_graph = true;
    }
    Ok(config)
}

fn load_program(path: &Path) -> Result<Program> {
    let content = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
}

fn resolve_command(args: ResolveArgs) -> Result<()> {
    let config = load_config(&args)?;
    let mut program = load_program(&args.input)?;
    info!(
        methods = program.methods.len(),
        jobs = args.jobs,
        "resolving {}",
        args.input.display()
    );

    let results = resolve_all(&mut program.methods, config, args.jobs);
    let failed = results.iter().filter(|r| r.is_err()).count();

    match args.format {
        OutputFormat::Text => print_text(&results),
        OutputFormat::Json => print_json(&program.methods, &results)?,
    }

    if let Some(output) = &args.output {
        let content = serde_json::to_string_pretty(&program)?;
        std::fs::write(output, content).with_context(|| format!("failed to write {}", output.display()))?;
        debug!("wrote {}", output.display());
    }

    if failed > 0 {
        bail!("{failed} of {} methods could not be typed", results.len());
    }
    Ok(())
}

/// Resolve every body, spreading contiguous chunks over `jobs` threads.
/// Results come back in input order.
fn resolve_all(
    methods: &mut [MethodBody],
    config: ResolverConfig,
    jobs: usize,
) -> Vec<Result<Resolution, ResolveError>> {
    let jobs = jobs.clamp(1, methods.len().max(1));
    let chunk = methods.len().div_ceil(jobs).max(1);

    std::thread::scope(|scope| {
        let workers: Vec<_> = methods
            .chunks_mut(chunk)
            .map(|bodies| {
                scope.spawn(move || {
                    // One resolver per worker, so trace output stays per body
                    let mut resolver = IntegerTypeResolver::new(config);
                    bodies
                        .iter_mut()
                        .map(|body| {
                            let _span = tracing::debug_span!("method", name = %body.name).entered();
                            resolver.resolve(body)
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        workers
            .into_iter()
            .flat_map(|worker| worker.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
            .collect()
    })
}

fn print_text(results: &[Result<Resolution, ResolveError>]) {
    for result in results {
        match result {
            Ok(resolution) => println!("{} {resolution}", "ok".green().bold()),
            Err(error) => println!("{} {error}", "failed".red().bold()),
        }
    }
}

fn print_json(methods: &[MethodBody], results: &[Result<Resolution, ResolveError>]) -> Result<()> {
    let report: Vec<serde_json::Value> = methods
        .iter()
        .zip(results)
        .map(|(body, result)| match result {
            Ok(resolution) => json!({
                "method": body.name,
                "status": "ok",
                "resolution": resolution,
            }),
            Err(error) => json!({
                "method": body.name,
                "status": "error",
                "kind": error_kind(error),
                "statement": error.statement(),
                "message": error.to_string(),
            }),
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn error_kind(error: &ResolveError) -> &'static str {
    match error {
        ResolveError::Fatal { .. } => "fatal",
        ResolveError::Malformed { .. } => "malformed",
        ResolveError::Rejected { .. } => "rejected",
    }
}
