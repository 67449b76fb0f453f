//! lockcheck CLI: checks lock-discipline annotations in JSON compilation units.

use clap::{Parser as ClapParser, Subcommand, ValueEnum};
use lockcheck::analysis::error_codes::{all_error_codes, error_doc};
use lockcheck::config::CONFIG_FILE;
use lockcheck::{CheckOptions, CheckReport};
use std::path::{Path, PathBuf};
use tracing::debug;
use tracing_subscriber::EnvFilter;

// ANSI color helpers
fn green(s: &str) -> String {
    format!("\x1b[32m{}\x1b[0m", s)
}
fn red(s: &str) -> String {
    format!("\x1b[31m{}\x1b[0m", s)
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{}\x1b[0m", s)
}
fn gray(s: &str) -> String {
    format!("\x1b[90m{}\x1b[0m", s)
}
fn status_label(label: &str) -> String {
    format!("\x1b[1;32m{:>12}\x1b[0m", label)
}

#[derive(ClapParser)]
#[command(name = "lockcheck", version, about = "Check @GuardedBy lock discipline")]
struct Cli {
    /// More logging (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check one or more JSON compilation units
    Check {
        /// Unit files
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Config file (default: nearest lockcheck.toml)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Ansi)]
        format: OutputFormat,

        /// Worker threads (0 = one per CPU); overrides the config file
        #[arg(short, long)]
        jobs: Option<usize>,
    },
    /// Create a lockcheck.toml in the current directory
    Init {
        /// Print the template instead of writing it
        #[arg(long)]
        stdout: bool,
    },
    /// Explain an error code
    Explain {
        /// Code such as E0700; lists all codes when omitted
        code: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Plain,
    Ansi,
    Json,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "lockcheck=warn",
        1 => "lockcheck=debug",
        _ => "lockcheck=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Check {
            files,
            config,
            format,
            jobs,
        } => cmd_check(&files, config.as_deref(), format, jobs),
        Commands::Init { stdout } => cmd_init(stdout),
        Commands::Explain { code } => cmd_explain(code.as_deref()),
    }
}

fn load_options(config: Option<&Path>, jobs: Option<usize>) -> Result<CheckOptions, lockcheck::ConfigError> {
    let mut options = match config {
        Some(path) => CheckOptions::load_from(path)?,
        None => CheckOptions::load()?,
    };
    if let Some(jobs) = jobs {
        options.jobs = jobs;
    }
    Ok(options)
}

fn cmd_check(files: &[PathBuf], config: Option<&Path>, format: OutputFormat, jobs: Option<usize>) {
    let options = load_options(config, jobs).unwrap_or_else(|e| {
        eprintln!("{} {}", red("error:"), e);
        std::process::exit(2);
    });
    debug!(
        files = files.len(),
        jobs = options.effective_jobs(),
        "loaded check options"
    );

    let mut reports: Vec<CheckReport> = Vec::with_capacity(files.len());
    for file in files {
        debug!(file = %file.display(), "checking unit");
        match lockcheck::check_file(file, &options) {
            Ok(report) => reports.push(report),
            Err(e) => {
                eprintln!("{} {}", red("error:"), e);
                std::process::exit(2);
            }
        }
    }

    match format {
        OutputFormat::Json => match serde_json::to_string_pretty(&reports) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("{} {}", red("error:"), e);
                std::process::exit(2);
            }
        },
        OutputFormat::Plain | OutputFormat::Ansi => {
            for report in &reports {
                print_report(report, format == OutputFormat::Ansi);
            }
        }
    }

    if reports.iter().any(CheckReport::has_errors) {
        std::process::exit(1);
    }
}

fn print_report(report: &CheckReport, color: bool) {
    let name = report.path.as_deref().unwrap_or("<unit>");
    for diag in &report.diagnostics {
        if color {
            eprint!("{}", diag.render_ansi());
        } else {
            eprint!("{}", diag.render_plain());
        }
    }
    let summary = format!(
        "{} members checked, {} exempt, {} guarded accesses",
        report.members_analyzed, report.members_exempt, report.accesses
    );
    match (report.has_errors(), color) {
        (false, true) => println!("{} {} {}", green("✓"), bold(name), gray(&summary)),
        (false, false) => println!("ok {} ({})", name, summary),
        (true, true) => println!("{} {} {} error(s)", red("✗"), bold(name), report.error_count()),
        (true, false) => println!("FAILED {} ({} error(s))", name, report.error_count()),
    }
}

fn cmd_init(stdout: bool) {
    if stdout {
        print!("{}", CheckOptions::default_template());
        return;
    }
    let path = PathBuf::from(CONFIG_FILE);
    if path.exists() {
        eprintln!("{} {} already exists, not overwriting", red("error:"), CONFIG_FILE);
        std::process::exit(1);
    }
    std::fs::write(&path, CheckOptions::default_template()).unwrap_or_else(|e| {
        eprintln!("{} writing {}: {}", red("error:"), CONFIG_FILE, e);
        std::process::exit(1);
    });
    println!("{} {}", status_label("Created"), CONFIG_FILE);
}

fn cmd_explain(code: Option<&str>) {
    match code {
        Some(code) => println!("{}: {}", bold(code), error_doc(code)),
        None => {
            for (code, doc) in all_error_codes() {
                println!("{}: {}\n", bold(code), doc);
            }
        }
    }
}
