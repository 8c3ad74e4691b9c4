use anyhow::Context;
use clap::{Parser, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use mta_rust_aireqs_core::config::DEFAULT_HEADER;
use mta_rust_aireqs_core::{
    format_output, ManifestConfig, OutputFormat, RemoteConfig, RequirementsGenerator, RunReport,
    ScanConfig, SiteConfig, Warning,
};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "aireqs")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Generate requirements.txt for a Python project")]
#[command(long_about = "Scans a project's Python scripts and Jupyter notebooks for imports, \
    drops standard library and first-party modules, and maps every remaining import name to \
    the package that provides it. Installed package metadata is consulted first; names no \
    installed distribution provides are looked up with Gemini. Installed versions are pinned.\n\n\
    Names that could not be resolved are written as-is and listed for you to double-check.")]
pub struct Args {
    /// Project root directory to scan
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Manifest path (defaults to <path>/requirements.txt)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print the manifest to stdout instead of writing it
    #[arg(long)]
    pub dry_run: bool,

    /// Start the manifest with a generated-by comment
    #[arg(long)]
    pub header: bool,

    /// Print a run report in this format
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormatArg>,

    /// Write the run report to a file (JSON unless --format is given)
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Virtualenv whose installed packages are consulted
    #[arg(long, env = "VIRTUAL_ENV")]
    pub venv: Option<PathBuf>,

    /// site-packages directory to consult (repeatable; overrides discovery)
    #[arg(long, action = clap::ArgAction::Append)]
    pub site_packages: Vec<PathBuf>,

    /// Python interpreter used to discover site-packages
    #[arg(long, default_value = "python3")]
    pub python: String,

    /// Gemini model name
    #[arg(long, default_value = mta_rust_aireqs_core::config::DEFAULT_MODEL)]
    pub model: String,

    /// Timeout for each Gemini request, in seconds
    #[arg(long, default_value_t = 20)]
    pub timeout: u64,

    /// Never contact Gemini; unresolved names are written as-is
    #[arg(long)]
    pub no_remote: bool,

    /// Additional ignore patterns (gitignore style)
    #[arg(long, action = clap::ArgAction::Append)]
    pub ignore: Vec<String>,

    /// Ignore file path (defaults to .gitignore)
    #[arg(long)]
    pub ignore_file: Option<PathBuf>,

    /// Include .venv / build directories in the scan
    #[arg(long)]
    pub include_deps: bool,

    /// Skip Jupyter notebooks
    #[arg(long)]
    pub no_notebooks: bool,

    /// Show progress (-v) and debug logging (-vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Parallel threads (0 = auto)
    #[arg(long, default_value_t = 0)]
    pub threads: usize,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum OutputFormatArg {
    Json,
    Yaml,
    Summary,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Json => OutputFormat::Json,
            OutputFormatArg::Yaml => OutputFormat::Yaml,
            OutputFormatArg::Summary => OutputFormat::Summary,
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Warnings for the user, with guesses collected into one block at the end.
/// Recorded warnings are only logged at debug level by the core, so this is
/// where users see them.
fn render_warnings(report: &RunReport) -> String {
    let mut out = String::new();
    for warning in &report.warnings {
        if !matches!(warning, Warning::Unresolved { .. }) {
            out.push_str(&format!("warning: {}\n", warning));
        }
    }

    let guesses = report.guesses();
    if !guesses.is_empty() {
        out.push_str("\nPlease double-check these packages; their names are best guesses:\n");
        for name in guesses {
            out.push_str(&format!("  - {}\n", name));
        }
    }
    out
}

/// Where the run report goes
#[derive(Debug, PartialEq, Eq)]
enum ReportTarget {
    None,
    File(PathBuf),
    Stdout,
    /// stdout already carries the manifest on a dry run
    Stderr,
}

fn report_target(
    report: Option<PathBuf>,
    format: Option<OutputFormatArg>,
    dry_run: bool,
) -> ReportTarget {
    match (report, format) {
        (Some(path), _) => ReportTarget::File(path),
        (None, Some(_)) if dry_run => ReportTarget::Stderr,
        (None, Some(_)) => ReportTarget::Stdout,
        (None, None) => ReportTarget::None,
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    // Build config
    let mut scan = ScanConfig::new(args.path.clone())
        .with_ignore_patterns(args.ignore.clone())
        .with_include_deps(args.include_deps)
        .with_include_notebooks(!args.no_notebooks)
        .with_threads(args.threads);

    if let Some(ignore_file) = args.ignore_file {
        scan = scan.with_ignore_file(ignore_file);
    }

    let site = SiteConfig::default()
        .with_site_packages(args.site_packages)
        .with_venv(args.venv)
        .with_python(args.python);

    let remote = RemoteConfig::default()
        .with_enabled(!args.no_remote)
        .with_api_key(args.api_key)
        .with_model(args.model)
        .with_timeout(Duration::from_secs(args.timeout));

    let manifest = ManifestConfig::default()
        .with_output(args.output)
        .with_header(args.header.then(|| DEFAULT_HEADER.to_string()))
        .with_dry_run(args.dry_run);

    // Show progress if verbose
    let spinner = if args.verbose > 0 {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .context("invalid progress template")?,
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message("Scanning project...");
        Some(pb)
    } else {
        None
    };

    let mut generator = RequirementsGenerator::new(scan, site, remote, manifest);
    let result = generator
        .run()
        .with_context(|| format!("failed to generate requirements for {}", args.path.display()));

    let generated = match result {
        Ok(generated) => generated,
        Err(e) => {
            if let Some(ref pb) = spinner {
                pb.abandon_with_message("Failed");
            }
            return Err(e);
        }
    };
    let report = &generated.report;

    if let Some(ref pb) = spinner {
        pb.finish_with_message(format!(
            "Resolved {} packages in {}ms",
            report.manifest.len(),
            report.metadata.duration_ms
        ));
    }

    if args.dry_run {
        print!("{}", generated.rendered);
    } else if let Some(ref path) = report.output {
        eprintln!(
            "Wrote {} requirements to {}",
            report.manifest.len(),
            path.display()
        );
    }

    let format: OutputFormat = args.format.map(Into::into).unwrap_or(OutputFormat::Json);
    match report_target(args.report, args.format, args.dry_run) {
        ReportTarget::None => {}
        ReportTarget::File(path) => {
            let output = format_output(report, format)?;
            fs::write(&path, &output)
                .with_context(|| format!("failed to write report to {}", path.display()))?;
            if args.verbose > 0 {
                eprintln!("Report written to: {}", path.display());
            }
        }
        ReportTarget::Stdout => println!("{}", format_output(report, format)?),
        ReportTarget::Stderr => eprintln!("{}", format_output(report, format)?),
    }

    eprint!("{}", render_warnings(report));

    Ok(())
}
