use std::fmt::Write as _;
use std::path::{Component, Path, PathBuf};
use std::sync::Once;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;
use vmstack_core::stack::{FRAME_LAYOUT, FrameLayout};

mod scenario;

use scenario::Scenario;

static VMSTACK_TRACE_INIT: Once = Once::new();
const TRACE_ENV: &str = "VMSTACK_TRACE";
const DEFAULT_TRACE_FILTER: &str =
    "vmstack::space=debug,vmstack::segment=debug,vmstack::generator=debug,vmstack::scenario=info,vmstack_cli=info";

#[derive(Debug, Parser)]
#[command(
    name = "vmstack",
    author,
    version,
    about = "Inspect the vmstack frame layout and drive stack scenarios",
    long_about = None
)]
struct CliArgs {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LayoutFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the frame layout table JIT code is generated against.
    Layout {
        #[arg(long, value_enum, default_value_t = LayoutFormat::Text)]
        format: LayoutFormat,
    },
    /// Run a TOML scenario and print one report per step.
    Run {
        #[arg(value_name = "SCENARIO", value_parser = parse_scenario_path)]
        file: PathBuf,
        /// Emit reports as JSON lines
        #[arg(long)]
        json: bool,
    },
}

/// Scenario files are TOML and may not climb out of the working tree.
fn scenario_path(raw: &str) -> anyhow::Result<PathBuf> {
    let p = Path::new(raw);
    if p.components().any(|comp| matches!(comp, Component::ParentDir)) {
        bail!("scenario path `{raw}` must not contain `..`");
    }
    if p.extension().and_then(|ext| ext.to_str()) != Some("toml") {
        bail!("scenario path `{raw}` is not a .toml file");
    }
    Ok(p.to_path_buf())
}

fn parse_scenario_path(raw: &str) -> Result<PathBuf, String> {
    scenario_path(raw).map_err(|e| e.to_string())
}

/// How `VMSTACK_TRACE` asks for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
enum TraceSetting {
    Off,
    /// `1`, `true` or `on`: `RUST_LOG` if set, else the stack targets.
    Default,
    Filter(String),
}

impl TraceSetting {
    fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        let is = |word: &str| trimmed.eq_ignore_ascii_case(word);
        if trimmed.is_empty() || is("0") || is("false") || is("off") {
            TraceSetting::Off
        } else if is("1") || is("true") || is("on") {
            TraceSetting::Default
        } else {
            TraceSetting::Filter(trimmed.to_string())
        }
    }

    fn from_env() -> Self {
        std::env::var(TRACE_ENV).map_or(TraceSetting::Off, |raw| Self::parse(&raw))
    }

    /// Filter expression to install; unparsable expressions fall back to the
    /// stack targets.
    fn filter(&self) -> Option<EnvFilter> {
        let expr = match self {
            TraceSetting::Off => return None,
            TraceSetting::Default => std::env::var("RUST_LOG").ok(),
            TraceSetting::Filter(expr) => Some(expr.clone()),
        };
        Some(
            expr.and_then(|expr| EnvFilter::try_new(expr).ok())
                .unwrap_or_else(|| EnvFilter::new(DEFAULT_TRACE_FILTER)),
        )
    }
}

fn maybe_init_tracing(setting: &TraceSetting) {
    let Some(filter) = setting.filter() else {
        return;
    };
    VMSTACK_TRACE_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .try_init();
    });
}

fn render_layout_text(layout: &FrameLayout) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "frame layout v{}: {}-byte words, {} header words",
        layout.version, layout.word_size, layout.header_words
    );
    let _ = writeln!(out, "header:");
    for field in &layout.header {
        let _ = writeln!(out, "  {:<12} +{}", field.name, field.offset);
    }
    let _ = writeln!(out, "flags:");
    for flag in &layout.flags {
        let _ = writeln!(out, "  {:<22} {:#010x}", flag.name, flag.bits);
    }
    let _ = writeln!(
        out,
        "regs: size {}, sp +{}, pc +{}, fp +{}",
        layout.regs.size, layout.regs.sp, layout.regs.pc, layout.regs.fp
    );
    let _ = write!(
        out,
        "script frames: this {}, callee {}",
        layout.script_this, layout.script_callee
    );
    out
}

fn run_scenario(path: &Path, json: bool) -> anyhow::Result<()> {
    let scenario = Scenario::load(path)?;
    let config = scenario.stack_config().context("stack configuration")?;
    let reports = scenario::run(scenario, &config)?;
    for report in &reports {
        if json {
            println!("{}", serde_json::to_string(report)?);
        } else {
            println!("{report}");
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    maybe_init_tracing(&TraceSetting::from_env());

    let CliArgs { command } = CliArgs::parse();
    match command {
        Commands::Layout { format } => {
            let out = match format {
                LayoutFormat::Json => FRAME_LAYOUT.to_json().context("serialize frame layout")?,
                LayoutFormat::Text => render_layout_text(&FRAME_LAYOUT),
            };
            println!("{out}");
        }
        Commands::Run { file, json } => run_scenario(&file, json)?,
    }
    Ok(())
}
