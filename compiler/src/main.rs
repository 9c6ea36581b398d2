use clap::Parser;
use std::path::PathBuf;

use pkc::pass::{PassId, FINAL_PASS, ALL_PASSES};
use pkc::pipeline::run_pipeline;
use pkc::source::KernelSource;

#[derive(Debug, Clone, clap::ValueEnum)]
enum EmitStage {
    /// Human-readable kernel listing
    Kernel,
    /// Canonical JSON
    Json,
    /// SHA-256 of the canonical JSON
    Fingerprint,
}

#[derive(Parser, Debug)]
#[command(
    name = "pkc",
    version,
    about = "Polyhedral kernel compiler front end — builds and validates loop kernels"
)]
struct Cli {
    /// Input kernel description (.json)
    source: PathBuf,

    /// Output form
    #[arg(long, value_enum, default_value_t = EmitStage::Kernel)]
    emit: EmitStage,

    /// Stop after the named pass (e.g. assemble_kernel)
    #[arg(long)]
    stop_after: Option<String>,

    /// Log every pass with timing
    #[arg(long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();

    let terminal = match cli.stop_after.as_deref() {
        None => FINAL_PASS,
        Some(name) => match PassId::from_name(name) {
            Some(pass) => pass,
            None => {
                let names: Vec<&str> = ALL_PASSES
                    .iter()
                    .map(|&p| pkc::pass::descriptor(p).name)
                    .collect();
                eprintln!("pkc: error: unknown pass '{}'", name);
                eprintln!("pkc: known passes: {}", names.join(", "));
                std::process::exit(2);
            }
        },
    };

    // ── Read and decode source ──
    let text = match std::fs::read_to_string(&cli.source) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("pkc: error: {}: {}", cli.source.display(), e);
            std::process::exit(2);
        }
    };
    let source = match KernelSource::from_json(&text) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("pkc: error: {}: {}", cli.source.display(), e);
            std::process::exit(2);
        }
    };

    // ── Construct ──
    let inputs = source.into_inputs();
    let state = match run_pipeline(&inputs, terminal, |_, _| {}) {
        Ok(state) => state,
        Err(diag) => {
            eprintln!("{}", diag);
            std::process::exit(1);
        }
    };
    let Some(kernel) = state.kernel else {
        eprintln!("pkc: error: nothing to emit before assemble_kernel");
        std::process::exit(2);
    };

    // ── Emit ──
    let rendered = match cli.emit {
        EmitStage::Kernel => Ok(kernel.to_string()),
        EmitStage::Json => serde_json::to_string_pretty(&kernel).map(|s| s + "\n"),
        EmitStage::Fingerprint => kernel.fingerprint().map(|s| s + "\n"),
    };
    match rendered {
        Ok(out) => print!("{}", out),
        Err(e) => {
            eprintln!("pkc: error: cannot serialize kernel: {}", e);
            std::process::exit(1);
        }
    }
}
