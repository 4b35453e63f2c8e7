use std::{fs, path::Path};

use anyhow::{Context, Result};
use clap::Parser;
use jaw_tracking_pipeline::{
    AnalysisSession, JawMotionConfig, JawMotionExport, JawMotionInput, JawMotionProblem,
    run_analysis,
};
use log::info;
use tracing_subscriber::EnvFilter;

/// Jaw motion analysis from recorded marker streams.
#[derive(Debug, Parser)]
#[command(author, version, about = "Jaw tracking calibration and motion analysis")]
struct Args {
    /// Path to JSON file containing JawMotionInput.
    #[arg(long)]
    input: String,

    /// Optional path to JSON JawMotionConfig. Defaults are used if omitted.
    #[arg(long)]
    config: Option<String>,

    /// Write the export here instead of stdout.
    #[arg(long)]
    output: Option<String>,

    /// Also save the full session (state and log) to this path.
    #[arg(long)]
    session: Option<String>,
}

fn load_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let data =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

fn run_from_files(
    input_path: &str,
    config_path: Option<&str>,
) -> Result<(JawMotionExport, AnalysisSession<JawMotionProblem>)> {
    let input: JawMotionInput = load_json_file(Path::new(input_path))?;
    let config = match config_path {
        Some(path) => load_json_file::<JawMotionConfig>(Path::new(path))?,
        None => JawMotionConfig::default(),
    };

    let mut session = AnalysisSession::<JawMotionProblem>::with_description(input_path);
    session.set_input(input)?;
    run_analysis(&mut session, Some(config))?;
    let notes = match config_path {
        Some(path) => format!("cli: {input_path} with {path}"),
        None => format!("cli: {input_path} with default config"),
    };
    let export = session.export_with_notes(notes)?;
    Ok((export, session))
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    if let Err(err) = try_main() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let args = Args::parse();
    let (export, session) = run_from_files(&args.input, args.config.as_deref())?;
    info!(
        "{} samples, registration rmse mandibular {:.4} / maxillary {:.4}",
        export.trajectory.len(),
        export.provenance.mandibular_rmse,
        export.provenance.maxillary_rmse
    );

    let json = serde_json::to_string_pretty(&export)?;
    match &args.output {
        Some(path) => fs::write(path, json).with_context(|| format!("writing {path}"))?,
        None => println!("{json}"),
    }
    if let Some(path) = &args.session {
        fs::write(path, session.to_json()?).with_context(|| format!("writing {path}"))?;
    }
    Ok(())
}
