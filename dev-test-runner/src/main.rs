//! Replays `samples/*.json` against the library.
//!
//! Each sample is a bundle plus `steps` and the expected final `{view, model}`:
//!
//! ```json
//! { "model": {...}, "view": {...}, "data": {...},
//!   "steps": [{"patch": {...}}, {"fire": "button.onClick"}, {"reject": {...}}],
//!   "expect": {"view": ..., "model": ...} }
//! ```
//!
//! `cargo run -p dev-test-runner -- [NAME_REGEX]`
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use colored::Colorize;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use json_ui::bundle::{Bundle, Session};
use json_ui::model::Patch;
use json_ui::view::ComponentRegistry;

#[derive(Deserialize)]
struct Sample {
    #[serde(flatten)]
    bundle: Bundle,
    #[serde(default)]
    steps: Vec<Step>,
    expect: Expect,
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum Step {
    Patch(Patch),
    Fire(String),
    /// A patch that must be rejected and leave the model as it was.
    Reject(Patch),
}

#[derive(Deserialize)]
struct Expect {
    view: Option<Value>,
    model: Option<Value>,
}

fn samples_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("samples")
}

fn run_sample(path: &Path) -> Result<()> {
    let source = std::fs::read_to_string(path)?;
    let sample: Sample = json_ui::path_de::from_str_with_path(&source)?;
    let session = Session::start(&sample.bundle, ComponentRegistry::standard())?;
    for (index, step) in sample.steps.iter().enumerate() {
        match step {
            Step::Patch(patch) => {
                session.apply(patch).with_context(|| format!("step {index}"))?;
            }
            Step::Fire(target) => {
                session.fire(target).with_context(|| format!("step {index}"))?;
            }
            Step::Reject(patch) => {
                let before = session.model().snapshot();
                if session.apply(patch).is_ok() {
                    bail!("step {index}: patch {} was accepted", patch.path);
                }
                if session.model().snapshot() != before {
                    bail!("step {index}: rejected patch changed the model");
                }
            }
        }
    }
    let output = session.output();
    for (name, expected) in [("view", &sample.expect.view), ("model", &sample.expect.model)] {
        if let Some(expected) = expected {
            let actual = &output[name];
            if actual != expected {
                bail!(
                    "{name} mismatch\n  expected: {}\n  actual:   {}",
                    serde_json::to_string(expected)?,
                    serde_json::to_string(actual)?
                );
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let filter = match std::env::args().nth(1).map(|p| Regex::new(&p)).transpose() {
        Ok(filter) => filter,
        Err(error) => {
            eprintln!("{} {error}", "invalid filter:".red());
            return ExitCode::FAILURE;
        }
    };
    let mut paths: Vec<PathBuf> = match std::fs::read_dir(samples_dir()) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect(),
        Err(error) => {
            eprintln!("{} {error}", "cannot read samples:".red());
            return ExitCode::FAILURE;
        }
    };
    paths.sort();

    let mut failed = 0;
    for path in &paths {
        let name = path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
        if filter.as_ref().is_some_and(|re| !re.is_match(&name)) {
            continue;
        }
        match run_sample(path) {
            Ok(()) => eprintln!("✅ {name}"),
            Err(error) => {
                failed += 1;
                eprintln!("❌ {}: {error:#}", name.red());
            }
        }
    }
    if failed > 0 { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}
