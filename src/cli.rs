//! Minimal CLI: bundle → (describe | render)
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;

use json_ui::bundle::{Bundle, Session};
use json_ui::model::Patch;
use json_ui::view::ComponentRegistry;

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// render a JSON view over a JSON model schema, or describe the model
#[derive(Parser, Debug)]
#[command(name = "json-ui", version)]
pub struct CommandLineInterface {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// print the structural summary of each bundle's model schema
    Describe(DescribeOut),
    /// mount each bundle's view, apply actions, print `{view, model}`
    Render(RenderOut),
}

#[derive(Args, Debug, Clone)]
struct InputSettings {
    /// JSON Pointer to select the bundle inside each document (e.g. /fixtures/0)
    #[arg(long)]
    json_pointer: Option<String>,

    /// JQ pre-process filter for each document; every output is a bundle.
    #[arg(long)]
    jq_expr: Option<String>,

    /// One or more bundle files. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,
}

#[derive(clap::Parser, Debug)]
struct DescribeOut {
    #[command(flatten)]
    input_settings: InputSettings,

    /// output file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(clap::Parser, Debug)]
struct RenderOut {
    #[command(flatten)]
    input_settings: InputSettings,

    /// patch applied to the root model before rendering, as JSON
    /// (e.g. '{"op":"replace","path":"/count","value":3}'); repeatable
    #[arg(long)]
    patch: Vec<String>,

    /// event handler to invoke, as TAG.PROP (e.g. button.onClick); repeatable,
    /// runs after every --patch
    #[arg(long)]
    fire: Vec<String>,

    /// output .json file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl InputSettings {
    fn load_process(&self, mut apply: impl FnMut(Bundle) -> Result<()>) -> Result<()> {
        let source_paths = resolve_file_path_patterns(&self.input)?;
        for source_path in source_paths {
            let source_path_str = source_path.to_string_lossy().to_string();
            let source = std::fs::read_to_string(&source_path)
                .with_context(|| format!("failed to read source file ({source_path_str})"))?;
            let json_value = serde_json::from_str::<Value>(&source)
                .with_context(|| format!("failed to parse JSON source file ({source_path_str})"))?;
            let json_value = match self.json_pointer.as_deref() {
                None => json_value,
                Some(pointer) => match json_value.pointer(pointer) {
                    Some(selected) => selected.clone(),
                    None => bail!("JSON pointer {pointer} selects nothing in {source_path_str}"),
                },
            };
            let documents = match self.jq_expr.as_ref() {
                None => vec![json_value],
                Some(jq_expr) => json_ui::jq_exec::run_jaq(jq_expr, &json_value).with_context(|| {
                    format!("failed to apply jq expression to source file ({source_path_str})")
                })?,
            };
            for document in documents {
                let bundle = Bundle::from_json(document)
                    .with_context(|| format!("invalid bundle in {source_path_str}"))?;
                apply(bundle).with_context(|| format!("while processing {source_path_str}"))?;
            }
        }
        Ok(())
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }
    pub fn run(&self) -> Result<()> {
        match &self.cmd {
            Command::Describe(target) => {
                let mut lines = Vec::new();
                target.input_settings.load_process(|bundle| {
                    let schema = bundle.schema()?;
                    lines.push(schema.describe(schema.root()));
                    Ok(())
                })?;
                emit(target.out.as_ref(), &lines.join("\n"))
            }
            Command::Render(target) => {
                let patches = target
                    .patch
                    .iter()
                    .map(|src| json_ui::path_de::from_str_with_path::<Patch>(src))
                    .collect::<Result<Vec<_>, _>>()
                    .context("invalid --patch")?;
                let mut outputs = Vec::new();
                target.input_settings.load_process(|bundle| {
                    let session = Session::start(&bundle, ComponentRegistry::standard())?;
                    for patch in &patches {
                        session.apply(patch)?;
                    }
                    for event in &target.fire {
                        session.fire(event)?;
                    }
                    outputs.push(session.output());
                    Ok(())
                })?;
                let output = match <[Value; 1]>::try_from(outputs) {
                    Ok([single]) => single,
                    Err(many) => Value::Array(many),
                };
                emit(target.out.as_ref(), &serde_json::to_string_pretty(&output)?)
            }
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn emit(out: Option<&PathBuf>, text: &str) -> Result<()> {
    match out {
        Some(out) => {
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(out, text).with_context(|| format!("failed to write {}", out.display()))
        }
        None => {
            println!("{text}");
            Ok(())
        }
    }
}

fn resolve_file_path_patterns<I>(patterns: I) -> Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        // Minimal glob detection for the `glob` crate syntax.
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{'))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            let mut matched_any = false;
            for entry in glob::glob(pattern)? {
                out.push(entry?);
                matched_any = true;
            }
            if !matched_any {
                bail!("glob pattern matched no files: {pattern}");
            }
        } else {
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}
