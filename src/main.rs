//! reqforge – requisition slips from the command line.
//!
//! Usage:
//!   reqforge submit <record.json>             render, publish, append to the ledger
//!   reqforge render <record.json> [out.pdf]   render only, no store or ledger
//!   reqforge find-id <description>            catalog item id for a description
//!   reqforge stocks [--full]                  running stocks from the catalog
//!   reqforge branches                         branch list
//!
//! Every command accepts `--config <settings.json>`; `RUST_LOG` controls
//! logging.

use std::{
    env, fs,
    path::{Path, PathBuf},
    process,
    sync::Arc,
};

use requisition_forge::catalog::{load_branches, Catalog};
use requisition_forge::error::{ForgeError, Result};
use requisition_forge::merge::MergePipeline;
use requisition_forge::pipeline::PageOrientation;
use requisition_forge::record::from_json_str;
use requisition_forge::service::{document_name, LocalService};
use requisition_forge::settings::Settings;
use requisition_forge::store::{FileStore, MemoryFileStore};
use requisition_forge::template::{TemplateRegistry, REQUISITION_TEMPLATE};

struct Cli {
    command: String,
    positional: Vec<String>,
    config: Option<PathBuf>,
    landscape: bool,
    full: bool,
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let prog = args.first().map(String::as_str).unwrap_or("reqforge");

    let cli = match parse_args(&args[1..]) {
        Ok(cli) => cli,
        Err(msg) => {
            if !msg.is_empty() {
                eprintln!("{msg}");
            }
            print_usage(prog);
            process::exit(if msg.is_empty() { 0 } else { 1 });
        }
    };

    if let Err(e) = run(&cli) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// `Err("")` means help was requested.
fn parse_args(args: &[String]) -> std::result::Result<Cli, String> {
    let mut cli = Cli {
        command: String::new(),
        positional: Vec::new(),
        config: None,
        landscape: false,
        full: false,
    };

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => match iter.next() {
                Some(v) => cli.config = Some(PathBuf::from(v)),
                None => return Err("--config needs a path".to_string()),
            },
            "--landscape" | "-l" => cli.landscape = true,
            "--full" => cli.full = true,
            "--help" | "-h" => return Err(String::new()),
            other if other.starts_with('-') => return Err(format!("Unknown flag: {other}")),
            value if cli.command.is_empty() => cli.command = value.to_string(),
            value => cli.positional.push(value.to_string()),
        }
    }

    if cli.command.is_empty() {
        return Err("Error: no command specified.".to_string());
    }
    Ok(cli)
}

fn arg<'a>(cli: &'a Cli, index: usize, what: &str) -> Result<&'a str> {
    cli.positional
        .get(index)
        .map(String::as_str)
        .ok_or_else(|| ForgeError::Config(format!("{} needs {what}", cli.command)))
}

fn run(cli: &Cli) -> Result<()> {
    let mut settings = Settings::load_or_default(cli.config.as_deref())?;
    if cli.landscape {
        settings.orientation = PageOrientation::Landscape;
    }

    match cli.command.as_str() {
        "submit" => {
            let json = fs::read_to_string(arg(cli, 0, "a record file")?)?;
            let raw: serde_json::Value = serde_json::from_str(&json)
                .map_err(|e| ForgeError::InvalidRecord(format!("not valid JSON: {e}")))?;
            let local = LocalService::from_settings(&settings)?;
            let submitted = local.service.submit(&raw);
            local.shutdown();
            let submission = submitted?;
            eprintln!(
                "{} row(s) -> {} [{}]",
                submission.rows, submission.bucket, submission.report
            );
            println!("{}", submission.url);
        }
        "render" => {
            let input = PathBuf::from(arg(cli, 0, "a record file")?);
            let output = match cli.positional.get(1) {
                Some(p) => PathBuf::from(p),
                None => input.with_extension("pdf"),
            };
            render_to_file(&settings, &input, &output)?;
        }
        "find-id" => {
            let catalog = Catalog::load(&settings.catalog_file)?;
            println!("{}", catalog.find_id(&cli.positional.join(" ")));
        }
        "stocks" => {
            let catalog = Catalog::load(&settings.catalog_file)?;
            let json = if cli.full {
                serde_json::to_string_pretty(&catalog.stocks_full())?
            } else {
                serde_json::to_string_pretty(&catalog.running_stocks())?
            };
            println!("{json}");
        }
        "branches" => {
            let branches = load_branches(&settings.branches_file)?;
            println!("{}", serde_json::to_string_pretty(&branches)?);
        }
        other => return Err(ForgeError::Config(format!("unknown command {other:?}"))),
    }
    Ok(())
}

/// Merge a record into the configured template without touching the local
/// store or the ledger.
fn render_to_file(settings: &Settings, input: &Path, output: &Path) -> Result<()> {
    let record = from_json_str(&fs::read_to_string(input)?)?;
    let template = match &settings.template_path {
        Some(path) => fs::read_to_string(path)?,
        None => REQUISITION_TEMPLATE.to_string(),
    };

    let store = Arc::new(MemoryFileStore::new());
    let registry = TemplateRegistry::register(store.clone(), &template, "template")?;
    let pipeline = MergePipeline::new(registry, settings.pipeline_config());
    let name = document_name(&chrono::Utc::now().with_timezone(&settings.utc_offset()?));
    let outcome = pipeline.render(&record, &name)?;
    let bytes = store.read(&outcome.file.id)?;

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(output, &bytes)?;
    eprintln!(
        "Wrote '{}' ({} bytes) [{}]",
        output.display(),
        bytes.len(),
        outcome.report
    );
    Ok(())
}

fn print_usage(prog: &str) {
    eprintln!("reqforge – requisition slip renderer");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {prog} submit <record.json>");
    eprintln!("  {prog} render <record.json> [output.pdf]");
    eprintln!("  {prog} find-id <description>");
    eprintln!("  {prog} stocks [--full]");
    eprintln!("  {prog} branches");
    eprintln!();
    eprintln!("Flags:");
    eprintln!("  --config, -c   Settings JSON file (default: built-in settings)");
    eprintln!("  --landscape    Landscape pages");
    eprintln!("  --full         With `stocks`: item id, stock and unit per item");
    eprintln!("  --help         Print this message");
}
