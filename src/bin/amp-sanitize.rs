use amp_sanitizer::{
    Document, ErrorContext, ErrorLedger, NodeSpec, Pipeline, PipelineConfig, SanitizeOutcome,
    SanitizerError, Scripts, Stylesheet,
};
use serde::Serialize;
use std::env;
use std::fs;
use std::process;

#[derive(Serialize)]
struct Report {
    document: Option<NodeSpec>,
    stylesheets: Vec<Stylesheet>,
    scripts: Scripts,
}

struct Options {
    document: String,
    config: Option<String>,
    ledger: Option<String>,
}

fn main() {
    env_logger::init();

    let Some(options) = parse_args(env::args().skip(1).collect()) else {
        eprintln!("Usage: amp-sanitize <document.yaml> [config.yaml] [--ledger <ledger.yaml>]");
        eprintln!();
        eprintln!("Examples:");
        eprintln!("  amp-sanitize post.yaml");
        eprintln!("  amp-sanitize post.yaml amp.yaml --ledger reviewed.yaml");
        process::exit(2);
    };

    match run(&options) {
        Ok(outcome) => {
            for error in &outcome.errors {
                eprintln!("  {}", error);
            }
            if outcome.has_kept_errors() {
                process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("✗ {}: {}", options.document, e);
            process::exit(2);
        }
    }
}

fn parse_args(args: Vec<String>) -> Option<Options> {
    let mut positional = Vec::new();
    let mut ledger = None;
    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        if arg == "--ledger" {
            ledger = Some(iter.next()?);
        } else {
            positional.push(arg);
        }
    }
    let mut positional = positional.into_iter();
    let document = positional.next()?;
    let config = positional.next();
    if positional.next().is_some() {
        return None;
    }
    Some(Options {
        document,
        config,
        ledger,
    })
}

fn run(options: &Options) -> Result<SanitizeOutcome, SanitizerError> {
    let mut doc = Document::from_yaml(&fs::read_to_string(&options.document)?)?;
    let config = match &options.config {
        Some(path) => PipelineConfig::from_yaml(&fs::read_to_string(path)?)?,
        None => PipelineConfig::default(),
    };
    let mut pipeline = Pipeline::new(&config)?;

    let outcome = match &options.ledger {
        Some(path) => {
            let mut ledger = ErrorLedger::load(path)?;
            let outcome = pipeline.run_with_ledger(&mut doc, ErrorContext::default(), &mut ledger);
            ledger.save(path)?;
            outcome
        }
        None => pipeline.run(&mut doc, ErrorContext::default(), None),
    };

    let report = Report {
        document: doc.to_spec(),
        stylesheets: outcome.stylesheets.entries().to_vec(),
        scripts: outcome.scripts.clone(),
    };
    print!("{}", serde_yaml::to_string(&report)?);
    Ok(outcome)
}
