/*
 * main.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! templatec - compile and run JSON-Template files from the command line

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context as _, Result, bail};
use clap::Parser;
use jsont::{CompileOptions, Compiler, ReferenceScanner, repr};
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "templatec")]
#[command(version, about = "Compile and execute JSON-Template files", long_about = None)]
struct Cli {
    /// Template file to compile
    template: PathBuf,

    /// JSON file to execute the template against
    #[arg(short = 'j', long, value_name = "FILE")]
    json: Option<PathBuf>,

    /// JSON object file mapping partial names to template source
    #[arg(short = 'p', long, value_name = "FILE")]
    partials: Option<PathBuf>,

    /// Collect execution errors instead of stopping at the first one
    #[arg(long)]
    safe: bool,

    /// Print the reference report instead of executing
    #[arg(short = 's', long)]
    stats: bool,

    /// Print the instruction tree instead of executing
    #[arg(short = 't', long)]
    tree: bool,

    /// List syntax errors instead of executing
    #[arg(long)]
    validate: bool,

    /// Only expand {^...} tags, passing everything else through
    #[arg(long)]
    preprocess: bool,

    /// Allow {.include} to pull in partials
    #[arg(long)]
    enable_include: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jsont=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

/// Returns false when the template reported errors.
fn run(cli: &Cli) -> Result<bool> {
    let source = fs::read_to_string(&cli.template)
        .with_context(|| format!("failed to read template {}", cli.template.display()))?;
    let compiler = Compiler::new();
    let mut stdout = std::io::stdout().lock();

    if cli.validate {
        let options = CompileOptions::new()
            .validate(true)
            .preprocess(cli.preprocess);
        let compiled = compiler.compile(&source, &options)?;
        for error in compiled.errors() {
            writeln!(stdout, "{}", error.message_with_children())?;
        }
        return Ok(compiled.errors().is_empty());
    }

    if cli.stats || cli.tree {
        let options = CompileOptions::new().preprocess(cli.preprocess);
        let code = compiler.compile(&source, &options)?.into_code();
        if cli.tree {
            write!(stdout, "{}", repr::tree(&code))?;
        }
        if cli.stats {
            let mut scanner = ReferenceScanner::new();
            scanner.extract(&code);
            let report = serde_json::to_string_pretty(&scanner.references().report())?;
            writeln!(stdout, "{}", report)?;
        }
        return Ok(true);
    }

    let json = match &cli.json {
        Some(path) => read_json(path)?,
        None => Value::Object(Default::default()),
    };
    let partials = match &cli.partials {
        Some(path) => {
            let value = read_json(path)?;
            if !value.is_object() {
                bail!("partials file {} must hold a JSON object", path.display());
            }
            Some(value)
        }
        None => None,
    };

    let options = CompileOptions::new()
        .validate(cli.safe)
        .preprocess(cli.preprocess);
    let (code, syntax_errors) = compiler.compile(&source, &options)?.into_parts();

    let mut executor = compiler
        .executor()
        .code(&code)
        .json(&json)
        .safe_execution(cli.safe)
        .enable_include(cli.enable_include);
    if let Some(partials) = &partials {
        executor = executor.partials(partials);
    }
    let ctx = executor.execute()?;

    write!(stdout, "{}", ctx.buffer())?;
    stdout.flush()?;

    let mut ok = true;
    for error in syntax_errors.iter().chain(ctx.errors()) {
        eprintln!("{}", error.message_with_children());
        ok = false;
    }
    Ok(ok)
}

fn read_json(path: &Path) -> Result<Value> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid JSON in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_flags() {
        let cli = Cli::try_parse_from(["templatec", "-j", "data.json", "--safe", "page.jsont"])
            .unwrap();
        assert_eq!(cli.template, PathBuf::from("page.jsont"));
        assert_eq!(cli.json, Some(PathBuf::from("data.json")));
        assert!(cli.safe);
        assert!(!cli.stats);
    }
}
