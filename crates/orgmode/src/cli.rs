//! The `orgmode` command line tool.
//!
//! ```text
//! orgmode parse <FILE> [--json] [--quiet] [--verbose]
//! orgmode check-grammar [<grammar.json>] [--verbose]
//! orgmode grammar
//! ```
//!
//! Logging goes to stderr and is filtered by the `ORGMODE_LOG` environment
//! variable (`warn` by default, `debug` with `--verbose`).

use std::fs;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use facet::Facet;
use orgmode::grammar::orgmode::{orgmode_grammar, START_RULE};
use orgmode::{language, parse_grammar, validate, Parser};

/// Command line arguments.
#[derive(Facet)]
struct Args {
    /// `parse`, `check-grammar` or `grammar`.
    #[facet(positional)]
    command: String,

    /// Input file.
    #[facet(positional, default)]
    path: Option<String>,

    /// Print the tree as JSON instead of an s-expression.
    #[facet(named, short = 'j', default)]
    json: bool,

    /// Print nothing, only set the exit code.
    #[facet(named, short = 'q', default)]
    quiet: bool,

    /// Log at debug level.
    #[facet(named, short = 'v', default)]
    verbose: bool,
}

const USAGE: &str = "usage: orgmode <parse FILE | check-grammar [FILE] | grammar> [--json] [--quiet] [--verbose]";

fn init_logging(verbose: bool) {
    let env = env_logger::Env::new().filter_or("ORGMODE_LOG", "warn");
    let mut builder = env_logger::Builder::from_env(env);
    if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.init();
}

fn main() -> ExitCode {
    let args: Args = match facet_args::from_std_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}\n{USAGE}");
            return ExitCode::from(2);
        }
    };
    init_logging(args.verbose);

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(2)
        }
    }
}

/// Runs a command. `Ok(false)` means the input was read but rejected.
fn run(args: &Args) -> Result<bool> {
    match args.command.as_str() {
        "parse" => parse(args),
        "check-grammar" => check_grammar(args.path.as_deref()),
        "grammar" => {
            println!("{}", orgmode_grammar().to_json());
            Ok(true)
        }
        other => bail!("unknown command '{other}'\n{USAGE}"),
    }
}

/// Parses a file, returning `Ok(false)` if the tree has errors.
fn parse(args: &Args) -> Result<bool> {
    let Some(path) = args.path.as_deref() else {
        bail!("parse needs a file\n{USAGE}");
    };
    let text = fs::read_to_string(path).with_context(|| format!("reading {path}"))?;

    let language = language().context("Error loading org mode grammar")?;
    let mut parser = Parser::new();
    parser.set_language(&language)?;
    let tree = parser.parse(&text)?;

    if !args.quiet {
        if args.json {
            println!("{}", tree.to_json());
        } else {
            println!("{}", tree.to_sexp());
        }
    }
    if tree.has_error() {
        log::warn!("{path}: syntax tree contains errors");
    }
    Ok(!tree.has_error())
}

/// Validates a grammar JSON file from its `document` rule, or the bundled
/// grammar.
fn check_grammar(path: Option<&str>) -> Result<bool> {
    let grammar = match path {
        Some(path) => {
            let json = fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
            parse_grammar(&json).with_context(|| format!("parsing {path}"))?
        }
        None => orgmode_grammar(),
    };

    match validate(&grammar, START_RULE) {
        Ok(()) => {
            println!("grammar '{}' is valid", grammar.name);
            Ok(true)
        }
        Err(e) => {
            eprintln!("grammar '{}' is invalid: {e}", grammar.name);
            Ok(false)
        }
    }
}
