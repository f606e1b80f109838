//! Command-line interface for grammar-kiln
//!
//! Usage:
//!   kiln compile `<grammars>...` --out `<snapshot>`   - Compile a grammar set and store it
//!   kiln parse `<input>` --snapshot `<file>`          - Parse with a stored parser
//!   kiln parse `<input>` --grammar `<file>`...        - Compile in memory, then parse
//!   kiln productions --snapshot `<file>`              - List the entry parser's productions
//!   kiln order `<grammars>...`                        - Print the dependency order
//!   kiln list-formats                               - List output formats
//!
//! `parse` also takes `--entry <rule>`, `--format <name>`, `--case <folding>`,
//! `--independent` and `--config <file>`. A `kiln.toml` in the working directory is
//! layered under `--config`.
//!
//! `<input>` may be `-` for stdin. Logging goes to stderr and is controlled with `RUST_LOG`.

use clap::{Arg, ArgAction, ArgMatches, Command};
use std::io::Read;
use tracing_subscriber::prelude::*;

use grammar_kiln::kiln::config::Loader;
use grammar_kiln::kiln::formats::FormatRegistry;
use grammar_kiln::kiln::resolver::resolve_dependency_order;
use grammar_kiln::{CaseSensitivity, CompiledParser, GrammarSpec, ParserOptions};

fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config_arg = Arg::new("config")
        .long("config")
        .short('c')
        .help("TOML file layered over the defaults and ./kiln.toml");

    let matches = Command::new("kiln")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Compile grammar sets into reusable parsers")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("compile")
                .about("Compile a grammar set and store the snapshot")
                .arg(
                    Arg::new("grammars")
                        .help("Grammar files")
                        .required(true)
                        .num_args(1..)
                        .index(1),
                )
                .arg(
                    Arg::new("out")
                        .long("out")
                        .short('o')
                        .help("Snapshot file to write")
                        .required(true),
                )
                .arg(config_arg.clone()),
        )
        .subcommand(
            Command::new("parse")
                .about("Parse an input file and print its tree")
                .arg(
                    Arg::new("input")
                        .help("Input file, or '-' for stdin")
                        .required(true)
                        .index(1),
                )
                .arg(
                    Arg::new("snapshot")
                        .long("snapshot")
                        .short('s')
                        .help("Stored parser to use")
                        .conflicts_with("grammar")
                        .required_unless_present("grammar"),
                )
                .arg(
                    Arg::new("grammar")
                        .long("grammar")
                        .short('g')
                        .help("Grammar files to compile in memory")
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("entry")
                        .long("entry")
                        .short('e')
                        .help("Entry production (defaults to the first declared one)"),
                )
                .arg(
                    Arg::new("format")
                        .long("format")
                        .short('f')
                        .help("Output format (see list-formats)")
                        .default_value("lisp"),
                )
                .arg(
                    Arg::new("case")
                        .long("case")
                        .help("Fold the input before lexing: none, upper or lower"),
                )
                .arg(
                    Arg::new("independent")
                        .long("independent")
                        .help("Do not share lexer instances with other parsers")
                        .action(ArgAction::SetTrue),
                )
                .arg(config_arg.clone()),
        )
        .subcommand(
            Command::new("productions")
                .about("List the productions of a stored parser")
                .arg(
                    Arg::new("snapshot")
                        .long("snapshot")
                        .short('s')
                        .help("Stored parser")
                        .required(true),
                ),
        )
        .subcommand(
            Command::new("order")
                .about("Print grammar names in dependency order")
                .arg(
                    Arg::new("grammars")
                        .help("Grammar files")
                        .required(true)
                        .num_args(1..)
                        .index(1),
                ),
        )
        .subcommand(Command::new("list-formats").about("List available output formats"))
        .get_matches();

    let result = match matches.subcommand() {
        Some(("compile", m)) => handle_compile_command(m),
        Some(("parse", m)) => handle_parse_command(m),
        Some(("productions", m)) => handle_productions_command(m),
        Some(("order", m)) => handle_order_command(m),
        Some(("list-formats", _)) => {
            handle_list_formats_command();
            Ok(())
        }
        _ => unreachable!(),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

type CliResult = Result<(), Box<dyn std::error::Error>>;

fn options(matches: &ArgMatches) -> Result<ParserOptions, Box<dyn std::error::Error>> {
    let mut loader = Loader::new().with_project_dir(std::env::current_dir()?);
    if let Some(path) = matches.get_one::<String>("config") {
        loader = loader.with_file(path);
    }
    if let Ok(Some(case)) = matches.try_get_one::<String>("case") {
        loader = loader.case_sensitivity(case.parse::<CaseSensitivity>()?)?;
    }
    if matches!(matches.try_get_one::<bool>("independent"), Ok(Some(true))) {
        loader = loader.independent_instance(true)?;
    }
    Ok(loader.build()?.parser_options())
}

fn grammar_specs<'a>(
    paths: impl Iterator<Item = &'a String>,
) -> Result<Vec<GrammarSpec>, Box<dyn std::error::Error>> {
    let mut specs = Vec::new();
    for path in paths {
        specs.push(GrammarSpec::from_file(path)?);
    }
    Ok(specs)
}

/// Handle the compile command
fn handle_compile_command(matches: &ArgMatches) -> CliResult {
    let specs = grammar_specs(matches.get_many::<String>("grammars").unwrap_or_default())?;
    let out = matches.get_one::<String>("out").ok_or("missing --out")?;

    let mut parser = CompiledParser::new(specs, options(matches)?)?;
    for (spec, errors) in parser.rejected() {
        for error in errors {
            eprintln!("warning: skipped {}: {}", spec.origin(), error);
        }
    }
    parser.compile()?;
    parser.store(out)?;

    if let Some(entry) = parser.entry_points() {
        println!(
            "Stored {} ({} / {}) in {}",
            parser.artifacts().len(),
            entry.lexer,
            entry.parser,
            out
        );
    }
    Ok(())
}

/// Handle the parse command
fn handle_parse_command(matches: &ArgMatches) -> CliResult {
    let options = options(matches)?;
    let mut parser = match matches.get_one::<String>("snapshot") {
        Some(snapshot) => CompiledParser::load(snapshot, options)?,
        None => {
            let specs = grammar_specs(matches.get_many::<String>("grammar").unwrap_or_default())?;
            let mut parser = CompiledParser::new(specs, options)?;
            parser.compile()?;
            parser
        }
    };

    let input = matches.get_one::<String>("input").ok_or("missing input")?;
    let text = if input == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        text
    } else {
        std::fs::read_to_string(input)?
    };

    let entry = matches.get_one::<String>("entry").map(String::as_str);
    let result = parser.parse(&text, entry)?;
    for diagnostic in &result.diagnostics {
        eprintln!("note: {}", diagnostic);
    }

    let format = matches
        .get_one::<String>("format")
        .map(String::as_str)
        .unwrap_or("lisp");
    let output = FormatRegistry::with_defaults().serialize(&result.tree, format)?;
    println!("{}", output);
    Ok(())
}

/// Handle the productions command
fn handle_productions_command(matches: &ArgMatches) -> CliResult {
    let snapshot = matches.get_one::<String>("snapshot").ok_or("missing --snapshot")?;
    let mut parser = CompiledParser::load(snapshot, ParserOptions::default())?;
    for production in parser.productions()? {
        println!("{}", production);
    }
    Ok(())
}

/// Handle the order command
fn handle_order_command(matches: &ArgMatches) -> CliResult {
    let specs = grammar_specs(matches.get_many::<String>("grammars").unwrap_or_default())?;
    for name in resolve_dependency_order(&specs)? {
        println!("{}", name);
    }
    Ok(())
}

/// Handle the list-formats command
fn handle_list_formats_command() {
    let registry = FormatRegistry::with_defaults();
    println!("Available output formats:\n");
    for name in registry.list_formats() {
        let description = registry.get(&name).map(|f| f.description()).unwrap_or("");
        println!("  {:<6} {}", name, description);
    }
}
