//! Command line front end for evaluating and inspecting expressions
//!
//! Features are read from JSON documents of the form
//! `{"id": 1, "attributes": {"name": "a"}, "geometry": "Point (1 2)"}`.

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use colored::Colorize;
use env_logger::Env;
use feature_expression::evaluator::global_scope;
use feature_expression::geometry::wkt;
use feature_expression::{
    ContextScope, EvaluationContext, Expression, Feature, Fields, FunctionRegistry, Value,
};
use serde_json::Value as JsonValue;
use std::fs;
use std::io::{self, Read};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "feature-expr")]
#[command(about = "Evaluate and inspect per-feature expressions")]
#[command(version)]
struct Cli {
    /// Log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate an expression, optionally against a feature
    Evaluate {
        /// Expression to evaluate
        expression: String,
        /// JSON file holding the feature ("-" reads stdin)
        #[arg(short, long)]
        feature: Option<String>,
        /// Variable binding as name=value; values are read as JSON when possible
        #[arg(long = "var", value_name = "NAME=VALUE")]
        variables: Vec<String>,
        /// Print only the value
        #[arg(short, long)]
        quiet: bool,
    },
    /// Parse an expression and show its normalized form and references
    Parse {
        /// Expression to parse
        expression: String,
    },
    /// List the registered functions
    Functions {
        /// Only list functions of this group
        #[arg(short, long)]
        group: Option<String>,
        /// Include the help text of each function
        #[arg(long)]
        help: bool,
    },
    /// Check that an expression parses and prepares
    Check {
        /// Expression to check
        expression: String,
        /// Print only OK or INVALID
        #[arg(short, long)]
        quiet: bool,
    },
}

fn main() {
    human_panic::setup_panic!();

    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    let result = match cli.command {
        Commands::Evaluate {
            expression,
            feature,
            variables,
            quiet,
        } => handle_evaluate(&expression, feature.as_deref(), &variables, quiet),
        Commands::Parse { expression } => handle_parse(&expression),
        Commands::Functions { group, help } => {
            handle_functions(group.as_deref(), help);
            Ok(())
        }
        Commands::Check { expression, quiet } => handle_check(&expression, quiet),
    };

    if let Err(error) = result {
        eprintln!("{} {error:#}", "error:".red().bold());
        std::process::exit(1);
    }
}

fn read_source(path: &str) -> Result<String> {
    if path == "-" {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .context("reading feature from stdin")?;
        return Ok(buffer);
    }
    fs::read_to_string(path).with_context(|| format!("reading feature file '{path}'"))
}

fn load_feature(path: &str) -> Result<(Feature, Arc<Fields>)> {
    let json: JsonValue = serde_json::from_str(&read_source(path)?)
        .with_context(|| format!("parsing feature JSON from '{path}'"))?;
    let id = json.get("id").and_then(JsonValue::as_i64).unwrap_or(0);

    let (names, values): (Vec<String>, Vec<Value>) = match json.get("attributes") {
        Some(JsonValue::Object(attributes)) => attributes
            .iter()
            .map(|(name, value)| (name.clone(), Value::from(value)))
            .unzip(),
        Some(_) => bail!("'attributes' must be a JSON object"),
        None => (Vec::new(), Vec::new()),
    };
    let fields = Arc::new(Fields::from_names(names));
    let mut feature = Feature::new(id, fields.clone()).with_attributes(values);

    match json.get("geometry") {
        Some(JsonValue::String(text)) => {
            let geometry =
                wkt::read(text).map_err(|error| anyhow!("invalid geometry WKT: {error}"))?;
            feature = feature.with_geometry(geometry);
        }
        Some(JsonValue::Null) | None => {}
        Some(_) => bail!("'geometry' must be a WKT string"),
    }
    Ok((feature, fields))
}

fn parse_binding(binding: &str) -> Result<(String, Value)> {
    let (name, raw) = binding
        .split_once('=')
        .ok_or_else(|| anyhow!("variable binding '{binding}' is not of the form NAME=VALUE"))?;
    let value = serde_json::from_str::<JsonValue>(raw)
        .map(|json| Value::from(&json))
        .unwrap_or_else(|_| Value::from(raw));
    Ok((name.trim().to_string(), value))
}

fn handle_evaluate(
    text: &str,
    feature: Option<&str>,
    bindings: &[String],
    quiet: bool,
) -> Result<()> {
    let mut context = EvaluationContext::from_scopes(vec![global_scope()]);
    if !bindings.is_empty() {
        let mut scope = ContextScope::new("Command line");
        for binding in bindings {
            let (name, value) = parse_binding(binding)?;
            scope.set_variable(name, value, true);
        }
        context.append_scope(scope);
    }
    if let Some(path) = feature {
        let (feature, fields) = load_feature(path)?;
        context.append_scope(ContextScope::new("Feature"));
        context.set_fields(fields);
        context.set_feature(feature);
    }

    let mut expression = Expression::new(text);
    if expression.has_parser_error() {
        bail!("parse error: {}", expression.parser_error_string());
    }
    if !expression.prepare(&mut context) {
        bail!("prepare error: {}", expression.eval_error_string());
    }
    let value = expression.evaluate(&mut context);
    if expression.has_eval_error() {
        bail!("evaluation error: {}", expression.eval_error_string());
    }

    if quiet {
        println!("{}", value.to_text());
    } else {
        eprintln!("{} {text}", "Expression:".bold());
        println!("{}", Expression::format_preview_string(&value));
    }
    Ok(())
}

fn join(items: impl IntoIterator<Item = String>) -> String {
    let items: Vec<String> = items.into_iter().collect();
    if items.is_empty() { "-".to_string() } else { items.join(", ") }
}

fn handle_parse(text: &str) -> Result<()> {
    let expression = Expression::new(text);
    if expression.has_parser_error() {
        bail!("parse error: {}", expression.parser_error_string());
    }
    println!("{} {}", "Normalized:".bold(), expression.dump());
    println!("{} {}", "Columns:".bold(), join(expression.referenced_columns()));
    println!("{} {}", "Variables:".bold(), join(expression.referenced_variables()));
    println!("{} {}", "Functions:".bold(), join(expression.referenced_functions()));
    println!("{} {}", "Needs geometry:".bold(), expression.needs_geometry());
    Ok(())
}

fn handle_functions(group: Option<&str>, with_help: bool) {
    let registry = FunctionRegistry::global();
    let mut functions = match group {
        Some(group) => registry.functions_by_group(group),
        None => registry.functions(),
    };
    functions.sort_by_key(|function| function.name().to_lowercase());
    for function in functions {
        let aliases = function.aliases();
        let mut line = function.name().green().to_string();
        if !aliases.is_empty() {
            line.push_str(&format!(" ({})", aliases.join(", ")));
        }
        let groups = format!(" [{}]", function.groups().join(", "));
        line.push_str(&groups.as_str().dimmed().to_string());
        println!("{line}");
        if with_help && !function.help_text().is_empty() {
            println!("    {}", function.help_text());
        }
    }
}

fn handle_check(text: &str, quiet: bool) -> Result<()> {
    let mut context = EvaluationContext::from_scopes(vec![global_scope()]);
    let outcome = Expression::check_expression(text, &mut context);
    match (outcome, quiet) {
        (Ok(()), true) => println!("OK"),
        (Ok(()), false) => println!("{} {text}", "✓ valid:".green()),
        (Err(_), true) => {
            println!("INVALID");
            std::process::exit(1);
        }
        (Err(error), false) => bail!("{} {error}", "✗ invalid:".red()),
    }
    Ok(())
}
