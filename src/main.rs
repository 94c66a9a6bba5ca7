use std::io::Read;

use clap::{Parser, Subcommand};
use json_path_tree::{self as jpt, Context, Tree};
use serde_json::Value;
use tracing::Level;

/// Query and edit JSON documents with path expressions.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the values matched by one or more paths
    Find {
        /// JSON document, or `-` to read stdin
        json: String,
        #[arg(required = true)]
        paths: Vec<String>,
        /// Only the first match
        #[arg(long)]
        first: bool,
        /// Drop repeated matches
        #[arg(long)]
        unique: bool,
        /// Fallback JSON when nothing matched
        #[arg(long)]
        default: Option<String>,
        /// Align matches of several paths into rows
        #[arg(long)]
        join: bool,
    },
    /// Replace existing matches
    Set { json: String, path: String, value: String },
    /// Set, creating missing keys and indices
    Bridge { json: String, path: String, value: String },
    /// Remove matches
    Delete {
        json: String,
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Copy the first match (or all with --all) to another path
    Copy {
        json: String,
        from: String,
        to: String,
        #[arg(long)]
        all: bool,
    },
    /// Like copy, then remove the source
    Move {
        json: String,
        from: String,
        to: String,
        #[arg(long)]
        all: bool,
    },
    /// Flatten to a map of absolute path to leaf value
    Squish { json: String },
    /// Rebuild a document from a squished map
    Expand { json: String },
}

fn read_document(arg: &str) -> Result<Value, String> {
    let text = if arg == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| format!("cannot read stdin: {e}"))?;
        buf
    } else {
        arg.to_string()
    };
    serde_json::from_str(&text).map_err(|e| jpt::Error::from(e).to_string())
}

/// A value argument is JSON when it parses, a plain string otherwise.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn run(command: Command) -> Result<Value, String> {
    let context = Context::default().on_diagnostic(|d| {
        tracing::info!(segment = %d.segment, "filter failed: {}", d.message);
    });
    let tree_for = |json: &str| read_document(json).map(|v| Tree::with_context(v, context.clone()));
    let out = match command {
        Command::Find { json, paths, first, unique, default, join } => {
            let data = read_document(&json)?;
            if join {
                let rows = jpt::find_join(&data, &paths).map_err(|e| e.to_string())?;
                return Ok(Value::Array(rows.into_iter().map(Value::Array).collect()));
            }
            let mut tree = Tree::with_context(data, context.clone());
            let mut out = Vec::new();
            for path in &paths {
                out.extend(tree.find_values(path).map_err(|e| e.to_string())?);
            }
            if unique { out = jpt::unique(&out); }
            if first { out = vec![jpt::first(&out)]; }
            if let Some(def) = default.as_deref() { out = jpt::or_default(&out, def); }
            Value::Array(out)
        }
        Command::Set { json, path, value } => {
            let mut tree = tree_for(&json)?;
            tree.set([(path, parse_value(&value))]).map_err(|e| e.to_string())?;
            tree.into_value()
        }
        Command::Bridge { json, path, value } => {
            let mut tree = tree_for(&json)?;
            tree.bridge([(path, parse_value(&value))]).map_err(|e| e.to_string())?;
            tree.into_value()
        }
        Command::Delete { json, paths } => {
            let mut tree = tree_for(&json)?;
            tree.delete(&paths).map_err(|e| e.to_string())?;
            tree.into_value()
        }
        Command::Copy { json, from, to, all } => {
            let mut tree = tree_for(&json)?;
            let result = if all { tree.copy_all([(from, to)]) } else { tree.copy([(from, to)]) };
            result.map_err(|e| e.to_string())?;
            tree.into_value()
        }
        Command::Move { json, from, to, all } => {
            let mut tree = tree_for(&json)?;
            let result = if all { tree.move_all([(from, to)]) } else { tree.move_value([(from, to)]) };
            result.map_err(|e| e.to_string())?;
            tree.into_value()
        }
        Command::Squish { json } => Value::Object(jpt::squish(&read_document(&json)?)),
        Command::Expand { json } => match read_document(&json)? {
            Value::Object(flat) => jpt::expand(&flat).map_err(|e| e.to_string())?,
            other => return Err(format!("expand needs an object, got {other}")),
        },
    };
    Ok(out)
}

fn main() {
    let args = Args::parse();

    let level = match args.verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match run(args.command) {
        Ok(out) => match serde_json::to_string_pretty(&out) {
            Ok(text) => println!("{text}"),
            Err(e) => {
                eprintln!("cannot render output: {e}");
                std::process::exit(1);
            }
        },
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }
}
