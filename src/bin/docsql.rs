use clap::{Parser, Subcommand};
use docsql::config::DocSqlConfig;
use docsql::dialect::DialectKind;
use docsql::errors::DbError;
use docsql::{Database, Document, Filter, FindOptions, Projection, SortSpec};
use serde_json::Value;
use std::io::Write;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "docsql",
    version,
    about = "Document operations over SQL JSON columns",
    long_about = None
)]
struct Cli {
    /// Path to a config file (TOML)
    #[arg(
        long,
        help = "Path to a config file (TOML). Falls back to DOCSQL_CONFIG, then ./docsql.toml."
    )]
    config: Option<PathBuf>,
    /// Override DB path (takes precedence over config and env)
    #[arg(long, help = "Database file path (e.g., app.db). In-memory when omitted everywhere.")]
    db: Option<PathBuf>,
    #[arg(long, help = "SQL dialect: sqlite|mysql|postgres|text. Only sqlite is executable here.")]
    dialect: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Find documents matching a filter; prints NDJSON to stdout")]
    Find {
        #[arg(help = "Collection name")]
        collection: String,
        #[arg(default_value = "{}", help = "Filter JSON (e.g., {\"age\": {\"$gte\": 21}})")]
        filter: String,
        #[arg(long, help = "Projection fields comma-separated (e.g., name,addr.city)")]
        project: Option<String>,
        #[arg(long, help = "Exclude _id from projected output")]
        no_id: bool,
        #[arg(long, help = "Sort spec comma-separated; -age,+name")]
        sort: Option<String>,
        #[arg(long, help = "Limit results (0 = unbounded)")]
        limit: Option<usize>,
        #[arg(long, help = "Skip N results")]
        skip: Option<usize>,
    },
    #[command(about = "Count documents matching a filter")]
    Count {
        collection: String,
        #[arg(default_value = "{}")]
        filter: String,
    },
    #[command(about = "Insert one JSON document, or NDJSON from stdin when the document is '-'")]
    Insert {
        collection: String,
        #[arg(help = "Document JSON or '-' for NDJSON on stdin")]
        document: String,
    },
    #[command(about = "Update matching documents (merge or $set/$inc/$unset)")]
    Update {
        collection: String,
        filter: String,
        update: String,
        #[arg(long, help = "Update only the first match")]
        one: bool,
    },
    #[command(about = "Replace matching documents, keeping their _id")]
    Replace {
        collection: String,
        filter: String,
        replacement: String,
        #[arg(long, help = "Replace only the first match")]
        one: bool,
    },
    #[command(about = "Delete matching documents")]
    Delete {
        collection: String,
        filter: String,
        #[arg(long, help = "Delete only the first match")]
        one: bool,
    },
    #[command(about = "Drop a collection's table")]
    Drop { collection: String },
}

fn load_config(cli: &Cli) -> Result<DocSqlConfig, DbError> {
    // Precedence: CLI > env > config file > defaults
    let mut cfg = DocSqlConfig::load(cli.config.as_deref())?;
    if let Some(d) = &cli.dialect {
        cfg.dialect = d.parse::<DialectKind>()?;
    }
    if let Some(db) = &cli.db {
        cfg.database = Some(db.clone());
    }
    Ok(cfg)
}

fn parse_object(what: &str, json: &str) -> Result<Document, DbError> {
    match serde_json::from_str::<Value>(json)? {
        Value::Object(m) => Ok(m),
        other => Err(DbError::CompilationError(format!(
            "{what} must be a JSON object, got {other}"
        ))),
    }
}

fn parse_sort(spec: &str) -> Vec<SortSpec> {
    spec.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|part| {
            if let Some(rest) = part.strip_prefix('-') {
                SortSpec::desc(rest)
            } else {
                SortSpec::asc(part.strip_prefix('+').unwrap_or(part))
            }
        })
        .collect()
}

fn print_line(
    out: &mut impl Write,
    v: &impl serde::Serialize,
) -> Result<(), Box<dyn std::error::Error>> {
    writeln!(out, "{}", serde_json::to_string(v)?)?;
    Ok(())
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let cfg = load_config(&cli)?;
    if let Err(e) = cfg.init_logging() {
        eprintln!("warning: logging disabled: {e}");
    }
    let db = Database::from_config(&cfg)?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Commands::Find {
            collection,
            filter,
            project,
            no_id,
            sort,
            limit,
            skip,
        } => {
            let col = db.collection(&collection)?;
            let mut opts = FindOptions {
                limit,
                skip,
                ..FindOptions::default()
            };
            if let Some(p) = project {
                let proj =
                    Projection::fields(p.split(',').map(str::trim).filter(|s| !s.is_empty()));
                opts.projection = Some(if no_id { proj.without_id() } else { proj });
            }
            if let Some(s) = sort {
                let specs = parse_sort(&s);
                if !specs.is_empty() {
                    opts.sort = Some(specs);
                }
            }
            for doc in col.find(&Filter::parse_json(&filter)?, &opts)? {
                print_line(&mut out, &doc?)?;
            }
        }
        Commands::Count { collection, filter } => {
            let n = db.collection(&collection)?.count(&Filter::parse_json(&filter)?)?;
            writeln!(out, "{n}")?;
        }
        Commands::Insert { collection, document } => {
            let col = db.collection(&collection)?;
            let docs = if document == "-" {
                let mut docs = Vec::new();
                for line in std::io::stdin().lines() {
                    let line = line?;
                    if !line.trim().is_empty() {
                        docs.push(parse_object("document", &line)?);
                    }
                }
                docs
            } else {
                vec![parse_object("document", &document)?]
            };
            for id in col.insert_many(docs)? {
                print_line(&mut out, &serde_json::json!({ "_id": id }))?;
            }
        }
        Commands::Update {
            collection,
            filter,
            update,
            one,
        } => {
            let col = db.collection(&collection)?;
            let (f, u) = (Filter::parse_json(&filter)?, parse_object("update", &update)?);
            let r = if one {
                col.update_one(&f, &u)?
            } else {
                col.update_many(&f, &u)?
            };
            print_line(
                &mut out,
                &serde_json::json!({ "matched": r.matched, "modified": r.modified }),
            )?;
        }
        Commands::Replace {
            collection,
            filter,
            replacement,
            one,
        } => {
            let col = db.collection(&collection)?;
            let f = Filter::parse_json(&filter)?;
            let r = parse_object("replacement", &replacement)?;
            let r = if one {
                col.replace_one(&f, &r)?
            } else {
                col.replace_many(&f, &r)?
            };
            print_line(
                &mut out,
                &serde_json::json!({ "matched": r.matched, "modified": r.modified }),
            )?;
        }
        Commands::Delete {
            collection,
            filter,
            one,
        } => {
            let col = db.collection(&collection)?;
            let f = Filter::parse_json(&filter)?;
            let r = if one {
                col.delete_one(&f)?
            } else {
                col.delete_many(&f)?
            };
            print_line(&mut out, &serde_json::json!({ "deleted": r.deleted }))?;
        }
        Commands::Drop { collection } => db.collection(&collection)?.drop()?,
    }
    Ok(())
}

fn main() {
    if let Err(e) = run(Cli::parse()) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_spec_prefixes() {
        let specs = parse_sort("-age, +name,city,");
        assert_eq!(
            specs,
            vec![
                SortSpec::desc("age"),
                SortSpec::asc("name"),
                SortSpec::asc("city")
            ]
        );
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::try_parse_from(["docsql", "--dialect", "sqlite", "count", "users"]).unwrap();
        assert_eq!(cli.dialect.as_deref(), Some("sqlite"));
        assert!(matches!(cli.command, Commands::Count { ref filter, .. } if filter == "{}"));
    }
}
