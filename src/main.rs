use bitscout::{
    DataDir,
    Document,
    DocumentLoader,
    FilesystemLoader,
    Index,
    IndexConfig,
    WriteBehindIndex,
    WriteBehindOptions,
    error::{self, Error},
};
use clap::Parser;
use serde_json::{Value, json};
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Cli, Command, ConfigAction};

fn init_tracing(verbose: u8, quiet: bool) {
    let filter = if let Ok(env) = std::env::var("BITSCOUT_LOG") {
        EnvFilter::new(env)
    } else if quiet {
        EnvFilter::new("warn")
    } else {
        match verbose {
            0 => EnvFilter::new("info"),
            1 => EnvFilter::new("debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn main() -> error::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Command::Completions(args) = &cli.command {
        args.generate();
        return Ok(());
    }

    let data_dir = DataDir::resolve(cli.data_dir.as_deref())?;
    let options = WriteBehindOptions {
        queue_capacity: cli.queue_capacity,
    };
    let index = WriteBehindIndex::open(&data_dir.index_db(), options)?;

    let result = run(&index, &data_dir, cli.command);
    // Close even when the command failed so queued writes are drained.
    let closed = index.close();
    result.and(closed)
}

fn run(
    index: &WriteBehindIndex,
    data_dir: &DataDir,
    command: Command,
) -> error::Result<()> {
    match command {
        Command::Ingest(args) => {
            let loader = FilesystemLoader::new(&args.dir).with_extensions(&args.ext);
            cmd_ingest(index, &loader)?;
        }
        Command::Search(args) => {
            let results = index.search(&args.query);
            if args.json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else if args.ids {
                for doc in &results {
                    println!("{}", doc.id);
                }
            } else {
                format_human(&results);
            }
        }
        Command::Get(args) => {
            let doc = index
                .get_document(&args.id)
                .ok_or_else(|| Error::NotFound {
                    kind: "document",
                    name: args.id.clone(),
                })?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&doc)?);
            } else {
                print_document(&doc);
            }
        }
        Command::Delete(args) => {
            index.delete_documents(&args.ids)?;
            println!("Deleted {} document(s)", args.ids.len());
        }
        Command::Config { action } => match action {
            ConfigAction::Show { json } => config_show(index, json)?,
            ConfigAction::Set { key, value } => config_set(index, key, &value)?,
            ConfigAction::Import { file } => {
                let raw = std::fs::read_to_string(&file)?;
                let config: IndexConfig = serde_json::from_str(&raw)
                    .map_err(|e| {
                        Error::Config(format!(
                            "{} is not a JSON object: {e}",
                            file.display()
                        ))
                    })?;
                index.configure(config)?;
                println!("Imported configuration from {}", file.display());
            }
        },
        Command::Status(args) => cmd_status(index, data_dir, args.json)?,
        Command::Completions(_) => {}
    }

    Ok(())
}

fn cmd_ingest(
    index: &WriteBehindIndex,
    loader: &impl DocumentLoader,
) -> error::Result<()> {
    let documents = loader.load()?;
    let count = documents.len();
    index.add_documents(documents)?;
    println!("Ingested {count} document(s)");
    Ok(())
}

fn format_human(results: &[Document]) {
    if results.is_empty() {
        println!("No results.");
        return;
    }
    for doc in results {
        println!("{}\t{}", doc.id, doc.source);
    }
    println!("{} result(s)", results.len());
}

fn print_document(doc: &Document) {
    println!("ID: {}", doc.id);
    println!("Source: {}", doc.source);
    let mut meta: Vec<_> = doc.meta.iter().collect();
    meta.sort();
    for (key, value) in meta {
        println!("  {key}: {value}");
    }
    if !doc.vector.is_empty() {
        println!("Vector: {:?}", doc.vector);
    }
    println!();
    println!("{}", doc.text);
}

fn config_show(index: &WriteBehindIndex, json: bool) -> error::Result<()> {
    let config = index.show_config();
    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
    } else if config.is_empty() {
        println!("No configuration set.");
    } else {
        for (key, value) in &config {
            println!("{key}\t{value}");
        }
    }
    Ok(())
}

fn config_set(
    index: &WriteBehindIndex,
    key: String,
    raw: &str,
) -> error::Result<()> {
    let value = parse_config_value(raw);
    let mut config = index.show_config();
    config.insert(key.clone(), value.clone());
    index.configure(config)?;
    println!("Set {key} = {value}");
    Ok(())
}

/// Interpret a CLI value as JSON, falling back to a plain string.
fn parse_config_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn cmd_status(
    index: &WriteBehindIndex,
    data_dir: &DataDir,
    json: bool,
) -> error::Result<()> {
    let stats = index.store_stats()?;

    if json {
        let status = json!({
            "data_dir": data_dir.root().display().to_string(),
            "documents": index.count(),
            "size": index.size(),
            "stored_documents": stats.document_count,
            "has_config": stats.has_config,
            "dropped_jobs": index.dropped_jobs(),
        });
        println!("{status}");
    } else {
        println!("Data directory: {}", data_dir.root().display());
        println!("Documents: {}", index.count());
        println!("Size: {} bytes", index.size());
        println!("Stored documents: {}", stats.document_count);
        println!("Stored config: {}", if stats.has_config { "yes" } else { "no" });
        if index.dropped_jobs() > 0 {
            println!("Dropped writes: {}", index.dropped_jobs());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_values_parse_as_json() {
        assert_eq!(parse_config_value("10"), json!(10));
        assert_eq!(parse_config_value("true"), json!(true));
        assert_eq!(parse_config_value(r#"["a","b"]"#), json!(["a", "b"]));
    }

    #[test]
    fn config_values_fall_back_to_string() {
        assert_eq!(parse_config_value("hello"), json!("hello"));
        assert_eq!(parse_config_value("[oops"), json!("[oops"));
    }
}
