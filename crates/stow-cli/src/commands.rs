use std::path::PathBuf;

use anyhow::{bail, Context};
use colored::Colorize;
use serde_json::json;
use stow_adapter::{AdapterConfig, FileAdapter, SyncMode};
use stow_store::{Live, ObjectStore, StoreConfig};
use stow_types::{Identity, KeySpace};

use crate::cli::*;
use crate::record::Record;

/// Data file used when neither `--config` nor `--data` names one.
const DEFAULT_DATA_FILE: &str = "stow.db";

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = resolve_config(cli.config.as_ref(), cli.data.as_ref())?;
    let format = cli.format;
    match cli.command {
        Command::Put(args) => with_store(&config, |store| cmd_put(store, args, format)),
        Command::Get(args) => with_store(&config, |store| cmd_get(store, args, format)),
        Command::Find(args) => with_store(&config, |store| cmd_find(store, args, format)),
        Command::Delete(args) => with_store(&config, |store| cmd_delete(store, args, format)),
        Command::List => with_store(&config, |store| cmd_list(store, format)),
        Command::Stats => with_store(&config, |store| cmd_stats(store, format)),
        Command::Compact => cmd_compact(&config, format),
        Command::Config => cmd_config(&config),
    }
}

/// Open the store, run `f`, and close the store even if `f` failed.
fn with_store(
    config: &StoreConfig,
    f: impl FnOnce(&ObjectStore) -> anyhow::Result<()>,
) -> anyhow::Result<()> {
    let store = ObjectStore::open(config).context("failed to open store")?;
    let result = f(&store);
    store.close().context("failed to close store")?;
    result
}

/// Effective configuration: the config file if given (else a file adapter
/// at `stow.db`), then `--data` on top.
pub(crate) fn resolve_config(
    config: Option<&PathBuf>,
    data: Option<&PathBuf>,
) -> anyhow::Result<StoreConfig> {
    let mut resolved = match config {
        Some(path) => StoreConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => StoreConfig {
            adapter: AdapterConfig::File {
                path: PathBuf::from(DEFAULT_DATA_FILE),
                sync: SyncMode::default(),
            },
            ..StoreConfig::default()
        },
    };
    if let Some(path) = data {
        let sync = match &resolved.adapter {
            AdapterConfig::File { sync, .. } => *sync,
            AdapterConfig::Memory => SyncMode::default(),
        };
        resolved.adapter = AdapterConfig::File {
            path: path.clone(),
            sync,
        };
    }
    Ok(resolved)
}

fn parse_id(raw: &str) -> anyhow::Result<Identity> {
    Identity::new(raw).with_context(|| format!("invalid identity '{raw}'"))
}

fn cmd_put(store: &ObjectStore, args: PutArgs, format: OutputFormat) -> anyhow::Result<()> {
    let mut record = Record::new(args.fields);
    for field in args.indexed {
        record = record.index(field);
    }
    if let Some(raw) = &args.id {
        record.id = Some(parse_id(raw)?);
    }
    let id = store.register(record).context("failed to store record")?;
    match format {
        OutputFormat::Json => println!("{}", json!({ "id": id })),
        OutputFormat::Text => println!("{} Stored record {}", "✓".green().bold(), id.as_str().yellow()),
    }
    Ok(())
}

fn cmd_get(store: &ObjectStore, args: GetArgs, format: OutputFormat) -> anyhow::Result<()> {
    let id = parse_id(&args.id)?;
    let live: Live<Record> = store
        .retrieve(&id)
        .with_context(|| format!("failed to get {id}"))?;
    print_record(&live, format)
}

fn cmd_find(store: &ObjectStore, args: FindArgs, format: OutputFormat) -> anyhow::Result<()> {
    let live: Live<Record> = store
        .retrieve_by_index(&args.name, &args.value)
        .with_context(|| format!("no record with {}={}", args.name, args.value))?;
    print_record(&live, format)
}

fn cmd_delete(store: &ObjectStore, args: DeleteArgs, format: OutputFormat) -> anyhow::Result<()> {
    let id = parse_id(&args.id)?;
    store
        .delete(&id)
        .with_context(|| format!("failed to delete {id}"))?;
    match format {
        OutputFormat::Json => println!("{}", json!({ "deleted": id })),
        OutputFormat::Text => println!("Deleted record {}", id.as_str().yellow()),
    }
    Ok(())
}

fn cmd_list(store: &ObjectStore, format: OutputFormat) -> anyhow::Result<()> {
    let ids = store.identities().context("failed to list identities")?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(&ids)?),
        OutputFormat::Text if ids.is_empty() => println!("No records."),
        OutputFormat::Text => {
            for id in &ids {
                println!("{}", id.as_str().yellow());
            }
        }
    }
    Ok(())
}

fn cmd_stats(store: &ObjectStore, format: OutputFormat) -> anyhow::Result<()> {
    let adapter = store.adapter();
    let objects = adapter.keys(KeySpace::Object.prefix())?.len();
    let index_entries = adapter.keys(KeySpace::Index.prefix())?.len();
    let stats = store.stats();
    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({
                "location": adapter.location(),
                "codec": store.codec().to_string(),
                "objects": objects,
                "index_entries": index_entries,
                "counters": stats,
            })
        ),
        OutputFormat::Text => {
            println!("Store: {}", adapter.location().bold());
            println!("  Codec: {}", store.codec().to_string().cyan());
            println!("  Objects: {}", objects.to_string().bold());
            println!("  Index entries: {}", index_entries.to_string().bold());
            println!(
                "  Adapter reads/writes/deletes: {}/{}/{}",
                stats.adapter_reads, stats.adapter_writes, stats.adapter_deletes
            );
        }
    }
    Ok(())
}

fn cmd_compact(config: &StoreConfig, format: OutputFormat) -> anyhow::Result<()> {
    let AdapterConfig::File { path, sync } = &config.adapter else {
        bail!("compaction needs a file adapter; pass --data or configure one");
    };
    let adapter = FileAdapter::open(path, *sync, config.lock_timeout())
        .with_context(|| format!("failed to open {}", path.display()))?;
    let report = adapter.compact().context("compaction failed")?;
    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({
                "records_kept": report.records_kept,
                "bytes_before": report.bytes_before,
                "bytes_after": report.bytes_after,
            })
        ),
        OutputFormat::Text => println!(
            "{} Compacted {}: {} records, {} -> {} bytes",
            "✓".green(),
            path.display(),
            report.records_kept,
            report.bytes_before,
            report.bytes_after
        ),
    }
    Ok(())
}

fn cmd_config(config: &StoreConfig) -> anyhow::Result<()> {
    print!("{}", config.to_toml_string()?);
    Ok(())
}

fn print_record(live: &Live<Record>, format: OutputFormat) -> anyhow::Result<()> {
    let record = live.read();
    match format {
        OutputFormat::Json => println!(
            "{}",
            json!({
                "id": live.identity(),
                "fields": record.fields,
                "indexed": record.indexed,
            })
        ),
        OutputFormat::Text => {
            println!("Record {}", live.identity().as_str().yellow().bold());
            for (key, value) in &record.fields {
                let marker = if record.indexed.contains(key) { "*".cyan() } else { " ".normal() };
                println!(" {marker} {} = {}", key.bold(), value);
            }
        }
    }
    Ok(())
}
