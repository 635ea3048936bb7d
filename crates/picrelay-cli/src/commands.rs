use anyhow::Context;
use colored::Colorize;
use picrelay_core::{reconcile, ReconcileReport, RepositoryAllocator};
use picrelay_server::{content_api, open_store, PicrelayServer, ServerConfig};
use picrelay_types::UploadRecord;
use serde_json::json;

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = ServerConfig::load(cli.config.as_deref()).context("loading configuration")?;
    match cli.command {
        Command::Serve(args) => cmd_serve(config, args).await,
        Command::Init(args) => cmd_init(&config, args).await,
        Command::Status => cmd_status(&config, cli.format).await,
        Command::Records(args) => cmd_records(&config, args, cli.format).await,
        Command::Reconcile => cmd_reconcile(&config, cli.format).await,
    }
}

async fn cmd_serve(mut config: ServerConfig, args: ServeArgs) -> anyhow::Result<()> {
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    let server = PicrelayServer::build(config).await.context("starting server")?;
    server.serve().await?;
    Ok(())
}

async fn cmd_init(config: &ServerConfig, args: InitArgs) -> anyhow::Result<()> {
    let store = open_store(config).await.context("opening metadata store")?;
    store.ensure_schema().await.context("creating schema")?;
    if args.reset {
        store.reset().await.context("resetting metadata store")?;
        println!("{} Cleared rotation counter and upload log", "✓".green().bold());
    }
    println!("{} Metadata store ready ({})", "✓".green().bold(), store.backend().cyan());
    Ok(())
}

async fn cmd_status(config: &ServerConfig, format: OutputFormat) -> anyhow::Result<()> {
    let repositories = config.repository_list()?;
    let store = open_store(config).await.context("opening metadata store")?;
    let counter = store.current_counter().await.context("reading rotation counter")?;
    let allocator = RepositoryAllocator::new(store.clone(), repositories);
    let next = allocator.peek().await?;

    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "store": store.backend(),
                "counter": counter,
                "repositories": allocator.repositories().iter().map(|r| r.as_str()).collect::<Vec<_>>(),
                "next_repository": next.repository.as_str(),
            }))?
        ),
        OutputFormat::Text => {
            println!("Store: {}", store.backend().cyan());
            println!("Rotation counter: {}", counter.to_string().bold());
            println!("Repositories ({}):", allocator.repositories().len());
            for (i, repository) in allocator.repositories().iter().enumerate() {
                if i as u64 == next.index {
                    println!("  {} {}", "→".green().bold(), repository.as_str().green().bold());
                } else {
                    println!("    {repository}");
                }
            }
        }
    }
    Ok(())
}

async fn cmd_records(config: &ServerConfig, args: RecordsArgs, format: OutputFormat) -> anyhow::Result<()> {
    let store = open_store(config).await.context("opening metadata store")?;
    let records = store.list_records(args.limit).await.context("reading upload log")?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&records)?),
        OutputFormat::Text if records.is_empty() => println!("No uploads recorded."),
        OutputFormat::Text => {
            for record in &records {
                print_record(record);
            }
        }
    }
    Ok(())
}

fn print_record(record: &UploadRecord) {
    println!(
        "{} {} {} {}",
        format!("#{}", record.id).yellow(),
        record.uploaded_at.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
        record.repository.as_str().cyan(),
        record.object_name,
    );
    println!("    {}", record.public_url.blue());
}

async fn cmd_reconcile(config: &ServerConfig, format: OutputFormat) -> anyhow::Result<()> {
    let repositories = config.repository_list()?;
    let store = open_store(config).await.context("opening metadata store")?;
    let api = content_api(config)?;
    let report = reconcile(
        store.as_ref(),
        api.as_ref(),
        &repositories,
        &config.uploader_settings(),
    )
    .await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_report(&report),
    }
    if !report.is_consistent() {
        anyhow::bail!(
            "{} orphaned objects, {} missing objects, {} records for unconfigured repositories",
            report.orphaned_count(),
            report.missing_count(),
            report.unlisted_records.len()
        );
    }
    if !report.is_complete() {
        anyhow::bail!(
            "listing truncated for {} repositories; missing objects were not checked there",
            report.truncated_repositories().count()
        );
    }
    Ok(())
}

fn print_report(report: &ReconcileReport) {
    for repo in &report.repositories {
        let mark = if repo.is_consistent() { "✓".green().bold() } else { "✗".red().bold() };
        println!(
            "{mark} {}: {} remote, {} recorded",
            repo.repository.bold(),
            repo.remote_objects,
            repo.recorded
        );
        if repo.truncated {
            println!("    {} listing truncated by remote; missing objects not checked", "!".yellow().bold());
        }
        for name in &repo.orphaned {
            println!("    {} {name}", "orphaned:".yellow());
        }
        for name in &repo.missing {
            println!("    {} {name}", "missing:".red());
        }
    }
    for record in &report.unlisted_records {
        println!(
            "{} record #{} names unconfigured repository {}",
            "!".yellow().bold(),
            record.id,
            record.repository.as_str().bold()
        );
    }
    if report.is_consistent() && report.is_complete() {
        println!("{} Upload log matches repository contents", "✓".green().bold());
    }
}
