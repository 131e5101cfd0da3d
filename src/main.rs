//! Importer binary: `import`, `enrich` and `verify` subcommands
//!
//! Configuration comes from `IMPORT_*` environment variables; the only
//! flags are the subcommand itself and `--dry-run` for imports. Startup
//! failures (robots.txt disallow without override, bad configuration)
//! exit non-zero immediately; per-URL failures never do.

use horeca_importer::application::{run_enrich, run_import, run_verify, PipelineContext};
use horeca_importer::infrastructure::{init_logging, AppConfig};
use tracing::error;

fn print_usage() {
    eprintln!("Usage: horeca-importer <command> [--dry-run]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  import    crawl the supplier and upsert products into the store");
    eprintln!("  enrich    refetch thin records and backfill specs/descriptions/images");
    eprintln!("  verify    dedup, repair and rewrite the store deterministically");
    eprintln!();
    eprintln!("Configuration via IMPORT_* environment variables (IMPORT_BASE_URL,");
    eprintln!("IMPORT_STRATEGY=crawl|sitemap, IMPORT_MODE=file|db, IMPORT_CONCURRENCY, ...)");
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    let Some(command) = args.get(1).map(String::as_str) else {
        print_usage();
        std::process::exit(2);
    };
    let dry_run = args.iter().any(|a| a == "--dry-run");

    if let Err(err) = run(command, dry_run).await {
        error!("{:#}", err);
        eprintln!("fatal: {err:#}");
        std::process::exit(1);
    }
}

async fn run(command: &str, dry_run: bool) -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    let _log_guard = init_logging(&config.log_dir)?;

    match command {
        "import" => {
            let ctx = PipelineContext::build(config, "import_run").await?;
            run_import(ctx, dry_run).await?;
        }
        "enrich" => {
            let ctx = PipelineContext::build(config, "enrich_run").await?;
            run_enrich(ctx).await?;
        }
        "verify" => {
            let ctx = PipelineContext::build(config, "verify_run").await?;
            run_verify(ctx).await?;
        }
        other => {
            eprintln!("unknown command: {other}");
            print_usage();
            std::process::exit(2);
        }
    }
    Ok(())
}
