use anyhow::Context;
use clap::Parser;
use findthatpostcode::adapters::{ElasticsearchStore, LocalBlobStore};
use findthatpostcode::app::indices::create_indices;
use findthatpostcode::config::{BlobBackend, Cli, Command, ImportArgs, Settings};
use findthatpostcode::core::ImportJob;
use findthatpostcode::domain::ports::{BlobStore, DocumentStore};
use findthatpostcode::utils::error::{ErrorSeverity, EtlError};
use findthatpostcode::utils::{logger, validation::Validate};
use findthatpostcode::{
    build_router, job_for, AppState, AreaNameCache, ImportContext, ImportEngine, QueryService,
};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.log_json {
        logger::init_json_logger(cli.verbose);
    } else {
        logger::init_cli_logger(cli.verbose);
    }
    tracing::info!("Starting findthatpostcode");
    if cli.verbose {
        tracing::debug!("CLI arguments: {:?}", cli);
    }

    let settings = match load_settings(&cli) {
        Ok(settings) => settings,
        Err(e) => {
            tracing::error!("❌ Configuration validation failed: {}", e);
            tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
            eprintln!("❌ {}", e.user_friendly_message());
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Command::Serve { .. } => serve(settings).await,
        Command::Import(args) => import(settings, args).await,
        Command::InitDb { reset } => init_db(settings, reset).await,
    };

    if let Err(e) = result {
        let Some(etl_error) = e.downcast_ref::<EtlError>() else {
            tracing::error!("❌ {:#}", e);
            eprintln!("❌ {:#}", e);
            std::process::exit(1);
        };
        tracing::error!(
            "❌ Command failed: {} (Category: {:?}, Severity: {:?})",
            etl_error,
            etl_error.category(),
            etl_error.severity()
        );
        eprintln!("❌ {}", etl_error.user_friendly_message());
        eprintln!("💡 Suggestion: {}", etl_error.recovery_suggestion());

        let exit_code = match etl_error.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };
        if exit_code > 0 {
            std::process::exit(exit_code);
        }
    }

    Ok(())
}

fn load_settings(cli: &Cli) -> findthatpostcode::Result<Settings> {
    let mut settings = Settings::load(cli.config.as_deref())?;
    match &cli.command {
        Command::Serve { bind: Some(bind) } => settings.bind_addr = bind.clone(),
        Command::Import(args) => {
            args.validate()?;
            if let Some(size) = args.batch_size {
                settings.batch_size = size;
            }
        }
        _ => {}
    }
    settings.validate()?;
    Ok(settings)
}

async fn blob_store(settings: &Settings) -> findthatpostcode::Result<Arc<dyn BlobStore>> {
    match settings.blobs.backend {
        BlobBackend::Local => Ok(Arc::new(LocalBlobStore::new(&settings.blobs.local_path))),
        #[cfg(feature = "s3")]
        BlobBackend::S3 => Ok(Arc::new(
            findthatpostcode::adapters::S3BlobStore::from_settings(&settings.blobs).await,
        )),
        #[cfg(not(feature = "s3"))]
        BlobBackend::S3 => Err(EtlError::ConfigError {
            message: "S3 blob storage needs a build with the s3 feature".to_string(),
        }),
    }
}

fn document_store(settings: &Settings) -> findthatpostcode::Result<Arc<dyn DocumentStore>> {
    tracing::info!("Using document store at {}", settings.es_url);
    Ok(Arc::new(ElasticsearchStore::new(&settings.es_url)?))
}

async fn serve(settings: Settings) -> anyhow::Result<()> {
    let names = AreaNameCache::shared(
        settings.cache_capacity,
        Duration::from_secs(settings.cache_ttl_seconds),
    );
    let service = QueryService::new(document_store(&settings)?, settings.indices(), names)
        .with_blobs(blob_store(&settings).await?);
    let app = build_router(AppState::new(service));

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("binding {}", settings.bind_addr))?;
    tracing::info!("🌐 Listening on http://{}", settings.bind_addr);
    println!("🌐 Listening on http://{}", settings.bind_addr);

    axum::serve(listener, app).await.context("server stopped")?;
    Ok(())
}

async fn import(settings: Settings, args: ImportArgs) -> anyhow::Result<()> {
    if args.monitor {
        tracing::info!("🔍 System monitoring enabled");
    }

    let job = job_for(args.dataset, &args.job_options())?;
    let mut ctx = ImportContext::new(document_store(&settings)?, settings.indices())
        .with_batch_size(settings.batch_size)
        .with_debug_limit(args.debug_limit);
    if args.needs_blob_store() {
        ctx = ctx.with_blobs(blob_store(&settings).await?);
    }

    let engine = ImportEngine::new_with_monitoring(args.monitor);
    let summary = engine.run(job.as_ref(), &ctx).await?;

    println!("✅ {} import finished", job.name());
    println!(
        "📦 {} documents sent, {} saved, {} rows skipped",
        summary.total, summary.saved, summary.skipped_rows
    );
    if !summary.failures.is_empty() {
        println!("⚠️  {} documents rejected by the store", summary.failures.len());
        for failure in summary.failures.iter().take(10) {
            println!(
                "   {} ({}): {} {}",
                failure.id, failure.status, failure.error_type, failure.reason
            );
        }
    }
    Ok(())
}

async fn init_db(settings: Settings, reset: bool) -> anyhow::Result<()> {
    let store = document_store(&settings)?;
    let indices = settings.indices();
    create_indices(store.as_ref(), &indices, reset).await?;
    println!(
        "✅ Indices ready: {}, {}, {}, {}",
        indices.area, indices.entity, indices.postcode, indices.placename
    );
    Ok(())
}
