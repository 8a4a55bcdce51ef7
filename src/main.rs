use std::{process, sync::Arc};

use mensa::{
    application::{
        catalog::{CatalogService, ReferenceCatalog},
        error::AppError,
        fixup::{FixupReport, fixup_cache},
        jobs::{FetchJobContext, run_fetch_job, spawn_fetch_loop},
        plans::PlansService,
        source::PlanSource,
    },
    cache::PlanCache,
    config,
    infra::{
        catalog::StaticCatalog,
        error::InfraError,
        http::{self, HttpState},
        source::RemotePlanSource,
        storage::DirectoryStorage,
        telemetry,
    },
    util::timezone::today_in,
};
use tokio::signal;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Fixup(_) => run_fixup(settings).await,
        config::Command::Fetch(_) => run_fetch(settings).await,
    }
}

fn open_cache(settings: &config::Settings) -> Result<Arc<PlanCache>, AppError> {
    let storage = DirectoryStorage::new(&settings.cache.directory).map_err(InfraError::from)?;
    info!(
        target = "mensa::cache",
        directory = %storage.root().display(),
        "Plan cache opened"
    );
    Ok(Arc::new(PlanCache::new(Arc::new(storage))))
}

fn load_catalog(settings: &config::Settings) -> Result<Arc<StaticCatalog>, AppError> {
    let catalog = StaticCatalog::load(&settings.catalog)
        .map_err(|err| InfraError::catalog(err.to_string()))?;
    Ok(Arc::new(catalog))
}

fn remote_source(settings: &config::Settings) -> Result<Option<Arc<dyn PlanSource>>, AppError> {
    let source = RemotePlanSource::from_settings(&settings.fetch)?;
    Ok(source.map(|source| Arc::new(source) as Arc<dyn PlanSource>))
}

async fn reconcile(
    cache: &PlanCache,
    catalog: &dyn ReferenceCatalog,
    dry_run: bool,
) -> Result<FixupReport, AppError> {
    let report = fixup_cache(cache, catalog, |date| {
        info!(target = "mensa::fixup", %date, dry_run, "fixup {date}");
        !dry_run
    })
    .await?;

    info!(
        target = "mensa::fixup",
        scanned = report.scanned,
        reconciled = report.reconciled.len(),
        written = report.written.len(),
        failures = report.failures.len(),
        "Fixup pass finished"
    );
    Ok(report)
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let cache = open_cache(&settings)?;
    let catalog = load_catalog(&settings)?;

    if settings.fixup.on_startup {
        reconcile(&cache, catalog.as_ref(), settings.fixup.dry_run).await?;
    }

    let fetch_handle = if settings.fetch.enabled {
        match remote_source(&settings)? {
            Some(source) => Some(spawn_fetch_loop(FetchJobContext {
                cache: cache.clone(),
                source,
                future_days: settings.fetch.simplesite.future_days,
                timezone: settings.fetch.timezone,
                interval: settings.fetch.interval,
            })),
            None => {
                warn!(
                    target = "mensa::fetch",
                    source = %settings.fetch.source,
                    "No upstream URL configured; periodic fetching is disabled"
                );
                None
            }
        }
    } else {
        None
    };

    let state = HttpState {
        plans: PlansService::new(cache),
        catalog: CatalogService::new(catalog),
    };
    let result = serve_http(&settings, state).await;

    if let Some(handle) = fetch_handle {
        handle.abort();
        let _ = handle.await;
    }

    result
}

async fn run_fixup(settings: config::Settings) -> Result<(), AppError> {
    let cache = open_cache(&settings)?;
    let catalog = load_catalog(&settings)?;

    let report = reconcile(&cache, catalog.as_ref(), settings.fixup.dry_run).await?;
    for failure in &report.failures {
        warn!(
            target = "mensa::fixup",
            date = %failure.date,
            error = %failure.error,
            "Entry left unreconciled"
        );
    }

    if report.is_clean() {
        Ok(())
    } else {
        Err(AppError::unexpected(format!(
            "fixup failed for {} of {} cached dates",
            report.failures.len(),
            report.scanned
        )))
    }
}

async fn run_fetch(settings: config::Settings) -> Result<(), AppError> {
    let cache = open_cache(&settings)?;
    let Some(source) = remote_source(&settings)? else {
        warn!(
            target = "mensa::fetch",
            source = %settings.fetch.source,
            "No upstream URL configured; nothing to fetch"
        );
        return Ok(());
    };

    let ctx = FetchJobContext {
        cache,
        source,
        future_days: settings.fetch.simplesite.future_days,
        timezone: settings.fetch.timezone,
        interval: settings.fetch.interval,
    };
    let today = today_in(ctx.timezone)
        .map_err(|err| AppError::unexpected(format!("failed to determine today's date: {err}")))?;
    let outcome = run_fetch_job(&ctx, today)
        .await
        .map_err(|err| AppError::unexpected(format!("fetch failed: {err}")))?;

    info!(
        target = "mensa::fetch",
        stored = outcome.stored.len(),
        rejected = outcome.rejected.len(),
        failures = outcome.failures.len(),
        "Fetch run finished"
    );

    if outcome.failures.is_empty() {
        Ok(())
    } else {
        Err(AppError::unexpected(format!(
            "failed to store plans for {} dates",
            outcome.failures.len()
        )))
    }
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state, &settings.server)?;

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "mensa::http",
        addr = %settings.server.addr,
        base = %settings.server.base,
        "Listening"
    );

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!(target = "mensa::http", "Received Ctrl+C, shutting down"),
            Err(err) => {
                error!(target = "mensa::http", error = %err, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!(target = "mensa::http", "Received terminate signal, shutting down");
            }
            Err(err) => {
                error!(target = "mensa::http", error = %err, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
