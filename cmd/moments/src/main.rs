//! # moments
//!
//! The entry point that assembles the archive service from its adapters.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use api_adapters::{router, AppState, HttpOptions, Metrics};
use auth_adapters::SharedSecretGate;
use configs::{LogSettings, Settings};
use domains::{namespaces, RateLimitPolicies, RateLimitPolicy, RateLimiter};
use services::{MediaService, MomentService, SubmissionService};
use storage_adapters::{DominantColorExtractor, InMemoryRateLimiter, LocalMediaStore, SqliteArchive};

#[cfg(feature = "redis")]
use storage_adapters::RedisRateLimiter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut settings = Settings::load().context("failed to load settings")?;
    init_tracing(&settings.log);

    // 1. Database
    ensure_sqlite_dir(&settings.database.url).await?;
    let archive = Arc::new(
        SqliteArchive::connect(&settings.database.url, settings.database.max_connections).await?,
    );
    archive.migrate().await?;
    info!(url = %settings.database.url, "database ready");

    // 2. Media storage and colour extraction
    tokio::fs::create_dir_all(&settings.media.root)
        .await
        .with_context(|| format!("failed to create media root {}", settings.media.root.display()))?;
    let media_store = Arc::new(LocalMediaStore::new(
        settings.media.root.clone(),
        &settings.media.url_prefix,
    ));
    let colors = Arc::new(
        DominantColorExtractor::new(Duration::from_secs(settings.color.fetch_timeout_secs))?
            .with_local_store(media_store.clone()),
    );

    // 3. Rate limiting
    let policies = policies(&settings);
    let limiter = build_limiter(&settings, policies.clone())?;

    // 4. Curator gate
    let admin = Arc::new(SharedSecretGate::new(settings.admin.secret.take()));
    if !admin.is_configured() {
        warn!("no admin secret configured; curator endpoints will answer 500");
    }

    // 5. Services and router
    let state = AppState {
        submissions: Arc::new(SubmissionService::new(
            archive.clone(),
            archive.clone(),
            media_store.clone(),
            colors.clone(),
            limiter.clone(),
        )),
        moments: Arc::new(MomentService::new(archive.clone(), colors)),
        media: Arc::new(
            MediaService::new(media_store, limiter.clone())
                .with_max_bytes(settings.media.max_upload_bytes),
        ),
        limiter,
        policies,
        admin,
        metrics: Arc::new(Metrics::new()),
        trust_proxy_headers: settings.server.trust_proxy_headers,
    };
    let options = HttpOptions {
        media_root: Some(settings.media.root.clone()),
        media_prefix: settings.media.url_prefix.clone(),
        cors_origins: settings.server.cors_origins.clone(),
    };
    let app = router(state, &options);

    let address = settings.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {address}"))?;
    info!(%address, "moments archive listening");

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let mut server = tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = stop_rx.changed().await;
        })
        .await
    });

    tokio::select! {
        joined = &mut server => {
            joined??;
            return Ok(());
        }
        () = shutdown_signal() => {}
    }

    let _ = stop_tx.send(true);
    let grace = Duration::from_secs(settings.server.shutdown_grace_secs);
    match tokio::time::timeout(grace, server).await {
        Ok(joined) => joined??,
        Err(_) => warn!(grace_secs = grace.as_secs(), "in-flight requests outlived the grace period"),
    }
    info!("shutdown complete");
    Ok(())
}

fn init_tracing(log: &LogSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let registry = tracing_subscriber::registry().with(filter);
    if log.json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

fn policies(settings: &Settings) -> RateLimitPolicies {
    let quota = |q: configs::QuotaSettings| RateLimitPolicy {
        hourly: q.hourly,
        daily: q.daily,
    };
    RateLimitPolicies::new(RateLimitPolicy::default())
        .with(namespaces::SUBMISSION, quota(settings.rate_limit.submission))
        .with(namespaces::UPLOAD, quota(settings.rate_limit.upload))
}

fn build_limiter(
    settings: &Settings,
    policies: RateLimitPolicies,
) -> anyhow::Result<Arc<dyn RateLimiter>> {
    #[cfg(feature = "redis")]
    if let Some(url) = &settings.redis.url {
        info!("rate limits shared through redis");
        return Ok(Arc::new(RedisRateLimiter::new(
            url,
            settings.redis.pool_size,
            policies,
        )?));
    }

    #[cfg(not(feature = "redis"))]
    if settings.redis.url.is_some() {
        warn!("redis.url is set but this build lacks the redis feature; using in-memory limits");
    }

    let limiter = Arc::new(InMemoryRateLimiter::new(policies));
    spawn_purge(
        limiter.clone(),
        Duration::from_secs(settings.rate_limit.purge_interval_secs.max(1)),
    );
    Ok(limiter)
}

/// Sweeps records whose day window has lapsed so idle identities do not pile up.
fn spawn_purge(limiter: Arc<InMemoryRateLimiter>, every: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let purged = limiter.purge_expired(chrono::Utc::now());
            if purged > 0 {
                info!(purged, remaining = limiter.len(), "purged expired rate limit records");
            }
        }
    });
}

/// SQLite creates the file but not its directory.
async fn ensure_sqlite_dir(url: &str) -> anyhow::Result<()> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .map(|rest| rest.split('?').next().unwrap_or(rest))
        .filter(|p| !p.is_empty() && !p.contains(":memory:"));

    if let Some(parent) = path.and_then(|p| Path::new(p).parent()) {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create database directory {}", parent.display()))?;
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("received SIGINT"); }
        () = terminate => { info!("received SIGTERM"); }
    }
}
