mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tokio::sync::watch;
use tracing::{error, info, warn};

use beacon_api::ingress::EventIngress;
use beacon_api::qrlogin::QrLogin;
use beacon_api::state::AppStateInner;
use beacon_db::Database;
use beacon_db::cache::{FastCache, MemoryCache, RedisCache};
use beacon_db::directory::SqlDirectory;
use beacon_presence::PresenceTracker;
use beacon_presence::announce::OnlineAnnouncer;
use beacon_presence::imcore::HttpImCore;
use beacon_presence::sweep::run_sweep_loop;
use beacon_presence::weights::DeviceWeights;
use beacon_push::dispatch::OfflinePushDispatcher;
use beacon_push::payload::PayloadBuilder;
use beacon_push::pool::DispatchWorkerPool;
use beacon_push::registry::PusherRegistry;
use beacon_push::resolver::NameAndBadgeResolver;
use beacon_push::router::PushRouter;
use beacon_push::target::PushTargetStore;
use beacon_types::directory::ImCore;

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "beacon=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Storage
    let db = Arc::new(Database::open(&PathBuf::from(&config.db_path), config.message_table_count)?);
    let cache: Arc<dyn FastCache> = match &config.redis_url {
        Some(url) => Arc::new(RedisCache::connect(url).await?),
        None => {
            warn!("BEACON_REDIS_URL not set, using in-process cache");
            Arc::new(MemoryCache::new())
        }
    };
    let directory = Arc::new(SqlDirectory::new(db.clone()));
    let im: Arc<dyn ImCore> = Arc::new(HttpImCore::new(&config.im_api_url)?);

    // Offline push
    let registry = PusherRegistry::from_config(&config.push, cache.clone())?;
    if registry.is_empty() {
        warn!("No push providers configured, offline pushes will be dropped");
    } else {
        info!(providers = registry.len(), "Push providers registered");
    }
    let targets = PushTargetStore::new(cache.clone());
    let resolver = NameAndBadgeResolver::new(cache.clone(), directory.clone(), config.name_cache_ttl);
    let router = PushRouter::new(
        targets.clone(),
        Arc::new(registry),
        PayloadBuilder::new(resolver, config.push_locale, config.push_detail),
    );
    let pool = Arc::new(DispatchWorkerPool::new(config.push_workers, config.push_queue));
    let dispatcher = Arc::new(OfflinePushDispatcher::new(
        directory.clone(),
        directory.clone(),
        router,
        pool.clone(),
    ));

    // Presence
    let weights = Arc::new(DeviceWeights::load(&db)?);
    let tracker = Arc::new(PresenceTracker::new(db.clone(), weights));
    let announcer = Arc::new(OnlineAnnouncer::new(tracker.clone(), directory, im.clone()));

    let mut ingress = EventIngress::new(db).with_dispatcher(dispatcher);
    ingress.add_presence_listener(tracker.clone());
    ingress.add_presence_listener(announcer);

    let state = Arc::new(AppStateInner {
        ingress,
        presence: tracker.clone(),
        targets,
        qr: QrLogin::new(cache),
        jwt_secret: config.jwt_secret.clone(),
    });

    // Background reconciliation against the IM core
    let sweep = tokio::spawn(run_sweep_loop(tracker, im, config.sweep_interval_secs));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    // gRPC webhook ingress
    let grpc_addr: SocketAddr = config.grpc_addr.parse()?;
    let grpc_server = tonic::transport::Server::builder()
        .add_service(beacon_api::grpc_service(state.clone()))
        .serve_with_shutdown(grpc_addr, wait_for_shutdown(shutdown_rx.clone()));
    let grpc = tokio::spawn(async move {
        if let Err(e) = grpc_server.await {
            error!("gRPC server error: {}", e);
        }
    });
    info!("Webhook gRPC service listening on {}", grpc_addr);

    let app = beacon_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Beacon server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown(shutdown_rx))
        .await?;

    let _ = grpc.await;
    sweep.abort();
    info!("Draining push queue ({} queued so far)", pool.submitted().saturating_sub(pool.completed()));
    pool.shutdown().await;
    info!("Shutdown complete");

    Ok(())
}

async fn wait_for_shutdown(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
