use std::{future::IntoFuture, process, sync::Arc, time::Duration};

use quaderno::{
    application::{
        audit::AuditService,
        auth::{SessionManager, TokenIssuer, TokenStore, verifier_for},
        error::AppError,
        posts::PostService,
        repos::{AuditRepo, PostsRepo, TokensRepo, UploadsRepo, UsersRepo},
        uploads::UploadService,
    },
    cache::{CacheConfig, CachedPostsRepo, PostCache},
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, AppState, HealthProbe},
        memory::MemoryRepositories,
        telemetry,
        uploads::UploadStorage,
    },
};
use tokio::{net::TcpListener, sync::watch, task::JoinHandle};
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

const TOKEN_PURGE_INTERVAL: Duration = Duration::from_secs(15 * 60);

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
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let state = build_state(&settings, repositories)?;

    let purge_handle = spawn_token_purge(state.sessions.clone());
    let result = serve_http(&settings, state).await;

    purge_handle.abort();
    let _ = purge_handle.await;

    result
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let database_url = settings
        .database
        .url
        .as_deref()
        .ok_or_else(|| AppError::validation("migrate requires database.url"))?;

    let pool =
        PostgresRepositories::connect(database_url, settings.database.max_connections.get())
            .await
            .map_err(|err| AppError::from(InfraError::from(err)))?;
    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(target = "quaderno::migrate", "migrations applied");
    Ok(())
}

struct Repositories {
    users: Arc<dyn UsersRepo>,
    posts: Arc<dyn PostsRepo>,
    tokens: Arc<dyn TokensRepo>,
    uploads: Arc<dyn UploadsRepo>,
    audit: Arc<dyn AuditRepo>,
    health: HealthProbe,
}

async fn init_repositories(settings: &config::Settings) -> Result<Repositories, AppError> {
    let Some(database_url) = settings.database.url.as_deref() else {
        warn!(
            target = "quaderno::bootstrap",
            "database.url is not configured; using in-memory repositories"
        );
        let repositories = Arc::new(MemoryRepositories::new());
        return Ok(Repositories {
            users: repositories.clone(),
            posts: repositories.clone(),
            tokens: repositories.clone(),
            uploads: repositories.clone(),
            audit: repositories.clone(),
            health: HealthProbe::Memory(repositories),
        });
    };

    let pool =
        PostgresRepositories::connect(database_url, settings.database.max_connections.get())
            .await
            .map_err(|err| AppError::from(InfraError::from(err)))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    let repositories = Arc::new(PostgresRepositories::new(pool));
    Ok(Repositories {
        users: repositories.clone(),
        posts: repositories.clone(),
        tokens: repositories.clone(),
        uploads: repositories.clone(),
        audit: repositories.clone(),
        health: HealthProbe::Postgres(repositories),
    })
}

fn build_state(
    settings: &config::Settings,
    repositories: Repositories,
) -> Result<AppState, AppError> {
    let audit = AuditService::new(repositories.audit);

    let cache_config = CacheConfig::from(&settings.cache);
    let posts_repo: Arc<dyn PostsRepo> = if cache_config.enabled {
        let cache = Arc::new(PostCache::for_posts(&cache_config));
        Arc::new(CachedPostsRepo::new(
            repositories.posts,
            cache,
            cache_config.post_ttl(),
        ))
    } else {
        repositories.posts
    };

    let store = TokenStore::new(repositories.tokens);
    let issuer = TokenIssuer::new(
        &settings.auth.jwt_secret,
        settings.auth.access_token_ttl,
        settings.auth.refresh_token_ttl,
        store.clone(),
    );
    let verifier = verifier_for(
        settings.auth.password_scheme,
        &settings.auth.password_secret,
    );
    let sessions = Arc::new(SessionManager::new(
        repositories.users,
        verifier,
        issuer,
        store,
        audit.clone(),
    ));

    let upload_storage = Arc::new(
        UploadStorage::new(settings.uploads.directory.clone())
            .map_err(|err| AppError::from(InfraError::Io(err)))?,
    );
    info!(
        target = "quaderno::bootstrap",
        directory = %upload_storage.root().display(),
        "upload storage ready"
    );
    let uploads = Arc::new(UploadService::new(
        repositories.uploads,
        upload_storage,
        audit.clone(),
        settings.uploads.max_request_bytes.get(),
    ));

    Ok(AppState {
        sessions,
        posts: Arc::new(PostService::new(posts_repo, audit)),
        uploads,
        health: repositories.health,
    })
}

fn spawn_token_purge(sessions: Arc<SessionManager>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(TOKEN_PURGE_INTERVAL);
        interval.tick().await;
        loop {
            interval.tick().await;
            match sessions.purge_expired_tokens().await {
                Ok(0) => {}
                Ok(purged) => info!(
                    target = "quaderno::auth::purge",
                    purged, "expired refresh tokens removed"
                ),
                Err(err) => warn!(
                    target = "quaderno::auth::purge",
                    error = %err,
                    "failed to purge expired refresh tokens"
                ),
            }
        }
    })
}

async fn serve_http(settings: &config::Settings, state: AppState) -> Result<(), AppError> {
    let upload_body_limit = usize::try_from(settings.uploads.max_request_bytes.get())
        .unwrap_or(usize::MAX);
    let router = http::build_router(state, upload_body_limit);

    let listener = TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(
        target = "quaderno::bootstrap",
        addr = %settings.server.addr,
        "listening"
    );

    let (stopping_tx, mut stopping_rx) = watch::channel(false);
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = stopping_tx.send(true);
        })
        .into_future();

    let grace = settings.server.graceful_shutdown;
    let deadline = async move {
        if stopping_rx.wait_for(|stopping| *stopping).await.is_err() {
            // Sender dropped without a signal: the server already finished.
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        result = server => result.map_err(|err| AppError::from(InfraError::server(err.to_string())))?,
        _ = deadline => {
            warn!(
                target = "quaderno::bootstrap",
                grace_seconds = grace.as_secs(),
                "graceful shutdown timed out; dropping open connections"
            );
        }
    }

    info!(target = "quaderno::bootstrap", "server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(target = "quaderno::bootstrap", error = %err, "failed to listen for ctrl-c");
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
                warn!(target = "quaderno::bootstrap", error = %err, "failed to listen for SIGTERM");
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

    info!(target = "quaderno::bootstrap", "shutdown signal received");
}
