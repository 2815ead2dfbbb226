use std::{future::IntoFuture, process, sync::Arc};

use scribbly::{
    application::{
        auth::{AuthService, CreateUserCommand},
        error::AppError,
        feed::FeedService,
        follows::FollowService,
        groups::{CreateGroupCommand, GroupService},
        posts::{ImageStore, PostService},
        profile::ProfileService,
        repos::{
            CommentsRepo, FollowsRepo, GroupsRepo, PostsRepo, PostsWriteRepo, SessionsRepo,
            UsersRepo,
        },
    },
    cache::{CacheConfig, CacheTrigger, PageCacheState, PageStore},
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState},
        telemetry,
        uploads::UploadStorage,
    },
};
use tokio::{net::TcpListener, sync::Notify};
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
        config::Command::CreateUser(args) => run_create_user(settings, args).await,
        config::Command::CreateGroup(args) => run_create_group(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let state = build_http_state(repositories, &settings)?;
    serve_http(&settings, state).await
}

async fn run_create_user(
    settings: config::Settings,
    args: config::CreateUserArgs,
) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let auth = AuthService::new(
        repositories.clone() as Arc<dyn UsersRepo>,
        repositories as Arc<dyn SessionsRepo>,
        settings.auth.session_ttl,
    );

    auth.create_user(CreateUserCommand {
        username: args.username,
        password: args.password,
        first_name: args.first_name,
        last_name: args.last_name,
        email: args.email,
    })
    .await?;
    Ok(())
}

async fn run_create_group(
    settings: config::Settings,
    args: config::CreateGroupArgs,
) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let groups = GroupService::new(repositories as Arc<dyn GroupsRepo>);

    groups
        .create_group(CreateGroupCommand {
            title: args.title,
            slug: args.slug,
            description: args.description,
        })
        .await?;
    Ok(())
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn build_http_state(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<HttpState, AppError> {
    let posts_repo: Arc<dyn PostsRepo> = repositories.clone();
    let posts_write: Arc<dyn PostsWriteRepo> = repositories.clone();
    let users_repo: Arc<dyn UsersRepo> = repositories.clone();
    let groups_repo: Arc<dyn GroupsRepo> = repositories.clone();
    let comments_repo: Arc<dyn CommentsRepo> = repositories.clone();
    let follows_repo: Arc<dyn FollowsRepo> = repositories.clone();
    let sessions_repo: Arc<dyn SessionsRepo> = repositories.clone();

    let uploads = UploadStorage::new(settings.uploads.directory.clone())
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    let images: Arc<dyn ImageStore> = Arc::new(uploads);

    let cache_config = CacheConfig::from(&settings.cache);
    let (cache_state, cache_trigger) = if cache_config.enabled {
        let store = Arc::new(PageStore::new(&cache_config));
        let trigger = Arc::new(CacheTrigger::new(cache_config.clone(), store.clone()));
        (
            Some(PageCacheState {
                config: cache_config,
                store,
            }),
            Some(trigger),
        )
    } else {
        warn!("Index page cache disabled");
        (None, None)
    };

    let feed = FeedService::new(
        posts_repo.clone(),
        users_repo.clone(),
        groups_repo.clone(),
        comments_repo.clone(),
    )
    .with_page_size(settings.feed.page_size);

    let posts = PostService::new(
        posts_repo,
        posts_write,
        comments_repo,
        users_repo.clone(),
        groups_repo,
        images,
    )
    .with_cache_trigger_opt(cache_trigger);

    let follows = FollowService::new(follows_repo, users_repo.clone());
    let profiles = ProfileService::new(users_repo.clone(), follows.clone());
    let auth = AuthService::new(users_repo, sessions_repo, settings.auth.session_ttl);

    Ok(HttpState {
        feed: Arc::new(feed),
        posts: Arc::new(posts),
        follows: Arc::new(follows),
        profiles: Arc::new(profiles),
        auth: Arc::new(auth),
        auth_settings: Arc::new(settings.auth.clone()),
        cache: cache_state,
        db: Some(repositories),
    })
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let body_limit = usize::try_from(settings.uploads.max_request_bytes.get())
        .map_err(|_| AppError::validation("uploads.max_request_bytes does not fit in memory"))?;
    let router = http::build_router(state, body_limit);

    let listener = TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "Listening");

    let grace = settings.server.graceful_shutdown;
    let requested = Arc::new(Notify::new());
    let server = axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown({
            let requested = requested.clone();
            async move {
                shutdown_signal().await;
                info!(grace_secs = grace.as_secs(), "Shutdown requested; draining connections");
                requested.notify_one();
            }
        })
        .into_future();

    // Open connections get `grace` to finish once shutdown starts.
    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        _ = async {
            requested.notified().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!("Grace period elapsed; dropping open connections");
        }
    }

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
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
                warn!(error = %err, "failed to listen for SIGTERM");
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
