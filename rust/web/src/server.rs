use std::convert::Infallible;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use warp::filters::body::BodyDeserializeError;
use warp::filters::BoxedFilter;
use warp::http::StatusCode;
use warp::reject::{InvalidQuery, MethodNotAllowed, PayloadTooLarge};
use warp::reply::{Reply, Response};
use warp::{Filter, Rejection};

use crate::config::ServerConfig;
use crate::errors::{ApiError, ErrorResponse, IntoErrorResponse};
use crate::handlers;
use crate::hub::Hub;
use crate::middleware::access_log;
use crate::persistence::{MemoryPersistence, Persistence, PersistenceError, SqlitePersistence};
use crate::store::GameStore;

/// Largest JSON request body accepted by the REST routes.
const MAX_BODY_BYTES: u64 = 16 * 1024;

/// Shared services handed to every handler.
#[derive(Debug, Clone)]
pub struct AppContext {
    config: Arc<ServerConfig>,
    store: Arc<GameStore>,
    hub: Hub,
    persistence: Arc<dyn Persistence>,
}

impl AppContext {
    /// Opens the configured storage and spawns the hub; needs a tokio runtime.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        config
            .validate()
            .map_err(|err| ServerError::ConfigError(err.to_string()))?;

        let persistence: Arc<dyn Persistence> = match &config.database_path {
            Some(path) => {
                tracing::info!(path = %path.display(), "opening sqlite database");
                Arc::new(SqlitePersistence::open(path)?)
            }
            None => {
                tracing::info!("no database configured, keeping records in memory");
                Arc::new(MemoryPersistence::new())
            }
        };
        let (hub, _task) = Hub::spawn(config.ws.send_queue);

        Ok(Self::new_with_dependencies(
            config,
            Arc::new(GameStore::new()),
            hub,
            persistence,
        ))
    }

    pub fn new_with_dependencies(
        config: ServerConfig,
        store: Arc<GameStore>,
        hub: Hub,
        persistence: Arc<dyn Persistence>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            store,
            hub,
            persistence,
        }
    }

    pub fn new_for_tests() -> Self {
        Self::new(ServerConfig::for_tests()).expect("test context")
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn store(&self) -> &GameStore {
        &self.store
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    pub fn persistence(&self) -> &dyn Persistence {
        self.persistence.as_ref()
    }
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(#[from] std::io::Error),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Storage error: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Every route, wrapped with JSON error bodies for rejections and the access log.
pub fn app(
    context: &AppContext,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone + Send + Sync + 'static {
    routes(context).recover(recover).with(access_log())
}

/// REST and websocket routes without rejection handling.
pub fn routes(context: &AppContext) -> BoxedFilter<(Response,)> {
    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and(with_context(context.clone()))
        .then(handlers::health);

    let ws = warp::path("ws")
        .and(warp::path::end())
        .and(warp::ws())
        .and(warp::query::<handlers::WsQuery>())
        .and(with_context(context.clone()))
        .map(|ws: warp::ws::Ws, query: handlers::WsQuery, ctx: AppContext| {
            handlers::upgrade(ws, query, ctx).into_response()
        });

    health
        .or(ws)
        .unify()
        .or(game_routes(context))
        .unify()
        .or(player_routes(context))
        .unify()
        .or(table_routes(context))
        .unify()
        .boxed()
}

fn game_routes(context: &AppContext) -> BoxedFilter<(Response,)> {
    let create = warp::path!("api" / "game" / "new")
        .and(warp::post())
        .and(with_context(context.clone()))
        .and(json_body::<handlers::NewGameRequest>())
        .then(handlers::create_game);

    let get = with_context(context.clone())
        .and(warp::path!("api" / "game" / String))
        .and(warp::get())
        .and(viewer_query())
        .then(handlers::get_game);

    let betting = with_context(context.clone())
        .and(warp::path!("api" / "game" / String / "betting"))
        .and(warp::post())
        .and(viewer_query())
        .then(handlers::open_betting);

    let bet = with_context(context.clone())
        .and(warp::path!("api" / "game" / String / "bet"))
        .and(warp::post())
        .and(json_body::<handlers::PlaceBetRequest>())
        .then(handlers::place_bet);

    let start = with_context(context.clone())
        .and(warp::path!("api" / "game" / String / "start"))
        .and(warp::post())
        .and(viewer_query())
        .then(handlers::start_round);

    let hit = with_context(context.clone())
        .and(warp::path!("api" / "game" / String / "hit"))
        .and(warp::post())
        .and(json_body::<handlers::PlayerRequest>())
        .then(handlers::hit);

    let stand = with_context(context.clone())
        .and(warp::path!("api" / "game" / String / "stand"))
        .and(warp::post())
        .and(json_body::<handlers::PlayerRequest>())
        .then(handlers::stand);

    let next_round = with_context(context.clone())
        .and(warp::path!("api" / "game" / String / "next-round"))
        .and(warp::post())
        .and(viewer_query())
        .then(handlers::next_round);

    create
        .or(get)
        .unify()
        .or(betting)
        .unify()
        .or(bet)
        .unify()
        .or(start)
        .unify()
        .or(hit)
        .unify()
        .or(stand)
        .unify()
        .or(next_round)
        .unify()
        .boxed()
}

fn player_routes(context: &AppContext) -> BoxedFilter<(Response,)> {
    let register = warp::path!("api" / "player" / "register")
        .and(warp::post())
        .and(with_context(context.clone()))
        .and(json_body::<handlers::RegisterPlayerRequest>())
        .then(handlers::register_player);

    let get = with_context(context.clone())
        .and(warp::path!("api" / "player" / String))
        .and(warp::get())
        .then(handlers::get_player);

    let stats = with_context(context.clone())
        .and(warp::path!("api" / "player" / String / "stats"))
        .and(warp::get())
        .then(handlers::get_player_stats);

    register.or(get).unify().or(stats).unify().boxed()
}

fn table_routes(context: &AppContext) -> BoxedFilter<(Response,)> {
    let list = warp::path!("api" / "table" / "list")
        .and(warp::get())
        .and(with_context(context.clone()))
        .then(handlers::list_tables);

    let join = with_context(context.clone())
        .and(warp::path!("api" / "table" / String / "join"))
        .and(warp::post())
        .and(json_body::<handlers::JoinTableRequest>())
        .then(handlers::join_table);

    let leave = with_context(context.clone())
        .and(warp::path!("api" / "table" / String / "leave"))
        .and(warp::post())
        .and(json_body::<handlers::PlayerRequest>())
        .then(handlers::leave_table);

    list.or(join).unify().or(leave).unify().boxed()
}

fn with_context(
    context: AppContext,
) -> impl Filter<Extract = (AppContext,), Error = Infallible> + Clone {
    warp::any().map(move || context.clone())
}

fn json_body<T>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
where
    T: DeserializeOwned + Send,
{
    warp::body::content_length_limit(MAX_BODY_BYTES).and(warp::body::json())
}

fn viewer_query() -> impl Filter<Extract = (handlers::ViewerQuery,), Error = Rejection> + Clone {
    warp::query::<handlers::ViewerQuery>()
}

/// Turns warp rejections into the same JSON error body the handlers use.
async fn recover(rejection: Rejection) -> Result<Response, Infallible> {
    if let Some(err) = rejection.find::<BodyDeserializeError>() {
        return Ok(ApiError::BadRequest(err.to_string()).into_http_response());
    }
    if let Some(err) = rejection.find::<InvalidQuery>() {
        return Ok(ApiError::BadRequest(err.to_string()).into_http_response());
    }
    let (status, code, message) = if rejection.is_not_found() {
        (StatusCode::NOT_FOUND, "not_found", "route not found")
    } else if rejection.find::<PayloadTooLarge>().is_some() {
        (
            StatusCode::PAYLOAD_TOO_LARGE,
            "payload_too_large",
            "request body too large",
        )
    } else if rejection.find::<MethodNotAllowed>().is_some() {
        (
            StatusCode::METHOD_NOT_ALLOWED,
            "method_not_allowed",
            "method not allowed",
        )
    } else {
        tracing::debug!(rejection = ?rejection, "unhandled rejection");
        (StatusCode::BAD_REQUEST, "invalid_request", "malformed request")
    };
    Ok(ErrorResponse::new(code, message).into_response(status))
}

#[derive(Debug, Clone)]
pub struct WebServer {
    context: AppContext,
}

impl WebServer {
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let context = AppContext::new(config)?;
        Ok(Self { context })
    }

    pub async fn start(self) -> Result<ServerHandle, ServerError> {
        let WebServer { context } = self;
        let bind_addr = Self::bind_addr(context.config())?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let shutdown_signal = async move {
            let _ = shutdown_rx.await;
        };

        let (addr, server_future) = warp::serve(app(&context))
            .try_bind_with_graceful_shutdown(bind_addr, shutdown_signal)
            .map_err(Self::map_warp_error)?;

        tracing::info!(address = %addr, "web server listening");

        let task = tokio::spawn(async move {
            server_future.await;
            Ok(())
        });

        Ok(ServerHandle::new(addr, shutdown_tx, task, context))
    }

    fn bind_addr(config: &ServerConfig) -> Result<SocketAddr, ServerError> {
        let host = config.host();

        if let Ok(addr) = host.parse::<SocketAddr>() {
            return Ok(addr);
        }

        if let Ok(ip) = host.parse::<std::net::IpAddr>() {
            return Ok(SocketAddr::new(ip, config.port()));
        }

        let candidate = format!("{}:{}", host, config.port());
        let mut addrs = candidate.to_socket_addrs().map_err(|err| {
            ServerError::ConfigError(format!("failed to resolve address `{candidate}`: {err}"))
        })?;

        addrs.next().ok_or_else(|| {
            ServerError::ConfigError(format!("failed to resolve address `{candidate}`"))
        })
    }

    fn map_warp_error(err: warp::Error) -> ServerError {
        use std::error::Error as StdError;

        if let Some(source) = err.source() {
            if let Some(io_err) = source.downcast_ref::<std::io::Error>() {
                let recreated = std::io::Error::new(io_err.kind(), io_err.to_string());
                return ServerError::BindError(recreated);
            }
        }

        ServerError::ConfigError(err.to_string())
    }
}

#[derive(Debug)]
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Result<(), ServerError>>>,
    context: AppContext,
}

impl ServerHandle {
    fn new(
        addr: SocketAddr,
        shutdown: oneshot::Sender<()>,
        task: JoinHandle<Result<(), ServerError>>,
        context: AppContext,
    ) -> Self {
        Self {
            addr,
            shutdown: Some(shutdown),
            task: Some(task),
            context,
        }
    }

    pub fn address(&self) -> SocketAddr {
        self.addr
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub async fn shutdown(mut self) -> Result<(), ServerError> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            match task.await {
                Ok(result) => result?,
                Err(err) => {
                    return Err(ServerError::ConfigError(format!(
                        "server task join error: {err}"
                    )))
                }
            }
        }

        tracing::info!(address = %self.addr, "web server stopped");
        Ok(())
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
