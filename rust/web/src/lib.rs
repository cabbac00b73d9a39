pub mod client;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod hub;
pub mod logging;
pub mod middleware;
pub mod persistence;
pub mod protocol;
pub mod server;
pub mod store;

pub use config::{ConfigError, ServerConfig, WsConfig};
pub use errors::{ApiError, ErrorResponse, ErrorSeverity, IntoErrorResponse};
pub use hub::{ConnectionId, Frame, Hub, HubStats};
pub use logging::{init_logging, LogFormat};
pub use middleware::{access_log, log_response};
pub use persistence::{
    MemoryPersistence, Persistence, PersistenceError, PlayerRecord, PlayerStats,
    SqlitePersistence,
};
pub use protocol::{Envelope, MessageType};
pub use server::{app, routes, AppContext, ServerError, ServerHandle, WebServer};
pub use store::{GameId, GameStore, StoreError};

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn context_provides_shared_components() {
        let ctx = AppContext::new_for_tests();

        assert_eq!(ctx.store().game_count().unwrap(), 0);
        assert_eq!(ctx.hub().stats().await, Some(HubStats::default()));
        assert!(ctx.persistence().get_player("nobody").unwrap().is_none());
        assert_eq!(ctx.config().port(), 0);
    }
}
