use warp::http::StatusCode;
use warp::log::{Info, Log};

/// Access log for every reply, including rejections turned into error bodies.
pub fn access_log() -> Log<impl Fn(Info<'_>) + Copy + Send + Sync> {
    warp::log::custom(|info: Info<'_>| {
        log_response(
            info.status(),
            info.path(),
            info.method().as_str(),
            info.elapsed().as_millis(),
        );
    })
}

/// Log response with status code
pub fn log_response(status: StatusCode, path: &str, method: &str, duration_ms: u128) {
    if status.is_client_error() {
        tracing::warn!(
            status = %status.as_u16(),
            path = %path,
            method = %method,
            duration_ms = duration_ms,
            "client error"
        );
    } else if status.is_server_error() {
        tracing::error!(
            status = %status.as_u16(),
            path = %path,
            method = %method,
            duration_ms = duration_ms,
            "server error"
        );
    } else {
        tracing::info!(
            status = %status.as_u16(),
            path = %path,
            method = %method,
            duration_ms = duration_ms,
            "response sent"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::capture::{Captured, EventLog};
    use tracing::Level;
    use warp::Filter;

    fn capture<F: FnOnce()>(f: F) -> Vec<Captured> {
        let log = EventLog::default();
        let guard = log.install();
        f();
        drop(guard);
        log.events()
    }

    #[tokio::test]
    async fn access_log_records_each_reply() {
        let log = EventLog::default();
        let _guard = log.install();

        let route = warp::path!("api" / "table" / "list")
            .and(warp::get())
            .map(|| warp::reply::json(&Vec::<String>::new()))
            .with(access_log());

        let response = warp::test::request()
            .method("GET")
            .path("/api/table/list")
            .reply(&route)
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        assert!(log.events().iter().any(|e| e.level == Level::INFO
            && e.message == "response sent"
            && e.field("path") == Some("/api/table/list")
            && e.field("method") == Some("GET")));
    }

    #[test]
    fn success_logs_at_info() {
        let events = capture(|| log_response(StatusCode::CREATED, "/api/game/new", "POST", 3));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, Level::INFO);
        assert_eq!(events[0].field("status"), Some("201"));
        assert_eq!(events[0].field("duration_ms"), Some("3"));
    }

    #[test]
    fn client_error_logs_at_warn() {
        let events = capture(|| log_response(StatusCode::NOT_FOUND, "/api/game/nope", "GET", 1));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, Level::WARN);
        assert_eq!(events[0].message, "client error");
    }

    #[test]
    fn server_error_logs_at_error() {
        let events = capture(|| {
            log_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "/api/player/register",
                "POST",
                9,
            )
        });
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].level, Level::ERROR);
        assert_eq!(events[0].message, "server error");
    }
}
