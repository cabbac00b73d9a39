/// Output format of the process-wide subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format `{other}` (expected text or json)")),
        }
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging(format: LogFormat) -> Result<(), tracing::subscriber::SetGlobalDefaultError> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,cardroom_web=debug"));

    match format {
        LogFormat::Text => {
            let subscriber = fmt()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
        }
        LogFormat::Json => {
            let subscriber = fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_current_span(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)
        }
    }
}

/// Event capture for unit tests: a layer that records every event into a shared vec.
#[cfg(test)]
pub(crate) mod capture {
    use std::fmt;
    use std::sync::{Arc, Mutex};

    use tracing::field::{Field, Visit};
    use tracing::subscriber::DefaultGuard;
    use tracing::{Event, Level, Subscriber};
    use tracing_subscriber::layer::{Context, SubscriberExt};
    use tracing_subscriber::{Layer, Registry};

    #[derive(Debug, Clone)]
    pub(crate) struct Captured {
        pub level: Level,
        pub message: String,
        fields: Vec<(&'static str, String)>,
    }

    impl Captured {
        pub fn field(&self, name: &str) -> Option<&str> {
            self.fields
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.as_str())
        }

        fn push(&mut self, field: &Field, value: String) {
            if field.name() == "message" {
                self.message = value;
            } else {
                self.fields.push((field.name(), value));
            }
        }
    }

    impl Visit for Captured {
        fn record_str(&mut self, field: &Field, value: &str) {
            self.push(field, value.to_string());
        }

        fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
            self.push(field, format!("{value:?}"));
        }
    }

    /// Events recorded on this thread while the guard from [`EventLog::install`] lives.
    #[derive(Debug, Clone, Default)]
    pub(crate) struct EventLog(Arc<Mutex<Vec<Captured>>>);

    impl EventLog {
        pub fn install(&self) -> DefaultGuard {
            tracing::subscriber::set_default(Registry::default().with(self.clone()))
        }

        pub fn events(&self) -> Vec<Captured> {
            self.0.lock().unwrap().clone()
        }
    }

    impl<S: Subscriber> Layer<S> for EventLog {
        fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
            let mut captured = Captured {
                level: *event.metadata().level(),
                message: String::new(),
                fields: Vec::new(),
            };
            event.record(&mut captured);
            self.0.lock().unwrap().push(captured);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::capture::EventLog;
    use super::*;
    use tracing::Level;

    #[test]
    fn log_format_parses_case_insensitively() {
        assert_eq!("JSON".parse::<LogFormat>(), Ok(LogFormat::Json));
        assert_eq!("pretty".parse::<LogFormat>(), Ok(LogFormat::Text));
        assert!("yaml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn log_format_reads_from_config_strings() {
        let format: LogFormat = serde_json::from_str("\"json\"").unwrap();
        assert_eq!(format, LogFormat::Json);
        assert_eq!(LogFormat::default(), LogFormat::Text);
    }

    #[test]
    fn captured_events_keep_message_and_fields() {
        let log = EventLog::default();
        {
            let _guard = log.install();
            tracing::info!(table_id = "felt-1", connections = 2, "connection registered");
            tracing::warn!(player_id = %"p1", "send queue full");
        }
        tracing::info!("after the guard");

        let events = log.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].level, Level::INFO);
        assert_eq!(events[0].message, "connection registered");
        assert_eq!(events[0].field("table_id"), Some("felt-1"));
        assert_eq!(events[0].field("connections"), Some("2"));
        assert_eq!(events[1].level, Level::WARN);
        assert_eq!(events[1].field("player_id"), Some("p1"));
        assert_eq!(events[1].field("missing"), None);
    }
}
