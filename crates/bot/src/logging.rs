use tracing::{Subscriber, level_filters::LevelFilter};
use tracing_subscriber::{
    EnvFilter, Layer, layer::SubscriberExt as _, registry::LookupSpan, util::SubscriberInitExt as _,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    /// `RUST_LOG_MODE=json` selects JSON lines; anything else is pretty.
    pub fn from_mode(mode: Option<&str>) -> Self {
        match mode {
            Some(m) if m.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Pretty,
        }
    }

    pub fn layer<S>(self) -> Box<dyn Layer<S> + Send + Sync + 'static>
    where
        for<'a> S: Subscriber + LookupSpan<'a>,
    {
        let fmt = tracing_subscriber::fmt::layer().with_thread_names(true);

        match self {
            Self::Json => Box::new(fmt.json().with_target(false)),
            Self::Pretty => Box::new(
                fmt.pretty()
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            ),
        }
    }
}

pub fn init_tracing() {
    let mode = std::env::var("RUST_LOG_MODE").ok();

    // Unparseable directives are dropped rather than aborting startup.
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(filter)
        .with(LogFormat::from_mode(mode.as_deref()).layer())
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_mode_selection() {
        assert_eq!(LogFormat::from_mode(Some("json")), LogFormat::Json);
        assert_eq!(LogFormat::from_mode(Some("JSON")), LogFormat::Json);
        assert_eq!(LogFormat::from_mode(Some("pretty")), LogFormat::Pretty);
        assert_eq!(LogFormat::from_mode(None), LogFormat::Pretty);
    }
}
