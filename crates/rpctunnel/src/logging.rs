use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Directive-style filter that overrides `--log-level`, e.g.
/// `RPCTUNNEL_LOG=rpctunnel_rpc=trace,info`.
pub const LOG_ENV: &str = "RPCTUNNEL_LOG";

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Filter from `directives` when given and valid, else `level` for everything.
fn build_filter(directives: Option<&str>, level: LogLevel) -> EnvFilter {
    let fallback = || EnvFilter::default().add_directive(level.as_filter().into());
    match directives.map(str::trim).filter(|d| !d.is_empty()) {
        Some(directives) => EnvFilter::try_new(directives).unwrap_or_else(|err| {
            eprintln!("warning: ignoring invalid {LOG_ENV}: {err}");
            fallback()
        }),
        None => fallback(),
    }
}

/// Logs always go to stderr; `serve` owns stdout for protocol frames.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let directives = std::env::var(LOG_ENV).ok();
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(build_filter(directives.as_deref(), level))
        .with_ansi(false)
        .with_target(false);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_applies_without_directives() {
        let filter = build_filter(None, LogLevel::Warn);
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::WARN));

        let blank = build_filter(Some("  "), LogLevel::Debug);
        assert_eq!(blank.max_level_hint(), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn env_directives_override_level() {
        let filter = build_filter(Some("rpctunnel_rpc=trace,error"), LogLevel::Info);
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::TRACE));
    }

    #[test]
    fn invalid_directives_fall_back_to_level() {
        let filter = build_filter(Some("rpctunnel_rpc=loud"), LogLevel::Error);
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::ERROR));
    }
}
