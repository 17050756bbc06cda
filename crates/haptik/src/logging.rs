use clap::ValueEnum;
use haptik_proto::LogLevel as ProtoLevel;
use tracing::level_filters::LevelFilter;

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

/// CLI-facing verbosity. Mirrors the protocol's `RequestLog` levels so the
/// `--log-level` flag and the wire message share one vocabulary.
#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Off,
    Fatal,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_proto(self) -> ProtoLevel {
        match self {
            LogLevel::Off => ProtoLevel::Off,
            LogLevel::Fatal => ProtoLevel::Fatal,
            LogLevel::Error => ProtoLevel::Error,
            LogLevel::Warn => ProtoLevel::Warn,
            LogLevel::Info => ProtoLevel::Info,
            LogLevel::Debug => ProtoLevel::Debug,
            LogLevel::Trace => ProtoLevel::Trace,
        }
    }
}

/// Tracing filter for a protocol log level. `Fatal` has no tracing
/// counterpart and folds into `ERROR`.
pub fn filter_for(level: ProtoLevel) -> LevelFilter {
    match level {
        ProtoLevel::Off => LevelFilter::OFF,
        ProtoLevel::Fatal | ProtoLevel::Error => LevelFilter::ERROR,
        ProtoLevel::Warn => LevelFilter::WARN,
        ProtoLevel::Info => LevelFilter::INFO,
        ProtoLevel::Debug => LevelFilter::DEBUG,
        ProtoLevel::Trace => LevelFilter::TRACE,
    }
}

pub fn init_logging(format: LogFormat, level: LogLevel) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(filter_for(level.as_proto()))
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
