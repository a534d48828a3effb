//! Initialize telemetry in all quill services.
//!
//! # Examples
//! ```no_run
//! quill_telemetry::configure()
//!     .set_filter_directives("info")
//!     .try_init()
//!     .expect("must be able to initialize telemetry");
//! tracing::info!("telemetry initialized");
//! ```
use std::{
    io::IsTerminal as _,
    net::{
        AddrParseError,
        SocketAddr,
    },
};

use metrics_exporter_prometheus::{
    BuildError,
    PrometheusBuilder,
};
use tracing_subscriber::{
    filter::{
        LevelFilter,
        ParseError,
    },
    layer::SubscriberExt as _,
    util::{
        SubscriberInitExt as _,
        TryInitError,
    },
    EnvFilter,
};

#[cfg(feature = "display")]
pub mod display;
#[doc(hidden)]
pub mod macros;

/// The errors that can occur when initializing telemetry.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct Error(ErrorKind);

impl Error {
    fn filter_directives(source: ParseError) -> Self {
        Self(ErrorKind::FilterDirectives(source))
    }

    fn init_subscriber(source: TryInitError) -> Self {
        Self(ErrorKind::InitSubscriber(source))
    }

    fn metrics_addr(source: AddrParseError) -> Self {
        Self(ErrorKind::MetricsAddr(source))
    }

    fn exporter_install(source: BuildError) -> Self {
        Self(ErrorKind::ExporterInstall(source))
    }
}

#[derive(Debug, thiserror::Error)]
enum ErrorKind {
    #[error("failed to parse filter directives")]
    FilterDirectives(#[source] ParseError),
    #[error("failed installing global tracing subscriber")]
    InitSubscriber(#[source] TryInitError),
    #[error("failed to parse metrics listening address")]
    MetricsAddr(#[source] AddrParseError),
    #[error("failed installing prometheus metrics exporter")]
    ExporterInstall(#[source] BuildError),
}

#[must_use = "the telemetry config must be initialized to be useful"]
pub fn configure() -> Config {
    Config::new()
}

pub struct Config {
    filter_directives: String,
    force_stdout: bool,
    pretty_print: bool,
    metrics: Option<MetricsConfig>,
}

struct MetricsConfig {
    listening_addr: String,
    service_name: String,
}

impl Config {
    #[must_use = "telemetry must be initialized to be useful"]
    fn new() -> Self {
        Self {
            filter_directives: String::new(),
            force_stdout: false,
            pretty_print: false,
            metrics: None,
        }
    }

    #[must_use = "telemetry must be initialized to be useful"]
    pub fn set_filter_directives(mut self, filter_directives: &str) -> Self {
        self.filter_directives = filter_directives.to_string();
        self
    }

    #[must_use = "telemetry must be initialized to be useful"]
    pub fn set_force_stdout(mut self, force_stdout: bool) -> Self {
        self.force_stdout = force_stdout;
        self
    }

    #[must_use = "telemetry must be initialized to be useful"]
    pub fn set_pretty_print(mut self, pretty_print: bool) -> Self {
        self.pretty_print = pretty_print;
        self
    }

    #[must_use = "telemetry must be initialized to be useful"]
    pub fn set_metrics(mut self, listening_addr: &str, service_name: &str) -> Self {
        self.metrics = Some(MetricsConfig {
            listening_addr: listening_addr.to_string(),
            service_name: service_name.to_string(),
        });
        self
    }

    /// Initialize telemetry, consuming the config.
    ///
    /// Must be called from within a tokio runtime if a metrics listener is
    /// configured, as the prometheus exporter spawns its HTTP server on it.
    ///
    /// # Errors
    /// Fails if the filter directives could not be parsed, if the metrics
    /// listening address is invalid, if the prometheus exporter could not be
    /// installed, or if the global tracing subscriber could not be installed.
    pub fn try_init(self) -> Result<Guard, Error> {
        let Self {
            filter_directives,
            force_stdout,
            pretty_print,
            metrics,
        } = self;

        let env_filter = {
            let builder = EnvFilter::builder().with_default_directive(LevelFilter::INFO.into());
            builder
                .parse(filter_directives)
                .map_err(Error::filter_directives)?
        };

        // Human-readable output when attached to a terminal (or forced),
        // one JSON object per line otherwise.
        let mut compact_printer = None;
        let mut json_printer = None;
        if pretty_print && (force_stdout || std::io::stdout().is_terminal()) {
            compact_printer = Some(tracing_subscriber::fmt::layer().compact());
        } else {
            json_printer = Some(tracing_subscriber::fmt::layer().json().flatten_event(true));
        }

        tracing_subscriber::registry()
            .with(compact_printer)
            .with(json_printer)
            .with(env_filter)
            .try_init()
            .map_err(Error::init_subscriber)?;

        if let Some(MetricsConfig {
            listening_addr,
            service_name,
        }) = metrics
        {
            let addr: SocketAddr = listening_addr.parse().map_err(Error::metrics_addr)?;
            PrometheusBuilder::new()
                .with_http_listener(addr)
                .add_global_label("service", service_name)
                .install()
                .map_err(Error::exporter_install)?;
        }

        Ok(Guard)
    }
}

/// Handle binding the lifetime of the telemetry subsystem to a scope.
///
/// Currently carries nothing to flush, but callers hold it for the lifetime of
/// `main` so that exporters can be torn down here later without touching call
/// sites.
pub struct Guard;
