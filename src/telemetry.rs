use std::sync::Arc;

/// Structured, in-process event hook for observability.
///
/// This crate is a library; emitting logs directly (e.g. `println!`) is not acceptable for
/// production. Instead, callers can provide an implementation that forwards these events to
/// `tracing`, `log`, metrics, or custom sinks.
pub trait QueryEventListener: std::fmt::Debug + Send + Sync + 'static {
    fn on_event(&self, event: QueryEvent);
}

/// Structured events emitted by the query core.
#[derive(Debug, Clone)]
pub enum QueryEvent {
    /// A scan completed: how many rows were read, into how many spans.
    ScanFinished { rows: usize, spans: usize },

    /// A span's tags lacked one of the group-by names, so it could not be
    /// assigned to any group and was dropped from the result.
    SpanDropped { row_key: Vec<u8> },
}

#[derive(Debug)]
pub struct NoopEventListener;

impl QueryEventListener for NoopEventListener {
    #[inline]
    fn on_event(&self, _event: QueryEvent) {}
}

pub fn noop_event_listener() -> Arc<dyn QueryEventListener> {
    Arc::new(NoopEventListener)
}

/// Metrics instrumentation for the query path.
///
/// ## Key properties
/// - Library-safe: emitting metrics is effectively a no-op until a recorder is installed.
/// - Serverless scraping: callers can render Prometheus exposition text in-process.
pub mod query_metrics {
    use ::metrics::{describe_counter, Unit};

    // Counters are exposed as `<name>_total` by the Prometheus exporter.
    pub const QUERIES_RUN: &str = "tsquery_queries_run";
    pub const SCANNED_ROWS: &str = "tsquery_scanned_rows";
    pub const SPANS_BUILT: &str = "tsquery_spans_built";
    pub const SPANS_DROPPED: &str = "tsquery_spans_dropped";

    /// Registers metric descriptions with the installed recorder.
    pub fn describe() {
        describe_counter!(QUERIES_RUN, Unit::Count, "Queries executed to completion");
        describe_counter!(SCANNED_ROWS, Unit::Count, "Rows returned by store scanners");
        describe_counter!(SPANS_BUILT, Unit::Count, "Spans materialised from scans");
        describe_counter!(
            SPANS_DROPPED,
            Unit::Count,
            "Spans dropped for missing a group-by tag"
        );
    }

    #[inline]
    pub fn record_scan(rows: u64, spans: u64) {
        if rows > 0 {
            ::metrics::counter!(SCANNED_ROWS).increment(rows);
        }
        if spans > 0 {
            ::metrics::counter!(SPANS_BUILT).increment(spans);
        }
    }

    #[inline]
    pub fn record_query_run() {
        ::metrics::counter!(QUERIES_RUN).increment(1);
    }

    #[inline]
    pub fn record_span_dropped() {
        ::metrics::counter!(SPANS_DROPPED).increment(1);
    }

    /// In-process Prometheus recorder; call
    /// [`InProcessPrometheus::render`] to scrape. Does **not** start an
    /// HTTP server.
    #[cfg(feature = "prometheus")]
    #[derive(Debug)]
    pub struct InProcessPrometheus {
        handle: metrics_exporter_prometheus::PrometheusHandle,
    }

    #[cfg(feature = "prometheus")]
    impl InProcessPrometheus {
        /// Installs a global Prometheus recorder (once per process).
        pub fn install() -> Result<Self, MetricsInitError> {
            use metrics_exporter_prometheus::PrometheusBuilder;

            describe();
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .map_err(MetricsInitError::from_build_error)?;
            Ok(Self { handle })
        }

        /// Renders the current metrics in the Prometheus text exposition format.
        pub fn render(&self) -> String {
            self.handle.render()
        }
    }

    #[cfg(feature = "prometheus")]
    #[derive(Debug, thiserror::Error)]
    pub enum MetricsInitError {
        #[error("metrics recorder already installed")]
        AlreadyInstalled,
        #[error("failed to install prometheus recorder: {0}")]
        Install(String),
    }

    #[cfg(feature = "prometheus")]
    impl MetricsInitError {
        fn from_build_error(e: metrics_exporter_prometheus::BuildError) -> Self {
            match e {
                metrics_exporter_prometheus::BuildError::FailedToSetGlobalRecorder(_) => {
                    MetricsInitError::AlreadyInstalled
                }
                other => MetricsInitError::Install(other.to_string()),
            }
        }
    }
}

/// Listener that records events in memory. Useful in tests and as a
/// template for real forwarding listeners.
#[derive(Debug, Default)]
pub struct RecordingEventListener {
    events: std::sync::Mutex<Vec<QueryEvent>>,
}

impl RecordingEventListener {
    pub fn events(&self) -> Vec<QueryEvent> {
        self.events.lock().expect("event listener lock").clone()
    }
}

impl QueryEventListener for RecordingEventListener {
    fn on_event(&self, event: QueryEvent) {
        self.events.lock().expect("event listener lock").push(event);
    }
}
