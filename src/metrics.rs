//! Prometheus metrics and tracing spans.
//!
//! With the `metrics` feature, [`METRICS`] holds OpenTelemetry instruments
//! exported through `opentelemetry-prometheus` into a dedicated `prometheus`
//! registry, which [`VendstockMetrics::render`] serialises for `/metrics`.
//! With the `tracing` feature, [`tracing_helpers`] builds the spans used
//! around connections, statements, transactions and request dispatch.

#[cfg(feature = "metrics")]
pub use self::prometheus_metrics::{VendstockMetrics, METRICS};

#[cfg(feature = "metrics")]
mod prometheus_metrics {
    use once_cell::sync::Lazy;
    use opentelemetry::metrics::{Counter, Histogram, MeterProvider};
    use opentelemetry::KeyValue;
    use opentelemetry_sdk::metrics::SdkMeterProvider;
    use prometheus::{Encoder, Registry, TextEncoder};
    use std::time::Duration;

    pub static METRICS: Lazy<VendstockMetrics> = Lazy::new(VendstockMetrics::init);

    pub struct VendstockMetrics {
        registry: Registry,
        // Keeps the reader alive for as long as the instruments are used.
        _provider: SdkMeterProvider,
        requests_total: Counter<u64>,
        request_duration: Histogram<f64>,
        store_query_duration: Histogram<f64>,
        store_errors_total: Counter<u64>,
        timeline_entries_total: Counter<u64>,
        pool_wait: Histogram<f64>,
    }

    impl VendstockMetrics {
        pub fn init() -> Self {
            let registry = Registry::new();
            let mut builder = SdkMeterProvider::builder();
            match opentelemetry_prometheus::exporter()
                .with_registry(registry.clone())
                .build()
            {
                Ok(exporter) => builder = builder.with_reader(exporter),
                Err(e) => log::error!("prometheus exporter unavailable, metrics disabled: {e}"),
            }
            let provider = builder.build();
            let meter = provider.meter("vendstock");

            let requests_total = meter
                .u64_counter("vendstock_requests_total")
                .with_description("HTTP requests handled, by resource, method and status")
                .build();

            let request_duration = meter
                .f64_histogram("vendstock_request_duration_seconds")
                .with_description("Time spent handling an HTTP request")
                .build();

            let store_query_duration = meter
                .f64_histogram("vendstock_store_query_duration_seconds")
                .with_description("Duration of PostgreSQL statements")
                .build();

            let store_errors_total = meter
                .u64_counter("vendstock_store_errors_total")
                .with_description("PostgreSQL statements that returned an error")
                .build();

            let timeline_entries_total = meter
                .u64_counter("vendstock_timeline_entries_total")
                .with_description("Stock timeline rows appended")
                .build();

            let pool_wait = meter
                .f64_histogram("vendstock_pool_wait_seconds")
                .with_description("Time spent waiting for a pooled connection")
                .build();

            Self {
                registry,
                _provider: provider,
                requests_total,
                request_duration,
                store_query_duration,
                store_errors_total,
                timeline_entries_total,
                pool_wait,
            }
        }

        pub fn record_request(
            &self,
            resource: &str,
            method: &str,
            status: u16,
            elapsed: Duration,
        ) {
            let attrs = [
                KeyValue::new("resource", resource.to_string()),
                KeyValue::new("method", method.to_string()),
                KeyValue::new("status", i64::from(status)),
            ];
            self.requests_total.add(1, &attrs);
            self.request_duration.record(elapsed.as_secs_f64(), &attrs[..2]);
        }

        pub fn record_query_duration(&self, elapsed: Duration) {
            self.store_query_duration.record(elapsed.as_secs_f64(), &[]);
        }

        pub fn record_store_error(&self) {
            self.store_errors_total.add(1, &[]);
        }

        pub fn record_timeline_entry(&self) {
            self.timeline_entries_total.add(1, &[]);
        }

        pub fn record_pool_wait(&self, waited: Duration) {
            self.pool_wait.record(waited.as_secs_f64(), &[]);
        }

        /// Prometheus text exposition of everything recorded so far.
        pub fn render(&self) -> Result<Vec<u8>, prometheus::Error> {
            let mut buffer = Vec::new();
            TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
            Ok(buffer)
        }
    }

}

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::{debug_span, info_span, Span};

    const MAX_STATEMENT_LEN: usize = 200;

    pub fn acquire_connection_span() -> Span {
        info_span!("vendstock.connect")
    }

    pub fn pool_acquire_span() -> Span {
        debug_span!("vendstock.pool.acquire")
    }

    pub fn execute_query_span(query: &str) -> Span {
        debug_span!("vendstock.query", db.statement = %truncate(query))
    }

    pub fn begin_transaction_span() -> Span {
        debug_span!("vendstock.transaction.begin")
    }

    pub fn commit_transaction_span() -> Span {
        debug_span!("vendstock.transaction.commit")
    }

    pub fn rollback_transaction_span() -> Span {
        debug_span!("vendstock.transaction.rollback")
    }

    pub fn dispatch_span(method: &str, path: &str) -> Span {
        info_span!("vendstock.request", http.method = %method, http.path = %path)
    }

    pub fn migration_span(version: i64, name: &str) -> Span {
        info_span!("vendstock.migration", version, name = %name)
    }

    fn truncate(query: &str) -> &str {
        match query.char_indices().nth(MAX_STATEMENT_LEN) {
            Some((idx, _)) => &query[..idx],
            None => query,
        }
    }

}
