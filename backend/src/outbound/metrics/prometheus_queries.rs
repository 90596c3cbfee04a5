//! Prometheus adapter for store call metrics.
//!
//! Instruments are registered once per registry and logical connection.
//! [`StoreMetricsRegistry`] remembers what it registered, so asking again for
//! the same connection hands back the same instruments. The metrics store
//! decorator shares them with every transaction and statement it wraps.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry};

use crate::domain::ports::{DbInfo, QueryMetrics};

const DB_SYSTEM: &str = "postgresql";

/// Histogram buckets in milliseconds.
const DURATION_BUCKETS_MS: &[f64] = &[
    1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1_000.0, 2_500.0,
];

type ConnectionKey = (String, String);

/// A Prometheus [`Registry`] plus the store instruments registered with it.
///
/// Clones share both the registry and the record of registered connections.
#[derive(Clone, Default)]
pub struct StoreMetricsRegistry {
    registry: Registry,
    registered: Arc<Mutex<HashMap<ConnectionKey, PrometheusQueryMetrics>>>,
}

impl StoreMetricsRegistry {
    /// Track store instruments registered with `registry`.
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            registered: Arc::default(),
        }
    }

    /// The underlying registry, for exporters such as `/metrics`.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

/// Prometheus-backed store call recorder.
///
/// # Metrics
///
/// - `db_query_errors_total` (counter, label `operation`)
/// - `db_query_duration_milliseconds` (histogram, label `operation`)
/// - `db_tx_rollbacks_total` (counter)
///
/// All three carry the constant labels `db_system`, `db_name` and `db_user`.
#[derive(Clone)]
pub struct PrometheusQueryMetrics {
    errors_total: IntCounterVec,
    duration_ms: HistogramVec,
    rollbacks_total: IntCounter,
}

impl PrometheusQueryMetrics {
    /// Instruments for the store described by `db`, registering them with
    /// `registry` on first use.
    ///
    /// Calling this again for the same database name and user returns
    /// handles to the instruments registered the first time.
    ///
    /// # Errors
    ///
    /// Returns an error if Prometheus rejects an instrument, for example when
    /// a metric of the same name was registered outside
    /// [`StoreMetricsRegistry`].
    pub fn new(registry: &StoreMetricsRegistry, db: &dyn DbInfo) -> Result<Self, prometheus::Error> {
        let key = (db.db_name().to_owned(), db.db_user().to_owned());
        let mut registered = registry
            .registered
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = registered.get(&key) {
            return Ok(existing.clone());
        }
        let metrics = Self::register(&registry.registry, db)?;
        registered.insert(key, metrics.clone());
        Ok(metrics)
    }

    fn register(registry: &Registry, db: &dyn DbInfo) -> Result<Self, prometheus::Error> {
        let labels: HashMap<String, String> = HashMap::from([
            ("db_system".to_owned(), DB_SYSTEM.to_owned()),
            ("db_name".to_owned(), db.db_name().to_owned()),
            ("db_user".to_owned(), db.db_user().to_owned()),
        ]);

        let errors_total = IntCounterVec::new(
            Opts::new("db_query_errors_total", "Failed store calls by operation")
                .const_labels(labels.clone()),
            &["operation"],
        )?;
        let duration_ms = HistogramVec::new(
            HistogramOpts::new(
                "db_query_duration_milliseconds",
                "Store call latency in milliseconds by operation",
            )
            .const_labels(labels.clone())
            .buckets(DURATION_BUCKETS_MS.to_vec()),
            &["operation"],
        )?;
        let rollbacks_total = IntCounter::with_opts(
            Opts::new("db_tx_rollbacks_total", "Transaction rollback requests").const_labels(labels),
        )?;

        registry.register(Box::new(errors_total.clone()))?;
        registry.register(Box::new(duration_ms.clone()))?;
        registry.register(Box::new(rollbacks_total.clone()))?;
        Ok(Self {
            errors_total,
            duration_ms,
            rollbacks_total,
        })
    }
}

impl QueryMetrics for PrometheusQueryMetrics {
    fn observe_duration(&self, operation: &str, elapsed: Duration) {
        self.duration_ms
            .with_label_values(&[operation])
            .observe(elapsed.as_secs_f64() * 1_000.0);
    }

    fn record_error(&self, operation: &str) {
        self.errors_total.with_label_values(&[operation]).inc();
    }

    fn record_rollback(&self) {
        self.rollbacks_total.inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::RecordingStore;
    use prometheus::TextEncoder;
    use rstest::{fixture, rstest};

    #[fixture]
    fn registry() -> StoreMetricsRegistry {
        StoreMetricsRegistry::new(Registry::new())
    }

    fn metrics(registry: &StoreMetricsRegistry) -> PrometheusQueryMetrics {
        PrometheusQueryMetrics::new(registry, &RecordingStore::with_identity("accounts", "svc"))
            .expect("metric registration should succeed")
    }

    #[rstest]
    fn registers_all_instruments(registry: StoreMetricsRegistry) {
        let metrics = metrics(&registry);
        metrics.observe_duration("SELECT", Duration::from_millis(3));
        metrics.record_error("SELECT");
        metrics.record_rollback();

        let names: Vec<String> = registry
            .registry()
            .gather()
            .iter()
            .map(|family| family.name().to_owned())
            .collect();
        for expected in [
            "db_query_errors_total",
            "db_query_duration_milliseconds",
            "db_tx_rollbacks_total",
        ] {
            assert!(names.iter().any(|name| name == expected), "{expected} missing");
        }
    }

    #[rstest]
    fn carries_connection_labels(registry: StoreMetricsRegistry) {
        let metrics = metrics(&registry);
        metrics.record_error("INSERT");

        let exposition = TextEncoder::new()
            .encode_to_string(&registry.registry().gather())
            .expect("encode metrics");

        assert!(exposition.contains("db_system=\"postgresql\""));
        assert!(exposition.contains("db_name=\"accounts\""));
        assert!(exposition.contains("db_user=\"svc\""));
        assert!(exposition.contains("operation=\"INSERT\""));
    }

    #[rstest]
    fn counts_errors_per_operation(registry: StoreMetricsRegistry) {
        let metrics = metrics(&registry);
        metrics.record_error("SELECT");
        metrics.record_error("SELECT");
        metrics.record_error("COMMIT");

        assert_eq!(metrics.errors_total.with_label_values(&["SELECT"]).get(), 2);
        assert_eq!(metrics.errors_total.with_label_values(&["COMMIT"]).get(), 1);
    }

    #[rstest]
    fn observes_durations_in_milliseconds(registry: StoreMetricsRegistry) {
        let metrics = metrics(&registry);
        metrics.observe_duration("PREPARE", Duration::from_millis(40));

        let histogram = metrics.duration_ms.with_label_values(&["PREPARE"]);
        assert_eq!(histogram.get_sample_count(), 1);
        assert!((histogram.get_sample_sum() - 40.0).abs() < f64::EPSILON);
    }

    #[rstest]
    fn counts_rollbacks(registry: StoreMetricsRegistry) {
        let metrics = metrics(&registry);
        metrics.record_rollback();

        assert_eq!(metrics.rollbacks_total.get(), 1);
    }

    #[rstest]
    fn registering_a_connection_twice_shares_its_instruments(registry: StoreMetricsRegistry) {
        let first = metrics(&registry);
        let second = metrics(&registry);

        first.record_error("SELECT");
        second.record_error("SELECT");
        second.record_rollback();

        assert_eq!(first.errors_total.with_label_values(&["SELECT"]).get(), 2);
        assert_eq!(first.rollbacks_total.get(), 1);
        let families = registry.registry().gather();
        let errors = families
            .iter()
            .find(|family| family.name() == "db_query_errors_total")
            .expect("error counter family");
        assert_eq!(errors.get_metric().len(), 1);
    }

    #[rstest]
    fn clones_share_registered_connections(registry: StoreMetricsRegistry) {
        let first = metrics(&registry);
        let second = metrics(&registry.clone());

        second.record_rollback();

        assert_eq!(first.rollbacks_total.get(), 1);
    }

    #[rstest]
    fn distinct_connections_get_their_own_instruments(registry: StoreMetricsRegistry) {
        let accounts = metrics(&registry);
        let reporting =
            PrometheusQueryMetrics::new(&registry, &RecordingStore::with_identity("reporting", "svc"))
                .expect("metric registration should succeed");

        accounts.record_rollback();

        assert_eq!(accounts.rollbacks_total.get(), 1);
        assert_eq!(reporting.rollbacks_total.get(), 0);
    }
}
