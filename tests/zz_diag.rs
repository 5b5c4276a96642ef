//! Integration test for the logging half of background failure reporting.
//!
//! A failed deferred write must surface twice: once through the handle and
//! exactly once in the error log, tagged with the entity type name. Lives in
//! its own binary because it installs a process-global subscriber.

use pooled_dao::{Dao, DaoError, Entity, StoreConfig, fields};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;
use tracing::field::{Field, Visit};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Metric {
    id: i64,
    name: String,
}

impl Entity for Metric {
    type Key = i64;
    const TABLE: &'static str = "metrics";
}

/// Captures every error-level event as a rendered field string.
struct ErrorCapture {
    events: Arc<Mutex<Vec<String>>>,
}

impl<S: tracing::Subscriber> Layer<S> for ErrorCapture {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        eprintln!("EVT [{:?}] level={} target={} msg_at={}:{:?}",
            std::thread::current().name(), event.metadata().level(),
            event.metadata().target(), event.metadata().file().unwrap_or("?"),
            event.metadata().line());
        if event.metadata().level() != &tracing::Level::ERROR {
            eprintln!("EVT skipped (non-error)");
            return;
        }
        eprintln!("EVT locking events mutex...");
        let mut rendered = String::new();
        event.record(&mut FieldCollector(&mut rendered));
        self.events.lock().unwrap().push(rendered);
        eprintln!("EVT recorded + unlocked");
    }
}

struct FieldCollector<'a>(&'a mut String);

impl Visit for FieldCollector<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        use std::fmt::Write;
        let _ = write!(self.0, "{}={:?} ", field.name(), value);
    }
}

async fn setup_metric_dao() -> Dao<Metric> {
    let temp_file = NamedTempFile::new().unwrap();
    // Keep the temp file alive - prevent deletion when function returns
    let db_path = temp_file.into_temp_path().keep().unwrap();

    let dao: Dao<Metric> = Dao::connect(&StoreConfig::new(db_path)).await.unwrap();
    dao.run_custom(|uow| {
        Box::pin(async move {
            uow.execute(
                "CREATE TABLE metrics (\
                 id INTEGER PRIMARY KEY AUTOINCREMENT, \
                 name TEXT NOT NULL UNIQUE)",
                &[],
            )
            .await?;
            Ok(())
        })
    })
    .await
    .unwrap();
    dao
}

#[tokio::test]
async fn test_background_failure_is_logged_exactly_once() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let subscriber = tracing_subscriber::registry().with(ErrorCapture {
        events: Arc::clone(&events),
    });
    // Background workers run on their own threads, so the subscriber must be
    // the process default, not thread-scoped.
    tracing::subscriber::set_global_default(subscriber).unwrap();

    let dao = setup_metric_dao().await;
    dao.create(fields! { "name" => "latency" }).await.unwrap();

    // Duplicate unique value: the failure resolves through the handle...
    let err = dao
        .create_ff(fields! { "name" => "latency" })
        .await
        .unwrap_err();
    assert!(matches!(err, DaoError::ConstraintViolation { .. }));

    // ...and is logged exactly once, carrying the entity type name.
    let logged = events.lock().unwrap();
    let matching: Vec<&String> = logged
        .iter()
        .filter(|line| line.contains("Metric"))
        .collect();
    assert_eq!(matching.len(), 1, "error events: {:?}", *logged);
    assert!(matching[0].contains("op=\"create\""));
    assert!(matching[0].contains("Background operation failed"));

    // A successful deferred write logs nothing.
    eprintln!("MAIN before second create_ff (guard held)");
    dao.create_ff(fields! { "name" => "throughput" })
        .await
        .unwrap();
    eprintln!("MAIN second create_ff done");
    assert_eq!(
        events.lock().unwrap().iter().filter(|l| l.contains("Metric")).count(),
        1
    );
}
