#![allow(dead_code)]
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::Utc;
use log::*;
use qr_payment_engine::{
    db_types::ReconciliationStatus,
    NewCheckoutOrder,
    OrderConfirmation,
    OrderSubmitter,
    SqliteLedger,
    SubmitError,
};
use sqlx::{migrate, migrate::MigrateDatabase, Sqlite};
use tokio::sync::watch;

pub fn random_db_path() -> String {
    format!("sqlite://{}/qpe_test_store_{}.db", std::env::temp_dir().display(), rand::random::<u64>())
}

pub async fn prepare_test_env(url: &str) {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    debug!("🚀 Logging initialised");
    create_database(url).await;
    run_migrations(url).await;
}

pub async fn run_migrations(url: &str) {
    let ledger = SqliteLedger::new_with_url(url, 5).await.expect("Error creating connection to database");
    migrate!("./src/sqlite/migrations").run(ledger.pool()).await.expect("Error running DB migrations");
    info!("🚀 Migrations complete");
}

pub async fn create_database(url: &str) {
    if let Err(e) = Sqlite::drop_database(url).await {
        warn!("Error dropping database {url}: {e:?}");
    }
    Sqlite::create_database(url).await.expect("Error creating database");
    info!("Created Sqlite database {url}");
}

/// A fresh, migrated ledger on its own database file.
pub async fn new_test_ledger() -> SqliteLedger {
    let url = random_db_path();
    prepare_test_env(&url).await;
    SqliteLedger::new_with_url(&url, 5).await.expect("Error creating connection to database")
}

//--------------------------------------     TestSubmitter    --------------------------------------------------------
/// An order-management stand-in. `submissions()` counts orders actually created, so a double-submission bug shows up
/// as a count greater than one.
#[derive(Clone, Default)]
pub struct TestSubmitter {
    submissions: Arc<AtomicUsize>,
    failures_remaining: Arc<AtomicUsize>,
    last_order: Arc<std::sync::Mutex<Option<NewCheckoutOrder>>>,
    delay: Option<Duration>,
}

impl TestSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the first `n` submission attempts with a network error before succeeding.
    pub fn failing_first(n: usize) -> Self {
        let submitter = Self::default();
        submitter.failures_remaining.store(n, Ordering::SeqCst);
        submitter
    }

    /// Hold each submission open for `delay`, so concurrent attempts genuinely overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn submissions(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    /// The most recently submitted order, if any.
    pub fn last_order(&self) -> Option<NewCheckoutOrder> {
        self.last_order.lock().unwrap().clone()
    }
}

impl OrderSubmitter for TestSubmitter {
    async fn submit_order(&self, order: &NewCheckoutOrder) -> Result<OrderConfirmation, SubmitError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failures_remaining.load(Ordering::SeqCst) > 0 {
            self.failures_remaining.fetch_sub(1, Ordering::SeqCst);
            return Err(SubmitError::Network("the order service timed out".to_string()));
        }
        let n = self.submissions.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_order.lock().unwrap() = Some(order.clone());
        Ok(OrderConfirmation { order_id: format!("ORD-{}-{n}", order.reference), confirmed_at: Utc::now() })
    }
}

/// Wait (with a timeout) until the status projection matches `pred`, returning the matching status.
pub async fn wait_for_status<F>(
    rx: &mut watch::Receiver<ReconciliationStatus>,
    mut pred: F,
) -> ReconciliationStatus
where F: FnMut(&ReconciliationStatus) -> bool {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let current = rx.borrow_and_update().clone();
            if pred(&current) {
                return current;
            }
            rx.changed().await.expect("The controller stopped before reaching the expected status");
        }
    })
    .await
    .expect("Timed out waiting for the expected status")
}
