use cucumber::World;
use log::*;
use settlement_engine::{
    events::EventProducers,
    payout_objects::PayoutConfig,
    test_utils::prepare_env::{create_database, random_db_path, run_migrations},
    PayoutProcessor,
    SettlementConfig,
    SettlementCoordinator,
    SettlementError,
    SqliteDatabase,
};

#[derive(Default, Debug, World)]
pub struct SettlementWorld {
    pub system: Option<SettlementSystem>,
    /// The error returned by the most recent step that was allowed to fail
    pub last_error: Option<SettlementError>,
}

#[derive(Debug)]
pub struct SettlementSystem {
    pub db_path: String,
    pub db: SqliteDatabase,
    pub coordinator: SettlementCoordinator<SqliteDatabase>,
    pub payouts: PayoutProcessor<SqliteDatabase>,
}

impl SettlementWorld {
    pub fn system(&self) -> &SettlementSystem {
        self.system.as_ref().expect("Settlement system not initialised")
    }

    pub fn coordinator(&self) -> &SettlementCoordinator<SqliteDatabase> {
        &self.system().coordinator
    }

    pub fn payouts(&self) -> &PayoutProcessor<SqliteDatabase> {
        &self.system().payouts
    }

    /// Keeps the error, if any, for a later `the last request failed` step.
    pub fn record<T>(&mut self, result: Result<T, SettlementError>) -> Option<T> {
        match result {
            Ok(v) => {
                self.last_error = None;
                Some(v)
            },
            Err(e) => {
                debug!("🚀️ Step returned an error: {e}");
                self.last_error = Some(e);
                None
            },
        }
    }
}

impl SettlementSystem {
    pub async fn new() -> Self {
        let url = prepare_test_env().await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating connection to database");
        debug!("Created database: {url}");
        let coordinator = SettlementCoordinator::new(db.clone(), EventProducers::default(), SettlementConfig::default());
        let payouts = PayoutProcessor::new(db.clone(), PayoutConfig::default());
        Self { db_path: url, db, coordinator, payouts }
    }
}

pub async fn prepare_test_env() -> String {
    let path = random_db_path();
    create_database(&path).await;
    run_migrations(&path).await;
    path
}
