//! Integration tests for the Charging Lifecycle Engine against a real
//! SeaORM/SQLite-in-memory stack (spec.md §8 "Testable properties" and
//! "Scenarios"). Exercised end to end rather than against a mock
//! repository, since the monetary invariants this module guarantees are
//! expressed as conditional SQL (`ClientRepository::debit`/`credit`) that a
//! hand-rolled in-memory fake would not faithfully reproduce.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;

use evcsms::charging::command_router::CommandRouter;
use evcsms::charging::lifecycle::ChargingLifecycleEngine;
use evcsms::charging::registry::StationRegistry;
use evcsms::domain::repositories::{ChargingSessionRepository, ClientRepository};
use evcsms::domain::{LimitKind, RepositoryProvider, SessionStatus};
use evcsms::infrastructure::bus::{InProcessBus, SharedBus};
use evcsms::infrastructure::db::entities::client;
use evcsms::infrastructure::db::{connect_and_migrate, repositories::repository_provider::SeaOrmRepositoryProvider};
use evcsms::shared::errors::DomainError;
use sea_orm::{ActiveModelTrait, Set};

fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

/// Wires one in-memory SQLite-backed `RepositoryProvider` and a fresh
/// `ChargingLifecycleEngine` over it, mirroring how `main.rs` assembles the
/// same pieces against a real database.
struct Harness {
    db: sea_orm::DatabaseConnection,
    repos: Arc<SeaOrmRepositoryProvider>,
    engine: ChargingLifecycleEngine,
    command_router: Arc<CommandRouter>,
    bus: SharedBus,
}

impl Harness {
    async fn new(price_per_kwh: &str) -> Self {
        let db = connect_and_migrate("sqlite::memory:").await.expect("connect");
        let repos = Arc::new(SeaOrmRepositoryProvider::new(db.clone()));
        let bus = InProcessBus::shared();
        let registry = Arc::new(StationRegistry::new(bus.clone()));
        let command_router = Arc::new(CommandRouter::new(bus.clone()));
        let engine = ChargingLifecycleEngine::new(
            repos.clone(),
            registry,
            command_router.clone(),
            bus.clone(),
            dec(price_per_kwh),
        );
        Self { db, repos, engine, command_router, bus }
    }

    async fn seed_client(&self, id: &str, balance: i64) {
        client::ActiveModel {
            id: Set(id.to_owned()),
            balance: Set(balance),
            currency: Set("som".to_owned()),
        }
        .insert(&self.db)
        .await
        .expect("seed client");
    }

    /// Marks `station_id` connected and keeps a live Command Router
    /// subscriber alive so a `publish` isn't treated as undelivered
    /// (spec.md §4.4).
    fn connect_station(&self, station_id: &str) -> tokio::sync::broadcast::Receiver<Vec<u8>> {
        self.bus.mark_connected(station_id, Duration::from_secs(600));
        self.command_router.subscribe(station_id)
    }

    fn balance_of(&self, client_id: &str) -> impl std::future::Future<Output = i64> + '_ {
        let client_id = client_id.to_owned();
        async move { self.repos.clients().find_by_id(&client_id).await.unwrap().unwrap().balance }
    }
}

#[tokio::test]
async fn scenario_1_happy_path_energy_limit() {
    let h = Harness::new("15").await;
    h.seed_client("client-1", 1000).await;
    let _rx = h.connect_station("CP1");

    let session_id = h
        .engine
        .start_charge("client-1", "CP1", 1, LimitKind::Energy, dec("10"))
        .await
        .expect("start_charge succeeds");

    let session = h.repos.charging_sessions().find_by_id(&session_id).await.unwrap().unwrap();
    assert_eq!(session.reserved_amount, 150);
    assert_eq!(session.status, SessionStatus::Starting);
    assert_eq!(h.balance_of("client-1").await, 850);

    let now = Utc::now();
    h.engine
        .on_start_transaction(&session.id_tag, 1, 1000, now)
        .await
        .unwrap()
        .expect("StartTransaction binds the pending session");

    let limit_hit = h.engine.on_meter_values("CP1", 1, 11_000, now).await.unwrap();
    assert!(limit_hit, "11 kWh reaches the 10 kWh limit");

    let stopped = h
        .engine
        .on_stop_transaction("CP1", 1, 11_000, now)
        .await
        .unwrap()
        .expect("StopTransaction finalizes the session");

    assert_eq!(stopped.status, SessionStatus::Stopped);
    assert_eq!(stopped.amount_charged, Some(150));
    assert_eq!(stopped.refund_amount, Some(0));
    assert!(stopped.reservation_is_exact());
    assert_eq!(h.balance_of("client-1").await, 850);
}

#[tokio::test]
async fn scenario_2_under_consumption_refund() {
    let h = Harness::new("15").await;
    h.seed_client("client-1", 1000).await;
    let _rx = h.connect_station("CP1");

    let session_id = h
        .engine
        .start_charge("client-1", "CP1", 1, LimitKind::Energy, dec("10"))
        .await
        .unwrap();
    let session = h.repos.charging_sessions().find_by_id(&session_id).await.unwrap().unwrap();

    let now = Utc::now();
    h.engine.on_start_transaction(&session.id_tag, 7, 1000, now).await.unwrap();

    let stopped = h
        .engine
        .on_stop_transaction("CP1", 7, 6_000, now)
        .await
        .unwrap()
        .expect("StopTransaction at 5 kWh finalizes the session");

    assert_eq!(stopped.amount_charged, Some(75));
    assert_eq!(stopped.refund_amount, Some(75));
    assert!(stopped.reservation_is_exact());
    assert_eq!(h.balance_of("client-1").await, 925);
}

#[tokio::test]
async fn scenario_4_insufficient_funds() {
    let h = Harness::new("15").await;
    h.seed_client("client-1", 50).await;
    let _rx = h.connect_station("CP1");

    let err = h
        .engine
        .start_charge("client-1", "CP1", 1, LimitKind::Amount, dec("100"))
        .await
        .unwrap_err();
    assert_eq!(err, DomainError::InsufficientFunds);

    assert_eq!(h.balance_of("client-1").await, 50, "balance must be untouched on a failed reservation");
    assert!(!h.repos.charging_sessions().has_live_for_client("client-1").await.unwrap());
}

#[tokio::test]
async fn scenario_6_concurrent_double_start_only_one_succeeds() {
    let h = Harness::new("15").await;
    h.seed_client("client-1", 1000).await;
    let _rx_a = h.connect_station("CP1");
    let _rx_b = h.connect_station("CP2");

    let (res_a, res_b) = tokio::join!(
        h.engine.start_charge("client-1", "CP1", 1, LimitKind::Amount, dec("100")),
        h.engine.start_charge("client-1", "CP2", 1, LimitKind::Amount, dec("100")),
    );

    let successes = [&res_a, &res_b].iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1, "exactly one of the two concurrent starts succeeds");

    let failure = if res_a.is_err() { res_a } else { res_b };
    assert_eq!(failure.unwrap_err(), DomainError::ClientBusy);
    assert_eq!(h.balance_of("client-1").await, 900, "balance is decremented exactly once");
}

#[tokio::test]
async fn stop_charge_on_stopped_session_is_idempotent() {
    let h = Harness::new("15").await;
    h.seed_client("client-1", 1000).await;
    let _rx = h.connect_station("CP1");

    let session_id = h
        .engine
        .start_charge("client-1", "CP1", 1, LimitKind::Energy, dec("10"))
        .await
        .unwrap();
    let session = h.repos.charging_sessions().find_by_id(&session_id).await.unwrap().unwrap();
    let now = Utc::now();
    h.engine.on_start_transaction(&session.id_tag, 1, 1000, now).await.unwrap();
    h.engine.on_stop_transaction("CP1", 1, 11_000, now).await.unwrap();

    let first = h.engine.stop_charge(&session_id).await.unwrap();
    let second = h.engine.stop_charge(&session_id).await.unwrap();
    assert_eq!(first.status, SessionStatus::Stopped);
    assert_eq!(second.status, SessionStatus::Stopped);
    assert_eq!(first.amount_charged, second.amount_charged);
    assert_eq!(h.balance_of("client-1").await, 850, "repeated StopCharge does not re-settle");
}

#[tokio::test]
async fn start_charge_rejects_second_session_on_same_connector() {
    let h = Harness::new("15").await;
    h.seed_client("client-1", 1000).await;
    h.seed_client("client-2", 1000).await;
    let _rx = h.connect_station("CP1");

    h.engine
        .start_charge("client-1", "CP1", 1, LimitKind::Amount, dec("100"))
        .await
        .unwrap();

    let err = h
        .engine
        .start_charge("client-2", "CP1", 1, LimitKind::Amount, dec("100"))
        .await
        .unwrap_err();
    assert_eq!(err, DomainError::ConnectorBusy);
}

#[tokio::test]
async fn start_transaction_rejected_when_no_matching_pending_session() {
    let h = Harness::new("15").await;
    let result = h.engine.on_start_transaction("unknown-tag", 1, 1000, Utc::now()).await.unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn connector_fault_fails_active_session_with_full_refund() {
    let h = Harness::new("15").await;
    h.seed_client("client-1", 1000).await;
    let _rx = h.connect_station("CP1");

    let session_id = h
        .engine
        .start_charge("client-1", "CP1", 1, LimitKind::Energy, dec("10"))
        .await
        .unwrap();
    let session = h.repos.charging_sessions().find_by_id(&session_id).await.unwrap().unwrap();
    h.engine.on_start_transaction(&session.id_tag, 1, 1000, Utc::now()).await.unwrap();

    h.engine.on_connector_faulted("CP1", 1).await.unwrap();

    let session = h.repos.charging_sessions().find_by_id(&session_id).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Failed);
    assert_eq!(session.refund_amount, Some(150));
    assert_eq!(h.balance_of("client-1").await, 1000, "full reservation refunded on fault");
}
