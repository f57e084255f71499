//! SeaORM implementation of `ClientRepository`.
//!
//! `debit`/`credit` bypass SeaORM's ActiveModel diffing — it can't express a
//! compare-and-set arithmetic update — and instead run a raw conditional
//! `UPDATE` through `ConnectionTrait::execute` (SPEC_FULL.md §2).

use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseConnection, EntityTrait, Statement};

use crate::domain::repositories::ClientRepository;
use crate::domain::Client;
use crate::infrastructure::db::entities::client;
use crate::shared::errors::DomainResult;

pub struct SeaOrmClientRepository {
    db: DatabaseConnection,
}

impl SeaOrmClientRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn model_to_domain(m: client::Model) -> Client {
    Client {
        id: m.id,
        balance: m.balance,
        currency: m.currency,
    }
}

#[async_trait]
impl ClientRepository for SeaOrmClientRepository {
    async fn find_by_id(&self, id: &str) -> DomainResult<Option<Client>> {
        let model = client::Entity::find_by_id(id.to_owned()).one(&self.db).await?;
        Ok(model.map(model_to_domain))
    }

    async fn debit(&self, id: &str, amount: i64) -> DomainResult<Option<i64>> {
        let backend = self.db.get_database_backend();
        let stmt = Statement::from_sql_and_values(
            backend,
            "UPDATE clients SET balance = balance - ? WHERE id = ? AND balance >= ?",
            [amount.into(), id.into(), amount.into()],
        );
        let result = self.db.execute(stmt).await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        let balance = self
            .find_by_id(id)
            .await?
            .map(|c| c.balance)
            .unwrap_or(0);
        Ok(Some(balance))
    }

    async fn credit(&self, id: &str, amount: i64) -> DomainResult<i64> {
        let backend = self.db.get_database_backend();
        let stmt = Statement::from_sql_and_values(
            backend,
            "UPDATE clients SET balance = balance + ? WHERE id = ?",
            [amount.into(), id.into()],
        );
        self.db.execute(stmt).await?;
        let balance = self
            .find_by_id(id)
            .await?
            .map(|c| c.balance)
            .unwrap_or(0);
        Ok(balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::db::connect_and_migrate;
    use sea_orm::{ActiveModelTrait, Set};
    use std::sync::Arc;

    async fn seeded_repo(balance: i64) -> SeaOrmClientRepository {
        let db = connect_and_migrate("sqlite::memory:").await.expect("connect");
        client::ActiveModel {
            id: Set("client-1".to_owned()),
            balance: Set(balance),
            currency: Set("som".to_owned()),
        }
        .insert(&db)
        .await
        .expect("seed client");
        SeaOrmClientRepository::new(db)
    }

    #[tokio::test]
    async fn debit_exactly_equal_to_balance_succeeds_and_zeroes_it() {
        let repo = seeded_repo(100).await;
        let balance = repo.debit("client-1", 100).await.unwrap();
        assert_eq!(balance, Some(0));
    }

    #[tokio::test]
    async fn debit_exceeding_balance_is_rejected_with_no_partial_effect() {
        let repo = seeded_repo(100).await;
        let balance = repo.debit("client-1", 101).await.unwrap();
        assert_eq!(balance, None);
        assert_eq!(repo.find_by_id("client-1").await.unwrap().unwrap().balance, 100);
    }

    #[tokio::test]
    async fn concurrent_debits_never_drive_the_balance_negative() {
        let repo = Arc::new(seeded_repo(100).await);
        let (a, b) = tokio::join!(repo.debit("client-1", 60), repo.debit("client-1", 60));
        let successes = [&a, &b].iter().filter(|r| r.as_ref().unwrap().is_some()).count();
        assert_eq!(successes, 1, "only one of two overlapping 60-unit debits against a 100-unit balance can succeed");
        assert_eq!(repo.find_by_id("client-1").await.unwrap().unwrap().balance, 40);
    }

    #[tokio::test]
    async fn credit_increases_balance() {
        let repo = seeded_repo(100).await;
        let balance = repo.credit("client-1", 25).await.unwrap();
        assert_eq!(balance, 125);
    }
}
