//! SeaORM implementation of `TariffRepository` (spec.md §9 Open Questions).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter};
use std::str::FromStr;

use crate::domain::repositories::TariffRepository;
use crate::infrastructure::db::entities::tariff_rule;
use crate::shared::errors::{DomainError, DomainResult};

pub struct SeaOrmTariffRepository {
    db: DatabaseConnection,
}

impl SeaOrmTariffRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TariffRepository for SeaOrmTariffRepository {
    async fn effective_price(
        &self,
        station_id: &str,
        now: DateTime<Utc>,
        default_price: Decimal,
    ) -> DomainResult<Decimal> {
        let window = Condition::all()
            .add(
                Condition::any()
                    .add(tariff_rule::Column::ValidFrom.is_null())
                    .add(tariff_rule::Column::ValidFrom.lte(now)),
            )
            .add(
                Condition::any()
                    .add(tariff_rule::Column::ValidTo.is_null())
                    .add(tariff_rule::Column::ValidTo.gt(now)),
            );

        let station_rule = tariff_rule::Entity::find()
            .filter(tariff_rule::Column::StationId.eq(station_id))
            .filter(window.clone())
            .one(&self.db)
            .await?;

        let rule = match station_rule {
            Some(r) => Some(r),
            None => {
                tariff_rule::Entity::find()
                    .filter(tariff_rule::Column::StationId.is_null())
                    .filter(window)
                    .one(&self.db)
                    .await?
            }
        };

        match rule {
            Some(r) => Decimal::from_str(&r.price_per_kwh)
                .map_err(|e| DomainError::Internal(format!("price_per_kwh decode: {e}"))),
            None => Ok(default_price),
        }
    }
}
