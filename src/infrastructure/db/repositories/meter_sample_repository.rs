//! SeaORM implementation of `MeterSampleRepository` — append-only writer.

use async_trait::async_trait;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set};

use crate::domain::repositories::MeterSampleRepository;
use crate::domain::OcppMeterSample;
use crate::infrastructure::db::entities::meter_sample;
use crate::shared::errors::DomainResult;

pub struct SeaOrmMeterSampleRepository {
    db: DatabaseConnection,
}

impl SeaOrmMeterSampleRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MeterSampleRepository for SeaOrmMeterSampleRepository {
    async fn append(&self, sample: OcppMeterSample) -> DomainResult<()> {
        let active = meter_sample::ActiveModel {
            id: Default::default(),
            session_id: Set(sample.session_id),
            timestamp: Set(sample.timestamp),
            meter_wh: Set(sample.meter_wh),
            measurand: Set(sample.measurand),
            unit: Set(sample.unit),
        };
        active.insert(&self.db).await?;
        Ok(())
    }

    async fn latest_for_session(&self, session_id: &str) -> DomainResult<Option<OcppMeterSample>> {
        let model = meter_sample::Entity::find()
            .filter(meter_sample::Column::SessionId.eq(session_id))
            .order_by_desc(meter_sample::Column::Timestamp)
            .one(&self.db)
            .await?;
        Ok(model.map(|m| OcppMeterSample {
            session_id: m.session_id,
            timestamp: m.timestamp,
            meter_wh: m.meter_wh,
            measurand: m.measurand,
            unit: m.unit,
        }))
    }
}
