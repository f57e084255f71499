//! SeaORM implementation of `ConnectorRepository`.

use async_trait::async_trait;
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};

use crate::domain::repositories::ConnectorRepository;
use crate::domain::{Connector, ConnectorStatus};
use crate::infrastructure::db::entities::connector;
use crate::shared::errors::DomainResult;

pub struct SeaOrmConnectorRepository {
    db: DatabaseConnection,
}

impl SeaOrmConnectorRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn model_to_domain(m: connector::Model) -> Connector {
    Connector {
        station_id: m.station_id,
        connector_id: m.connector_id,
        status: ConnectorStatus::from_str(&m.status).unwrap_or(ConnectorStatus::Available),
    }
}

#[async_trait]
impl ConnectorRepository for SeaOrmConnectorRepository {
    async fn find(&self, station_id: &str, connector_id: i32) -> DomainResult<Option<Connector>> {
        let model = connector::Entity::find()
            .filter(connector::Column::StationId.eq(station_id))
            .filter(connector::Column::ConnectorId.eq(connector_id))
            .one(&self.db)
            .await?;
        Ok(model.map(model_to_domain))
    }

    async fn upsert_status(
        &self,
        station_id: &str,
        connector_id: i32,
        status: ConnectorStatus,
    ) -> DomainResult<()> {
        let existing = connector::Entity::find()
            .filter(connector::Column::StationId.eq(station_id))
            .filter(connector::Column::ConnectorId.eq(connector_id))
            .one(&self.db)
            .await?;

        match existing {
            Some(existing) => {
                let mut active: connector::ActiveModel = existing.into();
                active.status = Set(status.as_str().to_owned());
                active.update(&self.db).await?;
            }
            None => {
                let active = connector::ActiveModel {
                    station_id: Set(station_id.to_owned()),
                    connector_id: Set(connector_id),
                    status: Set(status.as_str().to_owned()),
                };
                active.insert(&self.db).await?;
            }
        }
        Ok(())
    }

    async fn is_available(&self, station_id: &str, connector_id: i32) -> DomainResult<bool> {
        let status = self.find(station_id, connector_id).await?.map(|c| c.status);
        Ok(matches!(status, Some(ConnectorStatus::Available) | None))
    }
}
