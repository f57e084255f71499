//! SeaORM implementation of `StationRepository`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, Set,
};

use crate::domain::repositories::StationRepository;
use crate::domain::{Station, StationStatus};
use crate::infrastructure::db::entities::station;
use crate::shared::errors::{DomainError, DomainResult};

pub struct SeaOrmStationRepository {
    db: DatabaseConnection,
}

impl SeaOrmStationRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn model_to_domain(m: station::Model) -> DomainResult<Station> {
    let boot_info = match m.boot_info {
        Some(s) => Some(
            serde_json::from_str(&s)
                .map_err(|e| DomainError::Internal(format!("boot_info decode: {e}")))?,
        ),
        None => None,
    };
    Ok(Station {
        id: m.id,
        location_id: m.location_id,
        owner_id: m.owner_id,
        status: StationStatus::from_str(&m.status).unwrap_or(StationStatus::Unknown),
        last_heartbeat_at: m.last_heartbeat_at,
        boot_info,
    })
}

#[async_trait]
impl StationRepository for SeaOrmStationRepository {
    async fn find_by_id(&self, id: &str) -> DomainResult<Option<Station>> {
        let model = station::Entity::find_by_id(id.to_owned()).one(&self.db).await?;
        model.map(model_to_domain).transpose()
    }

    async fn upsert_boot(
        &self,
        id: &str,
        boot_info: serde_json::Value,
        status: StationStatus,
    ) -> DomainResult<Station> {
        let existing = station::Entity::find_by_id(id.to_owned()).one(&self.db).await?;
        let boot_info_json = serde_json::to_string(&boot_info)
            .map_err(|e| DomainError::Internal(format!("boot_info encode: {e}")))?;

        let model = match existing {
            Some(existing) => {
                let mut active: station::ActiveModel = existing.into();
                active.boot_info = Set(Some(boot_info_json));
                active.status = Set(status.as_str().to_owned());
                active.update(&self.db).await?
            }
            None => {
                let active = station::ActiveModel {
                    id: Set(id.to_owned()),
                    location_id: Set(None),
                    owner_id: Set(None),
                    status: Set(status.as_str().to_owned()),
                    last_heartbeat_at: Set(None),
                    boot_info: Set(Some(boot_info_json)),
                };
                active.insert(&self.db).await?
            }
        };
        model_to_domain(model)
    }

    async fn set_status(&self, id: &str, status: StationStatus) -> DomainResult<()> {
        let Some(existing) = station::Entity::find_by_id(id.to_owned()).one(&self.db).await?
        else {
            return Err(DomainError::NotFound {
                entity: "station",
                id: id.to_owned(),
            });
        };
        let mut active: station::ActiveModel = existing.into();
        active.status = Set(status.as_str().to_owned());
        active.update(&self.db).await?;
        Ok(())
    }

    async fn touch_heartbeat(&self, id: &str, at: DateTime<Utc>) -> DomainResult<()> {
        let Some(existing) = station::Entity::find_by_id(id.to_owned()).one(&self.db).await?
        else {
            return Err(DomainError::NotFound {
                entity: "station",
                id: id.to_owned(),
            });
        };
        let mut active: station::ActiveModel = existing.into();
        active.last_heartbeat_at = Set(Some(at));
        active.update(&self.db).await?;
        Ok(())
    }

    async fn find_stale(&self, threshold: DateTime<Utc>) -> DomainResult<Vec<Station>> {
        let models = station::Entity::find()
            .filter(
                Condition::all()
                    .add(station::Column::Status.ne(StationStatus::Offline.as_str()))
                    .add(
                        Condition::any()
                            .add(station::Column::LastHeartbeatAt.lt(threshold))
                            .add(station::Column::LastHeartbeatAt.is_null()),
                    ),
            )
            .all(&self.db)
            .await?;
        models.into_iter().map(model_to_domain).collect()
    }

    async fn owner_of(&self, id: &str) -> DomainResult<Option<String>> {
        let model = station::Entity::find_by_id(id.to_owned()).one(&self.db).await?;
        Ok(model.and_then(|m| m.owner_id))
    }
}
