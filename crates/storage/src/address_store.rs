use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, QueryOrder, Set};
use txsync_domain::model::{AddressId, NewTrackedAddress, TrackedAddress};
use txsync_domain::storage::{AddressStore, StorageResult};

use crate::entity::tracked_addresses;
use crate::errors::{map_db_err, StorageError};
use crate::SeaOrmStorage;

#[async_trait::async_trait]
impl AddressStore for SeaOrmStorage {
    async fn insert_address(&self, address: NewTrackedAddress) -> StorageResult<TrackedAddress> {
        let model = tracked_addresses::ActiveModel {
            address: Set(address.address.into_inner()),
            public_key: Set(address.public_key),
            private_key: Set(address.private_key),
            description: Set(address.description),
            created_at: Set(Utc::now()),
        };
        let created = model.insert(self.connection()).await.map_err(map_db_err)?;
        address_to_record(created)
    }

    async fn find_address(&self, address: &AddressId) -> StorageResult<Option<TrackedAddress>> {
        let maybe = tracked_addresses::Entity::find_by_id(address.as_str().to_owned())
            .one(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        maybe.map(address_to_record).transpose()
    }

    async fn list_addresses(&self) -> StorageResult<Vec<TrackedAddress>> {
        tracked_addresses::Entity::find()
            .order_by_asc(tracked_addresses::Column::CreatedAt)
            .order_by_asc(tracked_addresses::Column::Address)
            .all(self.connection())
            .await
            .map_err(StorageError::from_source)?
            .into_iter()
            .map(address_to_record)
            .collect()
    }

    async fn update_description(
        &self,
        address: &AddressId,
        description: String,
    ) -> StorageResult<Option<TrackedAddress>> {
        let maybe = tracked_addresses::Entity::find_by_id(address.as_str().to_owned())
            .one(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        let Some(model) = maybe else {
            return Ok(None);
        };

        let mut active: tracked_addresses::ActiveModel = model.into();
        active.description = Set(description);
        let updated = active
            .update(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        address_to_record(updated).map(Some)
    }
}

fn address_to_record(model: tracked_addresses::Model) -> StorageResult<TrackedAddress> {
    let address =
        AddressId::parse(&model.address).map_err(|err| StorageError::Database(err.to_string()))?;

    Ok(TrackedAddress {
        address,
        public_key: model.public_key,
        private_key: model.private_key,
        description: model.description,
        created_at: model.created_at,
    })
}
