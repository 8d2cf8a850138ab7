use bson::{doc, oid::ObjectId};
use mongodb::Database;
use vitalis_db::models::User;

use super::base::{BaseDao, DaoError, DaoResult};

/// Read-only access to the platform's user directory. Accounts are
/// created and deactivated by the main application; chat only looks
/// people up.
pub struct UserDao {
    pub base: BaseDao<User>,
}

impl UserDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, User::COLLECTION),
        }
    }

    pub async fn find_by_id_in_tenant(&self, tenant_id: ObjectId, user_id: ObjectId) -> DaoResult<User> {
        self.base.find_by_id_in_tenant(tenant_id, user_id).await
    }

    /// The active directory entry for a user, or NotFound. Deactivated
    /// accounts are treated as absent on purpose.
    pub async fn find_active(&self, tenant_id: ObjectId, user_id: ObjectId) -> DaoResult<User> {
        self.base
            .find_one(doc! { "_id": user_id, "tenant_id": tenant_id, "is_active": true })
            .await?
            .ok_or(DaoError::NotFound)
    }

    pub async fn find_active_by_tenant(&self, tenant_id: ObjectId) -> DaoResult<Vec<User>> {
        self.base
            .find_many(
                doc! { "tenant_id": tenant_id, "is_active": true },
                Some(doc! { "name": 1 }),
            )
            .await
    }

    /// Batch-fetch display names for a list of user IDs.
    pub async fn find_names(
        &self,
        user_ids: &[ObjectId],
    ) -> DaoResult<std::collections::HashMap<ObjectId, String>> {
        use futures::TryStreamExt;
        let mut result = std::collections::HashMap::new();
        if user_ids.is_empty() {
            return Ok(result);
        }

        let ids_bson: Vec<bson::Bson> = user_ids.iter().map(|id| bson::Bson::ObjectId(*id)).collect();
        let filter = doc! { "_id": { "$in": ids_bson } };

        // Raw documents so the projection doesn't fight the model type
        let projection = doc! { "_id": 1, "name": 1 };
        let coll = self.base.collection().clone_with_type::<bson::Document>();
        let mut cursor = coll.find(filter).projection(projection).await?;

        while let Some(doc) = cursor.try_next().await? {
            if let Ok(id) = doc.get_object_id("_id") {
                let name = doc.get_str("name").unwrap_or("").to_string();
                if !name.is_empty() {
                    result.insert(id, name);
                }
            }
        }
        Ok(result)
    }
}
