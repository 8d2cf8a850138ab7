use mongodb::{Database, IndexModel, options::IndexOptions};
use tracing::info;

pub async fn ensure_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    // Users (directory replica; written by the main platform)
    create_indexes(
        db,
        "users",
        vec![index(bson::doc! { "tenant_id": 1, "is_active": 1 })],
    )
    .await?;

    // Conversations
    create_indexes(
        db,
        "conversations",
        vec![
            // At most one active general conversation per tenant.
            index_unique_partial(
                bson::doc! { "tenant_id": 1 },
                bson::doc! { "kind": "GENERAL", "is_active": true },
            ),
            // One private conversation per user pair (key is pair-symmetric).
            index_unique_sparse(bson::doc! { "direct_key": 1 }),
            index(bson::doc! { "tenant_id": 1, "updated_at": -1 }),
        ],
    )
    .await?;

    // Participants
    create_indexes(
        db,
        "participants",
        vec![
            index_unique(bson::doc! { "conversation_id": 1, "user_id": 1 }),
            index(bson::doc! { "tenant_id": 1, "user_id": 1, "is_active": 1 }),
        ],
    )
    .await?;

    // Messages
    create_indexes(
        db,
        "messages",
        vec![
            index(bson::doc! { "conversation_id": 1, "created_at": -1, "_id": -1 }),
            index(bson::doc! { "tenant_id": 1, "sender_id": 1 }),
        ],
    )
    .await?;

    // Attachments
    create_indexes(
        db,
        "attachments",
        vec![index(bson::doc! { "message_id": 1 })],
    )
    .await?;

    // Read markers
    create_indexes(
        db,
        "read_markers",
        vec![
            index_unique(bson::doc! { "message_id": 1, "user_id": 1 }),
            index(bson::doc! { "conversation_id": 1, "user_id": 1 }),
        ],
    )
    .await?;

    info!("All indexes ensured");
    Ok(())
}

fn index(keys: bson::Document) -> IndexModel {
    IndexModel::builder().keys(keys).build()
}

fn index_unique(keys: bson::Document) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().unique(true).build())
        .build()
}

fn index_unique_sparse(keys: bson::Document) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().unique(true).sparse(true).build())
        .build()
}

fn index_unique_partial(keys: bson::Document, filter: bson::Document) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(
            IndexOptions::builder()
                .unique(true)
                .partial_filter_expression(filter)
                .build(),
        )
        .build()
}

async fn create_indexes(
    db: &Database,
    collection: &str,
    indexes: Vec<IndexModel>,
) -> Result<(), mongodb::error::Error> {
    let coll = db.collection::<bson::Document>(collection);
    match coll.create_indexes(indexes.clone()).await {
        Ok(_) => {
            info!(collection, "Indexes created");
            Ok(())
        }
        Err(e) => {
            // IndexKeySpecsConflict (code 86): an existing index has the same name
            // but different options (e.g. a partial filter added later). Drop the
            // conflicting indexes and retry.
            if let mongodb::error::ErrorKind::Command(ref cmd_err) = *e.kind {
                if cmd_err.code == 86 {
                    tracing::warn!(
                        collection,
                        "Index conflict detected, dropping conflicting indexes and retrying"
                    );
                    coll.drop_indexes().await?;
                    coll.create_indexes(indexes).await?;
                    info!(collection, "Indexes recreated after conflict resolution");
                    return Ok(());
                }
            }
            Err(e)
        }
    }
}
