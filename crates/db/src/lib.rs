pub mod indexes;
pub mod models;

use mongodb::{Client, Database, options::ClientOptions};
use tracing::info;
use vitalis_config::DatabaseSettings;

pub async fn connect(settings: &DatabaseSettings) -> Result<Database, mongodb::error::Error> {
    let mut options = ClientOptions::parse(&settings.uri).await?;
    options.app_name = Some("vitalis-chat".to_string());
    let client = Client::with_options(options)?;
    let db = client.database(&settings.name);
    info!(db = %settings.name, "Connected to MongoDB");
    Ok(db)
}
