use std::sync::Arc;

use mongodb::Database;
use vitalis_config::Settings;
use vitalis_services::auth::AuthService;
use vitalis_services::dao::{
    conversation::ConversationDao, message::MessageDao, read_marker::ReadMarkerDao, user::UserDao,
};

use crate::ws::{rooms::RoomRegistry, storage::WsStorage, typing::TypingTracker};

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub users: Arc<UserDao>,
    pub conversations: Arc<ConversationDao>,
    pub messages: Arc<MessageDao>,
    pub read_markers: Arc<ReadMarkerDao>,
    pub auth: Arc<AuthService>,
    pub ws_storage: Arc<WsStorage>,
    pub rooms: Arc<RoomRegistry>,
    pub typing: Arc<TypingTracker>,
}

impl AppState {
    pub fn new(db: &Database, settings: Settings) -> Self {
        let auth = AuthService::new(&settings.auth.jwt_secret);
        Self {
            settings: Arc::new(settings),
            users: Arc::new(UserDao::new(db)),
            conversations: Arc::new(ConversationDao::new(db)),
            messages: Arc::new(MessageDao::new(db)),
            read_markers: Arc::new(ReadMarkerDao::new(db)),
            auth: Arc::new(auth),
            ws_storage: Arc::new(WsStorage::new()),
            rooms: Arc::new(RoomRegistry::new()),
            typing: Arc::new(TypingTracker::new()),
        }
    }
}
