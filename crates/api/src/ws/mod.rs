pub mod dispatcher;
pub mod events;
pub mod handler;
pub mod rooms;
pub mod storage;
pub mod typing;
