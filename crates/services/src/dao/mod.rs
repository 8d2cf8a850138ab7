pub mod base;
pub mod conversation;
pub mod message;
pub mod read_marker;
pub mod user;

pub use base::BaseDao;
