pub mod attachment;
pub mod conversation;
pub mod message;
pub mod participant;
pub mod read_marker;
pub mod user;

pub use attachment::Attachment;
pub use conversation::{Conversation, ConversationKind};
pub use message::Message;
pub use participant::Participant;
pub use read_marker::ReadMarker;
pub use user::User;
