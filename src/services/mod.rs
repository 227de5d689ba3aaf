pub mod message_board;

pub use message_board::{BoardError, Conversation, Message, MessageBoard};
