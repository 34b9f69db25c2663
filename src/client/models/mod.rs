pub mod feed;
pub mod forms;
pub mod moderation;
