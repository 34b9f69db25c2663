pub mod admin_service;
pub mod api;
pub mod interactions;
pub mod live_updates;
pub mod message_parser;
pub mod query_cache;
pub mod websocket_client;
