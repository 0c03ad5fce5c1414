pub mod api_client;
pub mod export;
pub mod loader;
