pub mod clock;
pub mod config;
pub mod error;
pub mod file_store;
pub mod generation_cache;
pub mod logger;
pub mod poller;
pub mod post;
pub mod post_index;
pub mod post_store;
pub mod server;
pub mod text_utils;
pub mod view;
mod query_string;
mod test_data;
