pub mod config;
pub mod feed;
pub mod media;
pub mod platform;
