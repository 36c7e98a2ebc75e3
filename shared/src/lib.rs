pub mod batch;
pub mod config;
pub mod error;
pub mod geometry;
pub mod http;
pub mod image;
pub mod keys;
pub mod logging;
pub mod notify;
pub mod pipeline;
pub mod staging;
pub mod storage;
pub mod upload;
pub mod validate;
