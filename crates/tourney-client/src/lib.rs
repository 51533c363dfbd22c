// Library root: re-exports all modules so integration tests and the binary
// can access the client's public API.

pub mod app;
pub mod config;
pub mod feed;
