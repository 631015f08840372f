/// Courier shared crate.
///
/// Types and pure logic used by both the downloader and the API server.
pub mod errors;
pub mod formats;
pub mod models;
pub mod naming;
pub mod platform;
