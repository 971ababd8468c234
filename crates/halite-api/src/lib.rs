// halite-api: Async Rust client for the pool-controller vendor cloud API

pub mod client;
pub mod error;
pub mod models;
pub mod token;
pub mod transport;

pub use client::RestClient;
pub use error::Error;
pub use token::TokenCache;
pub use transport::{TlsMode, TransportConfig};
