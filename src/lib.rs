pub mod config;
pub mod correlation;
pub mod error;
pub mod flow;
pub mod health;
pub mod identity;
pub mod routes;
pub mod server;
pub mod test_utils;
pub mod token;
pub mod users;

pub use config::Config;
pub use server::Server;
