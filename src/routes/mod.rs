pub mod health;
pub mod login;
pub mod tokens;

pub use health::create_health_routes;
pub use login::create_login_routes;
pub use tokens::create_token_routes;
