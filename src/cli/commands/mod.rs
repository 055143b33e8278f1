pub mod auth;
pub mod migrate;
pub mod server;
pub mod tenant;
pub mod token;
