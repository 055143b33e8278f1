// Public tier: no authentication. Service info, liveness and token acquisition.

pub mod auth;
pub mod info;

pub use auth::login;
pub use info::{health, root};
