pub mod audit_log;
pub mod batch;
pub mod client;
pub mod document;
pub mod order;
pub mod project;
pub mod role;
pub mod schema;
pub mod tenant;
pub mod user;
