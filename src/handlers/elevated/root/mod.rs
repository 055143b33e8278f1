pub mod migrate;
pub mod tenant;

pub use migrate::migrate_all;
