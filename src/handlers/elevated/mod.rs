// Elevated tier: tokens with `access = root`. Platform administration that
// spans tenants and runs against the IAM database.

pub mod root;
