// Protected tier: bearer token, resolved tenant and validated user required.
//
// Every handler receives `TenantPool` and `ValidatedUser` from the middleware
// stack, builds the entity's Postgres service over the tenant pool and returns
// the service result as is. Permission checks happen inside the services.

pub mod audit;
pub mod batches;
pub mod clients;
pub mod documents;
pub mod field_mappings;
pub mod me;
pub mod orders;
pub mod projects;
pub mod roles;
pub mod schemas;
pub mod users;
