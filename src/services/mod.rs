//! Domain services. Each entity has an async trait and a PostgreSQL
//! implementation built per request over the tenant pool. Permission checks
//! happen here, so handlers only extract input and forward it.

pub mod audit;
pub mod batch;
pub mod client;
pub mod document;
pub mod field_mapping;
pub mod order;
pub mod order_data;
pub mod order_flow;
pub mod project;
pub mod role;
pub mod schema;
pub mod tenant;
pub mod user;

pub use audit::{AuditService, PgAuditService};
pub use batch::{BatchService, PgBatchService};
pub use client::{ClientService, PgClientService};
pub use document::{DocumentService, PgDocumentService};
pub use field_mapping::{FieldMappingService, PgFieldMappingService};
pub use order::{OrderService, PgOrderService};
pub use order_data::{OrderDataService, PgOrderDataService};
pub use order_flow::{OrderFlowService, PgOrderFlowService};
pub use project::{PgProjectService, ProjectService};
pub use role::{PermissionService, PgPermissionService, PgRoleService, RoleService};
pub use schema::{PgSchemaService, SchemaService};
pub use tenant::TenantService;
pub use user::{PgUserService, UserService};
