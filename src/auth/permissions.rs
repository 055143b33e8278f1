use serde::{Serialize, Serializer};

/// Permission codes seeded into every tenant database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    UsersRead,
    UsersManage,
    RolesRead,
    RolesManage,
    ClientsRead,
    ClientsManage,
    ProjectsRead,
    ProjectsManage,
    SchemasRead,
    SchemasManage,
    BatchesRead,
    BatchesManage,
    OrdersRead,
    OrdersManage,
    OrdersProcess,
    OrdersReview,
    DocumentsManage,
    AuditRead,
}

impl Permission {
    pub const ALL: [Permission; 18] = [
        Permission::UsersRead,
        Permission::UsersManage,
        Permission::RolesRead,
        Permission::RolesManage,
        Permission::ClientsRead,
        Permission::ClientsManage,
        Permission::ProjectsRead,
        Permission::ProjectsManage,
        Permission::SchemasRead,
        Permission::SchemasManage,
        Permission::BatchesRead,
        Permission::BatchesManage,
        Permission::OrdersRead,
        Permission::OrdersManage,
        Permission::OrdersProcess,
        Permission::OrdersReview,
        Permission::DocumentsManage,
        Permission::AuditRead,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Permission::UsersRead => "users.read",
            Permission::UsersManage => "users.manage",
            Permission::RolesRead => "roles.read",
            Permission::RolesManage => "roles.manage",
            Permission::ClientsRead => "clients.read",
            Permission::ClientsManage => "clients.manage",
            Permission::ProjectsRead => "projects.read",
            Permission::ProjectsManage => "projects.manage",
            Permission::SchemasRead => "schemas.read",
            Permission::SchemasManage => "schemas.manage",
            Permission::BatchesRead => "batches.read",
            Permission::BatchesManage => "batches.manage",
            Permission::OrdersRead => "orders.read",
            Permission::OrdersManage => "orders.manage",
            Permission::OrdersProcess => "orders.process",
            Permission::OrdersReview => "orders.review",
            Permission::DocumentsManage => "documents.manage",
            Permission::AuditRead => "audit.read",
        }
    }

    pub fn from_code(code: &str) -> Option<Permission> {
        Permission::ALL.into_iter().find(|p| p.as_str() == code)
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Permission {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn codes_are_unique_and_parse_back() {
        let codes: HashSet<_> = Permission::ALL.iter().map(|p| p.as_str()).collect();
        assert_eq!(codes.len(), Permission::ALL.len());

        for permission in Permission::ALL {
            assert_eq!(Permission::from_code(permission.as_str()), Some(permission));
        }
        assert_eq!(Permission::from_code("orders.delete"), None);
    }

    #[test]
    fn seeded_codes_match() {
        let seed = include_str!("../../migrations/tenant/0001_identity.sql");
        for permission in Permission::ALL {
            assert!(seed.contains(&format!("'{}'", permission)), "{} missing from seed", permission);
        }
    }
}
