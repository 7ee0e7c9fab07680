//! Authorization types.
//!
//! Every user of MediPort has a [`Role`], and every role grants a set of [`Permission`]s through
//! a [`RolePermissionTable`]. Frontends consult the table to decide which actions to offer. All
//! checks are total and deny by default: a role that is unknown or missing from the table has no
//! permissions.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

/// Capabilities that gate actions in MediPort frontends.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Create users and change their roles (serialized as `"manage_users"`).
    ManageUsers,
    /// Edit and discharge patients (serialized as `"manage_patients"`).
    ManagePatients,
    /// List and inspect patients (serialized as `"view_patients"`).
    ViewPatients,
    /// Admit new patients (serialized as `"add_patients"`).
    AddPatients,
    /// Assign patients to beds (serialized as `"assign_beds"`).
    AssignBeds,
    /// Maintain the medication inventory and prescribe (serialized as `"manage_medications"`).
    ManageMedications,
    /// List the medication inventory (serialized as `"view_medications"`).
    ViewMedications,
    /// Dispatch medication transports (serialized as `"manage_transports"`).
    ManageTransports,
    /// Read activity logs (serialized as `"view_logs"`).
    ViewLogs,
}

impl Permission {
    /// All permissions, in declaration order.
    pub const ALL: [Permission; 9] = [
        Permission::ManageUsers,
        Permission::ManagePatients,
        Permission::ViewPatients,
        Permission::AddPatients,
        Permission::AssignBeds,
        Permission::ManageMedications,
        Permission::ViewMedications,
        Permission::ManageTransports,
        Permission::ViewLogs,
    ];

    /// Returns the serialized name of this permission.
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ManageUsers => "manage_users",
            Permission::ManagePatients => "manage_patients",
            Permission::ViewPatients => "view_patients",
            Permission::AddPatients => "add_patients",
            Permission::AssignBeds => "assign_beds",
            Permission::ManageMedications => "manage_medications",
            Permission::ViewMedications => "view_medications",
            Permission::ManageTransports => "manage_transports",
            Permission::ViewLogs => "view_logs",
        }
    }

    /// Parses a permission from its serialized name.
    ///
    /// Returns `None` for unknown names.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == name)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The category of a MediPort user.
///
/// Roles are serialized by their descriptive name, for example `"Transport Tech"`. The backend
/// uses single-character codes instead, see [`crate::role_code`].
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    /// Full access, including user management.
    #[serde(rename = "Administrator")]
    Administrator,
    /// Treats patients and prescribes medication.
    #[serde(rename = "Doctor")]
    Doctor,
    /// Reads patient and medication data.
    #[serde(rename = "Nurse")]
    Nurse,
    /// Maintains the medication inventory.
    #[serde(rename = "Pharmacist")]
    Pharmacist,
    /// Operates medication transports.
    #[serde(rename = "Transport Tech")]
    TransportTech,
    /// Admits patients and assigns beds.
    #[serde(rename = "Receptionist")]
    Receptionist,
}

impl Role {
    /// All roles, in declaration order.
    pub const ALL: [Role; 6] = [
        Role::Administrator,
        Role::Doctor,
        Role::Nurse,
        Role::Pharmacist,
        Role::TransportTech,
        Role::Receptionist,
    ];

    /// Returns the descriptive name of this role.
    pub fn name(&self) -> &'static str {
        match self {
            Role::Administrator => "Administrator",
            Role::Doctor => "Doctor",
            Role::Nurse => "Nurse",
            Role::Pharmacist => "Pharmacist",
            Role::TransportTech => "Transport Tech",
            Role::Receptionist => "Receptionist",
        }
    }

    /// Parses a role from its descriptive name.
    ///
    /// Returns `None` for unknown names. Callers must treat `None` as "no permissions"; an
    /// unknown name is never mapped to a default role.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.name() == name)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A mapping from [`Role`] to the set of [`Permission`]s it grants.
///
/// [`RolePermissionTable::default`] returns the table MediPort ships with. Lookups for roles
/// without an entry, or for an unknown role (`None`), yield no permissions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePermissionTable {
    entries: BTreeMap<Role, HashSet<Permission>>,
}

static NO_PERMISSIONS: LazyLock<HashSet<Permission>> = LazyLock::new(HashSet::new);

static DEFAULT_TABLE: LazyLock<RolePermissionTable> = LazyLock::new(|| {
    use Permission::*;

    RolePermissionTable::empty()
        .grant(Role::Administrator, Permission::ALL)
        .grant(
            Role::Doctor,
            [
                ManagePatients,
                ViewPatients,
                ManageMedications,
                ViewMedications,
                ViewLogs,
            ],
        )
        .grant(Role::Nurse, [ViewPatients, ViewMedications, ViewLogs])
        .grant(Role::Pharmacist, [ManageMedications, ViewMedications, ViewLogs])
        .grant(Role::TransportTech, [ManageTransports, ViewLogs])
        .grant(Role::Receptionist, [AddPatients, AssignBeds, ViewPatients])
});

impl RolePermissionTable {
    /// Creates a table without any entries.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Adds the given permissions to the entry of `role`.
    pub fn grant(mut self, role: Role, permissions: impl IntoIterator<Item = Permission>) -> Self {
        self.entries.entry(role).or_default().extend(permissions);
        self
    }

    /// Returns the permissions granted to `role`.
    ///
    /// The set is empty for `None` and for roles without an entry.
    pub fn permissions(&self, role: impl Into<Option<Role>>) -> &HashSet<Permission> {
        role.into()
            .and_then(|role| self.entries.get(&role))
            .unwrap_or(&*NO_PERMISSIONS)
    }

    /// Checks whether `role` is granted `permission`.
    pub fn has_permission(&self, role: impl Into<Option<Role>>, permission: Permission) -> bool {
        self.permissions(role).contains(&permission)
    }

    /// Checks whether `role` is granted at least one of `permissions`.
    ///
    /// Returns `false` for an empty list.
    pub fn has_any_permission(
        &self,
        role: impl Into<Option<Role>>,
        permissions: &[Permission],
    ) -> bool {
        let granted = self.permissions(role);
        permissions.iter().any(|p| granted.contains(p))
    }

    /// Checks whether `role` is granted every one of `permissions`.
    ///
    /// Returns `true` for an empty list.
    pub fn has_all_permissions(
        &self,
        role: impl Into<Option<Role>>,
        permissions: &[Permission],
    ) -> bool {
        let granted = self.permissions(role);
        permissions.iter().all(|p| granted.contains(p))
    }
}

impl Default for RolePermissionTable {
    fn default() -> Self {
        DEFAULT_TABLE.clone()
    }
}

/// Returns the table MediPort ships with.
pub fn default_table() -> &'static RolePermissionTable {
    &DEFAULT_TABLE
}

/// Checks `permission` against the default table.
///
/// See [`RolePermissionTable::has_permission`].
pub fn has_permission(role: impl Into<Option<Role>>, permission: Permission) -> bool {
    DEFAULT_TABLE.has_permission(role, permission)
}

/// Checks `permissions` against the default table, requiring at least one.
///
/// See [`RolePermissionTable::has_any_permission`].
pub fn has_any_permission(role: impl Into<Option<Role>>, permissions: &[Permission]) -> bool {
    DEFAULT_TABLE.has_any_permission(role, permissions)
}

/// Checks `permissions` against the default table, requiring all of them.
///
/// See [`RolePermissionTable::has_all_permissions`].
pub fn has_all_permissions(role: impl Into<Option<Role>>, permissions: &[Permission]) -> bool {
    DEFAULT_TABLE.has_all_permissions(role, permissions)
}
