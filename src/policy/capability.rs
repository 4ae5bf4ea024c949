//! Role-capability matrix.
//!
//! Each staff member holds a [`Role`]. The matrix decides which (module,
//! action) pairs that role may exercise. The table is a total function:
//! a pair with no rule — including module or action names that do not parse
//! at all — resolves to **denied**, never to an error, so callers can feed it
//! untrusted names without crashing.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::OpsError;

// ─── Roles ────────────────────────────────────────────────────────────────────

/// Roles a staff member can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Runs the newsroom — full editorial and administrative access.
    ChiefEditor,
    /// Leads one department — assigns and reviews work within it.
    DepartmentHead,
    /// Writes and submits content.
    Reporter,
    /// Administrative support — read-mostly access.
    Secretary,
    /// Technical administrator — full access.
    Admin,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::ChiefEditor,
        Role::DepartmentHead,
        Role::Reporter,
        Role::Secretary,
        Role::Admin,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::ChiefEditor => "chief-editor",
            Role::DepartmentHead => "department-head",
            Role::Reporter => "reporter",
            Role::Secretary => "secretary",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = OpsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chief-editor" => Ok(Role::ChiefEditor),
            "department-head" => Ok(Role::DepartmentHead),
            "reporter" => Ok(Role::Reporter),
            "secretary" => Ok(Role::Secretary),
            "admin" => Ok(Role::Admin),
            other => Err(OpsError::validation("role", format!("unknown role '{other}'"))),
        }
    }
}

// ─── Modules and actions ──────────────────────────────────────────────────────

/// Coarse functional areas the capability table is partitioned by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Module {
    TaskAssignment,
    AiContent,
    HrManagement,
    Administration,
    Reporting,
}

impl Module {
    pub const ALL: [Module; 5] = [
        Module::TaskAssignment,
        Module::AiContent,
        Module::HrManagement,
        Module::Administration,
        Module::Reporting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Module::TaskAssignment => "task-assignment",
            Module::AiContent => "ai-content",
            Module::HrManagement => "hr-management",
            Module::Administration => "administration",
            Module::Reporting => "reporting",
        }
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Module {
    type Err = OpsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "task-assignment" => Ok(Module::TaskAssignment),
            "ai-content" => Ok(Module::AiContent),
            "hr-management" => Ok(Module::HrManagement),
            "administration" => Ok(Module::Administration),
            "reporting" => Ok(Module::Reporting),
            other => Err(OpsError::validation(
                "module",
                format!("unknown module '{other}'"),
            )),
        }
    }
}

/// Named capabilities a module can define.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    View,
    Create,
    Edit,
    Delete,
    Assign,
    Approve,
    Export,
}

impl Action {
    pub const ALL: [Action; 7] = [
        Action::View,
        Action::Create,
        Action::Edit,
        Action::Delete,
        Action::Assign,
        Action::Approve,
        Action::Export,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Create => "create",
            Action::Edit => "edit",
            Action::Delete => "delete",
            Action::Assign => "assign",
            Action::Approve => "approve",
            Action::Export => "export",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = OpsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "view" => Ok(Action::View),
            "create" => Ok(Action::Create),
            "edit" => Ok(Action::Edit),
            "delete" => Ok(Action::Delete),
            "assign" => Ok(Action::Assign),
            "approve" => Ok(Action::Approve),
            "export" => Ok(Action::Export),
            other => Err(OpsError::validation(
                "action",
                format!("unknown action '{other}'"),
            )),
        }
    }
}

// ─── Role groupings used by the standard policy ───────────────────────────────

const EVERY_ROLE: &[Role] = &Role::ALL;

/// Roles that manage editorial work: create, assign, review.
const EDITORIAL_MANAGERS: &[Role] = &[Role::ChiefEditor, Role::DepartmentHead, Role::Admin];

/// Roles trusted with destructive or organization-wide operations.
const SENIOR_STAFF: &[Role] = &[Role::ChiefEditor, Role::Admin];

/// Roles that produce content.
const CONTENT_PRODUCERS: &[Role] = &[
    Role::ChiefEditor,
    Role::DepartmentHead,
    Role::Reporter,
    Role::Admin,
];

struct Rule {
    module: Module,
    action: Action,
    roles: &'static [Role],
}

const fn rule(module: Module, action: Action, roles: &'static [Role]) -> Rule {
    Rule {
        module,
        action,
        roles,
    }
}

/// The standard newsroom policy. Pairs absent from this table are denied.
const STANDARD_RULES: &[Rule] = &[
    // Task assignment: everyone sees the board; managers run it.
    rule(Module::TaskAssignment, Action::View, EVERY_ROLE),
    rule(Module::TaskAssignment, Action::Export, EVERY_ROLE),
    rule(Module::TaskAssignment, Action::Create, EDITORIAL_MANAGERS),
    rule(Module::TaskAssignment, Action::Edit, EDITORIAL_MANAGERS),
    rule(Module::TaskAssignment, Action::Assign, EDITORIAL_MANAGERS),
    rule(Module::TaskAssignment, Action::Approve, EDITORIAL_MANAGERS),
    rule(Module::TaskAssignment, Action::Delete, SENIOR_STAFF),
    // AI content: producers write, managers assign, senior staff approve/delete.
    rule(Module::AiContent, Action::View, EVERY_ROLE),
    rule(Module::AiContent, Action::Export, EVERY_ROLE),
    rule(Module::AiContent, Action::Create, CONTENT_PRODUCERS),
    rule(Module::AiContent, Action::Edit, CONTENT_PRODUCERS),
    rule(Module::AiContent, Action::Assign, EDITORIAL_MANAGERS),
    rule(Module::AiContent, Action::Approve, SENIOR_STAFF),
    rule(Module::AiContent, Action::Delete, SENIOR_STAFF),
    // HR and administration: senior staff only; assign/approve undefined.
    rule(Module::HrManagement, Action::View, SENIOR_STAFF),
    rule(Module::HrManagement, Action::Create, SENIOR_STAFF),
    rule(Module::HrManagement, Action::Edit, SENIOR_STAFF),
    rule(Module::HrManagement, Action::Delete, SENIOR_STAFF),
    rule(Module::HrManagement, Action::Export, SENIOR_STAFF),
    rule(Module::Administration, Action::View, SENIOR_STAFF),
    rule(Module::Administration, Action::Create, SENIOR_STAFF),
    rule(Module::Administration, Action::Edit, SENIOR_STAFF),
    rule(Module::Administration, Action::Delete, SENIOR_STAFF),
    rule(Module::Administration, Action::Export, SENIOR_STAFF),
    // Reporting: read-only, management tier.
    rule(Module::Reporting, Action::View, EDITORIAL_MANAGERS),
    rule(Module::Reporting, Action::Export, EDITORIAL_MANAGERS),
];

// ─── Matrix ───────────────────────────────────────────────────────────────────

/// Immutable capability table.
///
/// Constructed once at process start and shared by reference — there is no
/// runtime mutation path, which is what makes concurrent reads from any
/// number of requests safe.
pub struct CapabilityMatrix {
    rules: &'static [Rule],
}

impl CapabilityMatrix {
    /// The standard newsroom policy table.
    pub fn standard() -> Self {
        Self {
            rules: STANDARD_RULES,
        }
    }

    /// Whether `role` holds `action` on `module`.
    ///
    /// Pure and deterministic. Pairs without a rule are denied.
    pub fn allows(&self, role: Role, module: Module, action: Action) -> bool {
        for r in self.rules {
            if r.module == module && r.action == action {
                return r.roles.contains(&role);
            }
        }
        false
    }

    /// String-name variant of [`allows`](Self::allows) for callers sitting at
    /// an untyped boundary. Unknown module or action names deny; they never
    /// error.
    pub fn allows_named(&self, role: Role, module: &str, action: &str) -> bool {
        match (Module::from_str(module), Action::from_str(action)) {
            (Ok(m), Ok(a)) => self.allows(role, m, a),
            _ => false,
        }
    }

    /// Full per-module flag map for one role, in the shape the login response
    /// exposes to clients.
    pub fn permission_map(&self, role: Role) -> serde_json::Value {
        let mut modules = serde_json::Map::new();
        for module in Module::ALL {
            let mut actions = serde_json::Map::new();
            for action in Action::ALL {
                actions.insert(
                    action.as_str().to_string(),
                    serde_json::Value::Bool(self.allows(role, module, action)),
                );
            }
            modules.insert(module.as_str().to_string(), serde_json::Value::Object(actions));
        }
        serde_json::Value::Object(modules)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
