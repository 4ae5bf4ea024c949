//! `policy` — role-capability policy for the newsroom core.
//!
//! - **Capability matrix** — immutable table deciding, per (role, module,
//!   action), whether a mutation is allowed. Built once at startup and
//!   injected wherever authorization happens; nothing mutates it at runtime.
//! - **Permission guard** — the single checkpoint every mutating service
//!   passes through before touching state. Centralizing the check here keeps
//!   the matrix the only place policy ever changes.

pub mod capability;
pub mod guard;

pub use capability::{Action, CapabilityMatrix, Module, Role};
pub use guard::PermissionGuard;
