//! Core types for warden.
//!
//! This crate provides the foundational types shared by the role store, the
//! projection cache and the gateway:
//!
//! - **Identifiers**: strongly-typed object IDs for projects and roles
//! - **Permissions**: the typed `{actions: [...]}` record granted per resource
//!
//! # Example
//!
//! ```
//! use warden_core::{Permission, ProjectId, RoleId};
//!
//! let project_id = ProjectId::from_hex("65f1c0a2b3d4e5f607182930").unwrap();
//! let role_id = RoleId::generate();
//!
//! let permission = Permission::new(["read", "write"]);
//! assert!(permission.allows("read"));
//! # let _ = (project_id, role_id);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod ids;
pub mod permission;

pub use ids::{IdError, ProjectId, RoleId, OBJECT_ID_LEN};
pub use permission::{Permission, PermissionMap};
