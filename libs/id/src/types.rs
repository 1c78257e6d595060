//! Typed ID definitions for all scheduler resources.
//!
//! Each ID type has a unique prefix that identifies the resource type.
//! IDs are ULID-based for sortability and uniqueness.

use crate::define_id;

// =============================================================================
// Sessions and Kernels
// =============================================================================

define_id!(SessionId, "sess");
define_id!(KernelId, "krnl");

// =============================================================================
// Fleet
// =============================================================================

define_id!(AgentId, "agnt");

// =============================================================================
// Ownership
// =============================================================================

define_id!(UserId, "usr");
define_id!(ProjectId, "prj");

// =============================================================================
// Requests and Events
// =============================================================================

define_id!(RequestId, "req");
