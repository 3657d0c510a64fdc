//! redb table definitions for the fleetscale state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// Groups keyed by `{group_id}`.
pub const GROUPS: TableDefinition<&str, &[u8]> = TableDefinition::new("groups");

/// Scaling history keyed by `{group_id}:{created_at_ms:020}`.
pub const GROUP_STATUS: TableDefinition<&str, &[u8]> = TableDefinition::new("group_status");
