//! Per-run lookup caches
//!
//! Explicit state owned by the orchestrator and passed into each stage, so
//! stages stay testable with a fresh cache and no ambient globals. Cleared on
//! every batch flush to bound memory growth; everything cached here is
//! rebuildable from the store.

use std::collections::HashMap;

use crate::domain::entities::AttributeValueKind;

/// Attribute registry entry resolved this run.
#[derive(Debug, Clone)]
pub struct CachedAttribute {
    pub id: String,
    pub value_kind: AttributeValueKind,
}

#[derive(Debug, Default)]
pub struct RunCaches {
    /// Derived external key -> resolved attribute.
    pub attributes: HashMap<String, CachedAttribute>,
    /// (attribute internal ID, exact trimmed value) -> option internal ID.
    pub options: HashMap<(String, String), String>,
    /// The fixed-name attribute group, once resolved.
    pub attribute_group: Option<String>,
    /// Normalized email -> user internal ID (includes users staged but not
    /// yet flushed, so identity matching sees them).
    pub users_by_email: HashMap<String, String>,
    /// Canonical phone -> user internal ID.
    pub users_by_phone: HashMap<String, String>,
    /// User internal ID -> (membership ID, vendor ID).
    pub members_by_user: HashMap<String, (String, String)>,
}

impl RunCaches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything. Safe because every entry is re-derivable from the
    /// store once the pending batch has been committed.
    pub fn clear(&mut self) {
        self.attributes.clear();
        self.options.clear();
        self.attribute_group = None;
        self.users_by_email.clear();
        self.users_by_phone.clear();
        self.members_by_user.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_resets_all_maps() {
        let mut caches = RunCaches::new();
        caches.attributes.insert(
            "attr:3".into(),
            CachedAttribute { id: "a-1".into(), value_kind: AttributeValueKind::Option },
        );
        caches.options.insert(("a-1".into(), "Black".into()), "o-1".into());
        caches.attribute_group = Some("g-1".into());
        caches.users_by_email.insert("a@b.com".into(), "u-1".into());

        caches.clear();

        assert!(caches.attributes.is_empty());
        assert!(caches.options.is_empty());
        assert!(caches.attribute_group.is_none());
        assert!(caches.users_by_email.is_empty());
    }
}
