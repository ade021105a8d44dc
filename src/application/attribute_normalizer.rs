//! Attribute/option normalizer
//!
//! Maps source-declared attributes (global registry entries plus record-inline
//! custom attributes) onto the internal attribute registry, deduplicated by a
//! derived external key. Registry writes are immediate rather than batched:
//! the run caches are cleared on every flush and the next lookup has to find
//! the rows already persisted.

use chrono::Utc;
use uuid::Uuid;

use crate::application::caches::{CachedAttribute, RunCaches};
use crate::application::identity_map::IdentityMap;
use crate::domain::entities::{Attribute, AttributeGroup, AttributeOption, AttributeValueKind};
use crate::domain::errors::{SyncError, SyncResult};
use crate::domain::identity::EntityKind;
use crate::infrastructure::catalog_repository::CatalogRepository;
use crate::infrastructure::parsing::slugify;
use crate::infrastructure::source_dtos::SourceAttribute;

/// Fixed name of the synthetic group every imported attribute hangs off.
pub const ATTRIBUTE_GROUP_NAME: &str = "Imported attributes";

pub struct AttributeNormalizer<'a> {
    identity: &'a IdentityMap,
    catalog: &'a CatalogRepository,
}

impl<'a> AttributeNormalizer<'a> {
    pub fn new(identity: &'a IdentityMap, catalog: &'a CatalogRepository) -> Self {
        Self { identity, catalog }
    }

    /// Derived external key: global identifier when the source has one,
    /// otherwise a slug of the display name.
    pub fn external_key(attribute: &SourceAttribute) -> String {
        match attribute.id.filter(|id| *id > 0) {
            Some(id) => format!("attr:{id}"),
            None => format!("custom:{}", slugify(attribute.name.as_deref().unwrap_or(""))),
        }
    }

    /// Resolve a source attribute to its registry entry, creating it on first
    /// sight. `observed_values` is the current record's view of the
    /// attribute's distinct values and drives value-kind inference; a record
    /// implying a different kind than the stored one redefines it
    /// (last-write-wins) with a warning.
    pub async fn resolve(
        &self,
        attribute: &SourceAttribute,
        observed_values: &[&str],
        caches: &mut RunCaches,
    ) -> SyncResult<CachedAttribute> {
        let name = attribute
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| SyncError::malformed("attribute without a name"))?;
        let key = Self::external_key(attribute);

        let mut distinct: Vec<&str> =
            observed_values.iter().map(|v| v.trim()).filter(|v| !v.is_empty()).collect();
        distinct.sort_unstable();
        distinct.dedup();
        let inferred = AttributeValueKind::from_option_count(distinct.len());

        if let Some(cached) = caches.attributes.get(&key) {
            if cached.value_kind == inferred {
                return Ok(cached.clone());
            }
        }

        let group_id = self.ensure_group(caches).await?;
        let internal_id = self.identity.get_or_create(EntityKind::Attribute, &key, None).await?;
        let now = Utc::now();

        let resolved = match self.catalog.find_attribute(&internal_id).await? {
            Some(existing) => {
                if existing.value_kind != inferred {
                    // The source shows differing option counts per record for
                    // the same attribute; the last-processed record wins.
                    tracing::warn!(
                        attribute = %key,
                        old_kind = existing.value_kind.as_str(),
                        new_kind = inferred.as_str(),
                        "Attribute value kind redefined by current record"
                    );
                    self.catalog
                        .upsert_attribute(&Attribute {
                            name: name.to_string(),
                            value_kind: inferred,
                            updated_at: now,
                            ..existing
                        })
                        .await?;
                }
                CachedAttribute { id: internal_id, value_kind: inferred }
            }
            None => {
                self.catalog
                    .upsert_attribute(&Attribute {
                        id: internal_id.clone(),
                        group_id,
                        external_key: key.clone(),
                        name: name.to_string(),
                        value_kind: inferred,
                        created_at: now,
                        updated_at: now,
                    })
                    .await?;
                CachedAttribute { id: internal_id, value_kind: inferred }
            }
        };

        caches.attributes.insert(key, resolved.clone());
        Ok(resolved)
    }

    /// Resolve one option value under an attribute, creating it on first
    /// occurrence. Returns `None` for blank values. The exact trimmed string
    /// is the identity; case and whitespace differences create distinct
    /// options.
    pub async fn resolve_option(
        &self,
        attribute_id: &str,
        raw_value: &str,
        caches: &mut RunCaches,
    ) -> SyncResult<Option<String>> {
        let value = raw_value.trim();
        if value.is_empty() {
            return Ok(None);
        }
        let cache_key = (attribute_id.to_string(), value.to_string());
        if let Some(id) = caches.options.get(&cache_key) {
            return Ok(Some(id.clone()));
        }

        let external_id = format!("{attribute_id}:{value}");
        let internal_id = self
            .identity
            .get_or_create(EntityKind::AttributeOption, &external_id, None)
            .await?;

        let option_id = if self.catalog.find_option(attribute_id, value).await?.is_none() {
            self.catalog
                .insert_option_if_absent(&AttributeOption {
                    id: internal_id,
                    attribute_id: attribute_id.to_string(),
                    value: value.to_string(),
                    created_at: Utc::now(),
                })
                .await?
        } else {
            internal_id
        };

        caches.options.insert(cache_key, option_id.clone());
        Ok(Some(option_id))
    }

    /// Lazily create the fixed-name attribute group, reusing it for the rest
    /// of the process and across runs.
    pub async fn ensure_group(&self, caches: &mut RunCaches) -> SyncResult<String> {
        if let Some(id) = &caches.attribute_group {
            return Ok(id.clone());
        }
        let group = match self.catalog.find_attribute_group_by_name(ATTRIBUTE_GROUP_NAME).await? {
            Some(group) => group,
            None => {
                let group = AttributeGroup {
                    id: Uuid::new_v4().to_string(),
                    name: ATTRIBUTE_GROUP_NAME.to_string(),
                    created_at: Utc::now(),
                };
                self.catalog.insert_attribute_group(&group).await?;
                group
            }
        };
        caches.attribute_group = Some(group.id.clone());
        Ok(group.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::identity_map_repository::IdentityMapRepository;
    use crate::test_support::test_database;

    fn attribute(id: Option<i64>, name: &str, options: &[&str]) -> SourceAttribute {
        SourceAttribute {
            id,
            name: Some(name.to_string()),
            options: options.iter().map(|o| o.to_string()).collect(),
            option: None,
            variation: false,
        }
    }

    #[tokio::test]
    async fn global_and_custom_keys_are_derived() {
        let global = attribute(Some(3), "رنگ", &[]);
        assert_eq!(AttributeNormalizer::external_key(&global), "attr:3");

        let custom = attribute(None, "Screen Size", &[]);
        assert_eq!(AttributeNormalizer::external_key(&custom), "custom:screen-size");

        let zero_id = attribute(Some(0), "حافظه داخلی", &[]);
        assert_eq!(AttributeNormalizer::external_key(&zero_id), "custom:حافظه-داخلی");
    }

    #[tokio::test]
    async fn first_sight_creates_registry_entry_with_inferred_kind() {
        let (_dir, db) = test_database().await;
        let catalog = CatalogRepository::new(db.pool().clone());
        let identity = IdentityMap::new("dokan", IdentityMapRepository::new(db.pool().clone()));
        let normalizer = AttributeNormalizer::new(&identity, &catalog);
        let mut caches = RunCaches::new();

        let source = attribute(Some(3), "رنگ", &["مشکی", "آبی"]);
        let resolved =
            normalizer.resolve(&source, &["مشکی", "آبی"], &mut caches).await.unwrap();
        assert_eq!(resolved.value_kind, AttributeValueKind::MultiOption);

        let stored = catalog.find_attribute(&resolved.id).await.unwrap().unwrap();
        assert_eq!(stored.external_key, "attr:3");
        assert_eq!(stored.value_kind, AttributeValueKind::MultiOption);

        // Second resolution reuses the same internal ID
        let again = normalizer.resolve(&source, &["مشکی"], &mut caches).await.unwrap();
        assert_eq!(again.id, resolved.id);
    }

    #[tokio::test]
    async fn kind_reclassification_is_last_write_wins() {
        let (_dir, db) = test_database().await;
        let catalog = CatalogRepository::new(db.pool().clone());
        let identity = IdentityMap::new("dokan", IdentityMapRepository::new(db.pool().clone()));
        let normalizer = AttributeNormalizer::new(&identity, &catalog);
        let mut caches = RunCaches::new();

        let source = attribute(Some(5), "Size", &[]);
        let first = normalizer.resolve(&source, &["XL"], &mut caches).await.unwrap();
        assert_eq!(first.value_kind, AttributeValueKind::Option);

        // A later record shows three values; the stored kind follows it
        let second =
            normalizer.resolve(&source, &["S", "M", "XL"], &mut caches).await.unwrap();
        assert_eq!(second.value_kind, AttributeValueKind::MultiOption);
        let stored = catalog.find_attribute(&second.id).await.unwrap().unwrap();
        assert_eq!(stored.value_kind, AttributeValueKind::MultiOption);

        // And a record with no values downgrades to text
        let third = normalizer.resolve(&source, &[], &mut caches).await.unwrap();
        assert_eq!(third.value_kind, AttributeValueKind::Text);
    }

    #[tokio::test]
    async fn option_identity_is_exact_trimmed_value() {
        let (_dir, db) = test_database().await;
        let catalog = CatalogRepository::new(db.pool().clone());
        let identity = IdentityMap::new("dokan", IdentityMapRepository::new(db.pool().clone()));
        let normalizer = AttributeNormalizer::new(&identity, &catalog);
        let mut caches = RunCaches::new();

        let black = normalizer.resolve_option("a-1", " مشکی ", &mut caches).await.unwrap();
        let black_again = normalizer.resolve_option("a-1", "مشکی", &mut caches).await.unwrap();
        assert_eq!(black, black_again);

        // Case differences create distinct options on purpose
        let upper = normalizer.resolve_option("a-1", "Black", &mut caches).await.unwrap();
        let lower = normalizer.resolve_option("a-1", "black", &mut caches).await.unwrap();
        assert_ne!(upper, lower);

        // Blank values resolve to no option
        assert_eq!(normalizer.resolve_option("a-1", "   ", &mut caches).await.unwrap(), None);
    }

    #[tokio::test]
    async fn option_survives_cache_clear_with_same_id() {
        let (_dir, db) = test_database().await;
        let catalog = CatalogRepository::new(db.pool().clone());
        let identity = IdentityMap::new("dokan", IdentityMapRepository::new(db.pool().clone()));
        let normalizer = AttributeNormalizer::new(&identity, &catalog);
        let mut caches = RunCaches::new();

        let first = normalizer.resolve_option("a-1", "آبی", &mut caches).await.unwrap();
        caches.clear();
        identity.clear_cache();
        let second = normalizer.resolve_option("a-1", "آبی", &mut caches).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn group_is_created_once_and_found_by_name() {
        let (_dir, db) = test_database().await;
        let catalog = CatalogRepository::new(db.pool().clone());
        let identity = IdentityMap::new("dokan", IdentityMapRepository::new(db.pool().clone()));
        let normalizer = AttributeNormalizer::new(&identity, &catalog);
        let mut caches = RunCaches::new();

        let first = normalizer.ensure_group(&mut caches).await.unwrap();
        caches.clear();
        let second = normalizer.ensure_group(&mut caches).await.unwrap();
        assert_eq!(first, second);
    }
}
