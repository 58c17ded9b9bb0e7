//! Cross-service ID registry (spec §4.2): short-circuits calls to the
//! Features upstream for catalog IDs already known to be missing or
//! already validated, in either direction.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;

use crate::cache::CacheManager;
use crate::error::Result;
use crate::models::registry::RegistryEntry;

const MISSING_ID_TTL_SECS: i64 = 86_400 * 90;
const VALIDATED_ID_TTL_SECS: i64 = 86_400 * 180;

const CATEGORY_VALIDATED: &str = "reccobeat_validated";
const CATEGORY_REVERSE: &str = "reccobeat_reverse_validated";

pub struct IdRegistry {
    cache: Arc<CacheManager>,
}

impl IdRegistry {
    pub fn new(cache: Arc<CacheManager>) -> Self {
        Self { cache }
    }

    pub async fn mark_missing(&self, catalog_id: &str, reason: &str) -> Result<()> {
        let entry = RegistryEntry::missing(catalog_id, reason);
        self.cache
            .set(
                CATEGORY_VALIDATED,
                &[catalog_id],
                &entry,
                Duration::seconds(MISSING_ID_TTL_SECS),
            )
            .await
    }

    /// Writes the forward and reverse entries. The pair is not
    /// transactional (no backing store here supports that); a crash
    /// between the two writes produces a temporary half-entry that costs
    /// one extra upstream call to heal, which spec §4.2 calls acceptable.
    pub async fn mark_validated(&self, catalog_id: &str, features_id: &str) -> Result<()> {
        let entry = RegistryEntry::validated(catalog_id, features_id);
        self.cache
            .set(
                CATEGORY_VALIDATED,
                &[catalog_id],
                &entry,
                Duration::seconds(VALIDATED_ID_TTL_SECS),
            )
            .await?;
        self.cache
            .set(
                CATEGORY_REVERSE,
                &[features_id],
                &entry,
                Duration::seconds(VALIDATED_ID_TTL_SECS),
            )
            .await
    }

    pub async fn is_known_missing(&self, catalog_id: &str) -> bool {
        matches!(
            self.cache.get::<RegistryEntry>(CATEGORY_VALIDATED, &[catalog_id]).await,
            Some(RegistryEntry::Missing { .. })
        )
    }

    pub async fn get_validated_id(&self, catalog_id: &str) -> Option<String> {
        match self.cache.get::<RegistryEntry>(CATEGORY_VALIDATED, &[catalog_id]).await {
            Some(RegistryEntry::Validated { features_id, .. }) => Some(features_id),
            _ => None,
        }
    }

    /// Splits `ids` into ones worth checking upstream and ones already
    /// known to be missing, so callers never re-ask about a dead ID.
    pub async fn bulk_check_missing(&self, ids: &[String]) -> (Vec<String>, Vec<String>) {
        let mut to_check = Vec::new();
        let mut known_missing = Vec::new();
        for id in ids {
            if self.is_known_missing(id).await {
                known_missing.push(id.clone());
            } else {
                to_check.push(id.clone());
            }
        }
        (to_check, known_missing)
    }

    pub async fn bulk_get_validated(&self, ids: &[String]) -> HashMap<String, String> {
        let mut result = HashMap::new();
        for id in ids {
            if let Some(features_id) = self.get_validated_id(id).await {
                result.insert(id.clone(), features_id);
            }
        }
        result
    }

    /// Reverse direction, present in the original implementation but not
    /// documented by spec §4.2's forward-only surface; both directions
    /// share the same write, so exposing the reverse read costs nothing.
    pub async fn get_spotify_id_for_reccobeat(&self, features_id: &str) -> Option<String> {
        match self.cache.get::<RegistryEntry>(CATEGORY_REVERSE, &[features_id]).await {
            Some(RegistryEntry::Validated { catalog_id, .. }) => Some(catalog_id),
            _ => None,
        }
    }

    pub async fn bulk_get_spotify_ids(&self, features_ids: &[String]) -> HashMap<String, String> {
        let mut result = HashMap::new();
        for id in features_ids {
            if let Some(catalog_id) = self.get_spotify_id_for_reccobeat(id).await {
                result.insert(id.clone(), catalog_id);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;

    fn test_cache() -> Arc<CacheManager> {
        let config = CacheConfig::from_env();
        Arc::new(CacheManager::new(&config, "test:").expect("cache manager"))
    }

    #[tokio::test]
    async fn unmarked_id_is_not_known_missing() {
        let registry = IdRegistry::new(test_cache());
        assert!(!registry.is_known_missing("unseen").await);
    }

    #[tokio::test]
    async fn marked_missing_id_is_reported_missing() {
        let registry = IdRegistry::new(test_cache());
        registry.mark_missing("sp1", "not found upstream").await.unwrap();
        assert!(registry.is_known_missing("sp1").await);
        assert_eq!(registry.get_validated_id("sp1").await, None);
    }

    #[tokio::test]
    async fn validated_id_resolves_both_directions() {
        let registry = IdRegistry::new(test_cache());
        registry.mark_validated("sp1", "rb1").await.unwrap();
        assert_eq!(registry.get_validated_id("sp1").await, Some("rb1".to_string()));
        assert_eq!(registry.get_spotify_id_for_reccobeat("rb1").await, Some("sp1".to_string()));
    }

    #[tokio::test]
    async fn bulk_check_missing_splits_ids() {
        let registry = IdRegistry::new(test_cache());
        registry.mark_missing("missing1", "gone").await.unwrap();
        let ids = vec!["missing1".to_string(), "fresh1".to_string()];
        let (to_check, known_missing) = registry.bulk_check_missing(&ids).await;
        assert_eq!(to_check, vec!["fresh1".to_string()]);
        assert_eq!(known_missing, vec!["missing1".to_string()]);
    }
}
