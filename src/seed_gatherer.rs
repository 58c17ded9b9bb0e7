//! Seed Gatherer (spec §4.8): builds the Features-service seed and
//! negative-seed ID lists the candidate generators consume, from a
//! listener's top tracks plus any user-mentioned anchors.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::cache::CacheManager;
use crate::error::Result;
use crate::http::catalog::{CatalogClient, TimeRange};
use crate::http::features::FeaturesClient;
use crate::id_registry::IdRegistry;

const TOP_TRACKS_CACHE_CATEGORY: &str = "top_tracks";
const DEFAULT_SEED_POOL_LIMIT: u32 = 20;
const REMIX_MODE_SEED_POOL_LIMIT: u32 = 30;
const FEATURES_BATCH_SIZE: usize = 40;
const MAX_NEGATIVE_SEEDS: usize = 5;

pub struct GatheredSeeds {
    /// Resolved Features-service IDs, user-mentioned tracks first, in
    /// discovery order, deduplicated.
    pub seed_ids: Vec<String>,
    /// Resolved Features-service IDs for prior-iteration outliers, used
    /// to steer the next iteration's recommendation call away from them.
    pub negative_seed_ids: Vec<String>,
}

pub struct SeedGatherer {
    catalog: Arc<CatalogClient>,
    features: Arc<FeaturesClient>,
    cache: Arc<CacheManager>,
    id_registry: Arc<IdRegistry>,
}

impl SeedGatherer {
    pub fn new(
        catalog: Arc<CatalogClient>,
        features: Arc<FeaturesClient>,
        cache: Arc<CacheManager>,
        id_registry: Arc<IdRegistry>,
    ) -> Self {
        Self { catalog, features, cache, id_registry }
    }

    /// Gathers and resolves seed IDs (spec §4.8): fetch+cache top tracks,
    /// merge any user-mentioned catalog IDs to the front, resolve every
    /// catalog ID to a Features ID via the [`IdRegistry`], and derive
    /// negative seeds from the previous iteration's outliers.
    pub async fn gather_seeds(
        &self,
        token: &str,
        user_id: &str,
        user_mentioned_catalog_ids: &[String],
        time_range: TimeRange,
        remix_mode: bool,
        prior_iteration_outlier_catalog_ids: &[String],
        progress: Option<&broadcast::Sender<String>>,
    ) -> Result<GatheredSeeds> {
        notify_progress(progress, "seed_gatherer:fetching_top_tracks");
        let limit = if remix_mode { REMIX_MODE_SEED_POOL_LIMIT } else { DEFAULT_SEED_POOL_LIMIT };
        let top_track_ids = self.fetch_top_track_ids(token, user_id, time_range, limit).await?;

        let mut catalog_ids: Vec<String> = Vec::new();
        for id in user_mentioned_catalog_ids.iter().chain(top_track_ids.iter()) {
            if !catalog_ids.contains(id) {
                catalog_ids.push(id.clone());
            }
        }

        notify_progress(progress, "seed_gatherer:resolving_ids");
        let seed_ids = self.resolve_to_features_ids(&catalog_ids).await;

        notify_progress(progress, "seed_gatherer:deriving_negative_seeds");
        let negative_seed_ids = self
            .resolve_to_features_ids(prior_iteration_outlier_catalog_ids)
            .await
            .into_iter()
            .take(MAX_NEGATIVE_SEEDS)
            .collect();

        notify_progress(progress, "seed_gatherer:done");
        Ok(GatheredSeeds { seed_ids, negative_seed_ids })
    }

    async fn fetch_top_track_ids(&self, token: &str, user_id: &str, time_range: TimeRange, limit: u32) -> Result<Vec<String>> {
        let limit_key = limit.to_string();
        let time_range_key = format!("{time_range:?}");
        let cache_parts = [user_id, time_range_key.as_str(), limit_key.as_str()];

        if let Some(cached) = self.cache.get::<CachedTrackPage>(TOP_TRACKS_CACHE_CATEGORY, &cache_parts).await {
            return Ok(cached.ids);
        }
        let page = self.catalog.get_top_tracks(token, time_range, limit).await?;
        let cached = CachedTrackPage::from(page);
        self.cache
            .set(TOP_TRACKS_CACHE_CATEGORY, &cache_parts, &cached, chrono::Duration::minutes(30))
            .await?;
        Ok(cached.ids)
    }

    /// Resolves each catalog ID to a Features ID, skipping IDs already
    /// known missing and reusing already-validated mappings, and only
    /// hitting the Features upstream for IDs genuinely unresolved — in
    /// batches of [`FEATURES_BATCH_SIZE`] (spec §4.8, §6).
    async fn resolve_to_features_ids(&self, catalog_ids: &[String]) -> Vec<String> {
        if catalog_ids.is_empty() {
            return Vec::new();
        }

        let (to_check, _known_missing) = self.id_registry.bulk_check_missing(catalog_ids).await;
        let mut already_validated = self.id_registry.bulk_get_validated(&to_check).await;
        let unresolved: Vec<String> = to_check.iter().filter(|id| !already_validated.contains_key(*id)).cloned().collect();

        for batch in unresolved.chunks(FEATURES_BATCH_SIZE) {
            match self.features.get_multiple_tracks(batch).await {
                Ok(found) => {
                    let found_ids: std::collections::HashSet<&str> = found.iter().map(|t| t.id.as_str()).collect();
                    for track in &found {
                        if let Err(err) = self.id_registry.mark_validated(&track.id, &track.id).await {
                            warn!(error = %err, catalog_id = %track.id, "failed to persist id registry entry");
                        }
                        already_validated.insert(track.id.clone(), track.id.clone());
                    }
                    for id in batch {
                        if !found_ids.contains(id.as_str()) {
                            if let Err(err) = self.id_registry.mark_missing(id, "absent from Features batch lookup").await {
                                warn!(error = %err, catalog_id = %id, "failed to persist id registry miss");
                            }
                        }
                    }
                }
                Err(err) => {
                    debug!(error = %err, batch_size = batch.len(), "features batch lookup failed, leaving ids unresolved");
                }
            }
        }

        catalog_ids.iter().filter_map(|id| already_validated.get(id).cloned()).collect()
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct CachedTrackPage {
    ids: Vec<String>,
}

impl From<crate::http::catalog::TrackPage> for CachedTrackPage {
    fn from(page: crate::http::catalog::TrackPage) -> Self {
        Self { ids: page.items.into_iter().map(|track| track.id).collect() }
    }
}

fn notify_progress(progress: Option<&broadcast::Sender<String>>, label: &str) {
    if let Some(sender) = progress {
        let _ = sender.send(label.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_track_page_extracts_ids_only() {
        let page = crate::http::catalog::TrackPage {
            items: vec![crate::http::catalog::CatalogTrack {
                id: "t1".to_string(),
                name: "Song".to_string(),
                artists: vec![],
                uri: None,
                popularity: None,
                album: None,
            }],
        };
        let cached = CachedTrackPage::from(page);
        assert_eq!(cached.ids, vec!["t1".to_string()]);
    }

    #[test]
    fn notify_progress_is_a_no_op_without_a_sender() {
        notify_progress(None, "label");
    }

    #[tokio::test]
    async fn notify_progress_sends_on_channel() {
        let (tx, mut rx) = broadcast::channel(4);
        notify_progress(Some(&tx), "seed_gatherer:done");
        assert_eq!(rx.recv().await.unwrap(), "seed_gatherer:done");
    }
}
