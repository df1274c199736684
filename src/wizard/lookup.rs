//! Country/state lookup: async reference-data queries with simulated
//! latency, a freshness cache, and stale-result discarding.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use super::model::Region;
use super::regions;

/// Read-only reference data service for the location step.
#[async_trait]
pub trait RegionLookup: Send + Sync {
    /// All selectable countries.
    async fn list_countries(&self) -> Vec<Region>;

    /// States/provinces of `country_code` whose name contains `search`
    /// (case-insensitive). An empty search returns all of them.
    async fn list_states(&self, country_code: &str, search: &str) -> Vec<Region>;
}

/// Case-insensitive substring filter on region names.
pub fn filter_by_name(regions: Vec<Region>, search: &str) -> Vec<Region> {
    if search.is_empty() {
        return regions;
    }
    let needle = search.to_lowercase();
    regions
        .into_iter()
        .filter(|r| r.name.to_lowercase().contains(&needle))
        .collect()
}

/// Static reference data behind artificial network latency.
pub struct StaticRegionLookup {
    country_latency: Duration,
    state_latency: Duration,
}

impl StaticRegionLookup {
    pub fn new(country_latency: Duration, state_latency: Duration) -> Self {
        Self {
            country_latency,
            state_latency,
        }
    }

    /// No latency at all (for tests).
    pub fn instant() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }
}

impl Default for StaticRegionLookup {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000), Duration::from_millis(300))
    }
}

#[async_trait]
impl RegionLookup for StaticRegionLookup {
    async fn list_countries(&self) -> Vec<Region> {
        tokio::time::sleep(self.country_latency).await;
        regions::COUNTRIES
            .iter()
            .map(|(code, name)| Region::new(code, name))
            .collect()
    }

    async fn list_states(&self, country_code: &str, search: &str) -> Vec<Region> {
        tokio::time::sleep(self.state_latency).await;
        let states = regions::states_for(country_code)
            .iter()
            .map(|(code, name)| Region::new(code, name))
            .collect();
        filter_by_name(states, search)
    }
}

struct CacheEntry {
    fetched_at: Instant,
    regions: Vec<Region>,
}

/// Caches an inner lookup for a freshness window.
///
/// Countries are cached as one entry; states are cached per country code
/// unfiltered, and the search term is applied to the cached list.
pub struct CachedLookup<L> {
    inner: L,
    ttl: Duration,
    countries: RwLock<Option<CacheEntry>>,
    states: RwLock<HashMap<String, CacheEntry>>,
}

impl<L: RegionLookup> CachedLookup<L> {
    pub fn new(inner: L, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            countries: RwLock::new(None),
            states: RwLock::new(HashMap::new()),
        }
    }

    fn is_fresh(&self, entry: &CacheEntry) -> bool {
        entry.fetched_at.elapsed() < self.ttl
    }
}

#[async_trait]
impl<L: RegionLookup> RegionLookup for CachedLookup<L> {
    async fn list_countries(&self) -> Vec<Region> {
        if let Some(entry) = self.countries.read().await.as_ref() {
            if self.is_fresh(entry) {
                return entry.regions.clone();
            }
        }

        let fetched = self.inner.list_countries().await;
        *self.countries.write().await = Some(CacheEntry {
            fetched_at: Instant::now(),
            regions: fetched.clone(),
        });
        debug!(count = fetched.len(), "Country list cached");
        fetched
    }

    async fn list_states(&self, country_code: &str, search: &str) -> Vec<Region> {
        if let Some(entry) = self.states.read().await.get(country_code) {
            if self.is_fresh(entry) {
                return filter_by_name(entry.regions.clone(), search);
            }
        }

        let fetched = self.inner.list_states(country_code, "").await;
        self.states.write().await.insert(
            country_code.to_string(),
            CacheEntry {
                fetched_at: Instant::now(),
                regions: fetched.clone(),
            },
        );
        debug!(country = country_code, count = fetched.len(), "State list cached");
        filter_by_name(fetched, search)
    }
}

#[async_trait]
impl<T: RegionLookup + ?Sized> RegionLookup for Arc<T> {
    async fn list_countries(&self) -> Vec<Region> {
        (**self).list_countries().await
    }

    async fn list_states(&self, country_code: &str, search: &str) -> Vec<Region> {
        (**self).list_states(country_code, search).await
    }
}

/// Identifies one country selection made by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionTicket {
    generation: u64,
    country: String,
}

impl SelectionTicket {
    pub fn country(&self) -> &str {
        &self.country
    }
}

/// Tracks the currently selected country so that state lists fetched for
/// an earlier selection can be dropped when they resolve late.
#[derive(Debug, Default)]
pub struct CountrySelection {
    generation: AtomicU64,
}

impl CountrySelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new selection. Any earlier ticket becomes stale.
    pub fn select(&self, country: &str) -> SelectionTicket {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        SelectionTicket {
            generation,
            country: country.to_string(),
        }
    }

    pub fn is_current(&self, ticket: &SelectionTicket) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket.generation
    }

    /// Pass `states` through only if `ticket` is still the latest selection.
    pub fn accept(&self, ticket: &SelectionTicket, states: Vec<Region>) -> Option<Vec<Region>> {
        if self.is_current(ticket) {
            Some(states)
        } else {
            debug!(country = %ticket.country, "Discarding stale state list");
            None
        }
    }
}
