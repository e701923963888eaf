use crate::models::ListingStatus;
use crate::store::{QueryFilter, Store};
use crate::sync::throttle::Throttle;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::{debug, info, warn};

pub const UNKNOWN_NAME: &str = "未知房源";

/// Last synchronized state of one listing
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotEntry {
    pub store_id: String,
    pub price: Option<i64>,
    pub status: ListingStatus,
    pub name: String,
}

/// Store contents keyed by listing URL, captured once per run
#[derive(Debug, Clone)]
pub struct RunSnapshot {
    entries: HashMap<String, SnapshotEntry>,
    complete: bool,
}

/// An empty store is a fully loaded baseline
impl Default for RunSnapshot {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            complete: true,
        }
    }
}

impl RunSnapshot {
    pub fn get(&self, url: &str) -> Option<&SnapshotEntry> {
        self.entries.get(url)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// False when a query failure cut loading short
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SnapshotEntry)> {
        self.entries.iter()
    }
}

impl FromIterator<(String, SnapshotEntry)> for RunSnapshot {
    fn from_iter<I: IntoIterator<Item = (String, SnapshotEntry)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
            complete: true,
        }
    }
}

/// Pages through the store and indexes every record by URL
pub struct SnapshotLoader<'a, S: Store + ?Sized> {
    store: &'a S,
    throttle: &'a Throttle,
}

impl<'a, S: Store + ?Sized> SnapshotLoader<'a, S> {
    pub fn new(store: &'a S, throttle: &'a Throttle) -> Self {
        Self { store, throttle }
    }

    pub async fn load(&self) -> RunSnapshot {
        info!("📡 Syncing current store contents...");

        let mut snapshot = RunSnapshot::default();
        let mut cursor: Option<String> = None;
        let mut skipped = 0usize;

        loop {
            self.throttle.wait().await;
            let page = match self.store.query(QueryFilter::All, cursor.as_deref()).await {
                Ok(page) => page,
                Err(e) => {
                    warn!("❌ Store query failed, continuing with partial baseline: {}", e);
                    snapshot.complete = false;
                    break;
                }
            };

            for record in page.records {
                let Some(url) = record.url else {
                    debug!("Skipping record {} without url", record.id);
                    skipped += 1;
                    continue;
                };
                let entry = SnapshotEntry {
                    store_id: record.id,
                    price: record.price,
                    status: record.status.unwrap_or(ListingStatus::Available),
                    name: record.name.unwrap_or_else(|| UNKNOWN_NAME.to_string()),
                };
                match snapshot.entries.entry(url) {
                    Entry::Vacant(slot) => {
                        slot.insert(entry);
                    }
                    Entry::Occupied(existing) => {
                        warn!(
                            "Duplicate record {} for {}, keeping {}",
                            entry.store_id,
                            existing.key(),
                            existing.get().store_id
                        );
                    }
                }
            }

            match page.next_cursor {
                Some(next) if page.has_more => cursor = Some(next),
                _ => break,
            }
        }

        info!(
            "✅ Baseline loaded: {} listings ({} malformed records skipped)",
            snapshot.len(),
            skipped
        );
        if !snapshot.complete {
            warn!("⚠️ Baseline is partial; listings on unloaded pages may be created again");
        }
        snapshot
    }
}
