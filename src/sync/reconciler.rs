//! Decides, per observed listing, which write converges the store to what the
//! crawl saw, and which baseline listings disappeared by the end of the run.

use crate::models::{ListingStatus, NormalizedListing};
use crate::store::snapshot::{RunSnapshot, SnapshotEntry};
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// URLs discovered during the current crawl
#[derive(Debug, Clone, Default)]
pub struct SeenSet(HashSet<String>);

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the URL was already recorded this run
    pub fn record(&mut self, url: &str) -> bool {
        self.0.insert(url.to_string())
    }

    pub fn contains(&self, url: &str) -> bool {
        self.0.contains(url)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Per-run state of a listing relative to the baseline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingState {
    NotSeenBefore,
    SeenUnchanged,
    SeenPriceChanged,
    SeenRevived,
    AbsentAtEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelistReason {
    /// Not found anywhere in this run's crawl
    Absent,
    /// Still listed, but above the configured price ceiling
    PriceCapped { price: i64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Create {
        listing: NormalizedListing,
        checked_at: DateTime<Utc>,
    },
    /// Back from DELISTED; carries the new price when it changed
    Revive {
        store_id: String,
        name: String,
        new_price: Option<i64>,
        checked_at: DateTime<Utc>,
    },
    PriceChange {
        store_id: String,
        name: String,
        old_price: Option<i64>,
        new_price: i64,
        checked_at: DateTime<Utc>,
    },
    Heartbeat {
        store_id: String,
        name: String,
        checked_at: DateTime<Utc>,
    },
    Delist {
        store_id: String,
        name: String,
        url: String,
        reason: DelistReason,
    },
    /// Over the price ceiling with nothing in the store to retire
    Ignore { url: String, price: i64 },
}

impl Decision {
    pub fn state(&self) -> Option<ListingState> {
        match self {
            Decision::Create { .. } => Some(ListingState::NotSeenBefore),
            Decision::Revive { .. } => Some(ListingState::SeenRevived),
            Decision::PriceChange { .. } => Some(ListingState::SeenPriceChanged),
            Decision::Heartbeat { .. } => Some(ListingState::SeenUnchanged),
            Decision::Delist {
                reason: DelistReason::Absent,
                ..
            } => Some(ListingState::AbsentAtEnd),
            Decision::Delist { .. } | Decision::Ignore { .. } => None,
        }
    }
}

pub struct Reconciler<'a> {
    snapshot: &'a RunSnapshot,
    price_ceiling: Option<i64>,
}

impl<'a> Reconciler<'a> {
    pub fn new(snapshot: &'a RunSnapshot, price_ceiling: Option<i64>) -> Self {
        Self {
            snapshot,
            price_ceiling,
        }
    }

    fn over_ceiling(&self, price: i64) -> bool {
        self.price_ceiling.is_some_and(|ceiling| price > ceiling)
    }

    /// Decision for one successfully normalized listing
    pub fn decide(&self, listing: NormalizedListing, now: DateTime<Utc>) -> Decision {
        let baseline = self.snapshot.get(&listing.url);

        if self.over_ceiling(listing.price) {
            return match baseline {
                Some(entry) if entry.status == ListingStatus::Available => Decision::Delist {
                    store_id: entry.store_id.clone(),
                    name: entry.name.clone(),
                    url: listing.url,
                    reason: DelistReason::PriceCapped {
                        price: listing.price,
                    },
                },
                _ => Decision::Ignore {
                    url: listing.url,
                    price: listing.price,
                },
            };
        }

        let Some(SnapshotEntry {
            store_id,
            price,
            status,
            name,
        }) = baseline.cloned()
        else {
            return Decision::Create {
                listing,
                checked_at: now,
            };
        };

        let price_changed = price != Some(listing.price);
        match status {
            ListingStatus::Delisted => Decision::Revive {
                store_id,
                name,
                new_price: price_changed.then_some(listing.price),
                checked_at: now,
            },
            ListingStatus::Available if price_changed => Decision::PriceChange {
                store_id,
                name,
                old_price: price,
                new_price: listing.price,
                checked_at: now,
            },
            ListingStatus::Available => Decision::Heartbeat {
                store_id,
                name,
                checked_at: now,
            },
        }
    }

    /// End-of-run delisting. Consumes the seen set so it runs once per run.
    pub fn sweep(&self, seen: SeenSet) -> Vec<Decision> {
        let mut absent: Vec<(&String, &SnapshotEntry)> = self
            .snapshot
            .iter()
            .filter(|(url, entry)| {
                entry.status == ListingStatus::Available && !seen.contains(url)
            })
            .collect();
        absent.sort_by(|a, b| a.0.cmp(b.0));

        absent
            .into_iter()
            .map(|(url, entry)| Decision::Delist {
                store_id: entry.store_id.clone(),
                name: entry.name.clone(),
                url: url.clone(),
                reason: DelistReason::Absent,
            })
            .collect()
    }
}
