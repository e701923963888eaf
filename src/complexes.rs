//! Refreshes the range columns of the housing complex database from each
//! complex's overview table.

use crate::models::ComplexDetails;
use crate::scrapers::traits::Extractor;
use crate::store::snapshot::SnapshotLoader;
use crate::store::writer::{StoreWriter, WriteOutcome};
use crate::store::{Field, PropertyBag, Store, Value};
use crate::sync::normalizer::normalize_complex;
use crate::sync::throttle::Throttle;
use tracing::{info, warn};

const AREA_UNIT: &str = "㎡";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComplexSummary {
    pub updated: usize,
    pub empty: usize,
    pub failed: usize,
}

/// Partial update holding only the fields the table carried
pub fn complex_properties(details: &ComplexDetails) -> PropertyBag {
    let mut bag = PropertyBag::new();
    if let Some(rent) = &details.rent {
        bag.set(Field::RentMin, Value::Integer(rent.min));
        bag.set(Field::RentMax, Value::Integer(rent.max));
    }
    if let Some(fee) = details.common_fee {
        bag.set(Field::CommonFee, Value::Integer(fee));
    }
    if let Some(rooms) = &details.room_type {
        bag.set(Field::RoomTypeMin, Value::Select(rooms.min.clone()));
        bag.set(Field::RoomTypeMax, Value::Select(rooms.max.clone()));
    }
    if let Some(area) = &details.floor_area {
        bag.set(Field::FloorAreaMin, Value::Text(format!("{}{}", area.min, AREA_UNIT)));
        bag.set(Field::FloorAreaMax, Value::Text(format!("{}{}", area.max, AREA_UNIT)));
    }
    bag
}

pub async fn refresh_complexes<E, S>(
    extractor: &E,
    store: &S,
    store_throttle: &Throttle,
    pace: &Throttle,
) -> ComplexSummary
where
    E: Extractor + ?Sized,
    S: Store + ?Sized,
{
    let snapshot = SnapshotLoader::new(store, store_throttle).load().await;
    let mut summary = ComplexSummary::default();
    if snapshot.is_empty() {
        info!("No complexes with a URL in the store, nothing to refresh");
        return summary;
    }

    let mut complexes: Vec<_> = snapshot.iter().collect();
    complexes.sort_by(|a, b| a.0.cmp(b.0));
    info!("🚀 Refreshing {} complexes", complexes.len());

    let writer = StoreWriter::new(store, store_throttle);
    for (url, entry) in complexes {
        pace.wait().await;
        info!("🧐 Reading: {}", entry.name);

        let table = match extractor.extract_complex(url).await {
            Ok(table) => table,
            Err(e) => {
                warn!("    ❌ Could not read {}: {:#}", url, e);
                summary.failed += 1;
                continue;
            }
        };

        let properties = complex_properties(&normalize_complex(&table));
        if properties.is_empty() {
            info!("    ℹ️ Nothing to update for {}", entry.name);
            summary.empty += 1;
            continue;
        }

        match writer.update(&entry.store_id, &properties).await {
            WriteOutcome::Ok => {
                info!("    ✅ Updated: {}", entry.name);
                summary.updated += 1;
            }
            _ => summary.failed += 1,
        }
    }

    info!(
        "✨ Complex refresh finished: {} updated, {} empty, {} failed",
        summary.updated, summary.empty, summary.failed
    );
    summary
}
