use crate::geo::{Commute, GeoEnricher};
use crate::store::snapshot::UNKNOWN_NAME;
use crate::store::writer::{StoreWriter, WriteOutcome};
use crate::store::{PropertyBag, QueryFilter, Store, StoredRecord, Value};
use crate::sync::throttle::Throttle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommuteSummary {
    pub pending: usize,
    pub written: usize,
    pub no_route: usize,
    pub failed: usize,
}

/// Every record whose metric is still empty, across all cursor pages
async fn pending_records<S: Store + ?Sized>(
    store: &S,
    filter: QueryFilter,
    throttle: &Throttle,
) -> Vec<StoredRecord> {
    let mut records = Vec::new();
    let mut cursor: Option<String> = None;

    loop {
        throttle.wait().await;
        let page = match store.query(filter, cursor.as_deref()).await {
            Ok(page) => page,
            Err(e) => {
                warn!("❌ Store query failed, continuing with {} records: {}", records.len(), e);
                break;
            }
        };
        records.extend(page.records);
        match page.next_cursor {
            Some(next) if page.has_more => cursor = Some(next),
            _ => break,
        }
    }
    records
}

/// Fills one commute metric for every record that has coordinates but no value yet
pub async fn enrich_commutes<S, G>(store: &S, enricher: &G, throttle: &Throttle) -> CommuteSummary
where
    S: Store + ?Sized,
    G: GeoEnricher + ?Sized,
{
    let metric = enricher.metric();
    info!("📡 Fetching records missing {:?}...", metric);

    let records = pending_records(store, QueryFilter::MissingMetric(metric), throttle).await;
    let mut summary = CommuteSummary {
        pending: records.len(),
        ..Default::default()
    };
    if records.is_empty() {
        info!("🎉 Nothing to compute");
        return summary;
    }
    info!("🔎 {} records to compute", records.len());

    let writer = StoreWriter::new(store, throttle);
    for record in records {
        let name = record.name.as_deref().unwrap_or(UNKNOWN_NAME);
        let Some(origin) = record.coordinates else {
            debug!("Skipping {} without coordinates", record.id);
            continue;
        };
        info!(" 🚀 [computing]: {} ({}, {})", name, origin.lat, origin.lng);

        let commute = match enricher.commute(origin).await {
            Ok(commute) => commute,
            Err(e) => {
                error!(" ❌ [failed]: {} -> {:#}", name, e);
                summary.failed += 1;
                continue;
            }
        };

        let properties =
            PropertyBag::new().with(metric.field(), Value::Integer(commute.minutes()));
        match writer.update(&record.id, &properties).await {
            WriteOutcome::Ok => {
                summary.written += 1;
                match commute {
                    Commute::Minutes(minutes) => info!(" ✅ [done]: {} -> {} min", name, minutes),
                    Commute::NoRoute => {
                        summary.no_route += 1;
                        warn!(" ⚠️ [no route]: {}", name);
                    }
                }
            }
            WriteOutcome::WriteFailed(_) | WriteOutcome::Skipped => summary.failed += 1,
        }
    }

    info!(
        "🎉 Done: {} written ({} without route), {} failed",
        summary.written, summary.no_route, summary.failed
    );
    summary
}
