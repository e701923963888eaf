use crate::scrapers::traits::{Extractor, ResultPager};
use crate::store::snapshot::{RunSnapshot, SnapshotLoader};
use crate::store::writer::{StoreWriter, WriteOutcome};
use crate::store::Store;
use crate::sync::normalizer::{normalize, resolve_coordinates, DegradedField};
use crate::sync::reconciler::{Decision, DelistReason, Reconciler, SeenSet};
use crate::sync::throttle::Throttle;
use chrono::Utc;
use tracing::{debug, info, warn};

/// What to crawl and what to keep
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub areas: Vec<String>,
    pub price_ceiling: Option<i64>,
}

/// Per-run counters reported at the end of a sync
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub discovered: usize,
    pub created: usize,
    pub revived: usize,
    pub price_changed: usize,
    pub unchanged: usize,
    pub price_capped: usize,
    pub ignored: usize,
    pub skipped: usize,
    pub write_failures: usize,
    pub delisted: usize,
}

impl RunSummary {
    fn record(&mut self, decision: &Decision, outcome: &WriteOutcome) {
        match outcome {
            WriteOutcome::WriteFailed(_) => self.write_failures += 1,
            WriteOutcome::Skipped => self.ignored += 1,
            WriteOutcome::Ok => match decision {
                Decision::Create { .. } => self.created += 1,
                Decision::Revive { .. } => self.revived += 1,
                Decision::PriceChange { .. } => self.price_changed += 1,
                Decision::Heartbeat { .. } => self.unchanged += 1,
                Decision::Delist {
                    reason: DelistReason::PriceCapped { .. },
                    ..
                } => self.price_capped += 1,
                Decision::Delist { .. } => self.delisted += 1,
                Decision::Ignore { .. } => self.ignored += 1,
            },
        }
    }
}

/// Walks every configured area and converges the store to what it finds
pub struct RunDriver<'a, P, E, S>
where
    P: ResultPager + ?Sized,
    E: Extractor + ?Sized,
    S: Store + ?Sized,
{
    pager: &'a P,
    extractor: &'a E,
    store: &'a S,
    store_throttle: &'a Throttle,
    page_throttle: &'a Throttle,
    config: &'a RunConfig,
}

impl<'a, P, E, S> RunDriver<'a, P, E, S>
where
    P: ResultPager + ?Sized,
    E: Extractor + ?Sized,
    S: Store + ?Sized,
{
    pub fn new(
        pager: &'a P,
        extractor: &'a E,
        store: &'a S,
        store_throttle: &'a Throttle,
        page_throttle: &'a Throttle,
        config: &'a RunConfig,
    ) -> Self {
        Self {
            pager,
            extractor,
            store,
            store_throttle,
            page_throttle,
            config,
        }
    }

    /// Loads the baseline from the store, then crawls
    pub async fn run(&self) -> RunSummary {
        let snapshot = SnapshotLoader::new(self.store, self.store_throttle)
            .load()
            .await;
        self.run_with(&snapshot).await
    }

    pub async fn run_with(&self, snapshot: &RunSnapshot) -> RunSummary {
        let reconciler = Reconciler::new(snapshot, self.config.price_ceiling);
        let writer = StoreWriter::new(self.store, self.store_throttle);
        let mut seen = SeenSet::new();
        let mut summary = RunSummary::default();

        for area in &self.config.areas {
            info!("🌍 === Scanning area: {} ===", area.to_uppercase());

            self.page_throttle.wait().await;
            if let Err(e) = self.pager.open_area(area).await {
                warn!("⚠️ Could not open area {}: {:#}", area, e);
                continue;
            }

            let mut page_num = 1;
            loop {
                info!("--- 📄 {} page {} ---", area.to_uppercase(), page_num);

                let links = match self.pager.result_links().await {
                    Ok(links) if links.is_empty() => {
                        info!("  ℹ️ No more listings in {}", area);
                        break;
                    }
                    Ok(links) => links,
                    Err(e) => {
                        warn!("  ⚠️ Result page unreadable, leaving {}: {:#}", area, e);
                        break;
                    }
                };

                for url in &links {
                    if !seen.record(url) {
                        debug!("Already visited {} this run", url);
                        continue;
                    }
                    summary.discovered += 1;
                    self.visit(url, &reconciler, &writer, &mut summary).await;
                }

                self.page_throttle.wait().await;
                match self.pager.next_page().await {
                    Ok(true) => page_num += 1,
                    Ok(false) => break,
                    Err(e) => {
                        warn!("  ⚠️ Pagination failed in {}: {:#}", area, e);
                        break;
                    }
                }
            }
        }

        if !snapshot.is_complete() {
            warn!("⚠️ Sweeping against a partial baseline");
        }
        info!("🧹 Checking for delisted listings ({} seen this run)...", seen.len());
        for decision in reconciler.sweep(seen) {
            let outcome = writer.apply(&decision).await;
            summary.record(&decision, &outcome);
        }

        info!(
            "🎉 Done: {} discovered, {} new, {} revived, {} repriced, {} unchanged",
            summary.discovered,
            summary.created,
            summary.revived,
            summary.price_changed,
            summary.unchanged,
        );
        info!(
            "   {} over cap, {} skipped, {} write failures, {} delisted",
            summary.price_capped,
            summary.skipped,
            summary.write_failures,
            summary.delisted,
        );
        summary
    }

    /// Extract, normalize, decide and write one listing. Never fails the run.
    async fn visit(
        &self,
        url: &str,
        reconciler: &Reconciler<'_>,
        writer: &StoreWriter<'_, S>,
        summary: &mut RunSummary,
    ) {
        let raw = match self.extractor.extract_listing(url).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("    ⚠️ [skipped] extraction failed for {}: {:#}", url, e);
                summary.skipped += 1;
                return;
            }
        };

        let normalized = match normalize(&raw) {
            Ok(normalized) => normalized,
            Err(e) => {
                warn!("    ⚠️ [skipped] {}", e);
                summary.skipped += 1;
                return;
            }
        };

        let mut decision = reconciler.decide(normalized.listing, Utc::now());
        if let Decision::Create { listing, .. } = &mut decision {
            resolve_coordinates(self.extractor, listing).await;
            let degraded: Vec<DegradedField> = normalized
                .degraded
                .into_iter()
                .filter(|field| {
                    *field != DegradedField::Coordinates || listing.coordinates.is_none()
                })
                .collect();
            if !degraded.is_empty() {
                warn!("    ⚠️ [partial] {}: defaults used for {:?}", url, degraded);
            }
        }

        let outcome = writer.apply(&decision).await;
        summary.record(&decision, &outcome);
    }
}
