//! Adds housing complexes listed in the area search results to the complex
//! database. Complexes whose URL is already stored are left untouched; the
//! range columns are filled later by the complex refresh.

use crate::models::Coordinates;
use crate::scrapers::traits::{Extractor, ResultPager};
use crate::scrapers::ur::map_url;
use crate::store::snapshot::{RunSnapshot, SnapshotLoader};
use crate::store::writer::{StoreWriter, WriteOutcome};
use crate::store::{Field, PropertyBag, Store, Value};
use crate::sync::normalizer::parse_coordinates;
use crate::sync::reconciler::SeenSet;
use crate::sync::throttle::Throttle;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoverySummary {
    pub found: usize,
    pub created: usize,
    pub known: usize,
    pub failed: usize,
}

/// Initial record of a newly found complex
pub fn discovered_properties(
    name: &str,
    url: &str,
    coordinates: Coordinates,
    found_at: DateTime<Utc>,
) -> PropertyBag {
    PropertyBag::new()
        .with(Field::Name, Value::Title(name.to_string()))
        .with(Field::Latitude, Value::Decimal(coordinates.lat))
        .with(Field::Longitude, Value::Decimal(coordinates.lng))
        .with(Field::Url, Value::Url(url.to_string()))
        .with(Field::UpdatedAt, Value::Date(found_at))
}

async fn map_coordinates<E: Extractor + ?Sized>(extractor: &E, url: &str) -> Coordinates {
    let map = map_url(url);
    match extractor.extract_coordinates(&map).await {
        Ok(Some(raw)) => parse_coordinates(&raw).unwrap_or_else(|| {
            warn!("    ⚠️ Unreadable markers on {}, using (0, 0)", map);
            Coordinates::UNKNOWN
        }),
        Ok(None) => {
            warn!("    ⚠️ No markers on {}, using (0, 0)", map);
            Coordinates::UNKNOWN
        }
        Err(e) => {
            warn!("    ⚠️ Map page failed for {}: {:#}", url, e);
            Coordinates::UNKNOWN
        }
    }
}

pub struct ComplexDiscovery<'a, P, E, S>
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
}

impl<'a, P, E, S> ComplexDiscovery<'a, P, E, S>
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
    ) -> Self {
        Self {
            pager,
            extractor,
            store,
            store_throttle,
            page_throttle,
        }
    }

    pub async fn run(&self, areas: &[String]) -> DiscoverySummary {
        let known = SnapshotLoader::new(self.store, self.store_throttle)
            .load()
            .await;
        let writer = StoreWriter::new(self.store, self.store_throttle);
        let mut seen = SeenSet::new();
        let mut summary = DiscoverySummary::default();

        for area in areas {
            info!("🌍 === Looking for complexes in {} ===", area.to_uppercase());

            self.page_throttle.wait().await;
            if let Err(e) = self.pager.open_area(area).await {
                warn!("⚠️ Could not open area {}: {:#}", area, e);
                continue;
            }

            let mut page_num = 1;
            loop {
                info!("--- 📄 {} page {} ---", area.to_uppercase(), page_num);

                let links = match self.pager.complex_links().await {
                    Ok(links) if links.is_empty() => {
                        info!("  ℹ️ No more complexes in {}", area);
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
                        debug!("Already handled {} this run", url);
                        continue;
                    }
                    summary.found += 1;
                    self.visit(url, &known, &writer, &mut summary).await;
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

        info!(
            "🎉 Discovery finished: {} found, {} added, {} already stored, {} failed",
            summary.found, summary.created, summary.known, summary.failed
        );
        summary
    }

    async fn visit(
        &self,
        url: &str,
        known: &RunSnapshot,
        writer: &StoreWriter<'_, S>,
        summary: &mut DiscoverySummary,
    ) {
        if let Some(entry) = known.get(url) {
            debug!("    😴 [known]: {}", entry.name);
            summary.known += 1;
            return;
        }

        let name = match self.extractor.extract_complex_name(url).await {
            Ok(name) => name,
            Err(e) => {
                warn!("    ❌ Could not read complex {}: {:#}", url, e);
                summary.failed += 1;
                return;
            }
        };
        let coordinates = map_coordinates(self.extractor, url).await;

        let properties = discovered_properties(&name, url, coordinates, Utc::now());
        match writer.create(&properties).await {
            WriteOutcome::Ok => {
                info!("    ✨ [new complex]: {}", name);
                summary.created += 1;
            }
            _ => summary.failed += 1,
        }
    }
}
