use crate::scrapers::traits::Extractor;
use crate::scrapers::types::Vacancy;
use crate::sync::throttle::Throttle;
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq)]
pub enum WatchOutcome {
    Checked(Vacancy),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WatchReport {
    pub url: String,
    pub outcome: WatchOutcome,
}

fn report(url: &str, outcome: &WatchOutcome) {
    match outcome {
        WatchOutcome::Checked(Vacancy::Available(rooms)) => {
            info!("🟢 {} room(s) available: {}", rooms, url)
        }
        WatchOutcome::Checked(Vacancy::NoRoomsNotice) => info!("⚪ No rooms offered: {}", url),
        WatchOutcome::Checked(Vacancy::NoneFound) => info!("⚪ No room rows found: {}", url),
        WatchOutcome::Failed(reason) => error!("❌ Check failed for {}: {}", url, reason),
    }
}

/// Reports the vacancy of each complex page. Read-only: nothing is written.
pub async fn watch_vacancies<E: Extractor + ?Sized>(
    extractor: &E,
    urls: &[String],
    pace: &Throttle,
) -> Vec<WatchReport> {
    info!("👀 Checking {} complexes", urls.len());

    let mut reports = Vec::with_capacity(urls.len());
    for url in urls {
        pace.wait().await;
        let outcome = match extractor.check_vacancy(url).await {
            Ok(vacancy) => WatchOutcome::Checked(vacancy),
            Err(e) => WatchOutcome::Failed(format!("{:#}", e)),
        };
        report(url, &outcome);
        reports.push(WatchReport {
            url: url.clone(),
            outcome,
        });
    }
    reports
}
