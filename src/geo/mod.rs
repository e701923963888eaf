//! Commute metrics for stored listings.

pub mod commute;
pub mod google;

use crate::models::Coordinates;
use crate::store::Metric;
use anyhow::Result;
use async_trait::async_trait;

/// Written when no route or station could be found
pub const NO_ROUTE_MINUTES: i64 = 999;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commute {
    Minutes(i64),
    NoRoute,
}

impl Commute {
    /// Value stored in the metric column
    pub fn minutes(self) -> i64 {
        match self {
            Commute::Minutes(minutes) => minutes,
            Commute::NoRoute => NO_ROUTE_MINUTES,
        }
    }
}

/// Seconds to whole minutes, rounding up
pub fn round_up_minutes(seconds: u64) -> i64 {
    seconds.div_ceil(60) as i64
}

/// Computes one commute metric from a listing's coordinates
#[async_trait]
pub trait GeoEnricher: Send + Sync {
    fn metric(&self) -> Metric;

    async fn commute(&self, origin: Coordinates) -> Result<Commute>;
}
