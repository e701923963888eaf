use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a listing as mirrored in the store
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ListingStatus {
    Available,
    Delisted,
}

/// Secondary workflow status; only ever written on creation or revival
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WorkflowStatus {
    NeedsTriage,
}

/// Latitude/longitude pair
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    /// Written when neither the listing page nor its map page carried markers
    pub const UNKNOWN: Coordinates = Coordinates { lat: 0.0, lng: 0.0 };

    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// A listing after field normalization, before reconciliation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NormalizedListing {
    pub url: String,
    pub name: String,
    pub price: i64,
    pub common_fee: Option<i64>,
    pub coordinates: Option<Coordinates>,
    pub area_text: String,
    pub room_type: String,
    pub floor_text: String,
    pub age_text: String,
}

impl NormalizedListing {
    /// Rent plus common fee
    pub fn total_cost(&self) -> i64 {
        self.price + self.common_fee.unwrap_or(0)
    }
}

/// Full record written when a listing is seen for the first time
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Listing {
    pub url: String,
    pub name: String,
    pub price: i64,
    pub common_fee: Option<i64>,
    pub coordinates: Coordinates,
    pub area_text: String,
    pub room_type: String,
    pub floor_text: String,
    pub age_text: String,
    pub status: ListingStatus,
    pub workflow: WorkflowStatus,
    pub last_update_timestamp: DateTime<Utc>,
}

impl Listing {
    /// Builds the initial record for a newly observed listing
    pub fn from_observed(listing: NormalizedListing, now: DateTime<Utc>) -> Self {
        Self {
            url: listing.url,
            name: listing.name,
            price: listing.price,
            common_fee: listing.common_fee,
            coordinates: listing.coordinates.unwrap_or(Coordinates::UNKNOWN),
            area_text: listing.area_text,
            room_type: listing.room_type,
            floor_text: listing.floor_text,
            age_text: listing.age_text,
            status: ListingStatus::Available,
            workflow: WorkflowStatus::NeedsTriage,
            last_update_timestamp: now,
        }
    }

    pub fn total_cost(&self) -> i64 {
        self.price + self.common_fee.unwrap_or(0)
    }
}

/// Inclusive range parsed from a textual "min〜max" field.
///
/// Values keep the order they appeared in the source text; no sorting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RangeField<T> {
    pub min: T,
    pub max: T,
}

impl<T: Clone> RangeField<T> {
    /// One token is a degenerate range, two or more take the first two
    pub fn from_tokens(tokens: Vec<T>) -> Option<Self> {
        let mut iter = tokens.into_iter();
        let min = iter.next()?;
        let max = iter.next().unwrap_or_else(|| min.clone());
        Some(Self { min, max })
    }
}

/// Range-valued attributes of a housing complex
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ComplexDetails {
    pub rent: Option<RangeField<i64>>,
    pub common_fee: Option<i64>,
    pub room_type: Option<RangeField<String>>,
    pub floor_area: Option<RangeField<String>>,
}

impl ComplexDetails {
    pub fn is_empty(&self) -> bool {
        self.rent.is_none()
            && self.common_fee.is_none()
            && self.room_type.is_none()
            && self.floor_area.is_none()
    }
}
