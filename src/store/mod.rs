pub mod notion;
pub mod snapshot;
pub mod writer;

pub use notion::{NotionStore, Schema};

use crate::models::{Coordinates, ListingStatus, WorkflowStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Non-2xx answer from the store
    #[error("store returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("store request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected store response: {0}")]
    Decode(String),
}

/// Logical record attributes; the store maps them to its own column names
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    Name,
    Url,
    Price,
    CommonFee,
    TotalCost,
    Latitude,
    Longitude,
    FloorArea,
    RoomType,
    Floor,
    Age,
    UpdatedAt,
    Status,
    Workflow,
    WalkMinutes,
    DriveMinutes,
    RentMin,
    RentMax,
    RoomTypeMin,
    RoomTypeMax,
    FloorAreaMin,
    FloorAreaMax,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Title(String),
    Integer(i64),
    Decimal(f64),
    Text(String),
    Select(String),
    Date(DateTime<Utc>),
    Url(String),
    Lifecycle(ListingStatus),
    Workflow(WorkflowStatus),
}

/// Typed property bag for create and partial-update calls
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyBag(BTreeMap<Field, Value>);

impl PropertyBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, field: Field, value: Value) -> Self {
        self.0.insert(field, value);
        self
    }

    pub fn set(&mut self, field: Field, value: Value) {
        self.0.insert(field, value);
    }

    pub fn get(&self, field: Field) -> Option<&Value> {
        self.0.get(&field)
    }

    pub fn contains(&self, field: Field) -> bool {
        self.0.contains_key(&field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Field, &Value)> {
        self.0.iter()
    }
}

/// Numeric metric written by the commute enrichment passes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    WalkMinutes,
    DriveMinutes,
}

impl Metric {
    pub fn field(self) -> Field {
        match self {
            Metric::WalkMinutes => Field::WalkMinutes,
            Metric::DriveMinutes => Field::DriveMinutes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryFilter {
    All,
    /// Metric still empty while both coordinates are present
    MissingMetric(Metric),
}

/// One record as returned by a query. Fields the store did not carry are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredRecord {
    pub id: String,
    pub url: Option<String>,
    pub name: Option<String>,
    pub price: Option<i64>,
    pub status: Option<ListingStatus>,
    pub coordinates: Option<Coordinates>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPage {
    pub records: Vec<StoredRecord>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

/// The remote record store
#[async_trait]
pub trait Store: Send + Sync {
    async fn query(
        &self,
        filter: QueryFilter,
        cursor: Option<&str>,
    ) -> Result<RecordPage, StoreError>;

    /// Returns the identifier of the new record
    async fn create(&self, properties: &PropertyBag) -> Result<String, StoreError>;

    /// Partial merge; fields absent from `properties` stay untouched
    async fn update(&self, id: &str, properties: &PropertyBag) -> Result<(), StoreError>;
}
