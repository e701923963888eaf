use crate::models::{Listing, ListingStatus, WorkflowStatus};
use crate::store::{Field, PropertyBag, Store, Value};
use crate::sync::reconciler::{Decision, DelistReason};
use crate::sync::throttle::Throttle;
use tracing::{debug, error, info};

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    Ok,
    /// The decision needed no store call
    Skipped,
    WriteFailed(String),
}

/// A single store call derived from a decision
#[derive(Debug, Clone, PartialEq)]
pub enum WriteCall {
    Create(PropertyBag),
    Update { id: String, properties: PropertyBag },
}

/// Full property set of a new listing
pub fn listing_properties(listing: &Listing) -> PropertyBag {
    let mut bag = PropertyBag::new()
        .with(Field::Name, Value::Title(listing.name.clone()))
        .with(Field::Price, Value::Integer(listing.price))
        .with(Field::TotalCost, Value::Integer(listing.total_cost()))
        .with(Field::Latitude, Value::Decimal(listing.coordinates.lat))
        .with(Field::Longitude, Value::Decimal(listing.coordinates.lng))
        .with(Field::FloorArea, Value::Text(listing.area_text.clone()))
        .with(Field::RoomType, Value::Select(listing.room_type.clone()))
        .with(Field::Floor, Value::Text(listing.floor_text.clone()))
        .with(Field::Age, Value::Text(listing.age_text.clone()))
        .with(Field::UpdatedAt, Value::Date(listing.last_update_timestamp))
        .with(Field::Url, Value::Url(listing.url.clone()))
        .with(Field::Status, Value::Lifecycle(listing.status))
        .with(Field::Workflow, Value::Workflow(listing.workflow));
    if let Some(fee) = listing.common_fee {
        bag.set(Field::CommonFee, Value::Integer(fee));
    }
    bag
}

fn update(id: &str, properties: PropertyBag) -> WriteCall {
    WriteCall::Update {
        id: id.to_string(),
        properties,
    }
}

/// Maps a decision to exactly one store call, or none for `Ignore`
pub fn write_call(decision: &Decision) -> Option<WriteCall> {
    match decision {
        Decision::Create {
            listing,
            checked_at,
        } => {
            let listing = Listing::from_observed(listing.clone(), *checked_at);
            Some(WriteCall::Create(listing_properties(&listing)))
        }
        Decision::Revive {
            store_id,
            new_price,
            checked_at,
            ..
        } => {
            let mut bag = PropertyBag::new()
                .with(Field::Status, Value::Lifecycle(ListingStatus::Available))
                .with(Field::Workflow, Value::Workflow(WorkflowStatus::NeedsTriage))
                .with(Field::UpdatedAt, Value::Date(*checked_at));
            if let Some(price) = new_price {
                bag.set(Field::Price, Value::Integer(*price));
            }
            Some(update(store_id, bag))
        }
        Decision::PriceChange {
            store_id,
            new_price,
            checked_at,
            ..
        } => Some(update(
            store_id,
            PropertyBag::new()
                .with(Field::Price, Value::Integer(*new_price))
                .with(Field::UpdatedAt, Value::Date(*checked_at)),
        )),
        Decision::Heartbeat {
            store_id,
            checked_at,
            ..
        } => Some(update(
            store_id,
            PropertyBag::new().with(Field::UpdatedAt, Value::Date(*checked_at)),
        )),
        Decision::Delist { store_id, .. } => Some(update(
            store_id,
            PropertyBag::new().with(Field::Status, Value::Lifecycle(ListingStatus::Delisted)),
        )),
        Decision::Ignore { .. } => None,
    }
}

fn report(decision: &Decision) {
    match decision {
        Decision::Create { listing, .. } => {
            info!("    ✨ [new]: {} ￥{}", listing.name, listing.price)
        }
        Decision::Revive {
            name, new_price, ..
        } => match new_price {
            Some(price) => info!("    🔥 [revived]: {} is back at ￥{}", name, price),
            None => info!("    🔥 [revived]: {} is back", name),
        },
        Decision::PriceChange {
            name,
            old_price,
            new_price,
            ..
        } => match old_price {
            Some(old) => info!("    🆙 [price]: {} ￥{} -> ￥{}", name, old, new_price),
            None => info!("    🆙 [price]: {} -> ￥{}", name, new_price),
        },
        Decision::Heartbeat { name, .. } => info!("    😴 [unchanged]: {}", name),
        Decision::Delist {
            name,
            url,
            reason: DelistReason::Absent,
            ..
        } => info!("    💤 [delisted]: {} ({})", name, url),
        Decision::Delist {
            name,
            reason: DelistReason::PriceCapped { price },
            ..
        } => info!("    🚫 [over price cap]: {} at ￥{}, delisting", name, price),
        Decision::Ignore { url, price } => {
            info!("    🚫 [over price cap]: ￥{} skipped ({})", price, url)
        }
    }
}

/// Applies decisions to the store one call at a time
pub struct StoreWriter<'a, S: Store + ?Sized> {
    store: &'a S,
    throttle: &'a Throttle,
}

impl<'a, S: Store + ?Sized> StoreWriter<'a, S> {
    pub fn new(store: &'a S, throttle: &'a Throttle) -> Self {
        Self { store, throttle }
    }

    /// Never fails the caller: store errors come back as `WriteFailed`
    pub async fn apply(&self, decision: &Decision) -> WriteOutcome {
        let Some(call) = write_call(decision) else {
            report(decision);
            return WriteOutcome::Skipped;
        };

        self.throttle.wait().await;
        let result = match &call {
            WriteCall::Create(properties) => self.store.create(properties).await.map(|_| ()),
            WriteCall::Update { id, properties } => self.store.update(id, properties).await,
        };

        match result {
            Ok(()) => {
                report(decision);
                WriteOutcome::Ok
            }
            Err(e) => {
                error!("    ❌ Store write failed ({:?}): {}", decision.state(), e);
                WriteOutcome::WriteFailed(e.to_string())
            }
        }
    }

    /// Creates a record outside the listing lifecycle
    pub async fn create(&self, properties: &PropertyBag) -> WriteOutcome {
        self.throttle.wait().await;
        match self.store.create(properties).await {
            Ok(id) => {
                debug!("    Created record {}", id);
                WriteOutcome::Ok
            }
            Err(e) => {
                error!("    ❌ Store create failed: {}", e);
                WriteOutcome::WriteFailed(e.to_string())
            }
        }
    }

    /// Writes an arbitrary partial update, used by the enrichment passes
    pub async fn update(&self, id: &str, properties: &PropertyBag) -> WriteOutcome {
        self.throttle.wait().await;
        match self.store.update(id, properties).await {
            Ok(()) => WriteOutcome::Ok,
            Err(e) => {
                error!("    ❌ Store update of {} failed: {}", id, e);
                WriteOutcome::WriteFailed(e.to_string())
            }
        }
    }
}
