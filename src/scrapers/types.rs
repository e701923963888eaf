use serde::{Deserialize, Serialize};

/// Coordinate markers as they appear on the page (hidden input values)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawCoordinates {
    pub lat: String,
    pub lng: String,
}

/// Best-effort field text extracted from a room detail page.
/// Every field may be missing; only the normalizer decides what is fatal.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawListing {
    pub url: String,
    /// Emphasized rent, e.g. "85,300円"
    pub rent_text: Option<String>,
    /// Whole price block including the common fee in parentheses
    pub price_block_text: Option<String>,
    /// Complex name line, e.g. "コンフォール松原(東京都足立区)..."
    pub subtitle: Option<String>,
    /// Building/room number
    pub room_title: Option<String>,
    /// Layout and floor area, e.g. "2DK / 48㎡"
    pub layout_size: Option<String>,
    pub floor: Option<String>,
    pub age: Option<String>,
    pub coordinates: Option<RawCoordinates>,
}

/// Label/value rows of a complex overview table
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawComplexTable {
    pub url: String,
    pub rows: Vec<(String, String)>,
}

/// Links of one result page and whether a further page follows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultPage {
    pub links: Vec<String>,
    pub has_next: bool,
}

/// Room availability of a watched complex
#[derive(Debug, Clone, PartialEq)]
pub enum Vacancy {
    Available(usize),
    NoRoomsNotice,
    NoneFound,
}
