//! Turns raw page text into typed listing values.
//!
//! Only the rent is mandatory. Every other field falls back to one of the
//! constants below and is reported as degraded.

use crate::models::{ComplexDetails, Coordinates, NormalizedListing, RangeField};
use crate::scrapers::traits::Extractor;
use crate::scrapers::types::{RawComplexTable, RawCoordinates, RawListing};
use crate::scrapers::ur::map_url;
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{info, warn};

pub const DEFAULT_AREA_NAME: &str = "UR";
pub const DEFAULT_ROOM_NUMBER: &str = "";
pub const DEFAULT_ROOM_TYPE: &str = "待确认";
pub const UNKNOWN_TEXT: &str = "未知";

const RECENTLY_VIEWED_MARKER: &str = "最近見た部屋";

#[derive(Debug, Error, PartialEq)]
pub enum NormalizeError {
    #[error("extraction incomplete for {url}: {reason}")]
    ExtractionIncomplete { url: String, reason: String },
}

/// Optional fields that fell back to their default
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradedField {
    AreaName,
    RoomNumber,
    Layout,
    Floor,
    Age,
    CommonFee,
    Coordinates,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub listing: NormalizedListing,
    pub degraded: Vec<DegradedField>,
}

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("static regex must compile"))
}

fn fee_regex() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(&CELL, r"\(([\d,]+)円\)")
}

fn parenthesised_regex() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(&CELL, r"\(.*?\).*")
}

fn yen_regex() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(&CELL, r"([\d,]+)円")
}

fn room_type_regex() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(&CELL, r"(\d[A-Z]+)")
}

fn floor_area_regex() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(&CELL, r"([\d.]+)㎡")
}

/// Digits of `text` as a positive integer, e.g. "85,300円" -> 85300
pub fn parse_price(text: &str) -> Option<i64> {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse::<i64>().ok().filter(|price| *price > 0)
}

fn parse_yen(token: &str) -> Option<i64> {
    token.replace(',', "").parse().ok()
}

/// Common fee shown as "(3,200円)" inside the price block
pub fn parse_common_fee(text: &str) -> Option<i64> {
    fee_regex()
        .captures(text)
        .and_then(|caps| parse_yen(&caps[1]))
}

/// First subtitle line with everything from the first "(" onwards removed
fn complex_name(subtitle: &str) -> Option<String> {
    let first_line = subtitle.lines().next().unwrap_or("");
    let name = parenthesised_regex().replace(first_line, "");
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_string())
}

pub fn parse_coordinates(raw: &RawCoordinates) -> Option<Coordinates> {
    let lat = raw.lat.trim().parse::<f64>().ok()?;
    let lng = raw.lng.trim().parse::<f64>().ok()?;
    Some(Coordinates::new(lat, lng))
}

fn or_default(
    degraded: &mut Vec<DegradedField>,
    value: Option<String>,
    field: DegradedField,
    default: &str,
) -> String {
    value.unwrap_or_else(|| {
        degraded.push(field);
        default.to_string()
    })
}

pub fn normalize(raw: &RawListing) -> Result<Normalized, NormalizeError> {
    let price = raw
        .rent_text
        .as_deref()
        .and_then(parse_price)
        .ok_or_else(|| NormalizeError::ExtractionIncomplete {
            url: raw.url.clone(),
            reason: format!("unparsable rent {:?}", raw.rent_text),
        })?;

    let mut degraded = Vec::new();

    let area_name = or_default(
        &mut degraded,
        raw.subtitle.as_deref().and_then(complex_name),
        DegradedField::AreaName,
        DEFAULT_AREA_NAME,
    );
    let room_number = or_default(
        &mut degraded,
        raw.room_title
            .as_deref()
            .map(|title| title.replace(RECENTLY_VIEWED_MARKER, "").trim().to_string())
            .filter(|title| !title.is_empty()),
        DegradedField::RoomNumber,
        DEFAULT_ROOM_NUMBER,
    );

    let layout = raw.layout_size.as_deref().and_then(|text| {
        let mut parts = text.split('/');
        let room_type = parts.next()?.trim().to_string();
        let size = parts.next()?.trim().to_string();
        Some((room_type, size))
    });
    let (room_type, area_text) = match layout {
        Some(parts) => parts,
        None => {
            degraded.push(DegradedField::Layout);
            (DEFAULT_ROOM_TYPE.to_string(), UNKNOWN_TEXT.to_string())
        }
    };

    let floor = raw.floor.clone();
    let floor_text = or_default(&mut degraded, floor, DegradedField::Floor, UNKNOWN_TEXT);
    let age_text = or_default(&mut degraded, raw.age.clone(), DegradedField::Age, UNKNOWN_TEXT);

    let common_fee = raw.price_block_text.as_deref().and_then(parse_common_fee);
    if common_fee.is_none() {
        degraded.push(DegradedField::CommonFee);
    }

    let coordinates = raw.coordinates.as_ref().and_then(parse_coordinates);
    if coordinates.is_none() {
        degraded.push(DegradedField::Coordinates);
    }

    Ok(Normalized {
        listing: NormalizedListing {
            url: raw.url.clone(),
            name: format!("{} {}", area_name, room_number).trim().to_string(),
            price,
            common_fee,
            coordinates,
            area_text,
            room_type,
            floor_text,
            age_text,
        },
        degraded,
    })
}

/// Falls back to the derived map page when the detail page had no markers.
/// Leaves `coordinates` empty if the map page has none either.
pub async fn resolve_coordinates<E>(extractor: &E, listing: &mut NormalizedListing)
where
    E: Extractor + ?Sized,
{
    if listing.coordinates.is_some() {
        return;
    }

    let map = map_url(&listing.url);
    info!("    🔄 No coordinates on detail page, trying map page: {}", map);

    match extractor.extract_coordinates(&map).await {
        Ok(Some(raw)) => match parse_coordinates(&raw) {
            Some(coordinates) => {
                info!("    📍 Coordinates: {}, {}", coordinates.lat, coordinates.lng);
                listing.coordinates = Some(coordinates);
            }
            None => warn!("    ⚠️ Unparsable coordinates on map page: {:?}", raw),
        },
        Ok(None) => warn!("    ⚠️ No coordinate markers found for {}", listing.url),
        Err(e) => warn!("    ⚠️ Map page fetch failed for {}: {:#}", listing.url, e),
    }
}

/// Range fields of a complex overview table.
///
/// The parenthesised common fee is stripped before rent tokens are collected
/// so that a single rent never pairs up with the fee as its maximum.
pub fn normalize_complex(table: &RawComplexTable) -> ComplexDetails {
    let mut details = ComplexDetails::default();

    for (label, text) in &table.rows {
        if label.contains("家賃") {
            details.common_fee = parse_common_fee(text);
            let rent_only = fee_regex().replace_all(text, "");
            let rents = yen_regex()
                .captures_iter(&rent_only)
                .filter_map(|caps| parse_yen(&caps[1]))
                .collect();
            details.rent = RangeField::from_tokens(rents);
        } else if label.contains("間取り/床面積") {
            let rooms = room_type_regex()
                .captures_iter(text)
                .map(|caps| caps[1].to_string())
                .collect();
            details.room_type = RangeField::from_tokens(rooms);

            let areas = floor_area_regex()
                .captures_iter(text)
                .map(|caps| caps[1].to_string())
                .collect();
            details.floor_area = RangeField::from_tokens(areas);
        }
    }

    details
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_room() -> RawListing {
        RawListing {
            url: "https://www.ur-net.go.jp/chintai/kanto/tokyo/20_1960_room.html".to_string(),
            rent_text: Some("85,300円".to_string()),
            price_block_text: Some("85,300円 (3,200円)".to_string()),
            subtitle: Some("コンフォール松原(東京都足立区) 最寄駅\n徒歩5分".to_string()),
            room_title: Some("最近見た部屋 3号棟 205号室".to_string()),
            layout_size: Some("2DK / 48㎡".to_string()),
            floor: Some("2階/5階建".to_string()),
            age: Some("1975年".to_string()),
            coordinates: Some(RawCoordinates {
                lat: "35.7812".to_string(),
                lng: "139.8123".to_string(),
            }),
        }
    }

    #[test]
    fn test_normalize_full_listing() {
        let normalized = normalize(&raw_room()).unwrap();
        let listing = normalized.listing;
        assert!(normalized.degraded.is_empty());
        assert_eq!(listing.name, "コンフォール松原 3号棟 205号室");
        assert_eq!(listing.price, 85_300);
        assert_eq!(listing.common_fee, Some(3_200));
        assert_eq!(listing.room_type, "2DK");
        assert_eq!(listing.area_text, "48㎡");
        assert_eq!(listing.coordinates, Some(Coordinates::new(35.7812, 139.8123)));
        assert_eq!(listing.total_cost(), 88_500);
    }

    #[test]
    fn test_unparsable_rent_is_incomplete() {
        let mut raw = raw_room();
        raw.rent_text = Some("お問い合わせ".to_string());
        assert!(matches!(
            normalize(&raw),
            Err(NormalizeError::ExtractionIncomplete { .. })
        ));

        raw.rent_text = None;
        assert!(normalize(&raw).is_err());

        raw.rent_text = Some("0円".to_string());
        assert!(normalize(&raw).is_err());
    }

    #[test]
    fn test_missing_optional_fields_use_defaults() {
        let raw = RawListing {
            url: "u".to_string(),
            rent_text: Some("70,000円".to_string()),
            ..Default::default()
        };
        let normalized = normalize(&raw).unwrap();
        let listing = &normalized.listing;
        assert_eq!(listing.name, "UR");
        assert_eq!(listing.room_type, DEFAULT_ROOM_TYPE);
        assert_eq!(listing.area_text, UNKNOWN_TEXT);
        assert_eq!(listing.floor_text, UNKNOWN_TEXT);
        assert_eq!(listing.age_text, UNKNOWN_TEXT);
        assert_eq!(listing.common_fee, None);
        assert_eq!(listing.coordinates, None);
        assert_eq!(
            normalized.degraded,
            vec![
                DegradedField::AreaName,
                DegradedField::RoomNumber,
                DegradedField::Layout,
                DegradedField::Floor,
                DegradedField::Age,
                DegradedField::CommonFee,
                DegradedField::Coordinates,
            ]
        );
    }

    #[test]
    fn test_layout_without_separator_degrades() {
        let mut raw = raw_room();
        raw.layout_size = Some("2DK".to_string());
        let normalized = normalize(&raw).unwrap();
        assert_eq!(normalized.listing.room_type, DEFAULT_ROOM_TYPE);
        assert_eq!(normalized.degraded, vec![DegradedField::Layout]);
    }

    #[test]
    fn test_garbage_coordinates_degrade() {
        let mut raw = raw_room();
        raw.coordinates = Some(RawCoordinates {
            lat: "n/a".to_string(),
            lng: "139.0".to_string(),
        });
        let normalized = normalize(&raw).unwrap();
        assert_eq!(normalized.listing.coordinates, None);
        assert_eq!(normalized.degraded, vec![DegradedField::Coordinates]);
    }

    fn complex(rows: &[(&str, &str)]) -> RawComplexTable {
        RawComplexTable {
            url: "u".to_string(),
            rows: rows
                .iter()
                .map(|(l, t)| (l.to_string(), t.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_complex_single_tokens_are_degenerate_ranges() {
        let details = normalize_complex(&complex(&[
            ("家賃", "72,000円(2,800円)"),
            ("間取り/床面積", "2DK / 48㎡"),
        ]));
        assert_eq!(details.rent, Some(RangeField { min: 72_000, max: 72_000 }));
        assert_eq!(details.common_fee, Some(2_800));
        assert_eq!(
            details.room_type,
            Some(RangeField { min: "2DK".to_string(), max: "2DK".to_string() })
        );
        assert_eq!(
            details.floor_area,
            Some(RangeField { min: "48".to_string(), max: "48".to_string() })
        );
    }

    #[test]
    fn test_complex_ranges_keep_source_order() {
        let details = normalize_complex(&complex(&[
            ("家賃", "91,200円～63,000円(3,100円)"),
            ("間取り/床面積", "3DK～1DK / 67.5㎡～40㎡"),
        ]));
        assert_eq!(details.rent, Some(RangeField { min: 91_200, max: 63_000 }));
        assert_eq!(
            details.room_type,
            Some(RangeField { min: "3DK".to_string(), max: "1DK".to_string() })
        );
        assert_eq!(
            details.floor_area,
            Some(RangeField { min: "67.5".to_string(), max: "40".to_string() })
        );
    }

    #[test]
    fn test_complex_unrelated_rows_are_empty() {
        let details = normalize_complex(&complex(&[("所在地", "東京都足立区")]));
        assert!(details.is_empty());
    }
}
