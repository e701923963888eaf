use crate::geo::google::GOOGLE_MAPS_URL;
use crate::store::notion::NOTION_API_URL;
use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

const DEFAULT_MAX_PRICE: i64 = 160_000;
const DEFAULT_AREAS: &str = "tokyo,kanagawa,chiba";
const DEFAULT_STORE_INTERVAL_MS: u64 = 350;
const DEFAULT_PAGE_INTERVAL_MS: u64 = 4_000;

/// Settings read from the environment. Credentials stay optional here and are
/// demanded by the commands that use them.
#[derive(Debug, Clone)]
pub struct Config {
    pub notion_token: Option<String>,
    pub rooms_database_id: Option<String>,
    pub complexes_database_id: Option<String>,
    pub notion_base_url: String,
    pub gmaps_key: Option<String>,
    pub gmaps_base_url: String,
    /// `None` disables the ceiling (`MAX_PRICE=0`)
    pub max_price: Option<i64>,
    pub areas: Vec<String>,
    pub store_interval: Duration,
    pub page_interval: Duration,
    pub headless: bool,
    pub watch_urls: Vec<String>,
}

fn list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn required(value: &Option<String>, key: &str) -> Result<String> {
    value
        .clone()
        .filter(|v| !v.is_empty())
        .with_context(|| format!("{} must be set", key))
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        let _ = dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let millis = |key: &str, default: u64| -> Result<Duration> {
            let ms = match lookup(key) {
                Some(v) => v
                    .trim()
                    .parse()
                    .with_context(|| format!("{} must be a number of milliseconds", key))?,
                None => default,
            };
            Ok(Duration::from_millis(ms))
        };

        let max_price = match lookup("MAX_PRICE") {
            Some(v) => v.trim().parse::<i64>().context("MAX_PRICE must be a number")?,
            None => DEFAULT_MAX_PRICE,
        };

        let headless = match lookup("HEADLESS") {
            Some(v) => v.trim().parse::<bool>().context("HEADLESS must be true or false")?,
            None => true,
        };

        Ok(Self {
            notion_token: lookup("NOTION_TOKEN"),
            rooms_database_id: lookup("DATABASE_ID"),
            complexes_database_id: lookup("DATABASE_D_ID"),
            notion_base_url: lookup("NOTION_BASE_URL")
                .unwrap_or_else(|| NOTION_API_URL.to_string()),
            gmaps_key: lookup("GMAPS_KEY"),
            gmaps_base_url: lookup("GMAPS_BASE_URL")
                .unwrap_or_else(|| GOOGLE_MAPS_URL.to_string()),
            max_price: (max_price > 0).then_some(max_price),
            areas: list(&lookup("AREAS").unwrap_or_else(|| DEFAULT_AREAS.to_string())),
            store_interval: millis("STORE_INTERVAL_MS", DEFAULT_STORE_INTERVAL_MS)?,
            page_interval: millis("PAGE_INTERVAL_MS", DEFAULT_PAGE_INTERVAL_MS)?,
            headless,
            watch_urls: lookup("WATCH_URLS").map(|v| list(&v)).unwrap_or_default(),
        })
    }

    pub fn notion_token(&self) -> Result<String> {
        required(&self.notion_token, "NOTION_TOKEN")
    }

    pub fn rooms_database_id(&self) -> Result<String> {
        required(&self.rooms_database_id, "DATABASE_ID")
    }

    pub fn complexes_database_id(&self) -> Result<String> {
        required(&self.complexes_database_id, "DATABASE_D_ID")
    }

    pub fn gmaps_key(&self) -> Result<String> {
        required(&self.gmaps_key, "GMAPS_KEY")
    }
}
