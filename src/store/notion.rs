use crate::models::{Coordinates, ListingStatus, WorkflowStatus};
use crate::store::{
    Field, Metric, PropertyBag, QueryFilter, RecordPage, Store, StoreError, StoredRecord, Value,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::SecondsFormat;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Map};
use std::time::Duration;
use tracing::{debug, warn};

pub const NOTION_API_URL: &str = "https://api.notion.com";
const NOTION_VERSION: &str = "2022-06-28";
const PAGE_SIZE: u32 = 100;

/// Column names and status labels of a Notion database
#[derive(Debug, Clone)]
pub struct Schema {
    pub title: &'static str,
    pub available_label: &'static str,
    pub delisted_label: &'static str,
    pub triage_label: &'static str,
}

impl Schema {
    /// Room listings database
    pub fn rooms() -> Self {
        Self {
            title: "房源名称",
            available_label: "空室可租",
            delisted_label: "已下线",
            triage_label: "待筛选",
        }
    }

    /// Housing complex database; same columns, different title
    pub fn complexes() -> Self {
        Self {
            title: "团地名称",
            ..Self::rooms()
        }
    }

    pub fn property_name(&self, field: Field) -> &'static str {
        match field {
            Field::Name => self.title,
            Field::Url => "链接",
            Field::Price => "租金",
            Field::CommonFee => "管理费",
            Field::TotalCost => "总费用",
            Field::Latitude => "纬度",
            Field::Longitude => "经度",
            Field::FloorArea => "面积",
            Field::RoomType => "房型",
            Field::Floor => "楼层",
            Field::Age => "管理年份",
            Field::UpdatedAt => "更新时间",
            Field::Status => "房屋状态",
            Field::Workflow => "我的状态",
            Field::WalkMinutes => "步行时间",
            Field::DriveMinutes => "通勤时间",
            Field::RentMin => "租金下限",
            Field::RentMax => "租金上限",
            Field::RoomTypeMin => "房型下限",
            Field::RoomTypeMax => "房型上限",
            Field::FloorAreaMin => "面积下限",
            Field::FloorAreaMax => "面积上限",
        }
    }

    fn status_label(&self, status: ListingStatus) -> &'static str {
        match status {
            ListingStatus::Available => self.available_label,
            ListingStatus::Delisted => self.delisted_label,
        }
    }

    fn workflow_label(&self, workflow: WorkflowStatus) -> &'static str {
        match workflow {
            WorkflowStatus::NeedsTriage => self.triage_label,
        }
    }

    fn parse_status(&self, label: &str) -> Option<ListingStatus> {
        if label == self.available_label {
            Some(ListingStatus::Available)
        } else if label == self.delisted_label {
            Some(ListingStatus::Delisted)
        } else {
            None
        }
    }

    /// Notion property value JSON for a typed value
    pub fn encode(&self, value: &Value) -> serde_json::Value {
        let rich_text = |s: &str| json!([{ "text": { "content": s } }]);
        match value {
            Value::Title(s) => json!({ "title": rich_text(s.as_str()) }),
            Value::Integer(n) => json!({ "number": n }),
            Value::Decimal(n) => json!({ "number": n }),
            Value::Text(s) => json!({ "rich_text": rich_text(s.as_str()) }),
            Value::Select(s) => json!({ "select": { "name": s } }),
            Value::Date(dt) => {
                json!({ "date": { "start": dt.to_rfc3339_opts(SecondsFormat::Secs, true) } })
            }
            Value::Url(s) => json!({ "url": s }),
            Value::Lifecycle(status) => json!({ "status": { "name": self.status_label(*status) } }),
            Value::Workflow(workflow) => {
                json!({ "status": { "name": self.workflow_label(*workflow) } })
            }
        }
    }

    pub fn encode_properties(&self, properties: &PropertyBag) -> serde_json::Value {
        let map: Map<String, serde_json::Value> = properties
            .iter()
            .map(|(field, value)| (self.property_name(*field).to_string(), self.encode(value)))
            .collect();
        serde_json::Value::Object(map)
    }

    fn encode_filter(&self, filter: QueryFilter) -> Option<serde_json::Value> {
        match filter {
            QueryFilter::All => None,
            QueryFilter::MissingMetric(metric) => {
                let number = |field: Field, condition: &str| {
                    json!({
                        "property": self.property_name(field),
                        "number": { condition: true },
                    })
                };
                Some(json!({
                    "and": [
                        number(Metric::field(metric), "is_empty"),
                        number(Field::Latitude, "is_not_empty"),
                        number(Field::Longitude, "is_not_empty"),
                    ]
                }))
            }
        }
    }

    /// Lenient decoding: anything but the page id may be missing
    fn decode_record(&self, page: &serde_json::Value) -> Option<StoredRecord> {
        let id = page["id"].as_str()?.to_string();
        let props = &page["properties"];
        let prop = |field: Field| &props[self.property_name(field)];

        let name = prop(Field::Name)["title"][0]
            .get("plain_text")
            .or_else(|| prop(Field::Name)["title"][0]["text"].get("content"))
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let number = |field: Field| prop(field)["number"].as_f64();
        let coordinates = match (number(Field::Latitude), number(Field::Longitude)) {
            (Some(lat), Some(lng)) => Some(Coordinates::new(lat, lng)),
            _ => None,
        };

        Some(StoredRecord {
            id,
            url: prop(Field::Url)["url"].as_str().map(str::to_string),
            name,
            price: prop(Field::Price)["number"]
                .as_i64()
                .or_else(|| number(Field::Price).map(|p| p.round() as i64)),
            status: prop(Field::Status)["status"]["name"]
                .as_str()
                .and_then(|label| self.parse_status(label)),
            coordinates,
        })
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    results: Vec<serde_json::Value>,
    #[serde(default)]
    has_more: bool,
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedPage {
    id: String,
}

/// Notion database used as the record store
pub struct NotionStore {
    client: Client,
    base_url: String,
    token: String,
    database_id: String,
    schema: Schema,
}

impl NotionStore {
    pub fn new(base_url: &str, token: &str, database_id: &str, schema: Schema) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            database_id: database_id.to_string(),
            schema,
        })
    }

    async fn send(&self, request: RequestBuilder) -> Result<serde_json::Value, StoreError> {
        let response = request
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| StoreError::Decode(e.to_string()))
    }
}

#[async_trait]
impl Store for NotionStore {
    async fn query(
        &self,
        filter: QueryFilter,
        cursor: Option<&str>,
    ) -> Result<RecordPage, StoreError> {
        let url = format!("{}/v1/databases/{}/query", self.base_url, self.database_id);
        let mut payload = json!({ "page_size": PAGE_SIZE });
        if let Some(cursor) = cursor {
            payload["start_cursor"] = json!(cursor);
        }
        if let Some(filter) = self.schema.encode_filter(filter) {
            payload["filter"] = filter;
        }

        debug!("Querying {} (cursor {:?})", url, cursor);
        let body = self.send(self.client.post(&url).json(&payload)).await?;
        let response: QueryResponse =
            serde_json::from_value(body).map_err(|e| StoreError::Decode(e.to_string()))?;

        let records = response
            .results
            .iter()
            .filter_map(|page| {
                let record = self.schema.decode_record(page);
                if record.is_none() {
                    warn!("Skipping malformed store record: {}", page);
                }
                record
            })
            .collect();

        Ok(RecordPage {
            records,
            next_cursor: response.next_cursor,
            has_more: response.has_more,
        })
    }

    async fn create(&self, properties: &PropertyBag) -> Result<String, StoreError> {
        let url = format!("{}/v1/pages", self.base_url);
        let payload = json!({
            "parent": { "database_id": self.database_id },
            "properties": self.schema.encode_properties(properties),
        });

        let body = self.send(self.client.post(&url).json(&payload)).await?;
        let created: CreatedPage =
            serde_json::from_value(body).map_err(|e| StoreError::Decode(e.to_string()))?;
        Ok(created.id)
    }

    async fn update(&self, id: &str, properties: &PropertyBag) -> Result<(), StoreError> {
        let url = format!("{}/v1/pages/{}", self.base_url, id);
        let payload = json!({ "properties": self.schema.encode_properties(properties) });
        self.send(self.client.patch(&url).json(&payload)).await?;
        Ok(())
    }
}
