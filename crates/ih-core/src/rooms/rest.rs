//! Document store over the backend's REST interface.
//!
//! Tables are addressed as `/rest/v1/<table>` with `column=eq.<value>`
//! filters; inserts ask for the stored row back with
//! `Prefer: return=representation`.

use std::time::Duration;

use async_trait::async_trait;
use ih_protocol::{MessageReport, NewRoomMessage, RoomMember, RoomMessage};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use super::store::{MessageStore, StoreError};

const MEMBERS: &str = "room_members";
const MESSAGES: &str = "chat_messages";
const REPORTS: &str = "message_reports";

pub struct RestStore {
    base_url: String,
    api_key: String,
    access_token: Option<String>,
    http: Client,
}

impl RestStore {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, StoreError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            access_token: None,
            http,
        })
    }

    /// Act as a signed-in user instead of the anonymous role.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.api_key);
        request.header("apikey", &self.api_key).bearer_auth(bearer)
    }

    async fn check(response: Response) -> Result<Response, StoreError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string))
            .unwrap_or_else(|| format!("request failed with status {status}"));
        warn!(%status, %message, "store request rejected");
        Err(StoreError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, StoreError> {
        let response = Self::check(self.authorize(request).send().await?).await?;
        Ok(response.json().await?)
    }

    async fn execute(&self, request: RequestBuilder) -> Result<(), StoreError> {
        Self::check(self.authorize(request).send().await?).await?;
        Ok(())
    }
}

#[async_trait]
impl MessageStore for RestStore {
    async fn find_member(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<Option<RoomMember>, StoreError> {
        let request = self.http.get(self.table_url(MEMBERS)).query(&[
            ("select", "*".to_string()),
            ("room_id", format!("eq.{room_id}")),
            ("user_id", format!("eq.{user_id}")),
            ("limit", "1".to_string()),
        ]);
        let rows: Vec<RoomMember> = self.fetch(request).await?;
        Ok(rows.into_iter().next())
    }

    async fn join(&self, member: &RoomMember) -> Result<(), StoreError> {
        let request = self
            .http
            .post(self.table_url(MEMBERS))
            .header("Prefer", "return=minimal")
            .json(member);
        self.execute(request).await
    }

    async fn recent_messages(
        &self,
        room_id: &str,
        limit: usize,
    ) -> Result<Vec<RoomMessage>, StoreError> {
        let request = self.http.get(self.table_url(MESSAGES)).query(&[
            ("select", "*".to_string()),
            ("room_id", format!("eq.{room_id}")),
            ("order", "created_at.desc".to_string()),
            ("limit", limit.to_string()),
        ]);
        let mut rows: Vec<RoomMessage> = self.fetch(request).await?;
        rows.reverse();
        debug!(room_id, count = rows.len(), "loaded room history");
        Ok(rows)
    }

    async fn insert_message(&self, message: &NewRoomMessage) -> Result<RoomMessage, StoreError> {
        let request = self
            .http
            .post(self.table_url(MESSAGES))
            .header("Prefer", "return=representation")
            .json(message);
        let rows: Vec<RoomMessage> = self.fetch(request).await?;
        rows.into_iter().next().ok_or(StoreError::NotFound)
    }

    async fn delete_message(&self, message_id: &str) -> Result<(), StoreError> {
        let request = self
            .http
            .delete(self.table_url(MESSAGES))
            .query(&[("id", format!("eq.{message_id}"))]);
        self.execute(request).await
    }

    async fn report_message(&self, report: &MessageReport) -> Result<(), StoreError> {
        let request = self
            .http
            .post(self.table_url(REPORTS))
            .header("Prefer", "return=minimal")
            .json(report);
        self.execute(request).await
    }
}
