use chrono::{Duration, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use secrecy::ExposeSecret;
use serde_json::json;
use tracing::debug;

use replyq_core::config::HelpdeskConfig;
use replyq_core::domain::conversation::{ConversationItem, Message, ReplyCandidate, SourceType};

use crate::needs_reply::{item_qualifies, select_client_message};
use crate::wire::{ListEnvelope, MessageDto, OrderDto, TicketDto};
use crate::{HelpdeskApi, HelpdeskError};

const API_VERSION_HEADER: &str = "X-Api-Version";
const DEFAULT_LIST_PAGE_SIZE: u32 = 100;
const DEFAULT_MESSAGE_FETCH_LIMIT: u32 = 50;

/// Concrete reqwest-backed facade. One instance per process; cheap to clone.
#[derive(Clone, Debug)]
pub struct HelpdeskClient {
    http: reqwest::Client,
    base_url: String,
    list_page_size: u32,
    message_fetch_limit: u32,
}

impl HelpdeskClient {
    pub fn new(config: &HelpdeskConfig) -> Result<Self, HelpdeskError> {
        let mut headers = HeaderMap::new();
        let bearer = format!("Bearer {}", config.api_key.expose_secret());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&bearer).map_err(|_| {
                HelpdeskError::Config(
                    "api key contains characters not allowed in an Authorization header"
                        .to_string(),
                )
            })?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            API_VERSION_HEADER,
            HeaderValue::from_str(&config.api_version).map_err(|_| {
                HelpdeskError::Config(format!("invalid api version {:?}", config.api_version))
            })?,
        );

        let http = reqwest::Client::builder().default_headers(headers).build()?;

        Ok(Self {
            http,
            base_url: format!("https://{}/api", config.workspace_host),
            list_page_size: DEFAULT_LIST_PAGE_SIZE,
            message_fetch_limit: DEFAULT_MESSAGE_FETCH_LIMIT,
        })
    }

    pub fn with_limits(mut self, list_page_size: u32, message_fetch_limit: u32) -> Self {
        self.list_page_size = list_page_size.clamp(1, 100);
        self.message_fetch_limit = message_fetch_limit.max(1);
        self
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(String, String)],
    ) -> Result<T, HelpdeskError> {
        let url = format!("{}/{endpoint}", self.base_url);
        let response = self.http.get(&url).query(params).send().await?;
        decode(response).await
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &serde_json::Value,
    ) -> Result<T, HelpdeskError> {
        let url = format!("{}/{endpoint}", self.base_url);
        let response = self.http.post(&url).json(body).send().await?;
        decode(response).await
    }

    fn list_params(
        limit: u32,
        page: u32,
        sort: &str,
        filters: &[(&str, &str)],
    ) -> Vec<(String, String)> {
        let mut params = vec![
            ("limit".to_string(), limit.to_string()),
            ("page".to_string(), page.to_string()),
            ("sort".to_string(), sort.to_string()),
        ];
        for (key, value) in filters {
            params.push((format!("filters[{key}]"), (*value).to_string()));
        }
        params
    }

    pub async fn list_orders(
        &self,
        limit: u32,
        page: u32,
        sort: &str,
        filters: &[(&str, &str)],
    ) -> Result<Vec<ConversationItem>, HelpdeskError> {
        let envelope: ListEnvelope<OrderDto> =
            self.get_json("orders", &Self::list_params(limit, page, sort, filters)).await?;
        Ok(envelope.data.into_iter().map(Into::into).collect())
    }

    pub async fn list_tickets(
        &self,
        limit: u32,
        page: u32,
        sort: &str,
        filters: &[(&str, &str)],
    ) -> Result<Vec<ConversationItem>, HelpdeskError> {
        let envelope: ListEnvelope<TicketDto> =
            self.get_json("tickets", &Self::list_params(limit, page, sort, filters)).await?;
        Ok(envelope.data.into_iter().map(Into::into).collect())
    }

    /// Thread for one item, newest first as returned by the remote API.
    pub async fn get_messages(
        &self,
        source_type: SourceType,
        source_id: i64,
        limit: u32,
    ) -> Result<Vec<Message>, HelpdeskError> {
        let endpoint = match source_type {
            SourceType::Order => format!("order_messages/{source_id}"),
            SourceType::Ticket => format!("ticket_messages/{source_id}"),
        };
        let envelope: ListEnvelope<MessageDto> = self
            .get_json(&endpoint, &[("limit".to_string(), limit.to_string())])
            .await?;
        Ok(envelope.data.into_iter().map(Into::into).collect())
    }

    async fn find_candidates_of_type(
        &self,
        source_type: SourceType,
        cutoff: chrono::DateTime<Utc>,
        out: &mut Vec<ReplyCandidate>,
    ) -> Result<(), HelpdeskError> {
        let items = match source_type {
            SourceType::Order => {
                self.list_orders(self.list_page_size, 1, "last_message_at:desc", &[]).await?
            }
            SourceType::Ticket => {
                self.list_tickets(self.list_page_size, 1, "last_message_at:desc", &[]).await?
            }
        };

        for item in items {
            if !item_qualifies(&item, cutoff) {
                continue;
            }

            let messages =
                self.get_messages(source_type, item.id, self.message_fetch_limit).await?;
            if messages.is_empty() {
                continue;
            }

            if let Some(client_message) = select_client_message(item.user_id, &messages) {
                debug!(
                    source_type = %source_type,
                    source_id = item.id,
                    message_id = client_message.id,
                    "item needs reply"
                );
                let client_message = client_message.clone();
                let manager_user_id = item.manager_user_id();
                out.push(ReplyCandidate {
                    source_type,
                    item,
                    messages,
                    client_message,
                    manager_user_id,
                });
            }
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl HelpdeskApi for HelpdeskClient {
    async fn find_items_needing_reply(
        &self,
        check_orders: bool,
        check_tickets: bool,
        lookback_hours: u32,
    ) -> Result<Vec<ReplyCandidate>, HelpdeskError> {
        let cutoff = Utc::now() - Duration::hours(i64::from(lookback_hours));
        let mut candidates = Vec::new();

        if check_orders {
            self.find_candidates_of_type(SourceType::Order, cutoff, &mut candidates).await?;
        }
        if check_tickets {
            self.find_candidates_of_type(SourceType::Ticket, cutoff, &mut candidates).await?;
        }

        Ok(candidates)
    }

    async fn send_message(
        &self,
        source_type: SourceType,
        source_id: i64,
        text: &str,
        user_id: Option<i64>,
        staff_only: bool,
    ) -> Result<serde_json::Value, HelpdeskError> {
        let endpoint = match source_type {
            SourceType::Order => format!("order_messages/{source_id}"),
            SourceType::Ticket => format!("ticket_messages/{source_id}"),
        };

        let mut payload = json!({
            "message": text,
            "staff_only": staff_only,
        });
        if let Some(user_id) = user_id {
            payload["user_id"] = json!(user_id);
        }

        self.post_json(&endpoint, &payload).await
    }
}

async fn decode<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, HelpdeskError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(HelpdeskError::Status { status: status.as_u16(), body });
    }
    Ok(response.json::<T>().await?)
}
