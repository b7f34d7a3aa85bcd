// Messages backend client
// The core only ever talks to the backend through `MessagesApi`.

use async_trait::async_trait;
use log::{debug, error, info};
use reqwest::{Client, Method, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use uuid::Uuid;

use super::envelope;
use super::MessagingError;
use crate::models::{Contact, Message, SendMessageRequest};

/// The four backend operations the messaging core relies on
#[async_trait]
pub trait MessagesApi: Send + Sync {
    /// Contacts `user_id` has exchanged messages with
    async fn my_conversations(&self, user_id: &str) -> Result<Vec<Contact>, MessagingError>;

    /// Thread between `user_id` and `contact_id`, in server order
    async fn messages_with(
        &self,
        user_id: &str,
        contact_id: &str,
    ) -> Result<Vec<Message>, MessagingError>;

    async fn send_message(&self, request: &SendMessageRequest) -> Result<Message, MessagingError>;

    async fn mark_read(&self, message_id: &str) -> Result<(), MessagingError>;
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout: Option<Duration>,
}

impl ApiConfig {
    pub fn new(base_url: &str) -> Self {
        ApiConfig {
            base_url: base_url.to_string(),
            token: None,
            timeout: None,
        }
    }
}

/// reqwest-backed implementation talking to `{base_url}/messages/...`
pub struct HttpApi {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpApi {
    pub fn new(config: &ApiConfig) -> Result<Self, MessagingError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            MessagingError::Validation(format!("Invalid base URL '{}': {}", config.base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(MessagingError::Validation(format!(
                "Base URL '{}' cannot carry a path",
                config.base_url
            )));
        }

        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| MessagingError::Network(format!("HTTP client: {}", e)))?;

        info!("Messages backend at {}", base_url);
        Ok(HttpApi {
            client,
            base_url,
            token: config.token.clone(),
        })
    }

    /// Build `{base}/messages/<segments..>`, percent-encoding each segment
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push("messages").extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send the request and hand status + raw body back for envelope decoding
    async fn execute(&self, builder: reqwest::RequestBuilder, what: &str) -> Result<(u16, Vec<u8>), MessagingError> {
        let request_id = Uuid::new_v4();
        debug!("[{}] {}", request_id, what);

        let response = builder.send().await.map_err(|e| {
            error!("[{}] {} failed: {}", request_id, what, e);
            MessagingError::Network(e.to_string())
        })?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| {
            error!("[{}] reading {} response failed: {}", request_id, what, e);
            MessagingError::Network(e.to_string())
        })?;

        debug!("[{}] {} -> {} ({} bytes)", request_id, what, status, body.len());
        Ok((status, body.to_vec()))
    }

    async fn fetch<T: DeserializeOwned>(&self, builder: reqwest::RequestBuilder, what: &str) -> Result<T, MessagingError> {
        let (status, body) = self.execute(builder, what).await?;
        envelope::decode(status, &body)
    }
}

#[async_trait]
impl MessagesApi for HttpApi {
    async fn my_conversations(&self, user_id: &str) -> Result<Vec<Contact>, MessagingError> {
        let url = self.endpoint(&["myConversations", user_id]);
        self.fetch(self.request(Method::GET, url), "list conversations").await
    }

    async fn messages_with(
        &self,
        user_id: &str,
        contact_id: &str,
    ) -> Result<Vec<Message>, MessagingError> {
        let url = self.endpoint(&["myMessagesWith", user_id, contact_id]);
        self.fetch(self.request(Method::GET, url), "list messages").await
    }

    async fn send_message(&self, request: &SendMessageRequest) -> Result<Message, MessagingError> {
        let url = self.endpoint(&["send"]);
        self.fetch(self.request(Method::POST, url).json(request), "send message").await
    }

    async fn mark_read(&self, message_id: &str) -> Result<(), MessagingError> {
        let url = self.endpoint(&["messageRead", message_id]);
        let (status, body) = self
            .execute(self.request(Method::PATCH, url), "mark message read")
            .await?;
        envelope::decode_empty(status, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_layout() {
        let api = HttpApi::new(&ApiConfig::new("http://localhost:3333")).unwrap();

        assert_eq!(
            api.endpoint(&["myConversations", "u-1"]).as_str(),
            "http://localhost:3333/messages/myConversations/u-1"
        );
        assert_eq!(
            api.endpoint(&["myMessagesWith", "u-1", "u-2"]).as_str(),
            "http://localhost:3333/messages/myMessagesWith/u-1/u-2"
        );
    }

    #[test]
    fn test_endpoint_keeps_base_path_and_encodes_ids() {
        let api = HttpApi::new(&ApiConfig::new("https://api.example.com/v1/")).unwrap();

        assert_eq!(
            api.endpoint(&["messageRead", "a b/c"]).as_str(),
            "https://api.example.com/v1/messages/messageRead/a%20b%2Fc"
        );
    }

    #[test]
    fn test_invalid_base_url_is_validation_error() {
        let result = HttpApi::new(&ApiConfig::new("not a url"));
        assert!(matches!(result, Err(MessagingError::Validation(_))));

        let result = HttpApi::new(&ApiConfig::new("mailto:someone@example.com"));
        assert!(matches!(result, Err(MessagingError::Validation(_))));
    }
}
