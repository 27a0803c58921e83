//! Transport trait and the reqwest-backed HTTP implementation.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use std::fmt::Debug;

use crate::types::{Error, HubConfig, Result};

/// Raw body chunks of an inbound subscription.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Outbound and inbound halves of the hub channel.
#[async_trait]
pub trait HubTransport: Send + Sync + Debug {
    /// Send one serialized event to the publisher topic.
    async fn publish(&self, data: String) -> Result<()>;

    /// Open the subscription and return its body stream.
    async fn subscribe(&self) -> Result<ByteStream>;
}

/// HTTP transport talking to a Mercure-style hub.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    hub: HubConfig,
}

impl HttpTransport {
    pub fn new(hub: HubConfig) -> Self {
        Self::with_client(reqwest::Client::new(), hub)
    }

    pub fn with_client(client: reqwest::Client, hub: HubConfig) -> Self {
        Self { client, hub }
    }

    pub fn hub(&self) -> &HubConfig {
        &self.hub
    }
}

#[async_trait]
impl HubTransport for HttpTransport {
    async fn publish(&self, data: String) -> Result<()> {
        let form = [
            ("topic", self.hub.publisher.topic.as_str()),
            ("data", data.as_str()),
        ];
        let response = self
            .client
            .post(&self.hub.url)
            .bearer_auth(&self.hub.publisher.token)
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::internal(format!("Hub rejected publish with status {}", status)));
        }
        Ok(())
    }

    async fn subscribe(&self) -> Result<ByteStream> {
        let mut request = self
            .client
            .get(&self.hub.url)
            .query(&[("topic", self.hub.subscriber.topic.as_str())])
            .header(reqwest::header::ACCEPT, "text/event-stream");
        if !self.hub.subscriber.token.is_empty() {
            request = request.bearer_auth(&self.hub.subscriber.token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::internal(format!(
                "Subscription refused with status {}",
                status
            )));
        }

        Ok(response.bytes_stream().map_err(Error::from).boxed())
    }
}
