use async_trait::async_trait;
use tracing::debug;

use crate::config::CollectionConfig;
use crate::error::SaleError;
use crate::types::{FeedResponse, RawRecord};

/// Source of recent sell-side orders for a collection.
#[async_trait]
pub trait FeedClient: Send + Sync {
    /// Fetch the most recent orders. Never returns a partial batch: any
    /// transport, status or decode failure is an error.
    async fn fetch_recent(&self, collection: &CollectionConfig) -> Result<Vec<RawRecord>, SaleError>;
}

/// Marketplace orders API over HTTP. Cheap to share; the inner client pools
/// connections.
#[derive(Debug, Clone)]
pub struct HttpFeedClient {
    client: reqwest::Client,
    limit: u32,
}

impl HttpFeedClient {
    pub fn new(client: reqwest::Client, limit: u32) -> Self {
        Self { client, limit }
    }
}

#[async_trait]
impl FeedClient for HttpFeedClient {
    async fn fetch_recent(&self, collection: &CollectionConfig) -> Result<Vec<RawRecord>, SaleError> {
        let name = collection.name.as_str();
        let limit = self.limit.to_string();
        let resp = self
            .client
            .get(&collection.api_url)
            .query(&[("type", "sell"), ("offset", "0"), ("limit", limit.as_str())])
            .send()
            .await
            .map_err(|e| SaleError::fetch(name, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SaleError::fetch(name, format!("HTTP {status}: {body}")));
        }

        let feed: FeedResponse = resp
            .json()
            .await
            .map_err(|e| SaleError::fetch(name, format!("invalid response body: {e}")))?;
        debug!("Fetched {} orders for {name}", feed.data.len());
        Ok(feed.data)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const ORDERS_PATH: &str = "/listings/nfts/dopedoges/orders";

    fn collection(base: &str) -> CollectionConfig {
        CollectionConfig {
            name: "dopedoges".to_string(),
            api_url: format!("{base}{ORDERS_PATH}"),
            webhook_url: None,
            color: 0xFF4500,
            hashtag: "#DopeDogeVibes".to_string(),
        }
    }

    fn client() -> HttpFeedClient {
        HttpFeedClient::new(reqwest::Client::new(), 20)
    }

    #[tokio::test]
    async fn fetches_recent_sell_orders() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(ORDERS_PATH))
            .and(query_param("type", "sell"))
            .and(query_param("offset", "0"))
            .and(query_param("limit", "20"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    {
                        "status": "bought",
                        "price": 7000000000000u64,
                        "itemId": "412",
                        "inscriptionId": "abc123i0",
                        "buyerAddress": "DBuyerAddress0001",
                        "sellerAddress": "DSellerAddress002",
                        "date": "2025-03-11T21:00:00.000Z"
                    },
                    { "status": "listed", "price": null }
                ]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let records = client()
            .fetch_recent(&collection(&mock_server.uri()))
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].item_id.as_deref(), Some("412"));
        assert!(records[0].is_completed_sale());
        assert!(!records[1].is_completed_sale());
    }

    #[tokio::test]
    async fn custom_limit_is_sent() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(ORDERS_PATH))
            .and(query_param("limit", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let records = HttpFeedClient::new(reqwest::Client::new(), 5)
            .fetch_recent(&collection(&mock_server.uri()))
            .await
            .unwrap();
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn server_error_is_upstream_fetch() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(ORDERS_PATH))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream down"))
            .mount(&mock_server)
            .await;

        let err = client()
            .fetch_recent(&collection(&mock_server.uri()))
            .await
            .unwrap_err();

        assert!(matches!(err, SaleError::UpstreamFetch { .. }));
        let msg = err.to_string();
        assert!(msg.contains("500"), "unexpected error: {msg}");
        assert!(msg.contains("upstream down"), "unexpected error: {msg}");
    }

    #[tokio::test]
    async fn garbage_body_is_upstream_fetch() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(ORDERS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&mock_server)
            .await;

        let err = client()
            .fetch_recent(&collection(&mock_server.uri()))
            .await
            .unwrap_err();

        assert!(matches!(err, SaleError::UpstreamFetch { .. }));
    }

    #[tokio::test]
    async fn unreachable_feed_is_upstream_fetch() {
        let mock_server = MockServer::start().await;
        let uri = mock_server.uri();
        drop(mock_server);

        let err = client().fetch_recent(&collection(&uri)).await.unwrap_err();

        assert!(matches!(err, SaleError::UpstreamFetch { .. }));
        assert_eq!(err.collection(), "dopedoges");
    }
}
