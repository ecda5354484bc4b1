use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde::Serialize;
use tracing::info;
use url::Url;

use crate::config::CollectionConfig;
use crate::error::SaleError;
use crate::types::SaleEvent;
use crate::{CONTENT_URL_BASE, INSCRIPTION_URL_BASE};

const HEADLINE_EMOJIS: [&str; 5] = ["🔥", "🚀", "💥", "🌟", "⚡"];

/// Resolved destination for one collection's alerts.
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub collection: String,
    pub display_name: String,
    pub webhook: Url,
    pub color: u32,
    pub hashtag: String,
}

/// Delivers sale alerts. Each `notify` call is a single attempt.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Look up where alerts for `collection` go.
    fn resolve(&self, collection: &CollectionConfig) -> Result<Channel, SaleError>;

    async fn notify(&self, channel: &Channel, sale: &SaleEvent) -> Result<(), SaleError>;
}

/// Posts embeds to Discord webhooks.
#[derive(Debug, Clone)]
pub struct DiscordNotifier {
    client: reqwest::Client,
}

impl DiscordNotifier {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Notifier for DiscordNotifier {
    fn resolve(&self, collection: &CollectionConfig) -> Result<Channel, SaleError> {
        let env_var = collection.webhook_env_var();
        let raw = collection
            .webhook_url
            .clone()
            .filter(|u| !u.is_empty())
            .or_else(|| std::env::var(&env_var).ok().filter(|u| !u.is_empty()))
            .ok_or_else(|| {
                SaleError::configuration(
                    &collection.name,
                    format!("no webhook_url configured and {env_var} is not set"),
                )
            })?;
        channel_for(collection, &raw)
    }

    async fn notify(&self, channel: &Channel, sale: &SaleEvent) -> Result<(), SaleError> {
        let message = WebhookMessage {
            embeds: vec![render_embed(channel, sale, random_emoji())],
        };
        let resp = self
            .client
            .post(channel.webhook.clone())
            .json(&message)
            .send()
            .await
            .map_err(|e| SaleError::delivery(&channel.collection, e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SaleError::delivery(
                &channel.collection,
                format!("HTTP {status}: {body}"),
            ));
        }

        info!(
            "Posted sale for {}: itemId={} price={} DOGE",
            channel.collection,
            sale.item_id.as_deref().unwrap_or("???"),
            sale.display_price(),
        );
        Ok(())
    }
}

/// Build a channel from a collection and a webhook URL.
pub fn channel_for(collection: &CollectionConfig, webhook: &str) -> Result<Channel, SaleError> {
    let webhook = Url::parse(webhook).map_err(|e| {
        SaleError::configuration(&collection.name, format!("invalid webhook url: {e}"))
    })?;
    if !matches!(webhook.scheme(), "http" | "https") {
        return Err(SaleError::configuration(
            &collection.name,
            format!("unsupported webhook scheme {}", webhook.scheme()),
        ));
    }
    Ok(Channel {
        collection: collection.name.clone(),
        display_name: collection.display_name(),
        webhook,
        color: collection.color,
        hashtag: collection.hashtag.clone(),
    })
}

fn random_emoji() -> &'static str {
    HEADLINE_EMOJIS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(HEADLINE_EMOJIS[0])
}

/// Alert headline, e.g. `🐶 **DOPEDOGES ALERT! Fresh Sale on Doginals! 🚀**`.
pub fn headline(collection: &str, emoji: &str) -> String {
    format!(
        "🐶 **{} ALERT! Fresh Sale on Doginals! {emoji}**",
        collection.to_uppercase()
    )
}

// ── Discord webhook payload ────────────────────────────────────────

#[derive(Debug, Serialize)]
struct WebhookMessage {
    embeds: Vec<Embed>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Embed {
    pub title: String,
    pub url: String,
    pub description: String,
    pub color: u32,
    pub fields: Vec<EmbedField>,
    pub thumbnail: EmbedImage,
    pub footer: EmbedFooter,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedImage {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

fn field(name: &str, value: String) -> EmbedField {
    EmbedField {
        name: name.to_string(),
        value,
        inline: true,
    }
}

/// Render the embed for one sale.
pub fn render_embed(channel: &Channel, sale: &SaleEvent, emoji: &str) -> Embed {
    let inscription_number = sale
        .inscription_number
        .map(|n| n.to_string())
        .unwrap_or_else(|| "N/A".to_string());

    Embed {
        title: format!(
            "{} #{}",
            channel.display_name,
            sale.item_id.as_deref().unwrap_or("???")
        ),
        url: format!("{INSCRIPTION_URL_BASE}/{}", sale.inscription_id),
        description: headline(&channel.collection, emoji),
        color: channel.color,
        fields: vec![
            field("💰 Sold for", format!("{} Doge", sale.display_price())),
            field("Inscription Number", inscription_number),
            field("Buyer", sale.buyer.clone()),
            field("Seller", sale.seller.clone()),
        ],
        thumbnail: EmbedImage {
            url: format!("{CONTENT_URL_BASE}/{}", sale.inscription_id),
        },
        footer: EmbedFooter {
            text: format!(
                "Sold on {} | {} ✅",
                sale.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
                channel.hashtag
            ),
        },
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::types::RawRecord;

    fn collection(webhook: Option<&str>) -> CollectionConfig {
        CollectionConfig {
            name: "dopedoges".to_string(),
            api_url: "https://api.doggy.market/listings/nfts/dopedoges/orders".to_string(),
            webhook_url: webhook.map(str::to_string),
            color: 0xFF4500,
            hashtag: "#DopeDogeVibes".to_string(),
        }
    }

    fn sale() -> SaleEvent {
        let record = RawRecord {
            status: Some("bought".to_string()),
            price: 7_000_000_000_000,
            item_id: Some("412".to_string()),
            inscription_id: Some("abc123i0".to_string()),
            inscription_number: Some(5012345),
            buyer_address: Some("DBuyerAddress0001".to_string()),
            seller_address: Some("DSellerAddress002".to_string()),
            date: Some("2025-03-11T21:00:00.000Z".to_string()),
        };
        SaleEvent::from_record("dopedoges", &record)
    }

    #[test]
    fn resolves_configured_webhook() {
        let notifier = DiscordNotifier::new(reqwest::Client::new());
        let channel = notifier
            .resolve(&collection(Some("https://discord.com/api/webhooks/1/abc")))
            .unwrap();
        assert_eq!(channel.display_name, "Dopedoges");
        assert_eq!(channel.webhook.as_str(), "https://discord.com/api/webhooks/1/abc");
    }

    #[test]
    fn rejects_invalid_webhook() {
        let err = channel_for(&collection(None), "not a url").unwrap_err();
        assert!(matches!(err, SaleError::Configuration { .. }));

        let err = channel_for(&collection(None), "ftp://example.com/hook").unwrap_err();
        assert!(matches!(err, SaleError::Configuration { .. }));
    }

    #[test]
    fn renders_embed() {
        let channel = channel_for(
            &collection(None),
            "https://discord.com/api/webhooks/1/abc",
        )
        .unwrap();
        let embed = render_embed(&channel, &sale(), "🚀");

        assert_eq!(embed.title, "Dopedoges #412");
        assert_eq!(embed.url, "https://doggy.market/inscription/abc123i0");
        assert_eq!(
            embed.description,
            "🐶 **DOPEDOGES ALERT! Fresh Sale on Doginals! 🚀**"
        );
        assert_eq!(embed.color, 0xFF4500);
        assert_eq!(embed.fields[0].value, "70000.00 Doge");
        assert_eq!(embed.fields[1].value, "5012345");
        assert_eq!(embed.fields[2].value, "DBuy...0001");
        assert_eq!(embed.fields[3].value, "DSel...s002");
        assert_eq!(embed.thumbnail.url, "https://cdn.doggy.market/content/abc123i0");
        assert_eq!(
            embed.footer.text,
            "Sold on 2025-03-11 21:00:00 UTC | #DopeDogeVibes ✅"
        );
    }

    #[test]
    fn renders_missing_fields() {
        let channel = channel_for(
            &collection(None),
            "https://discord.com/api/webhooks/1/abc",
        )
        .unwrap();
        let mut sale = sale();
        sale.item_id = None;
        sale.inscription_number = None;
        let embed = render_embed(&channel, &sale, "🔥");
        assert_eq!(embed.title, "Dopedoges #???");
        assert_eq!(embed.fields[1].value, "N/A");
    }

    #[tokio::test]
    async fn posts_embed_to_webhook() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/webhooks/1/abc"))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        let channel = channel_for(
            &collection(None),
            &format!("{}/api/webhooks/1/abc", mock_server.uri()),
        )
        .unwrap();
        DiscordNotifier::new(reqwest::Client::new())
            .notify(&channel, &sale())
            .await
            .unwrap();

        let requests = mock_server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        let embeds = body["embeds"].as_array().unwrap();
        assert_eq!(embeds.len(), 1);
        assert_eq!(embeds[0]["title"], "Dopedoges #412");
        assert_eq!(embeds[0]["color"], 0xFF4500);
        assert_eq!(embeds[0]["fields"][0]["value"], "70000.00 Doge");
        assert_eq!(
            embeds[0]["footer"]["text"],
            "Sold on 2025-03-11 21:00:00 UTC | #DopeDogeVibes ✅"
        );
    }

    #[tokio::test]
    async fn webhook_error_is_delivery_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/webhooks/1/abc"))
            .respond_with(ResponseTemplate::new(500).set_body_string("oops"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let channel = channel_for(
            &collection(None),
            &format!("{}/api/webhooks/1/abc", mock_server.uri()),
        )
        .unwrap();
        let err = DiscordNotifier::new(reqwest::Client::new())
            .notify(&channel, &sale())
            .await
            .unwrap_err();

        assert!(matches!(err, SaleError::Delivery { .. }));
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn unknown_webhook_is_delivery_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let channel = channel_for(
            &collection(None),
            &format!("{}/api/webhooks/9/gone", mock_server.uri()),
        )
        .unwrap();
        let err = DiscordNotifier::new(reqwest::Client::new())
            .notify(&channel, &sale())
            .await
            .unwrap_err();

        assert_eq!(err.stage(), crate::error::Stage::Deliver);
    }

    #[test]
    fn embed_serializes_like_discord_expects() {
        let channel = channel_for(
            &collection(None),
            "https://discord.com/api/webhooks/1/abc",
        )
        .unwrap();
        let message = WebhookMessage {
            embeds: vec![render_embed(&channel, &sale(), "⚡")],
        };
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["embeds"][0]["color"], 0xFF4500);
        assert_eq!(json["embeds"][0]["fields"][0]["inline"], true);
        assert!(json["embeds"][0]["thumbnail"]["url"].is_string());
    }
}
