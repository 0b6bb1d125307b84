use super::NotificationError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Outbound chat channel addressed by numeric chat id.
#[async_trait]
pub trait ChatNotifier: Send + Sync {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), NotificationError>;
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

#[derive(Deserialize)]
struct BotApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram Bot API `sendMessage` client.
#[derive(Clone)]
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_url: String,
    bot_token: String,
}

impl TelegramNotifier {
    pub fn new(
        client: reqwest::Client,
        api_url: impl Into<String>,
        bot_token: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into(),
            bot_token: bot_token.into(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.api_url.trim_end_matches('/'),
            self.bot_token,
            method
        )
    }
}

#[async_trait]
impl ChatNotifier for TelegramNotifier {
    #[instrument(skip(self, text))]
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), NotificationError> {
        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&SendMessage {
                chat_id,
                text,
                parse_mode: "HTML",
                disable_web_page_preview: true,
            })
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        let parsed: Option<BotApiResponse> = serde_json::from_str(&body).ok();
        match parsed {
            Some(reply) if status.is_success() && reply.ok => {
                debug!("Chat message delivered");
                Ok(())
            }
            Some(reply) => Err(NotificationError::Provider {
                status: status.as_u16(),
                body: reply.description.unwrap_or(body),
            }),
            None => Err(NotificationError::Provider {
                status: status.as_u16(),
                body,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn sends_to_bot_method_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:abc/sendMessage"))
            .and(body_partial_json(serde_json::json!({"chat_id": 777, "parse_mode": "HTML"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let bot = TelegramNotifier::new(reqwest::Client::new(), server.uri(), "123:abc");
        bot.send_message(777, "hello").await.unwrap();
    }

    #[tokio::test]
    async fn blocked_chat_surfaces_description() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_json(serde_json::json!({
                "ok": false,
                "description": "Forbidden: bot was blocked by the user"
            })))
            .mount(&server)
            .await;

        let bot = TelegramNotifier::new(reqwest::Client::new(), server.uri(), "t");
        match bot.send_message(1, "hi").await {
            Err(NotificationError::Provider { status, body }) => {
                assert_eq!(status, 403);
                assert!(body.contains("blocked"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
