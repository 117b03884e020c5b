// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Outbound collaborators of the stress monitor: advice text and message
//! delivery.

use crate::models::{Urgency, UserId};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org/bot";
const SEND_TIMEOUT: Duration = Duration::from_secs(15);

/// Inputs for an advice message.
#[derive(Debug, Clone, PartialEq)]
pub struct AdviceRequest {
    pub urgency: Urgency,
    pub strain: f64,
    pub recovery: Option<f64>,
    pub threshold: f64,
}

/// Produces the advice line of a stress alert.
#[async_trait]
pub trait AdviceGenerator: Send + Sync {
    async fn advice(&self, request: &AdviceRequest) -> anyhow::Result<String>;
}

/// Delivers a message to a user.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_id: UserId, text: &str) -> anyhow::Result<()>;
}

/// Fixed advice per urgency. Also the fallback when a generator fails.
pub fn canned_advice(urgency: Urgency) -> &'static str {
    match urgency {
        Urgency::Urgent => {
            "Your body is under-recovered and strain is high. Stop here for today: \
             hydrate, eat, and get to bed early."
        }
        Urgency::Medium => {
            "Strain is climbing faster than your recovery supports. \
             Take a break and keep the rest of the day light."
        }
        Urgency::Gentle => {
            "You're well recovered, but today's load is already high. \
             A short pause and some water will help."
        }
    }
}

/// `AdviceGenerator` that always answers with the canned text.
#[derive(Debug, Clone, Default)]
pub struct StaticAdvisor;

#[async_trait]
impl AdviceGenerator for StaticAdvisor {
    async fn advice(&self, request: &AdviceRequest) -> anyhow::Result<String> {
        Ok(canned_advice(request.urgency).to_string())
    }
}

/// Logs messages instead of sending them (no bot token configured).
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, user_id: UserId, text: &str) -> anyhow::Result<()> {
        tracing::info!(user_id, text, "Notification (delivery disabled)");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram Bot API delivery. The user id doubles as the private chat id.
#[derive(Clone)]
pub struct TelegramNotifier {
    http: reqwest::Client,
    bot_token: String,
    api_base: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            bot_token: bot_token.into(),
            api_base: TELEGRAM_API_BASE.to_string(),
        }
    }

    /// Point at a different API host (mock servers in tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}{}/{}", self.api_base, self.bot_token, method)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, user_id: UserId, text: &str) -> anyhow::Result<()> {
        let params = serde_json::json!({
            "chat_id": user_id,
            "text": text,
        });

        let response = self
            .http
            .post(self.api_url("sendMessage"))
            .json(&params)
            .timeout(SEND_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Telegram HTTP {}: {}", status, body);
        }

        let body: TelegramResponse = response.json().await?;
        if !body.ok {
            anyhow::bail!(
                "Telegram API error: {}",
                body.description.unwrap_or_default()
            );
        }

        tracing::debug!(user_id, "Telegram message sent");
        Ok(())
    }
}
