//! Operator notifications
//!
//! Fire-and-forget text messages to one configured chat. Delivery failures are
//! logged and dropped.

use reqwest::Client;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

use crate::config::NotifyConfig;
use crate::domain::{Position, PositionSide};

pub const DEFAULT_TELEGRAM_API_URL: &str = "https://api.telegram.org";

/// Sink for operator-facing messages; `notify` must never block the caller
pub trait Notifier: Send + Sync {
    fn notify(&self, text: String);
}

/// Build the configured notifier; log-only when Telegram is not set up
pub fn build_notifier(config: &NotifyConfig) -> Arc<dyn Notifier> {
    match (&config.telegram_token, &config.chat_id) {
        (Some(token), Some(chat_id)) => {
            info!("Telegram notifications enabled");
            let api_url = config
                .api_url
                .clone()
                .unwrap_or_else(|| DEFAULT_TELEGRAM_API_URL.to_string());
            Arc::new(TelegramNotifier::new(&api_url, token, chat_id))
        }
        _ => Arc::new(LogNotifier),
    }
}

// ==================== Message formatting ====================

pub fn format_entry(symbol: &str, side: PositionSide, quantity: f64, price: f64, sl: f64, tp: f64) -> String {
    let emoji = match side {
        PositionSide::Long => "🟢",
        PositionSide::Short => "🔴",
    };
    format!(
        "{} OPEN {} {}\nQty: {:.6} @ {:.4}\nSL: {:.4} | TP: {:.4}",
        emoji, side, symbol, quantity, price, sl, tp
    )
}

pub fn format_close(position: &Position, quantity: f64, price: f64, pnl: f64, partial: bool) -> String {
    let pnl_emoji = if pnl >= 0.0 { "📈" } else { "📉" };
    let action = if partial { "PARTIAL CLOSE" } else { "CLOSE" };
    format!(
        "{} {} {} {}\nQty: {:.6} @ {:.4} (entry {:.4})\nPnL: {:.4}",
        pnl_emoji, action, position.side, position.symbol, quantity, price, position.entry_price, pnl
    )
}

// ==================== Telegram ====================

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
}

/// Telegram Bot API notifier
#[derive(Clone)]
pub struct TelegramNotifier {
    client: Client,
    endpoint: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(api_url: &str, token: &str, chat_id: &str) -> Self {
        Self {
            client: Client::new(),
            endpoint: format!("{}/bot{}/sendMessage", api_url.trim_end_matches('/'), token),
            chat_id: chat_id.to_string(),
        }
    }

    /// Send a message and wait for the result
    pub async fn send_message(&self, text: &str) -> Result<(), String> {
        let body = SendMessage {
            chat_id: &self.chat_id,
            text,
        };

        match self.client.post(&self.endpoint).json(&body).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!("Telegram notification sent");
                Ok(())
            }
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                error!("Telegram notification failed: {} - {}", status, body);
                Err(format!("HTTP {}: {}", status, body))
            }
            Err(e) => {
                error!("Telegram request failed: {}", e);
                Err(e.to_string())
            }
        }
    }
}

impl Notifier for TelegramNotifier {
    fn notify(&self, text: String) {
        let this = self.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    let _ = this.send_message(&text).await;
                });
            }
            Err(_) => debug!("No runtime; dropping notification: {}", text),
        }
    }
}

// ==================== Log-only ====================

/// Writes notifications to the log only
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, text: String) {
        info!(target: "scalper::notify", "{}", text.replace('\n', " | "));
    }
}

/// Keeps every message in memory (tests, dry runs)
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages
            .lock()
            .map(|m| m.clone())
            .unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, text: String) {
        if let Ok(mut messages) = self.messages.lock() {
            messages.push(text);
        }
    }
}
