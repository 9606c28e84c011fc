use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::env;

use crate::config::DiscordConfig;
use crate::models::OfferStatus;

const DISCORD_API_URL: &str = "https://discord.com/api/v10";

pub const COLOR_OFFERED: u32 = 0x43B581;
pub const COLOR_PENDING: u32 = 0xFFAA00;
pub const COLOR_REJECTED: u32 = 0xF04747;
pub const COLOR_DEFAULT: u32 = 0x3498DB;

/// Embed accent color for an offer status.
pub fn status_color(status: OfferStatus) -> u32 {
    match status {
        OfferStatus::Offered => COLOR_OFFERED,
        OfferStatus::Pending => COLOR_PENDING,
        OfferStatus::Rejected => COLOR_REJECTED,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Embed {
    pub title: String,
    pub url: String,
    pub color: u32,
    pub fields: Vec<EmbedField>,
    pub description: String,
    pub footer: EmbedFooter,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Debug, Serialize)]
struct MessagePayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    embeds: Vec<Embed>,
}

/// Delivery seam. Best-effort from the pipeline's perspective: the driver
/// logs and swallows whatever this returns.
pub trait Notifier {
    fn send(&self, content: Option<&str>, embed: Option<Embed>) -> Result<()>;
}

pub struct DiscordSender {
    token: String,
    channel_id: String,
    client: reqwest::blocking::Client,
}

impl DiscordSender {
    pub fn new(config: &DiscordConfig) -> Result<Self> {
        let token = match &config.token {
            Some(token) => token.clone(),
            None => env::var("DISCORD_TOKEN").context(
                "DISCORD_TOKEN environment variable not set and no discord.token in config",
            )?,
        };
        let client = reqwest::blocking::Client::new();
        Ok(Self {
            token,
            channel_id: config.channel_id.clone(),
            client,
        })
    }
}

impl Notifier for DiscordSender {
    fn send(&self, content: Option<&str>, embed: Option<Embed>) -> Result<()> {
        let payload = MessagePayload {
            content,
            embeds: embed.into_iter().collect(),
        };

        let url = format!("{}/channels/{}/messages", DISCORD_API_URL, self.channel_id);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bot {}", self.token))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .context("Failed to send Discord message")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().unwrap_or_default();
            return Err(anyhow!(
                "Discord message failed with status {}: {}",
                status,
                error_text
            ));
        }

        Ok(())
    }
}
