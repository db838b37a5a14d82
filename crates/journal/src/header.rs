//! Day-file header rendering and the optional enrichment line.

use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use chrono::NaiveDate;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

use crate::DATE_FORMAT;

/// Supplies one extra line for the header of a new day file.
///
/// Errors are never fatal: the writer logs them and writes the header
/// without the line.
#[async_trait]
pub trait HeaderEnricher: Send + Sync {
    async fn enrichment_line(&self) -> Result<String>;
}

/// `# YYYY-MM-DD`, the optional enrichment line, then a blank line.
pub fn render_header(date: NaiveDate, enrichment: Option<&str>) -> String {
    let mut lines = vec![format!("# {}", date.format(DATE_FORMAT))];
    if let Some(extra) = enrichment.map(str::trim).filter(|line| !line.is_empty()) {
        lines.push(extra.to_string());
    }
    format!("{}\n\n", lines.join("\n"))
}

/// Current conditions from wttr.in, one line.
pub struct WeatherEnricher {
    client: reqwest::Client,
    url: String,
}

impl WeatherEnricher {
    pub fn new(location: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: weather_url(location),
        })
    }
}

fn weather_url(location: &str) -> String {
    let location = utf8_percent_encode(location.trim(), NON_ALPHANUMERIC);
    format!("https://wttr.in/{location}?format=3")
}

#[async_trait]
impl HeaderEnricher for WeatherEnricher {
    async fn enrichment_line(&self) -> Result<String> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let body = body.trim();
        if body.is_empty() {
            bail!("weather service returned an empty body");
        }
        Ok(format!("Weather: {body}"))
    }
}
