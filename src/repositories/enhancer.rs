use crate::models::enhance::EnhancerResponse;

use anyhow::bail;
use async_trait::async_trait;

#[async_trait]
pub trait Enhancer: Send + Sync + 'static {
    /// Returns the URL of the enhanced copy of `source`.
    async fn enhance(&self, source: &str) -> Result<String, anyhow::Error>;
}

pub struct ReminiApi {
    url: String,
    client: reqwest::Client,
}

impl ReminiApi {
    pub fn new(url: String, client: reqwest::Client) -> Self {
        Self { url, client }
    }
}

#[async_trait]
impl Enhancer for ReminiApi {
    async fn enhance(&self, source: &str) -> Result<String, anyhow::Error> {
        let response = self
            .client
            .get(&self.url)
            .query(&[("url", source)])
            .send()
            .await?
            .text()
            .await?;

        parse_enhancer_response(&response)
    }
}

fn parse_enhancer_response(body: &str) -> Result<String, anyhow::Error> {
    let response: EnhancerResponse = serde_json::from_str(body)?;
    match response.result {
        Some(result) if !result.trim().is_empty() => Ok(result),
        _ => bail!("Enhancer: Bad response format."),
    }
}
