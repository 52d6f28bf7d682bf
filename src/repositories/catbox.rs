use anyhow::bail;
use async_trait::async_trait;
use reqwest::multipart::Form;

/// Anonymous file host that re-hosts a remote URL.
#[async_trait]
pub trait FileHost: Send + Sync + 'static {
    async fn upload_url(&self, source: &str, handle: Option<&str>)
        -> Result<String, anyhow::Error>;
}

pub struct CatboxApi {
    url: String,
    client: reqwest::Client,
}

impl CatboxApi {
    pub fn new(url: String, client: reqwest::Client) -> Self {
        Self { url, client }
    }
}

#[async_trait]
impl FileHost for CatboxApi {
    async fn upload_url(
        &self,
        source: &str,
        handle: Option<&str>,
    ) -> Result<String, anyhow::Error> {
        let mut form = Form::new()
            .text("reqtype", "urlupload")
            .text("url", source.to_string());
        if let Some(handle) = handle {
            form = form.text("userhash", handle.to_string());
        }

        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;

        parse_upload_response(&response)
    }
}

fn parse_upload_response(body: &str) -> Result<String, anyhow::Error> {
    let hosted = body.trim();
    match url::Url::parse(hosted) {
        Ok(url) if url.scheme() == "https" || url.scheme() == "http" => Ok(hosted.to_string()),
        _ => bail!("Catbox: Unexpected upload response: {}", hosted),
    }
}
