//! Authentication/status backend.
//!
//! The relay exposes a small HTTP API next to the control channel that
//! serves operator announcements and the per-token kill switch.

use futures_util::future::{BoxFuture, FutureExt};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ClientError, Result};

pub trait StatusBackend: Send + Sync {
    /// Current operator broadcast, empty when there is none
    fn announcement(&self) -> BoxFuture<'_, Result<String>>;

    /// Whether the server has switched this token to disconnected
    fn connection_status<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<bool>>;

    fn set_disconnected<'a>(
        &'a self,
        token: &'a str,
        disconnected: bool,
    ) -> BoxFuture<'a, Result<()>>;
}

#[derive(Debug, Deserialize)]
struct AnnouncementBody {
    #[serde(default)]
    announcement: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ConnectionStatusBody {
    disconnected: bool,
}

/// Backend reached over HTTPS with `reqwest`
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            client,
            base_url: Url::parse(base_url)?,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    async fn fetch_announcement(&self) -> Result<String> {
        let resp = self
            .client
            .get(self.endpoint("/api/announcement")?)
            .send()
            .await?;
        let body: AnnouncementBody = check_status(resp).await?.json().await?;
        Ok(body.announcement)
    }

    async fn fetch_status(&self, token: &str) -> Result<bool> {
        let resp = self
            .client
            .get(self.endpoint("/api/connection-status")?)
            .bearer_auth(token)
            .send()
            .await?;
        let body: ConnectionStatusBody = check_status(resp).await?.json().await?;
        Ok(body.disconnected)
    }

    async fn put_status(&self, token: &str, disconnected: bool) -> Result<()> {
        let resp = self
            .client
            .put(self.endpoint("/api/connection-status")?)
            .bearer_auth(token)
            .json(&ConnectionStatusBody { disconnected })
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }
}

impl StatusBackend for HttpBackend {
    fn announcement(&self) -> BoxFuture<'_, Result<String>> {
        self.fetch_announcement().boxed()
    }

    fn connection_status<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<bool>> {
        self.fetch_status(token).boxed()
    }

    fn set_disconnected<'a>(
        &'a self,
        token: &'a str,
        disconnected: bool,
    ) -> BoxFuture<'a, Result<()>> {
        self.put_status(token, disconnected).boxed()
    }
}

async fn check_status(resp: Response) -> Result<Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }

    let status = resp.status();
    let body: serde_json::Value = resp.json().await.unwrap_or_default();
    let msg = body["error"]["message"].as_str().unwrap_or("Unknown error");
    Err(ClientError::Backend(format!("{} - {}", status, msg)))
}
