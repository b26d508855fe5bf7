use log::debug;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use url::Url;

use crate::auth::Credentials;
use crate::error::{ExporterError, Result};

pub const DEFAULT_BASE_URL: &str = "https://api.bitbucket.org/2.0";

/// One page of a Bitbucket collection response.
///
/// `next` holds the absolute URL of the following page and is absent on the last one.
#[derive(Debug, Deserialize)]
pub struct Page<T> {
    pub values: Vec<T>,
    #[serde(default)]
    pub next: Option<String>,
}

pub struct BitbucketClient {
    client: Client,
    api_url: Url,
    credentials: Credentials,
}

impl BitbucketClient {
    pub fn new(base_url: &str, credentials: Credentials, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("bitbucket-pipelines-exporter/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| ExporterError::Config(format!("Failed to create HTTP client: {e}")))?;

        let api_url = Url::parse(base_url)
            .map_err(|e| ExporterError::Config(format!("Invalid base URL: {e}")))?;

        if api_url.cannot_be_a_base() {
            return Err(ExporterError::Config(format!(
                "Base URL cannot carry a path: {base_url}"
            )));
        }

        Ok(Self {
            client,
            api_url,
            credentials,
        })
    }

    /// Appends percent-encoded path segments to the API base URL.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                ExporterError::Config(format!("Base URL cannot carry a path: {}", self.api_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn auth_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request.basic_auth(
            self.credentials.username(),
            Some(self.credentials.app_password()),
        )
    }

    /// GET `url` and deserialize the JSON body.
    ///
    /// Non-2xx statuses become [`ExporterError::Api`], bodies that are not JSON become
    /// [`ExporterError::Decode`] and JSON of the wrong shape becomes [`ExporterError::Schema`].
    pub(super) async fn get_json<T>(&self, url: Url) -> Result<T>
    where
        T: DeserializeOwned,
    {
        debug!("Requesting {url}");

        let response = self
            .auth_request(self.client.get(url).header(ACCEPT, "application/json"))
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(ExporterError::Api {
                status: status.as_u16(),
                message: error_text,
            });
        }

        let body = response.text().await?;
        let value: serde_json::Value =
            serde_json::from_str(&body).map_err(ExporterError::Decode)?;

        serde_json::from_value(value).map_err(ExporterError::Schema)
    }

    /// Fetch a single page of a collection endpoint.
    pub async fn fetch_page<T>(&self, url: Url) -> Result<Page<T>>
    where
        T: DeserializeOwned,
    {
        self.get_json(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> BitbucketClient {
        BitbucketClient::new(
            base_url,
            Credentials::new("user", "pass"),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let url = client(DEFAULT_BASE_URL)
            .endpoint(&["repositories", "acme"])
            .unwrap();
        assert_eq!(url.as_str(), "https://api.bitbucket.org/2.0/repositories/acme");
    }

    #[test]
    fn test_endpoint_with_trailing_slash_base() {
        let url = client("https://api.bitbucket.org/2.0/")
            .endpoint(&["repositories", "acme", "svc-a", "pipelines"])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.bitbucket.org/2.0/repositories/acme/svc-a/pipelines"
        );
    }

    #[test]
    fn test_endpoint_encodes_segments() {
        let url = client("http://localhost:1234")
            .endpoint(&["repositories", "my workspace"])
            .unwrap();
        assert_eq!(url.path(), "/repositories/my%20workspace");
    }

    #[test]
    fn test_invalid_base_url() {
        let result = BitbucketClient::new(
            "not a url",
            Credentials::new("user", "pass"),
            Duration::from_secs(5),
        );
        assert!(matches!(result, Err(ExporterError::Config(_))));
    }

    #[test]
    fn test_cannot_be_a_base_url() {
        let result = BitbucketClient::new(
            "mailto:ops@example.com",
            Credentials::new("user", "pass"),
            Duration::from_secs(5),
        );
        assert!(matches!(result, Err(ExporterError::Config(_))));
    }

    #[tokio::test]
    async fn test_fetch_page_sends_basic_auth() {
        let mut server = mockito::Server::new_async().await;
        // base64("user:pass")
        let mock = server
            .mock("GET", "/repositories/acme")
            .match_header("authorization", "Basic dXNlcjpwYXNz")
            .with_status(200)
            .with_body(r#"{"values": [{"slug": "svc-a"}]}"#)
            .create_async()
            .await;

        let client = client(&server.url());
        let url = client.endpoint(&["repositories", "acme"]).unwrap();
        let page: Page<serde_json::Value> = client.fetch_page(url).await.unwrap();

        assert_eq!(page.values.len(), 1);
        assert!(page.next.is_none());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_page_error_status() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repositories/acme")
            .with_status(401)
            .with_body("Unauthorized")
            .create_async()
            .await;

        let client = client(&server.url());
        let url = client.endpoint(&["repositories", "acme"]).unwrap();
        let result = client.fetch_page::<serde_json::Value>(url).await;

        match result {
            Err(ExporterError::Api { status, message }) => {
                assert_eq!(status, 401);
                assert_eq!(message, "Unauthorized");
            }
            other => panic!("expected API error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_page_malformed_body() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repositories/acme")
            .with_status(200)
            .with_body("<html>oops</html>")
            .create_async()
            .await;

        let client = client(&server.url());
        let url = client.endpoint(&["repositories", "acme"]).unwrap();
        let result = client.fetch_page::<serde_json::Value>(url).await;

        assert!(matches!(result, Err(ExporterError::Decode(_))));
    }

    #[tokio::test]
    async fn test_fetch_page_unexpected_shape() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repositories/acme")
            .with_status(200)
            .with_body(r#"{"items": []}"#)
            .create_async()
            .await;

        let client = client(&server.url());
        let url = client.endpoint(&["repositories", "acme"]).unwrap();
        let result = client.fetch_page::<serde_json::Value>(url).await;

        assert!(matches!(result, Err(ExporterError::Schema(_))));
    }
}
