use log::warn;
use serde::de::DeserializeOwned;
use url::Url;

use super::core::BitbucketClient;

impl BitbucketClient {
    /// Follow `next` links from `start` and collect every item.
    ///
    /// Any failing page ends pagination: the error is logged and the items gathered
    /// from earlier pages are returned.
    pub async fn fetch_all_pages<T>(&self, start: Url) -> Vec<T>
    where
        T: DeserializeOwned,
    {
        let mut items = Vec::new();
        let mut next_url = Some(start);

        while let Some(url) = next_url.take() {
            let page = match self.fetch_page::<T>(url.clone()).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(
                        "Stopping pagination at {url} with {} items collected: {e}",
                        items.len()
                    );
                    break;
                }
            };

            items.extend(page.values);

            next_url = match page.next.as_deref().map(Url::parse) {
                None => None,
                Some(Ok(next)) => Some(next),
                Some(Err(e)) => {
                    warn!(
                        "Stopping pagination at {url}: invalid next page URL ({e})"
                    );
                    None
                }
            };
        }

        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Credentials;
    use mockito::Matcher;
    use serde_json::json;
    use std::time::Duration;

    fn client(base_url: &str) -> BitbucketClient {
        BitbucketClient::new(
            base_url,
            Credentials::new("user", "pass"),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_follows_next_until_absent() {
        let mut server = mockito::Server::new_async().await;
        let page_2 = format!("{}/repositories/acme?page=2", server.url());
        let page_3 = format!("{}/repositories/acme?page=3", server.url());

        let first = server
            .mock("GET", "/repositories/acme")
            .match_query(Matcher::Regex("^$".into()))
            .with_status(200)
            .with_body(json!({ "values": [1, 2], "next": page_2 }).to_string())
            .expect(1)
            .create_async()
            .await;
        let second = server
            .mock("GET", "/repositories/acme")
            .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
            .with_status(200)
            .with_body(json!({ "values": [3], "next": page_3 }).to_string())
            .expect(1)
            .create_async()
            .await;
        let third = server
            .mock("GET", "/repositories/acme")
            .match_query(Matcher::UrlEncoded("page".into(), "3".into()))
            .with_status(200)
            .with_body(json!({ "values": [4, 5, 6] }).to_string())
            .expect(1)
            .create_async()
            .await;

        let client = client(&server.url());
        let start = client.endpoint(&["repositories", "acme"]).unwrap();
        let items: Vec<u32> = client.fetch_all_pages(start).await;

        assert_eq!(items, vec![1, 2, 3, 4, 5, 6]);
        first.assert_async().await;
        second.assert_async().await;
        third.assert_async().await;
    }

    #[tokio::test]
    async fn test_returns_partial_results_on_error_status() {
        let mut server = mockito::Server::new_async().await;
        let page_2 = format!("{}/repositories/acme?page=2", server.url());

        server
            .mock("GET", "/repositories/acme")
            .match_query(Matcher::Regex("^$".into()))
            .with_status(200)
            .with_body(json!({ "values": [1, 2], "next": page_2 }).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/repositories/acme")
            .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
            .with_status(500)
            .with_body("Internal Server Error")
            .create_async()
            .await;

        let client = client(&server.url());
        let start = client.endpoint(&["repositories", "acme"]).unwrap();
        let items: Vec<u32> = client.fetch_all_pages(start).await;

        assert_eq!(items, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_returns_partial_results_on_malformed_page() {
        let mut server = mockito::Server::new_async().await;
        let page_2 = format!("{}/repositories/acme?page=2", server.url());

        server
            .mock("GET", "/repositories/acme")
            .match_query(Matcher::Regex("^$".into()))
            .with_status(200)
            .with_body(json!({ "values": [7], "next": page_2 }).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/repositories/acme")
            .match_query(Matcher::UrlEncoded("page".into(), "2".into()))
            .with_status(200)
            .with_body(r#"{"values": [8, "#)
            .create_async()
            .await;

        let client = client(&server.url());
        let start = client.endpoint(&["repositories", "acme"]).unwrap();
        let items: Vec<u32> = client.fetch_all_pages(start).await;

        assert_eq!(items, vec![7]);
    }

    #[tokio::test]
    async fn test_first_page_failure_returns_empty() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repositories/acme")
            .with_status(403)
            .create_async()
            .await;

        let client = client(&server.url());
        let start = client.endpoint(&["repositories", "acme"]).unwrap();
        let items: Vec<u32> = client.fetch_all_pages(start).await;

        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_next_url_stops_pagination() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repositories/acme")
            .with_status(200)
            .with_body(json!({ "values": [1], "next": "not a url" }).to_string())
            .expect(1)
            .create_async()
            .await;

        let client = client(&server.url());
        let start = client.endpoint(&["repositories", "acme"]).unwrap();
        let items: Vec<u32> = client.fetch_all_pages(start).await;

        assert_eq!(items, vec![1]);
    }
}
