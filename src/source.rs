use reqwest::{Client, header};
use tracing::debug;

use crate::error::FetchError;

pub const DEFAULT_BASE_URL: &str = "https://www.cinema.co.il";

/// Program category pages still rendered in the older block layout.
pub const DEFAULT_CATEGORY_URLS: [&str; 4] = [
    "https://www.cinema.co.il/%D7%97%D7%95%D7%A4%D7%A9%D7%99-%D7%9C%D7%9E%D7%A0%D7%95%D7%99%D7%99%D7%9D/",
    "https://www.cinema.co.il/%d7%98%d7%a8%d7%95%d7%9d-%d7%91%d7%9b%d7%95%d7%a8%d7%94/",
    "https://www.cinema.co.il/%d7%94%d7%a7%d7%a8%d7%a0%d7%95%d7%aa-%d7%a7%d7%91%d7%95%d7%a2%d7%95%d7%aa-2/",
    "https://www.cinema.co.il/%d7%a1%d7%a8%d7%98-%d7%94%d7%a8%d7%a6%d7%90%d7%94/",
];

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/143.0.0.0 Safari/537.36";

/// Raw listing page for one date.
#[derive(Debug, Clone)]
pub struct Page {
    /// Final URL of the response, used as a date fallback by the extractor.
    pub url: String,
    pub body: String,
}

/// Where per-date schedule pages come from.
#[async_trait::async_trait]
pub trait SchedulePages: Send + Sync {
    /// Fetch the listing for `date` (`YYYY-MM-DD`).
    async fn fetch_page(&self, date: &str) -> Result<Page, FetchError>;

    /// Fetch a category page by its full URL.
    async fn fetch_category_page(&self, url: &str) -> Result<Page, FetchError>;
}

/// The cinema.co.il "shown" listing: `GET <base>/shown/?date=YYYY-MM-DD`.
pub struct CinemaSite {
    client: Client,
    base_url: String,
}

impl CinemaSite {
    pub fn new(base_url: impl Into<String>) -> Result<Self, FetchError> {
        // Cookie store so whatever the site sets on the first page is replayed.
        let client = Client::builder().cookie_store(true).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    pub fn listing_url(&self) -> String {
        format!("{}/shown/", self.base_url)
    }
}

impl CinemaSite {
    async fn fetch(&self, request: reqwest::RequestBuilder) -> Result<Page, FetchError> {
        let resp = request.header(header::USER_AGENT, USER_AGENT).send().await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }

        let url = resp.url().to_string();
        let body = resp.text().await?;
        debug!(%url, bytes = body.len(), "fetched page");
        Ok(Page { url, body })
    }
}

#[async_trait::async_trait]
impl SchedulePages for CinemaSite {
    async fn fetch_page(&self, date: &str) -> Result<Page, FetchError> {
        let request = self.client.get(self.listing_url()).query(&[("date", date)]);
        self.fetch(request).await
    }

    async fn fetch_category_page(&self, url: &str) -> Result<Page, FetchError> {
        self.fetch(self.client.get(url)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_url_ignores_trailing_slash() {
        let site = CinemaSite::with_client(Client::new(), "https://www.cinema.co.il/");
        assert_eq!(site.listing_url(), "https://www.cinema.co.il/shown/");
    }
}
