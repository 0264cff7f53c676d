use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use rand::Rng;
use tracing::debug;

use crate::error::FetchError;
use crate::record::{source_url, FoodId};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Error pages from the site come back as HTTP 200 PHP dumps, much shorter
/// than any real food page.
const MIN_BODY_LEN: usize = 1000;

/// Page retrieval for one food id. The pipeline is generic over this so
/// tests can drive it with a scripted fetcher.
pub trait Fetcher {
    fn fetch(&mut self, id: FoodId) -> impl Future<Output = Result<String, FetchError>>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
    delay_min: f64,
    delay_max: f64,
}

impl HttpFetcher {
    pub fn new(delay_min: f64, delay_max: f64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            delay_min,
            delay_max,
        })
    }

    async fn fetch_inner(&self, id: FoodId) -> Result<String, FetchError> {
        let url = source_url(id);
        debug!("Fetching {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(classify_transport)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound);
        }
        if !response.status().is_success() {
            return Err(FetchError::Network(format!("HTTP {}", response.status())));
        }

        let body = response.text().await.map_err(classify_transport)?;
        check_rendered(&body)?;
        Ok(body)
    }

    /// Uniformly sampled politeness pause. Runs whether or not the fetch
    /// succeeded, bounding the request rate toward the site.
    async fn pause(&self) {
        let secs = rand::rng().random_range(self.delay_min..=self.delay_max);
        tokio::time::sleep(Duration::from_secs_f64(secs)).await;
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&mut self, id: FoodId) -> Result<String, FetchError> {
        let result = self.fetch_inner(id).await;
        self.pause().await;
        result
    }
}

fn classify_transport(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout
    } else {
        FetchError::Network(err.to_string())
    }
}

/// The site computes nutrient values in the page itself; a body carrying PHP
/// error markers or almost no content never finished rendering them.
fn check_rendered(body: &str) -> Result<(), FetchError> {
    if body.contains("Fatal error") || body.contains("Uncaught") {
        return Err(FetchError::Render("php error page".to_string()));
    }
    if body.len() < MIN_BODY_LEN {
        return Err(FetchError::Render(format!(
            "body too short ({} bytes)",
            body.len()
        )));
    }
    Ok(())
}
