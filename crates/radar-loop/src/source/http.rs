// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! HTTP implementation of [`TileSource`] on top of `reqwest`.

use std::time::Duration;

use log::debug;

use super::{parse_metadata, TileEntry, TileSource};
use crate::category::{Category, SPLASH_BASE_URL};
use crate::error::FetchError;

/// User-Agent sent with every request.
pub const DEFAULT_USER_AGENT: &str = "Home Assistant (Weer Plaza)";

/// Configuration for the HTTP tile source.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Base URL of the splash endpoints.
    pub base_url: String,
    /// Access token appended to metadata requests.
    pub access_token: String,
    /// User-Agent header value.
    pub user_agent: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: SPLASH_BASE_URL.to_string(),
            access_token: "weerplaza".to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Fetches metadata and tiles from the splash API.
#[derive(Debug, Clone)]
pub struct HttpTileSource {
    client: reqwest::Client,
    config: HttpConfig,
}

impl HttpTileSource {
    pub fn new(config: HttpConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()?;
        Ok(Self { client, config })
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status().as_u16()));
        }

        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}

impl TileSource for HttpTileSource {
    async fn fetch_metadata(&self, category: Category) -> Result<Vec<TileEntry>, FetchError> {
        let url = category.endpoint(&self.config.base_url, &self.config.access_token);
        debug!("Fetching {} metadata", category);
        let body = self.get_bytes(&url).await?;
        parse_metadata(&body)
    }

    async fn fetch_tile(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        debug!("Downloading tile {}", url);
        self.get_bytes(url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answer a single request with `response` and return the server's base URL.
    async fn serve_once(response: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        });
        format!("http://{addr}")
    }

    fn http_response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    fn source(base_url: String, timeout: Duration) -> HttpTileSource {
        HttpTileSource::new(HttpConfig {
            base_url,
            timeout,
            ..HttpConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_non_success_status_maps_to_status_error() {
        let base = serve_once(http_response("404 Not Found", "")).await;
        let source = source(base.clone(), Duration::from_secs(5));

        let err = source
            .fetch_tile(&format!("{base}/tile.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Status(404)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_metadata_is_fetched_and_parsed() {
        let body = r#"{"data": [{"dateTime": "2025-06-01T12:05:00Z", "layerNameHD": "https://t/a.png"}]}"#;
        let base = serve_once(http_response("200 OK", body)).await;
        let source = source(base, Duration::from_secs(5));

        let entries = source.fetch_metadata(Category::RainRadar).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].primary, "https://t/a.png");
    }

    #[tokio::test]
    async fn test_slow_server_maps_to_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });
        let source = source(format!("http://{addr}"), Duration::from_millis(200));

        let err = source
            .fetch_tile(&format!("http://{addr}/tile.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Timeout), "got {err:?}");
    }

    #[tokio::test]
    async fn test_refused_connection_maps_to_transport_error() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let source = source(format!("http://{addr}"), Duration::from_secs(5));

        let err = source
            .fetch_tile(&format!("http://{addr}/tile.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)), "got {err:?}");
    }
}
