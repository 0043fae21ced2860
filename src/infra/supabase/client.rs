use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use air_quality_etl::config::StoreConfig;
use air_quality_etl::store::{StoreRecord, TableClient};

/// Sort key for paged reads. `limit`/`offset` pages are only stable under an
/// explicit order, and the table has no key narrower than the full row.
const PAGE_ORDER: &str = "city.asc,time.asc,hour.asc,pm10.asc,pm2_5.asc,carbon_monoxide.asc,\
nitrogen_dioxide.asc,sulphur_dioxide.asc,ozone.asc,uv_index.asc,aqi_category.asc,\
severity_score.asc,risk_flag.asc";

/// PostgREST client for a Supabase project.
///
/// Every request carries the project key both as `apikey` and as a bearer
/// token, the way Supabase expects service and anon keys to be sent.
pub struct SupabaseClient {
    http: reqwest::Client,
    base_url: String,
    page_size: usize,
}

impl SupabaseClient {
    pub fn new(config: &StoreConfig) -> Result<Self> {
        anyhow::ensure!(
            config.url.starts_with("http://") || config.url.starts_with("https://"),
            "SUPABASE_URL must be an http(s) URL"
        );

        let mut headers = HeaderMap::new();
        headers.insert(
            "apikey",
            HeaderValue::from_str(&config.key).context("invalid SUPABASE_KEY")?,
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", config.key))
                .context("invalid SUPABASE_KEY")?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .default_headers(headers)
            .build()
            .context("failed to build Supabase HTTP client")?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            page_size: config.page_size.max(1),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn page_query(&self, offset: usize) -> [(&'static str, String); 4] {
        [
            ("select", "*".to_string()),
            ("order", PAGE_ORDER.to_string()),
            ("limit", self.page_size.to_string()),
            ("offset", offset.to_string()),
        ]
    }
}

#[async_trait]
impl TableClient for SupabaseClient {
    async fn select_all(&self, table: &str) -> Result<Vec<Value>> {
        let url = self.table_url(table);
        let mut rows = Vec::new();

        loop {
            let response = self
                .http
                .get(&url)
                .query(&self.page_query(rows.len()))
                .send()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to send select request: {}", e))?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(anyhow::anyhow!("Select returned status {}: {}", status, body));
            }

            let page: Vec<Value> = response
                .json()
                .await
                .map_err(|e| anyhow::anyhow!("Failed to parse select response: {}", e))?;

            let page_len = page.len();
            rows.extend(page);
            debug!(table, page_len, total = rows.len(), "Fetched page");

            // The server may cap a page below `limit`, so only an empty page ends the table.
            if page_len == 0 {
                break;
            }
        }

        Ok(rows)
    }

    async fn insert(&self, table: &str, records: &[StoreRecord]) -> Result<()> {
        let response = self
            .http
            .post(self.table_url(table))
            .header("Prefer", "return=minimal")
            .json(records)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to send insert request: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Insert returned status {}: {}", status, body));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn config(url: &str) -> StoreConfig {
        StoreConfig {
            url: url.to_string(),
            key: "anon-key".to_string(),
            table: "air_quality_data".to_string(),
            page_size: 500,
        }
    }

    #[test]
    fn test_table_url() {
        let client = SupabaseClient::new(&config("https://abc.supabase.co/")).unwrap();
        assert_eq!(
            client.table_url("air_quality_data"),
            "https://abc.supabase.co/rest/v1/air_quality_data"
        );
    }

    #[test]
    fn test_page_query() {
        let client = SupabaseClient::new(&config("https://abc.supabase.co")).unwrap();
        let query = client.page_query(1000);
        assert_eq!(query[1].0, "order");
        assert!(query[1].1.starts_with("city.asc,time.asc,"));
        assert_eq!(query[2], ("limit", "500".to_string()));
        assert_eq!(query[3], ("offset", "1000".to_string()));
    }

    #[test]
    fn test_rejects_non_http_url() {
        assert!(SupabaseClient::new(&config("abc.supabase.co")).is_err());
    }

    /// Serves `total` rows over plain HTTP, never more than `cap` per response.
    /// Returns the base URL and the request lines seen.
    async fn capped_server(total: usize, cap: usize) -> (String, Arc<Mutex<Vec<String>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }
                let request = String::from_utf8_lossy(&buf);
                let line = request.lines().next().unwrap_or_default().to_string();

                let param = |name: &str| -> usize {
                    line.split(['?', '&', ' '])
                        .find_map(|kv| kv.strip_prefix(&format!("{name}=")))
                        .and_then(|v| v.parse().ok())
                        .unwrap_or(0)
                };
                let (limit, offset) = (param("limit"), param("offset"));
                log.lock().unwrap().push(line);

                let end = total.min(offset + limit.min(cap));
                let rows: Vec<Value> = (offset.min(end)..end)
                    .map(|i| json!({"city": format!("City {i}"), "time": "2024-05-01T00:00:00"}))
                    .collect();
                let body = serde_json::to_string(&rows).unwrap();
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{addr}"), seen)
    }

    #[tokio::test]
    async fn test_select_all_reads_past_server_row_cap() {
        let (url, seen) = capped_server(5, 2).await;
        let client = SupabaseClient::new(&StoreConfig {
            page_size: 3,
            ..config(&url)
        })
        .unwrap();

        let rows = client.select_all("air_quality_data").await.unwrap();

        assert_eq!(rows.len(), 5);
        let cities: Vec<_> = rows.iter().map(|r| r["city"].as_str().unwrap()).collect();
        assert_eq!(cities, ["City 0", "City 1", "City 2", "City 3", "City 4"]);

        let seen = seen.lock().unwrap();
        // 2 + 2 + 1 rows, then the empty page that ends the read
        assert_eq!(seen.len(), 4);
        assert!(seen.iter().all(|line| line.contains("order=")));
        assert!(seen[1].contains("offset=2"));
        assert!(seen[3].contains("offset=5"));
    }
}
