//! Web retrieval tools: SearxNG search and plain page fetch.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Tool, ToolOutput};
use crate::config::ToolsConfig;
use crate::error::{ToolError, ToolResult};

/// Parameters for a web search
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSearchParams {
    /// Search query.
    pub query: String,
    /// Restrict results to one publication year.
    #[serde(default)]
    pub filter_year: Option<i32>,
}

/// SearxNG JSON response
#[derive(Debug, Clone, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Clone, Deserialize)]
struct SearchResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
    #[serde(default, rename = "publishedDate")]
    published_date: Option<String>,
}

/// Web search backed by a SearxNG instance.
///
/// When a year-filtered search comes back empty the filter is dropped and
/// the search retried once, with the relaxation noted in the output.
pub struct WebSearchTool {
    client: Client,
    searxng_url: String,
}

impl WebSearchTool {
    /// Tool identifier the planner uses.
    pub const ID: &'static str = "web_search";

    /// Create the tool from configuration
    pub fn new(config: &ToolsConfig) -> ToolResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ToolError::Transient {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            searxng_url: config.searxng_url.trim_end_matches('/').to_string(),
        })
    }

    async fn search(&self, query: &str, filter_year: Option<i32>) -> ToolResult<Vec<SearchResult>> {
        let mut params = vec![
            ("q", query.to_string()),
            ("format", "json".to_string()),
            ("engines", "google".to_string()),
        ];
        if let Some(year) = filter_year {
            params.push(("time_range", format!("{}-{}", year, year)));
        }

        debug!(query = %query, filter_year = ?filter_year, "Searching");

        let response = self
            .client
            .get(format!("{}/search", self.searxng_url))
            .query(&params)
            .send()
            .await
            .map_err(|e| ToolError::Transient {
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::Transient {
                message: format!("search returned {}: {}", status, body),
            });
        }

        let parsed: SearchResponse = response.json().await.map_err(|e| ToolError::Transient {
            message: format!("unreadable search response: {}", e),
        })?;

        Ok(parsed.results)
    }
}

fn format_results(query: &str, results: &[SearchResult], filter_dropped: bool) -> String {
    let snippets: Vec<String> = results
        .iter()
        .enumerate()
        .map(|(idx, page)| {
            let date = page
                .published_date
                .as_deref()
                .map(|d| format!("\nDate published: {}", d))
                .unwrap_or_default();
            let snippet = if page.content.is_empty() {
                String::new()
            } else {
                format!("\n{}", page.content)
            };
            format!("{}. [{}]({}){}{}", idx + 1, page.title, page.url, date, snippet)
        })
        .collect();

    let mut out = format!(
        "A search for '{}' found {} results:\n\n## Web Results\n{}",
        query,
        snippets.len(),
        snippets.join("\n\n")
    );
    if filter_dropped {
        out = format!(
            "No results with the year filter; it was removed. Results may be from any year.\n\n{}",
            out
        );
    }
    out
}

#[async_trait]
impl Tool for WebSearchTool {
    fn id(&self) -> &str {
        Self::ID
    }

    async fn call(&self, payload: &serde_json::Value) -> ToolResult<ToolOutput> {
        let params: WebSearchParams =
            serde_json::from_value(payload.clone()).map_err(|e| ToolError::BadInput {
                message: format!("invalid web_search payload: {}", e),
            })?;

        if params.query.trim().is_empty() {
            return Err(ToolError::BadInput {
                message: "query must not be empty".to_string(),
            });
        }

        let results = self.search(&params.query, params.filter_year).await?;

        // Retry once without the year restriction before reporting nothing.
        if results.is_empty() && params.filter_year.is_some() {
            let relaxed = self.search(&params.query, None).await?;
            if relaxed.is_empty() {
                return Ok(ToolOutput {
                    content: format!(
                        "No results found for '{}', with or without the year filter. Try a more general query.",
                        params.query
                    ),
                    facts: vec![],
                });
            }
            return Ok(ToolOutput {
                content: format_results(&params.query, &relaxed, true),
                facts: vec![],
            });
        }

        if results.is_empty() {
            return Ok(ToolOutput {
                content: format!(
                    "No results found for '{}'. Try a more general query.",
                    params.query
                ),
                facts: vec![],
            });
        }

        Ok(ToolOutput {
            content: format_results(&params.query, &results, false),
            facts: vec![],
        })
    }
}

/// Parameters for a page fetch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageFetchParams {
    /// URL to retrieve.
    pub url: String,
}

/// Length cap on returned page text; keeps evidence prompt-sized.
const PAGE_CONTENT_LIMIT: usize = 16 * 1024;

/// Plain text/HTML page fetch.
///
/// Only textual content types are accepted; binary formats are out of
/// scope and surface as deterministic failures.
pub struct PageFetchTool {
    client: Client,
}

impl PageFetchTool {
    /// Tool identifier the planner uses.
    pub const ID: &'static str = "page_fetch";

    /// Create the tool from configuration
    pub fn new(config: &ToolsConfig) -> ToolResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| ToolError::Transient {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Tool for PageFetchTool {
    fn id(&self) -> &str {
        Self::ID
    }

    async fn call(&self, payload: &serde_json::Value) -> ToolResult<ToolOutput> {
        let params: PageFetchParams =
            serde_json::from_value(payload.clone()).map_err(|e| ToolError::BadInput {
                message: format!("invalid page_fetch payload: {}", e),
            })?;

        if !params.url.starts_with("http://") && !params.url.starts_with("https://") {
            return Err(ToolError::BadInput {
                message: format!("unsupported URL scheme: {}", params.url),
            });
        }

        debug!(url = %params.url, "Fetching page");

        let response = self
            .client
            .get(&params.url)
            .send()
            .await
            .map_err(|e| ToolError::Transient {
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.is_client_error() {
            return Err(ToolError::BadInput {
                message: format!("page returned {}", status),
            });
        }
        if !status.is_success() {
            return Err(ToolError::Transient {
                message: format!("page returned {}", status),
            });
        }

        let content_type = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !content_type.contains("text/") {
            return Err(ToolError::BadInput {
                message: format!("unsupported content type: {}", content_type),
            });
        }

        let body = response.text().await.map_err(|e| ToolError::Transient {
            message: e.to_string(),
        })?;

        let content = if body.chars().count() > PAGE_CONTENT_LIMIT {
            let truncated: String = body.chars().take(PAGE_CONTENT_LIMIT).collect();
            format!("{}\n\n[content truncated]", truncated)
        } else {
            body
        };

        Ok(ToolOutput {
            content,
            facts: vec![],
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ToolSet;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(searxng_url: &str) -> ToolsConfig {
        ToolsConfig {
            executor_url: "http://localhost:1".to_string(),
            searxng_url: searxng_url.to_string(),
            tool_set: ToolSet::Full,
            timeout_ms: 5000,
        }
    }

    fn search_body(count: usize) -> serde_json::Value {
        serde_json::json!({
            "results": (0..count).map(|i| serde_json::json!({
                "title": format!("Result {}", i),
                "url": format!("https://example.com/{}", i),
                "content": "snippet text",
                "publishedDate": "2019-07-20"
            })).collect::<Vec<_>>()
        })
    }

    #[tokio::test]
    async fn test_web_search_formats_snippets() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("format", "json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(search_body(2)))
            .mount(&server)
            .await;

        let tool = WebSearchTool::new(&test_config(&server.uri())).unwrap();
        let output = tool
            .call(&serde_json::json!({"query": "moon landing"}))
            .await
            .unwrap();

        assert!(output.content.contains("found 2 results"));
        assert!(output.content.contains("1. [Result 0](https://example.com/0)"));
        assert!(output.content.contains("Date published: 2019-07-20"));
    }

    #[tokio::test]
    async fn test_web_search_drops_year_filter_on_empty() {
        let server = MockServer::start().await;
        // Filtered search finds nothing.
        Mock::given(method("GET"))
            .and(path("/search"))
            .and(query_param("time_range", "1969-1969"))
            .respond_with(ResponseTemplate::new(200).set_body_json(search_body(0)))
            .expect(1)
            .mount(&server)
            .await;
        // Relaxed search succeeds.
        Mock::given(method("GET"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(search_body(1)))
            .expect(1)
            .mount(&server)
            .await;

        let tool = WebSearchTool::new(&test_config(&server.uri())).unwrap();
        let output = tool
            .call(&serde_json::json!({"query": "moon landing", "filter_year": 1969}))
            .await
            .unwrap();

        assert!(output.content.contains("year filter"));
        assert!(output.content.contains("found 1 results"));
    }

    #[tokio::test]
    async fn test_web_search_empty_query_is_bad_input() {
        let tool = WebSearchTool::new(&test_config("http://localhost:1")).unwrap();
        let err = tool.call(&serde_json::json!({"query": ""})).await.unwrap_err();
        assert!(matches!(err, ToolError::BadInput { .. }));
    }

    #[tokio::test]
    async fn test_page_fetch_rejects_non_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/file.bin"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/octet-stream")
                    .set_body_bytes(vec![0u8, 1, 2]),
            )
            .mount(&server)
            .await;

        let tool = PageFetchTool::new(&test_config("http://localhost:1")).unwrap();
        let err = tool
            .call(&serde_json::json!({"url": format!("{}/file.bin", server.uri())}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::BadInput { .. }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_page_fetch_returns_text() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/html; charset=utf-8")
                    .set_body_string("<html>Apollo 11</html>"),
            )
            .mount(&server)
            .await;

        let tool = PageFetchTool::new(&test_config("http://localhost:1")).unwrap();
        let output = tool
            .call(&serde_json::json!({"url": format!("{}/page", server.uri())}))
            .await
            .unwrap();
        assert!(output.content.contains("Apollo 11"));
    }

    #[tokio::test]
    async fn test_page_fetch_rejects_file_scheme() {
        let tool = PageFetchTool::new(&test_config("http://localhost:1")).unwrap();
        let err = tool
            .call(&serde_json::json!({"url": "file:///etc/passwd"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::BadInput { .. }));
    }
}
