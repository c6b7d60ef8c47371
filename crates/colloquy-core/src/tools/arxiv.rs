use crate::error::ColloquyError;
use crate::tools::traits::{Tool, ToolOutput};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{info, warn};

pub const ARXIV_API_URL: &str = "http://export.arxiv.org/api/query";
pub const MAX_RESULTS: u64 = 1000;

/// Searches arXiv for papers and renders their metadata as text.
///
/// The HTTP client is provisioned on first use and cached together with
/// any provisioning error, so setup runs once per tool instance.
pub struct ArxivSearchTool {
    base_url: String,
    timeout: Duration,
    client: OnceCell<Result<reqwest::Client, String>>,
}

impl ArxivSearchTool {
    pub fn new() -> Self {
        Self {
            base_url: ARXIV_API_URL.to_string(),
            timeout: Duration::from_secs(30),
            client: OnceCell::new(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn client(&self) -> Result<&reqwest::Client, ColloquyError> {
        let provisioned = self
            .client
            .get_or_init(|| async {
                info!("Provisioning arXiv HTTP client");
                reqwest::Client::builder()
                    .timeout(self.timeout)
                    .user_agent("Colloquy/0.1")
                    .build()
                    .map_err(|e| {
                        warn!(error = %e, "arXiv client setup failed");
                        e.to_string()
                    })
            })
            .await;

        provisioned.as_ref().map_err(|e| {
            ColloquyError::DependencyUnavailable(format!("arXiv client unavailable: {e}"))
        })
    }
}

impl Default for ArxivSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Tool for ArxivSearchTool {
    fn name(&self) -> &str {
        "arxiv_search"
    }

    fn description(&self) -> &str {
        "Search arXiv for academic papers. Returns title, authors, publication date, URL and abstract for each paper found."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "minLength": 1,
                    "description": "The topic the papers should be about"
                },
                "max_results": {
                    "type": "integer",
                    "exclusiveMinimum": 1,
                    "maximum": MAX_RESULTS,
                    "description": "The number of papers to retrieve (2 to 1000)"
                }
            },
            "required": ["query", "max_results"]
        })
    }

    async fn execute(&self, params: Value) -> Result<ToolOutput, ColloquyError> {
        let query = params
            .get("query")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| {
                ColloquyError::invalid_argument("arxiv_search", "query must be a non-empty string")
            })?;

        let max_results = params
            .get("max_results")
            .and_then(|v| v.as_u64())
            .filter(|n| *n > 1 && *n <= MAX_RESULTS)
            .ok_or_else(|| {
                ColloquyError::invalid_argument(
                    "arxiv_search",
                    format!("max_results must be an integer between 2 and {MAX_RESULTS}"),
                )
            })?;

        let client = self.client().await?;

        let url = format!(
            "{}?search_query=all:{}&start=0&max_results={}&sortBy=relevance&sortOrder=descending",
            self.base_url,
            urlencoding::encode(query),
            max_results
        );

        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| ColloquyError::DependencyUnavailable(format!("arXiv request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ColloquyError::DependencyUnavailable(format!(
                "arXiv API error ({status})"
            )));
        }

        let feed = response.text().await.map_err(|e| {
            ColloquyError::DependencyUnavailable(format!("Failed to read arXiv response: {e}"))
        })?;

        let papers = parse_feed(&feed)?;
        if papers.is_empty() {
            return Ok(ToolOutput::Empty);
        }

        Ok(ToolOutput::Text(render_papers(&papers)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Paper {
    pub title: String,
    pub authors: Vec<String>,
    pub published: String,
    pub url: String,
    pub summary: String,
}

/// Parse the entries of an arXiv Atom feed.
pub fn parse_feed(xml: &str) -> Result<Vec<Paper>, ColloquyError> {
    let mut papers = Vec::new();

    for segment in xml.split("<entry>").skip(1) {
        let entry = segment.split("</entry>").next().unwrap_or(segment);

        let url = extract_between(entry, "<id>", "</id>").unwrap_or_default();
        let summary = clean_text(&extract_between(entry, "<summary", "</summary>").map(skip_attrs).unwrap_or_default());

        // The API reports malformed queries as a single pseudo-entry
        if url.contains("/api/errors") {
            return Err(ColloquyError::DependencyUnavailable(format!(
                "arXiv rejected the query: {summary}"
            )));
        }

        let title = clean_text(&extract_between(entry, "<title", "</title>").map(skip_attrs).unwrap_or_default());
        let published = extract_between(entry, "<published>", "</published>")
            .map(|p| p.trim().chars().take(10).collect())
            .unwrap_or_default();
        let authors = entry
            .split("<author>")
            .skip(1)
            .filter_map(|a| extract_between(a, "<name>", "</name>"))
            .map(|n| clean_text(&n))
            .collect();

        papers.push(Paper {
            title,
            authors,
            published,
            url: url.trim().to_string(),
            summary,
        });
    }

    Ok(papers)
}

pub fn render_papers(papers: &[Paper]) -> String {
    papers
        .iter()
        .enumerate()
        .map(|(i, p)| {
            format!(
                "Paper {}:\n  Title: {}\n  Authors: {}\n  Published: {}\n  URL: {}\n  Abstract: {}\n",
                i + 1,
                p.title,
                p.authors.join(", "),
                p.published,
                p.url,
                p.summary
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn extract_between(text: &str, start: &str, end: &str) -> Option<String> {
    let start_idx = text.find(start)? + start.len();
    let remaining = &text[start_idx..];
    let end_idx = remaining.find(end)?;
    Some(remaining[..end_idx].to_string())
}

/// Drop the rest of an opening tag such as `<title type="text">`.
fn skip_attrs(inner: String) -> String {
    match inner.find('>') {
        Some(idx) => inner[idx + 1..].to_string(),
        None => inner,
    }
}

fn clean_text(text: &str) -> String {
    let decoded = text
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}
