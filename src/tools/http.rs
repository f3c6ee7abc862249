//! HTTP 请求工具：域名白名单、超时、结果大小限制
//!
//! 仅允许配置中的域名；GET 请求带超时与 User-Agent；
//! 响应超过 max_result_chars 时截断并追加截断标记。
//! 对 HTML 响应使用 html2text 提取可读文本。

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use html2text::from_read;
use reqwest::Client;
use serde_json::Value;

use crate::tools::dispatcher::TRUNCATION_MARKER;
use crate::tools::{Tool, ToolResult};

/// 判断内容是否像 HTML（需提取可读文本）
fn looks_like_html(s: &str) -> bool {
    let s = s.trim_start();
    s.starts_with("<!") || s.starts_with("<html") || s.starts_with("<HTML")
}

/// 从 URL 中提取 host（不含端口与路径）
fn extract_domain(url: &str) -> Option<String> {
    let url = url.trim();
    let url = url.strip_prefix("https://").or_else(|| url.strip_prefix("http://"))?;
    let host = url.split('/').next()?;
    let host = host.split(':').next()?;
    Some(host.to_lowercase())
}

pub struct HttpRequestTool {
    client: Client,
    allowed_domains: HashSet<String>,
    max_result_chars: usize,
}

impl HttpRequestTool {
    pub fn new(allowed_domains: Vec<String>, max_result_chars: usize) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("mantis/0.1")
            .build()
            .unwrap_or_default();
        Self {
            client,
            allowed_domains: allowed_domains.into_iter().map(|d| d.to_lowercase()).collect(),
            max_result_chars,
        }
    }

    fn is_allowed(&self, url: &str) -> Result<String, String> {
        let domain = extract_domain(url).ok_or_else(|| format!("Invalid URL: {}", url))?;
        if self.allowed_domains.contains(&domain) {
            Ok(domain)
        } else {
            Err(format!("Domain '{}' not in allowlist", domain))
        }
    }
}

#[async_trait]
impl Tool for HttpRequestTool {
    fn name(&self) -> &str {
        "http_request"
    }

    fn description(&self) -> &str {
        "GET a URL (allowlisted domains only). Args: {\"url\": \"https://docs.rs/...\"}"
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let url = match args.get("url").and_then(|v| v.as_str()) {
            Some(u) if !u.trim().is_empty() => u,
            _ => return ToolResult::fail("Missing required parameter: url"),
        };

        if let Err(reason) = self.is_allowed(url) {
            return ToolResult::fail(reason);
        }

        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => return ToolResult::fail(format!("Request failed: {}", e)),
        };
        let status = response.status();
        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => return ToolResult::fail(format!("Read body failed: {}", e)),
        };

        let mut text = if looks_like_html(&body) {
            match from_read(body.as_bytes(), 100) {
                Ok(t) if !t.trim().is_empty() => t,
                _ => body,
            }
        } else {
            body
        };

        if text.chars().count() > self.max_result_chars {
            text = text.chars().take(self.max_result_chars).collect();
            text.push('\n');
            text.push_str(TRUNCATION_MARKER);
        }

        let metadata = serde_json::json!({"status": status.as_u16()});
        if status.is_success() {
            ToolResult::ok_with_metadata(text, metadata)
        } else {
            ToolResult::fail_with_output(format!("HTTP {}", status.as_u16()), text, metadata)
        }
    }
}
