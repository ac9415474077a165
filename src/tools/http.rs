//! HTTP 请求工具：域名白名单、超时、结果大小限制
//!
//! 仅允许配置中的域名；GET / POST 带超时与 User-Agent；
//! 响应超过 max_result_chars 时截断并追加 ...[truncated]。

use std::collections::HashSet;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::tools::Tool;

/// 从 URL 中提取 host（不含端口与路径）
fn extract_domain(url: &str) -> Option<String> {
    let url = url.trim();
    let url = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))?;
    let host = url.split('/').next()?;
    let host = host.split(':').next()?;
    Some(host.to_lowercase())
}

/// http.request 工具：抓取 URL 内容，仅允许白名单域名
pub struct HttpRequestTool {
    client: Client,
    allowed_domains: HashSet<String>,
    max_result_chars: usize,
}

impl HttpRequestTool {
    pub fn new(allowed_domains: Vec<String>, timeout_secs: u64, max_result_chars: usize) -> Self {
        let allowed_domains = allowed_domains
            .into_iter()
            .map(|s| s.to_lowercase())
            .collect();
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .user_agent("hive/0.1")
            .build()
            .unwrap_or_default();
        Self {
            client,
            allowed_domains,
            max_result_chars,
        }
    }

    fn is_allowed(&self, url: &str) -> Result<(), String> {
        let domain = extract_domain(url).ok_or_else(|| "Invalid or missing URL".to_string())?;
        if self.allowed_domains.contains(&domain) {
            return Ok(());
        }
        Err(format!("Domain not in allowlist: {}", domain))
    }
}

#[async_trait]
impl Tool for HttpRequestTool {
    fn name(&self) -> &str {
        "http.request"
    }

    fn description(&self) -> &str {
        "Fetch a URL (GET/POST) from an allowlisted domain."
    }

    fn instructions(&self) -> &str {
        "Only domains on the configured allowlist are reachable; long responses are truncated."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {"type": "string", "description": "Target URL (http/https)"},
                "method": {"type": "string", "enum": ["GET", "POST"], "description": "Default GET"},
                "body": {"type": "string", "description": "Request body for POST"}
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, String> {
        let url = args.get("url").and_then(|v| v.as_str()).unwrap_or("");
        self.is_allowed(url)?;
        let method = args
            .get("method")
            .and_then(|v| v.as_str())
            .unwrap_or("GET")
            .to_uppercase();

        tracing::info!(url = %url, method = %method, "http tool execute");

        let request = match method.as_str() {
            "GET" => self.client.get(url),
            "POST" => {
                let body = args
                    .get("body")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_string();
                self.client.post(url).body(body)
            }
            other => return Err(format!("Unsupported method: {}", other)),
        };

        let response = request.send().await.map_err(|e| format!("Request failed: {}", e))?;
        let status = response.status().as_u16();
        let mut body = response
            .text()
            .await
            .map_err(|e| format!("Read body failed: {}", e))?;
        if body.chars().count() > self.max_result_chars {
            body = body.chars().take(self.max_result_chars).collect();
            body.push_str("...[truncated]");
        }

        Ok(serde_json::json!({ "status": status, "body": body }))
    }
}
