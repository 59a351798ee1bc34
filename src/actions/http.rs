//! REST / GraphQL 调用
//!
//! URL 与 header 值中的 `{参数}` / `{appkey}` 在发送前替换；GET 只替换 URL，其余方法同时以 JSON 发送参数。
//! 非 2xx 响应视为失败（ExternalCall）。重试不在这一层做。

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder};
use serde_json::{json, Value};

use crate::actions::spec::{GraphQlAction, RestAction};
use crate::actions::template::render_with;
use crate::actions::Arguments;
use crate::core::SessionError;

/// 带超时的 HTTP 客户端（整个进程共用一个连接池）
#[derive(Debug, Clone)]
pub struct HttpActionClient {
    client: Client,
}

impl HttpActionClient {
    pub fn new(timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("slash/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self { client }
    }

    pub async fn call_rest(
        &self,
        action: &RestAction,
        args: &Arguments,
        appkey: &str,
        verbose: bool,
    ) -> Result<String, SessionError> {
        let lookup = |k: &str| lookup_with_appkey(args, appkey, k);
        let url = render_with(&action.url, lookup)?;
        let method = Method::from_bytes(action.method.to_uppercase().as_bytes())
            .map_err(|e| SessionError::ExternalCall(format!("invalid method {}: {}", action.method, e)))?;

        let mut request = self.client.request(method.clone(), &url);
        request = apply_headers(request, &action.headers, args, appkey)?;
        if method != Method::GET {
            request = request.json(&args.to_json());
        }
        if verbose {
            tracing::debug!(method = %method, url = %url, args = %args.to_json(), "rest request");
        }
        send(request, &url).await
    }

    /// GraphQL：`query` 参数作为查询体，其余关键字参数作为 variables
    pub async fn call_graphql(
        &self,
        action: &GraphQlAction,
        args: &Arguments,
        appkey: &str,
        verbose: bool,
    ) -> Result<String, SessionError> {
        let lookup = |k: &str| lookup_with_appkey(args, appkey, k);
        let url = render_with(&action.url, lookup)?;
        let (query, variables) = match args {
            Arguments::PositionalBlob(text) => (text.clone(), Value::Object(Default::default())),
            Arguments::KeywordArgs(map) => {
                let query = map
                    .get("query")
                    .and_then(Value::as_str)
                    .ok_or_else(|| SessionError::TemplateArgumentMissing("query".to_string()))?
                    .to_string();
                let mut rest = map.clone();
                rest.remove("query");
                (query, Value::Object(rest))
            }
        };
        let body = json!({ "query": query, "variables": variables });

        let mut request = self.client.post(&url);
        request = apply_headers(request, &action.headers, args, appkey)?;
        if verbose {
            tracing::debug!(url = %url, body = %body, "graphql request");
        }
        send(request.json(&body), &url).await
    }
}

impl Default for HttpActionClient {
    fn default() -> Self {
        Self::new(30)
    }
}

fn lookup_with_appkey(args: &Arguments, appkey: &str, key: &str) -> Option<String> {
    if key == "appkey" {
        return Some(appkey.to_string());
    }
    args.lookup(key)
}

fn apply_headers(
    mut request: RequestBuilder,
    headers: &std::collections::BTreeMap<String, String>,
    args: &Arguments,
    appkey: &str,
) -> Result<RequestBuilder, SessionError> {
    for (name, value) in headers {
        let value = render_with(value, |k| lookup_with_appkey(args, appkey, k))?;
        request = request.header(name.as_str(), value);
    }
    Ok(request)
}

async fn send(request: RequestBuilder, url: &str) -> Result<String, SessionError> {
    let resp = request
        .send()
        .await
        .map_err(|e| SessionError::ExternalCall(format!("request to {} failed: {}", url, e)))?;
    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| SessionError::ExternalCall(format!("read body: {}", e)))?;
    if !status.is_success() {
        return Err(SessionError::ExternalCall(format!("HTTP {} from {}", status, url)));
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_appkey_placeholder() {
        let args = Arguments::from_value(json!({"city": "Lyon"}));
        assert_eq!(lookup_with_appkey(&args, "k1", "appkey").as_deref(), Some("k1"));
        assert_eq!(lookup_with_appkey(&args, "k1", "city").as_deref(), Some("Lyon"));
        assert_eq!(lookup_with_appkey(&args, "k1", "other"), None);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_external_call_error() {
        let client = HttpActionClient::new(2);
        let action = RestAction {
            url: "http://127.0.0.1:1/weather?city={city}".to_string(),
            method: "GET".to_string(),
            headers: Default::default(),
            appkey_ref: None,
        };
        let args = Arguments::from_value(json!({"city": "Lyon"}));
        let err = client.call_rest(&action, &args, "", false).await.unwrap_err();
        assert!(matches!(err, SessionError::ExternalCall(_)));
    }

    #[tokio::test]
    async fn test_graphql_requires_query() {
        let client = HttpActionClient::new(2);
        let action = GraphQlAction {
            url: "http://127.0.0.1:1/graphql".to_string(),
            headers: Default::default(),
            appkey_ref: None,
        };
        let args = Arguments::from_value(json!({"id": 1}));
        let err = client.call_graphql(&action, &args, "", false).await.unwrap_err();
        assert!(matches!(err, SessionError::TemplateArgumentMissing(k) if k == "query"));
    }
}
