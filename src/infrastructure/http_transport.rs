//! 基于 reqwest 的传输实现

use super::transport::{RawResponse, Transport};
use crate::error::{AppError, NetworkError, Result};
use crate::forms::{PayloadValue, SubmissionPayload};
use crate::page::{FormEncoding, HttpMethod};
use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

const USER_AGENT: &str = concat!("ilias_tests/", env!("CARGO_PKG_VERSION"));

/// HTTP 传输
pub struct HttpTransport {
    client: Client,
    jar: Arc<Jar>,
    base_url: Url,
}

impl HttpTransport {
    /// 创建新的传输实例（独立 Cookie 容器）
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|_| AppError::invalid_config("ILIAS_BASE_URL", base_url, "不是合法的 URL"))?;
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .cookie_provider(jar.clone())
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| AppError::network(base_url.as_str(), e))?;
        Ok(Self {
            client,
            jar,
            base_url,
        })
    }

    async fn send(&self, url: &str, request: RequestBuilder) -> Result<RawResponse> {
        let response = request.send().await.map_err(|e| classify(url, e))?;
        let final_url = response.url().to_string();
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| classify(url, e))?;
        debug!("HTTP {} {} ({} 字节)", status, final_url, body.len());
        Ok(RawResponse {
            url: final_url,
            status,
            body,
        })
    }
}

fn classify(url: &str, error: reqwest::Error) -> AppError {
    if error.is_timeout() {
        NetworkError::Timeout {
            url: url.to_string(),
        }
        .into()
    } else {
        AppError::network(url, error)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<RawResponse> {
        debug!("GET {}", url);
        self.send(url, self.client.get(url)).await
    }

    async fn submit(&self, payload: &SubmissionPayload) -> Result<RawResponse> {
        debug!("提交表单 {} ({} 个字段)", payload.url, payload.fields.len());
        let request = match (payload.method, payload.encoding) {
            (HttpMethod::Get, _) => {
                let mut url = Url::parse(&payload.url)
                    .map_err(|e| AppError::network(&payload.url, e))?;
                url.query_pairs_mut().extend_pairs(payload.text_pairs());
                self.client.get(url)
            }
            (HttpMethod::Post, FormEncoding::UrlEncoded) => {
                self.client.post(&payload.url).form(&payload.text_pairs())
            }
            (HttpMethod::Post, FormEncoding::Multipart) => {
                let mut form = Form::new();
                for (name, value) in &payload.fields {
                    form = match value {
                        PayloadValue::Text(text) => form.text(name.clone(), text.clone()),
                        PayloadValue::File { filename, content } => {
                            let part = Part::bytes(content.clone())
                                .file_name(filename.clone())
                                .mime_str("application/octet-stream")
                                .map_err(|e| AppError::network(&payload.url, e))?;
                            form.part(name.clone(), part)
                        }
                    };
                }
                self.client.post(&payload.url).multipart(form)
            }
        };
        self.send(&payload.url, request).await
    }

    async fn post_json(&self, url: &str, body: &serde_json::Value) -> Result<RawResponse> {
        debug!("POST JSON {}", url);
        let request = self
            .client
            .post(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(body);
        self.send(url, request).await
    }

    fn export_cookies(&self) -> Vec<String> {
        self.jar
            .cookies(&self.base_url)
            .and_then(|header| header.to_str().ok().map(String::from))
            .map(|header| {
                header
                    .split("; ")
                    .filter(|c| !c.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn import_cookies(&self, cookies: &[String]) {
        for cookie in cookies {
            self.jar
                .add_cookie_str(&format!("{}; Path=/", cookie), &self.base_url);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_round_trip_through_jar() {
        let transport =
            HttpTransport::new("https://ilias.test/", Duration::from_secs(5)).unwrap();
        transport.import_cookies(&["PHPSESSID=abc".to_string(), "ilClientId=demo".to_string()]);
        let mut cookies = transport.export_cookies();
        cookies.sort();
        assert_eq!(cookies, vec!["PHPSESSID=abc", "ilClientId=demo"]);
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        let err = HttpTransport::new("::", Duration::from_secs(5)).err().unwrap();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }
}
