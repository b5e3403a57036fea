//! HTTP client for the knowledge-base library service.
//!
//! Every endpoint except `ask` answers with an envelope
//! `{success, errorCode, message?, data}`. A call only succeeds when the HTTP
//! status is 200, `success` is true and `errorCode` is 0.

use async_trait::async_trait;
use library_sync_core::remote::{Answer, DocPage, RemoteError, RemoteLibrary, Result};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://aiproxy.io/api";
pub const DEFAULT_ASK_URL: &str = "https://api.aiproxy.io/api/library/ask";

/// Header carrying the API key on library endpoints
const API_KEY_HEADER: &str = "Api-Key";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error_code: i64,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AskResponse {
    #[serde(flatten)]
    answer: Answer,
    #[serde(default)]
    error_code: i64,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateByText<'a> {
    library_id: u64,
    text: &'a str,
    title: &'a str,
    url: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteDocuments<'a> {
    library_id: u64,
    doc_ids: &'a [String],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AskRequest<'a> {
    library_id: u64,
    model: &'a str,
    query: &'a str,
    stream: bool,
}

/// Decode an enveloped response body.
pub(crate) fn decode_envelope<T: DeserializeOwned>(status: u16, body: &str) -> Result<Option<T>> {
    if status != 200 {
        return Err(RemoteError::Http {
            status,
            body: body.to_string(),
        });
    }

    let envelope: Envelope<T> =
        serde_json::from_str(body).map_err(|e| RemoteError::Decode(e.to_string()))?;
    if !envelope.success || envelope.error_code != 0 {
        return Err(RemoteError::Api {
            code: envelope.error_code,
            message: envelope
                .message
                .unwrap_or_else(|| "request was not successful".to_string()),
        });
    }
    Ok(envelope.data)
}

/// Decode the response of the ask endpoint, which is not enveloped.
pub(crate) fn decode_answer(status: u16, body: &str) -> Result<Answer> {
    if status != 200 {
        return Err(RemoteError::Http {
            status,
            body: body.to_string(),
        });
    }

    let response: AskResponse =
        serde_json::from_str(body).map_err(|e| RemoteError::Decode(e.to_string()))?;
    if !response.answer.success || response.error_code != 0 {
        return Err(RemoteError::Api {
            code: response.error_code,
            message: response
                .message
                .unwrap_or_else(|| "question was not answered".to_string()),
        });
    }
    Ok(response.answer)
}

/// Library service client backed by reqwest.
pub struct HttpLibrary {
    client: Client,
    api_key: String,
    base_url: String,
    ask_url: String,
}

impl HttpLibrary {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        ask_url: impl Into<String>,
    ) -> reqwest::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("library-sync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ask_url: ask_url.into(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn send(request: RequestBuilder) -> Result<(u16, String)> {
        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        Ok((status, body))
    }

    async fn call<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Option<T>> {
        let (status, body) = Self::send(request.header(API_KEY_HEADER, &self.api_key)).await?;
        decode_envelope(status, &body)
    }
}

#[async_trait]
impl RemoteLibrary for HttpLibrary {
    async fn create_document(&self, library_id: u64, text: &str, title: &str) -> Result<String> {
        debug!("POST createByText: {}", title);
        let request = self
            .client
            .post(self.endpoint("library/document/createByText"))
            .json(&CreateByText {
                library_id,
                text,
                title,
                url: "",
            });

        self.call::<String>(request)
            .await?
            .filter(|id| !id.is_empty())
            .ok_or_else(|| RemoteError::Decode("response carries no document id".to_string()))
    }

    async fn list_documents(&self, library_id: u64, page: u32, page_size: u32) -> Result<DocPage> {
        debug!("GET listDocument: page {}", page);
        let request = self
            .client
            .get(self.endpoint("library/listDocument"))
            .query(&[
                ("libraryId", library_id.to_string()),
                ("page", page.to_string()),
                ("pageSize", page_size.to_string()),
                ("order", "desc".to_string()),
                ("orderBy", "gmtCreate".to_string()),
            ]);

        Ok(self.call::<DocPage>(request).await?.unwrap_or_default())
    }

    async fn delete_documents(&self, doc_ids: &[String], library_id: u64) -> Result<()> {
        debug!("POST delete: {:?}", doc_ids);
        let request = self
            .client
            .post(self.endpoint("library/document/delete"))
            .json(&DeleteDocuments {
                library_id,
                doc_ids,
            });

        self.call::<serde_json::Value>(request).await?;
        Ok(())
    }

    async fn ask(&self, library_id: u64, query: &str, model: &str) -> Result<Answer> {
        debug!("POST ask: {}", query);
        let request = self
            .client
            .post(&self.ask_url)
            .bearer_auth(&self.api_key)
            .json(&AskRequest {
                library_id,
                model,
                query,
                stream: false,
            });

        let (status, body) = Self::send(request).await?;
        decode_answer(status, &body)
    }
}
