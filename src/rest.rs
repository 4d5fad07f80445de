use std::env;
use std::sync::Arc;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::TokenProvider;
use crate::services::{AdminError, ListQuery, Page, ServiceResult};

/// Paginated envelope as the platform API spells it on the wire.
#[derive(Debug, Deserialize)]
pub struct ApiPage<T> {
    pub items: Vec<T>,
    pub count: i64,
    #[serde(rename = "pageCount")]
    pub page_count: i64,
    #[serde(rename = "pageNumber")]
    pub page_number: i64,
    #[serde(rename = "pageSize")]
    pub page_size: i64,
}

impl<T> From<ApiPage<T>> for Page<T> {
    fn from(wire: ApiPage<T>) -> Self {
        Page {
            items: wire.items,
            count: wire.count,
            page_count: wire.page_count,
            page_number: wire.page_number,
            page_size: wire.page_size,
        }
    }
}

fn normalize_base_url(raw: String) -> String {
    let url = raw.trim().trim_end_matches('/').to_string();
    if url.starts_with("http://") || url.starts_with("https://") {
        url
    } else {
        format!("http://{url}")
    }
}

/// Blocking client for the platform API. Every request goes out with the
/// bearer token the injected provider currently yields; no other part of the
/// dashboard touches auth state. Must not be driven from inside an async
/// runtime (reqwest's blocking client refuses that).
#[derive(Clone)]
pub struct RestClient {
    http: Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl RestClient {
    pub fn new(base_url: &str, tokens: Arc<dyn TokenProvider>) -> ServiceResult<Self> {
        let http = Client::builder()
            .user_agent("educoin-admin/0.1")
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AdminError::Internal(format!("http client init failed: {e}")))?;
        Ok(Self {
            http,
            base_url: normalize_base_url(base_url.to_string()),
            tokens,
        })
    }

    /// Builds a client from `EDUCOIN_API_URL`, defaulting to a local API.
    pub fn from_env(tokens: Arc<dyn TokenProvider>) -> ServiceResult<Self> {
        let base_url =
            env::var("EDUCOIN_API_URL").unwrap_or_else(|_| "http://127.0.0.1:8080/api".into());
        info!(base_url, "connecting to EduCoin API");
        Self::new(&base_url, tokens)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.tokens.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn check_status(path: &str, status: StatusCode) -> ServiceResult<()> {
        if status.is_success() {
            return Ok(());
        }
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(AdminError::PermissionDenied(path.to_string()))
            }
            StatusCode::NOT_FOUND => Err(AdminError::NotFound(path.to_string())),
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                Err(AdminError::Validation(path.to_string()))
            }
            other => Err(AdminError::Api(format!("{path}: http {other}"))),
        }
    }

    pub fn get_page<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &ListQuery,
    ) -> ServiceResult<Page<T>> {
        let mut request = self
            .http
            .get(self.url(path))
            .query(&[("page", query.page), ("pageSize", query.page_size)]);
        if let Some(search) = &query.search {
            request = request.query(&[("search", search.as_str())]);
        }
        let response = self
            .authorize(request)
            .send()
            .map_err(|e| AdminError::Api(format!("{path}: {e}")))?;
        Self::check_status(path, response.status())?;
        let page: ApiPage<T> = response
            .json()
            .map_err(|e| AdminError::Api(format!("{path}: {e}")))?;
        Ok(page.into())
    }

    /// GET one record; a 404 becomes `None` rather than an error, matching
    /// the get-by-id service methods.
    pub fn get_one<T: DeserializeOwned>(&self, path: &str) -> ServiceResult<Option<T>> {
        let response = self
            .authorize(self.http.get(self.url(path)))
            .send()
            .map_err(|e| AdminError::Api(format!("{path}: {e}")))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::check_status(path, response.status())?;
        let record = response
            .json()
            .map_err(|e| AdminError::Api(format!("{path}: {e}")))?;
        Ok(Some(record))
    }

    pub fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> ServiceResult<T> {
        let response = self
            .authorize(self.http.post(self.url(path)).json(body))
            .send()
            .map_err(|e| AdminError::Api(format!("{path}: {e}")))?;
        Self::check_status(path, response.status())?;
        response
            .json()
            .map_err(|e| AdminError::Api(format!("{path}: {e}")))
    }

    pub fn put_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> ServiceResult<T> {
        let response = self
            .authorize(self.http.put(self.url(path)).json(body))
            .send()
            .map_err(|e| AdminError::Api(format!("{path}: {e}")))?;
        Self::check_status(path, response.status())?;
        response
            .json()
            .map_err(|e| AdminError::Api(format!("{path}: {e}")))
    }

    /// POST where the caller only cares that the action was accepted.
    pub fn post_unit<B: Serialize>(&self, path: &str, body: &B) -> ServiceResult<()> {
        let response = self
            .authorize(self.http.post(self.url(path)).json(body))
            .send()
            .map_err(|e| AdminError::Api(format!("{path}: {e}")))?;
        Self::check_status(path, response.status())
    }

    pub fn delete(&self, path: &str) -> ServiceResult<()> {
        let response = self
            .authorize(self.http.delete(self.url(path)))
            .send()
            .map_err(|e| AdminError::Api(format!("{path}: {e}")))?;
        Self::check_status(path, response.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;

    #[test]
    fn base_url_gets_scheme_and_loses_trailing_slash() {
        assert_eq!(
            normalize_base_url("api.educoin.example/v1/".into()),
            "http://api.educoin.example/v1"
        );
        assert_eq!(
            normalize_base_url("https://api.educoin.example".into()),
            "https://api.educoin.example"
        );
    }

    #[test]
    fn url_join_handles_leading_slash() {
        let client =
            RestClient::new("http://localhost:8080/api", Arc::new(StaticToken("t".into())))
                .unwrap();
        assert_eq!(client.url("categories"), "http://localhost:8080/api/categories");
        assert_eq!(client.url("/categories/3"), "http://localhost:8080/api/categories/3");
    }

    #[test]
    fn wire_envelope_maps_to_page() {
        let wire: ApiPage<i64> = serde_json::from_value(serde_json::json!({
            "items": [1, 2, 3],
            "count": 23,
            "pageCount": 3,
            "pageNumber": 1,
            "pageSize": 10,
        }))
        .unwrap();
        let page: Page<i64> = wire.into();
        assert_eq!(page.items, vec![1, 2, 3]);
        assert_eq!(page.page_count, 3);
    }

    #[test]
    fn status_mapping() {
        assert!(RestClient::check_status("x", StatusCode::OK).is_ok());
        assert!(matches!(
            RestClient::check_status("x", StatusCode::FORBIDDEN),
            Err(AdminError::PermissionDenied(_))
        ));
        assert!(matches!(
            RestClient::check_status("x", StatusCode::NOT_FOUND),
            Err(AdminError::NotFound(_))
        ));
        assert!(matches!(
            RestClient::check_status("x", StatusCode::BAD_GATEWAY),
            Err(AdminError::Api(_))
        ));
    }
}
