//! Kube Client
//!
//! [`Upstream`] implementation for Kubernetes-style API servers: list calls
//! paginated with `limit` and `metadata.continue`.

use super::contexts::Context;
use super::http::KubeHttpClient;
use crate::resource::fetcher::{extract_items, ListRequest, Upstream};
use crate::resource::Node;
use anyhow::{anyhow, Context as _, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use url::Url;

/// Default number of items requested per page
pub const DEFAULT_PAGE_SIZE: usize = 500;

/// One page of a list call
pub struct Page {
    pub items: Vec<Node>,
    pub continue_token: Option<String>,
}

/// Client for the API servers of all configured contexts
#[derive(Clone)]
pub struct KubeClient {
    pub http: KubeHttpClient,
    pub page_size: usize,
}

impl KubeClient {
    pub fn new(page_size: usize) -> Result<Self> {
        Ok(Self {
            http: KubeHttpClient::new()?,
            page_size: page_size.max(1),
        })
    }

    /// Build the URL of one page. The request path is appended to the
    /// server URL so a server path prefix (e.g. a proxy) is kept.
    pub fn page_url(&self, context: &Context, path: &str, continue_token: Option<&str>) -> Result<Url> {
        let base = context.server.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        let mut url = Url::parse(&format!("{}/{}", base, path))
            .with_context(|| format!("Invalid list path {} for context {}", path, context.id))?;

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &self.page_size.to_string());
            if let Some(token) = continue_token {
                query.append_pair("continue", token);
            }
        }

        Ok(url)
    }

    /// Fetch one page
    pub async fn list_page(
        &self,
        context: &Context,
        request: &ListRequest,
        continue_token: Option<&str>,
    ) -> Result<Page> {
        let url = self.page_url(context, &request.path, continue_token)?;
        let response = self.http.get(&url, context.token.as_deref()).await?;

        let continue_token = response
            .get("metadata")
            .and_then(|m| m.get("continue"))
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());

        let items = extract_items(&Node::from(response), &request.response_path)?;

        Ok(Page {
            items,
            continue_token,
        })
    }

    /// Fetch all pages
    pub async fn list_all(&self, context: &Context, request: &ListRequest) -> Result<Vec<Node>> {
        let mut all_items = Vec::new();
        let mut continue_token: Option<String> = None;

        loop {
            let page = self
                .list_page(context, request, continue_token.as_deref())
                .await
                .with_context(|| format!("Listing {} in {}", request.path, context.id))?;
            all_items.extend(page.items);

            match page.continue_token {
                None => break,
                Some(token) if continue_token.as_deref() == Some(token.as_str()) => {
                    return Err(anyhow!(
                        "Listing {} in {} returned the same continue token twice",
                        request.path,
                        context.id
                    ));
                }
                next => continue_token = next,
            }
        }

        tracing::debug!(
            "Fetched {} items from {} in {}",
            all_items.len(),
            request.path,
            context.id
        );
        Ok(all_items)
    }
}

impl Upstream for KubeClient {
    fn list<'a>(
        &'a self,
        context: &'a Context,
        request: &'a ListRequest,
    ) -> BoxFuture<'a, Result<Vec<Node>>> {
        self.list_all(context, request).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(server: &str) -> Context {
        Context::new("prod", Url::parse(server).unwrap())
    }

    #[test]
    fn test_page_url_keeps_server_prefix() {
        let client = KubeClient::new(100).unwrap();
        let url = client
            .page_url(&context("https://proxy.example.com/k8s/prod/"), "/api/v1/pods", None)
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://proxy.example.com/k8s/prod/api/v1/pods?limit=100"
        );
    }

    #[test]
    fn test_page_url_appends_continue_token() {
        let client = KubeClient::new(2).unwrap();
        let url = client
            .page_url(
                &context("https://api.example.com"),
                "/api/v1/pods?labelSelector=app%3Dweb",
                Some("abc=="),
            )
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.example.com/api/v1/pods?labelSelector=app%3Dweb&limit=2&continue=abc%3D%3D"
        );
    }

    #[test]
    fn test_page_size_is_at_least_one() {
        assert_eq!(KubeClient::new(0).unwrap().page_size, 1);
    }
}
