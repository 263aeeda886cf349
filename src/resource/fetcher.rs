//! Resource Fetcher
//!
//! Resolves a table's [`Listing`] into the ordered sequence of items to
//! flatten: either through the [`Upstream`] client, or from inside the
//! parent item.

use super::path::Path;
use super::schema::Listing;
use super::value::Node;
use crate::kube::contexts::Context;
use anyhow::{anyhow, Result};
use futures::future::BoxFuture;

/// One API listing call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListRequest {
    /// API path, placeholders already filled
    pub path: String,
    /// Where the items sit in each response page
    pub response_path: Path,
}

/// Upstream resource client.
///
/// Returns one logical, already-paginated, ordered sequence of items. An
/// error means the listing failed, which is distinct from an empty list.
pub trait Upstream: Send + Sync {
    fn list<'a>(
        &'a self,
        context: &'a Context,
        request: &'a ListRequest,
    ) -> BoxFuture<'a, Result<Vec<Node>>>;
}

/// List the items of a table for one context and (optional) parent item
pub async fn list_items(
    upstream: &dyn Upstream,
    context: &Context,
    listing: &Listing,
    parent: Option<&Node>,
) -> Result<Vec<Node>> {
    match listing {
        Listing::Api {
            path,
            response_path,
        } => {
            let path = path
                .render(parent)
                .map_err(|field| anyhow!("Listing path {} needs parent field {}", path, field))?;
            let request = ListRequest {
                path,
                response_path: response_path.clone(),
            };
            upstream.list(context, &request).await
        }
        Listing::Parent { path } => {
            let Some(parent) = parent else {
                return Err(anyhow!("Listing {} needs a parent item", path));
            };
            items_from_parent(path, parent)
        }
    }
}

/// Items nested in a parent: sequence elements, or one `{key, value}`
/// record per entry of a record/mapping
pub fn items_from_parent(path: &Path, parent: &Node) -> Result<Vec<Node>> {
    let Some(found) = path.resolve(parent) else {
        return Ok(Vec::new());
    };
    match found.active() {
        None => Ok(Vec::new()),
        Some(Node::Sequence(items)) => Ok(items.iter().filter(|i| !i.is_missing()).cloned().collect()),
        Some(Node::Record(fields) | Node::Mapping(fields)) => Ok(fields
            .iter()
            .map(|(key, value)| {
                Node::record([("key", Node::text(key.clone())), ("value", value.clone())])
            })
            .collect()),
        Some(other) => Err(anyhow!(
            "Expected a collection at {}, found {}",
            path,
            other.type_name()
        )),
    }
}

/// Extract the items of one response page using the response path
pub fn extract_items(response: &Node, response_path: &Path) -> Result<Vec<Node>> {
    let Some(found) = response_path.resolve(response) else {
        return Ok(Vec::new());
    };
    match found.active() {
        None => Ok(Vec::new()),
        Some(Node::Sequence(items)) => Ok(items.clone()),
        Some(other) => Err(anyhow!(
            "Expected a list at '{}' in response, found {}",
            response_path,
            other.type_name()
        )),
    }
}
