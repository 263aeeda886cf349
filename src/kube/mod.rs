//! API server interaction module
//!
//! # Module Structure
//!
//! - [`contexts`] - Upstream environments and their credentials
//! - [`client`] - Paginating list client, the production [`Upstream`](crate::resource::Upstream)
//! - [`http`] - HTTP utilities for REST API calls

pub mod client;
pub mod contexts;
pub mod http;

pub use client::KubeClient;
pub use contexts::{resolve_contexts, Context};
