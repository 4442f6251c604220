//! Feed access: the [`FeedClient`] seam used by the collector, and the
//! HTTP plumbing behind the DSAT implementation.

mod basic;
mod client;
mod dsat;
mod error;

pub use basic::BasicClient;
pub use client::HttpClient;
pub use dsat::{DSAT_URL, DsatFeed, build_token, form_body};
pub use error::FeedError;

use async_trait::async_trait;

use crate::snapshot::Snapshot;

/// Supplies one snapshot of a route per call.
///
/// Implementations fail closed: a transport problem or a payload that does
/// not have the expected structure is an error, never a partial snapshot.
#[async_trait]
pub trait FeedClient: Send + Sync {
    async fn fetch(&self, route: &str) -> Result<Snapshot, FeedError>;
}

/// Sends `req` and returns the body bytes of a successful response.
pub async fn fetch_bytes<C: HttpClient>(client: &C, req: reqwest::Request) -> Result<Vec<u8>, FeedError> {
    let resp = client.execute(req).await?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(FeedError::Status {
            status: status.as_u16(),
            body,
        });
    }

    Ok(resp.bytes().await?.to_vec())
}
