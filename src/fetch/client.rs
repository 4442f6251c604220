use async_trait::async_trait;
use reqwest::{Request, Response};

/// Executes prepared requests; lets the feed be tested or wrapped without
/// touching the network layer.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> reqwest::Result<Response>;
}
