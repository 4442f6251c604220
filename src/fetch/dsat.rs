//! Client for the DSAT (Macau) live route-station endpoint.

use async_trait::async_trait;
use chrono::Local;
use reqwest::header::{CONTENT_TYPE, HeaderValue, USER_AGENT};
use reqwest::{Method, Request, Url};
use tracing::debug;

use super::{FeedClient, FeedError, HttpClient, fetch_bytes};
use crate::parser::parse_snapshot;
use crate::snapshot::Snapshot;

pub const DSAT_URL: &str = "https://bis.dsat.gov.mo:37812/macauweb/routestation/bus";

const BROWSER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
(KHTML, like Gecko) Chrome/117.0.0.0 Safari/537.36 Edg/117.0.2045.47";

/// Form fields in the order the endpoint hashes them. Direction is always
/// 0 for loop lines.
const FIXED_FIELDS: &[(&str, &str)] = &[
    ("action", "dy"),
    ("dir", "0"),
    ("lang", "zh-tw"),
    ("device", "web"),
];

/// Builds the urlencoded request body for `route`, e.g.
/// `action=dy&dir=0&lang=zh-tw&device=web&routeName=73`.
pub fn form_body(route: &str) -> String {
    FIXED_FIELDS
        .iter()
        .copied()
        .chain(std::iter::once(("routeName", route)))
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Interleaves the md5 hex digest of `form` with a `YYYYMMDDHHmm` stamp.
pub fn build_token(form: &str, stamp: &str) -> String {
    let digest = format!("{:x}", md5::compute(form.as_bytes()));
    let (d, t) = (digest.as_str(), stamp);
    let cut = |s: &str, from: usize, to: usize| s.get(from..to.min(s.len())).unwrap_or("").to_string();

    [
        cut(d, 0, 4),
        cut(t, 0, 4),
        cut(d, 4, 12),
        cut(t, 4, 8),
        cut(d, 12, 24),
        cut(t, 8, t.len()),
        cut(d, 24, d.len()),
    ]
    .concat()
}

/// [`FeedClient`] for DSAT over any [`HttpClient`].
pub struct DsatFeed<C> {
    http: C,
    url: Url,
}

impl<C: HttpClient> DsatFeed<C> {
    pub fn new(http: C, url: &str) -> Result<Self, FeedError> {
        let url = url
            .parse()
            .map_err(|e| FeedError::Malformed(format!("invalid feed url '{url}': {e}")))?;
        Ok(Self { http, url })
    }

    fn request(&self, route: &str) -> Result<Request, FeedError> {
        let body = form_body(route);
        let stamp = Local::now().format("%Y%m%d%H%M").to_string();
        let token = build_token(&body, &stamp);

        let mut req = Request::new(Method::POST, self.url.clone());
        let headers = req.headers_mut();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_AGENT));
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        let token = HeaderValue::from_str(&token)
            .map_err(|e| FeedError::Malformed(format!("invalid token header: {e}")))?;
        headers.insert("token", token);
        *req.body_mut() = Some(body.into());

        Ok(req)
    }
}

#[async_trait]
impl<C: HttpClient> FeedClient for DsatFeed<C> {
    #[tracing::instrument(skip(self), fields(url = %self.url))]
    async fn fetch(&self, route: &str) -> Result<Snapshot, FeedError> {
        let req = self.request(route)?;
        let bytes = fetch_bytes(&self.http, req).await?;
        debug!(bytes = bytes.len(), "Route response received, parsing");
        parse_snapshot(&bytes)
    }
}
