use crate::error::Error;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::redirect::Policy;
use reqwest::tls::Version;
use reqwest::Client;
use std::time::Duration;

const JSON: HeaderValue = HeaderValue::from_static("application/json");
const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// `https_only` is relaxed for the local emulator, which only speaks plain http
/// and is reached without going through any configured proxy.
pub(crate) fn json_client(https_only: bool) -> Result<Client, Error> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, JSON);
    headers.insert(CONTENT_TYPE, JSON);
    let builder = if https_only {
        Client::builder()
    } else {
        Client::builder().no_proxy()
    };
    Ok(builder
        .https_only(https_only)
        .use_rustls_tls()
        .min_tls_version(Version::TLS_1_2)
        .user_agent(USER_AGENT)
        .redirect(Policy::none())
        .default_headers(headers)
        .deflate(true)
        .gzip(true)
        .brotli(true)
        .zstd(true)
        .connect_timeout(Duration::from_secs(3))
        .read_timeout(Duration::from_secs(15))
        .build()?)
}
