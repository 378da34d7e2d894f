use crate::error::Error;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use pinboard::Pinboard;
use reqwest::header::HeaderValue;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

pub const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_VALIDITY_SECONDS: i64 = 3_600; // 1h
const REFRESH_MARGIN_SECONDS: i64 = 60;

/// The fields of a service account JSON key this client needs.
#[derive(Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type")]
    pub key_type: String,
    pub project_id: Option<String>,
    pub private_key_id: Option<String>,
    pub private_key: String,
    pub client_email: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Debug, Serialize, PartialEq)]
pub(crate) struct Claims {
    iss: String,
    scope: &'static str,
    aud: String,
    iat: i64,
    exp: i64,
}

impl ServiceAccountKey {
    pub fn parse(json: &str) -> Result<Self, Error> {
        let key = serde_json::from_str::<Self>(json)
            .map_err(|err| Error::Credential(err.to_string()))?;
        if key.key_type != "service_account" {
            return Err(Error::Credential(format!(
                "expected a service_account key, found {}",
                key.key_type
            )));
        }
        Ok(key)
    }

    pub async fn load(path: &Path) -> Result<Self, Error> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| Error::File {
                path: path.to_path_buf(),
                source,
            })?;
        Self::parse(&content)
    }

    pub(crate) fn claims(&self, now: i64) -> Claims {
        Claims {
            iss: self.client_email.clone(),
            scope: DATASTORE_SCOPE,
            aud: self.token_uri.clone(),
            iat: now,
            exp: now + ASSERTION_VALIDITY_SECONDS,
        }
    }

    /// Signed RS256 JWT exchanged for an access token.
    pub fn assertion(&self, now: i64) -> Result<String, Error> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.private_key_id.clone();
        let key = EncodingKey::from_rsa_pem(self.private_key.as_bytes())?;
        Ok(encode(&header, &self.claims(now), &key)?)
    }
}

pub(crate) struct Authorization {
    pub(crate) bearer_token: HeaderValue,
    pub(crate) expires_at: i64,
}

impl Authorization {
    fn is_fresh(&self, now: i64) -> bool {
        now + REFRESH_MARGIN_SECONDS < self.expires_at
    }
}

#[derive(Deserialize)]
struct Token {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
    // token_type: String,
}

fn default_expires_in() -> i64 {
    ASSERTION_VALIDITY_SECONDS
}

#[derive(Deserialize)]
struct TokenError {
    error: String,
    #[serde(default)]
    error_description: String,
}

/// Hands out bearer tokens for a service account, reusing one until shortly before it expires.
pub struct TokenSource {
    key: ServiceAccountKey,
    authorization: Pinboard<Authorization>,
}

impl TokenSource {
    pub fn new(key: ServiceAccountKey) -> Self {
        Self {
            key,
            authorization: Pinboard::new_empty(),
        }
    }

    pub fn project_id(&self) -> Option<&str> {
        self.key.project_id.as_deref()
    }

    pub async fn bearer_token(&self, client: &Client) -> Result<HeaderValue, Error> {
        let now = Utc::now().timestamp();
        if let Some(bearer_token) = self.cached(now) {
            return Ok(bearer_token);
        }
        let authorization = request_access_token(client, &self.key, now).await?;
        let bearer_token = authorization.bearer_token.clone();
        self.authorization.set(authorization);
        Ok(bearer_token)
    }

    fn cached(&self, now: i64) -> Option<HeaderValue> {
        self.authorization
            .get_ref()
            .filter(|it| it.is_fresh(now))
            .map(|it| it.bearer_token.clone())
    }
}

async fn request_access_token(
    client: &Client,
    key: &ServiceAccountKey,
    now: i64,
) -> Result<Authorization, Error> {
    let assertion = key.assertion(now)?;
    let mut params = BTreeMap::new();
    params.insert("grant_type", JWT_BEARER_GRANT_TYPE);
    params.insert("assertion", assertion.as_str());
    debug!("POST {}", key.token_uri);
    let response = client.post(&key.token_uri).form(&params).send().await?;
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        return Err(match serde_json::from_str::<TokenError>(&text) {
            Ok(err) => Error::Status {
                status: status.as_u16(),
                code: err.error,
                message: err.error_description,
            },
            Err(_) => Error::Status {
                status: status.as_u16(),
                code: status.canonical_reason().unwrap_or("UNKNOWN").to_string(),
                message: text,
            },
        });
    }
    let token = serde_json::from_str::<Token>(&text)
        .map_err(|err| Error::Decode(format!("failed to parse token response: {err}")))?;
    let bearer_token = HeaderValue::try_from(format!("Bearer {}", token.access_token))
        .map_err(|_| Error::Decode("access token is not a valid header value".to_string()))?;
    Ok(Authorization {
        bearer_token,
        expires_at: now + token.expires_in,
    })
}
