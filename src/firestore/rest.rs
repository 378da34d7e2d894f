use crate::env::Settings;
use crate::error::Error;
use crate::firestore::credential::{ServiceAccountKey, TokenSource};
use crate::firestore::value::Value;
use crate::firestore::{Document, DocumentPath, DocumentStore, Precondition};
use crate::http_client::json_client;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, info};

const EMULATOR_BEARER_TOKEN: HeaderValue = HeaderValue::from_static("Bearer owner");

enum Credentials {
    ServiceAccount(TokenSource),
    Emulator,
}

/// Firestore v1 REST client for the `(default)` database of one project.
pub struct FirestoreClient {
    client: Client,
    documents_url: String,
    credentials: Credentials,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorStatus,
}

#[derive(Deserialize)]
struct ErrorStatus {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

impl FirestoreClient {
    pub async fn connect(settings: &Settings) -> Result<Self, Error> {
        let (credentials, endpoint, project_id) = match settings.emulator_host.as_deref() {
            Some(host) => {
                info!("using firestore emulator at {host}");
                (Credentials::Emulator, format!("http://{host}/v1"), None)
            }
            None => {
                let path = settings.credentials.as_deref().ok_or_else(|| {
                    Error::Config(
                        "GOOGLE_APPLICATION_CREDENTIALS is not set and no emulator is configured"
                            .to_string(),
                    )
                })?;
                let key = ServiceAccountKey::load(path).await?;
                debug!("loaded service account {}", key.client_email);
                let source = TokenSource::new(key);
                let project_id = source.project_id().map(str::to_string);
                (
                    Credentials::ServiceAccount(source),
                    settings.endpoint.clone(),
                    project_id,
                )
            }
        };
        let project_id = settings
            .project_id
            .clone()
            .or(project_id)
            .ok_or_else(|| Error::Config("FIRESTORE_PROJECT_ID is not set".to_string()))?;
        let client = json_client(matches!(credentials, Credentials::ServiceAccount(_)))?;
        Ok(Self {
            client,
            documents_url: documents_url(&endpoint, &project_id),
            credentials,
        })
    }

    async fn bearer_token(&self) -> Result<HeaderValue, Error> {
        match &self.credentials {
            Credentials::ServiceAccount(source) => source.bearer_token(&self.client).await,
            Credentials::Emulator => Ok(EMULATOR_BEARER_TOKEN),
        }
    }
}

impl DocumentStore for FirestoreClient {
    async fn get(&self, path: &DocumentPath) -> Result<Option<Document>, Error> {
        let url = document_url(&self.documents_url, path)?;
        debug!("GET {}", url.as_str());
        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, self.bearer_token().await?)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            // a missing project or database is also a 404
            let err = status_error(StatusCode::NOT_FOUND, &response.text().await?);
            return if is_missing_document(&err, path) {
                Ok(None)
            } else {
                Err(err)
            };
        }
        let document = checked(response)
            .await?
            .json::<Document>()
            .await
            .map_err(|err| Error::Decode(format!("failed to parse document {path}: {err}")))?;
        Ok(Some(document))
    }

    async fn update(
        &self,
        path: &DocumentPath,
        field: &str,
        value: Value,
        precondition: Precondition,
    ) -> Result<Document, Error> {
        let url = update_url(&self.documents_url, path, field, &precondition)?;
        debug!("PATCH {}", url.as_str());
        let mut fields = BTreeMap::new();
        fields.insert(field, value);
        let response = self
            .client
            .patch(url)
            .header(AUTHORIZATION, self.bearer_token().await?)
            .json(&json!({ "fields": fields }))
            .send()
            .await?;
        match checked(response).await {
            Ok(response) => response
                .json::<Document>()
                .await
                .map_err(|err| Error::Decode(format!("failed to parse document {path}: {err}"))),
            Err(Error::Status { code, .. })
                if code == "FAILED_PRECONDITION"
                    && matches!(precondition, Precondition::UpdateTime(_)) =>
            {
                Err(Error::Conflict(path.to_string()))
            }
            Err(err) => Err(err),
        }
    }
}

fn documents_url(endpoint: &str, project_id: &str) -> String {
    format!(
        "{}/projects/{project_id}/databases/(default)/documents",
        endpoint.trim_end_matches('/')
    )
}

fn document_url(documents_url: &str, path: &DocumentPath) -> Result<Url, Error> {
    let mut url = Url::parse(documents_url)
        .map_err(|err| Error::Config(format!("invalid firestore endpoint: {err}")))?;
    url.path_segments_mut()
        .map_err(|_| Error::Config(format!("invalid firestore endpoint: {documents_url}")))?
        .push(&path.collection)
        .push(&path.id);
    Ok(url)
}

fn update_url(
    documents_url: &str,
    path: &DocumentPath,
    field: &str,
    precondition: &Precondition,
) -> Result<Url, Error> {
    let mut url = document_url(documents_url, path)?;
    let mut query = url.query_pairs_mut();
    query.append_pair("updateMask.fieldPaths", field);
    match precondition {
        Precondition::Exists => query.append_pair("currentDocument.exists", "true"),
        Precondition::UpdateTime(update_time) => {
            query.append_pair("currentDocument.updateTime", update_time)
        }
    };
    drop(query);
    Ok(url)
}

fn is_missing_document(err: &Error, path: &DocumentPath) -> bool {
    match err {
        Error::Status { code, message, .. } => {
            code == "NOT_FOUND"
                && message.starts_with("Document ")
                && message.contains(&format!("/documents/{path}\""))
        }
        _ => false,
    }
}

async fn checked(response: Response) -> Result<Response, Error> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let text = response.text().await?;
    Err(status_error(status, &text))
}

fn status_error(status: StatusCode, body: &str) -> Error {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(ErrorEnvelope { error }) => Error::Status {
            status: status.as_u16(),
            code: error.status,
            message: error.message,
        },
        Err(_) => Error::Status {
            status: status.as_u16(),
            code: status.canonical_reason().unwrap_or("UNKNOWN").to_string(),
            message: body.to_string(),
        },
    }
}
