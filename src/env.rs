use crate::custom_field::{fees_fields, load_fields, FieldDefinition};
use crate::error::Error;
use crate::firestore::DocumentPath;
use std::path::PathBuf;
use tracing::debug;

pub const DEFAULT_ENDPOINT: &str = "https://firestore.googleapis.com/v1";
const DEFAULT_COLLECTION: &str = "orgs";
const DEFAULT_ORGANIZATION_ID: &str = "demo";
const DEFAULT_CATEGORY: &str = "fees";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigurationKey {
    Credentials,
    ProjectId,
    Endpoint,
    EmulatorHost,
    Collection,
    OrganizationId,
    Category,
    FieldsFile,
    GuardConcurrentWrites,
    StrictExitStatus,
}

impl ConfigurationKey {
    pub const ALL: [ConfigurationKey; 10] = [
        Self::Credentials,
        Self::ProjectId,
        Self::Endpoint,
        Self::EmulatorHost,
        Self::Collection,
        Self::OrganizationId,
        Self::Category,
        Self::FieldsFile,
        Self::GuardConcurrentWrites,
        Self::StrictExitStatus,
    ];

    pub fn variable_name(self) -> &'static str {
        match self {
            Self::Credentials => "GOOGLE_APPLICATION_CREDENTIALS",
            Self::ProjectId => "FIRESTORE_PROJECT_ID",
            Self::Endpoint => "FIRESTORE_ENDPOINT",
            Self::EmulatorHost => "FIRESTORE_EMULATOR_HOST",
            Self::Collection => "ORG_COLLECTION",
            Self::OrganizationId => "ORG_ID",
            Self::Category => "CUSTOM_FIELDS_CATEGORY",
            Self::FieldsFile => "CUSTOM_FIELDS_FILE",
            Self::GuardConcurrentWrites => "GUARD_CONCURRENT_WRITES",
            Self::StrictExitStatus => "STRICT_EXIT_STATUS",
        }
    }
}

/// Everything a run needs to know, read from the environment.
///
/// | Variable                         | Default                               |
/// |----------------------------------|---------------------------------------|
/// | `GOOGLE_APPLICATION_CREDENTIALS` | required unless using the emulator    |
/// | `FIRESTORE_PROJECT_ID`           | `project_id` of the credential        |
/// | `FIRESTORE_ENDPOINT`             | `https://firestore.googleapis.com/v1` |
/// | `FIRESTORE_EMULATOR_HOST`        | --                                    |
/// | `ORG_COLLECTION`                 | `orgs`                                |
/// | `ORG_ID`                         | `demo`                                |
/// | `CUSTOM_FIELDS_CATEGORY`         | `fees`                                |
/// | `CUSTOM_FIELDS_FILE`             | built-in fee fields                   |
/// | `GUARD_CONCURRENT_WRITES`        | `false`                               |
/// | `STRICT_EXIT_STATUS`             | `false`                               |
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub credentials: Option<PathBuf>,
    pub project_id: Option<String>,
    pub endpoint: String,
    pub emulator_host: Option<String>,
    pub organization: DocumentPath,
    pub category: String,
    pub fields_file: Option<PathBuf>,
    pub guard_concurrent_writes: bool,
    pub strict_exit_status: bool,
}

impl Settings {
    /// `STRICT_EXIT_STATUS` on its own, so that a run failing on any other
    /// variable still exits with the requested status. Invalid values count as unset.
    pub fn strict_exit_status_from_lookup(lookup: impl Fn(&str) -> Option<String>) -> bool {
        flag(&lookup, ConfigurationKey::StrictExitStatus).unwrap_or(false)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let get = |key: ConfigurationKey| value(&lookup, key);
        let collection = segment(
            ConfigurationKey::Collection,
            get(ConfigurationKey::Collection).unwrap_or(DEFAULT_COLLECTION.to_string()),
        )?;
        let id = segment(
            ConfigurationKey::OrganizationId,
            get(ConfigurationKey::OrganizationId).unwrap_or(DEFAULT_ORGANIZATION_ID.to_string()),
        )?;
        Ok(Self {
            credentials: get(ConfigurationKey::Credentials).map(PathBuf::from),
            project_id: get(ConfigurationKey::ProjectId),
            endpoint: get(ConfigurationKey::Endpoint).unwrap_or(DEFAULT_ENDPOINT.to_string()),
            emulator_host: get(ConfigurationKey::EmulatorHost),
            organization: DocumentPath { collection, id },
            category: get(ConfigurationKey::Category).unwrap_or(DEFAULT_CATEGORY.to_string()),
            fields_file: get(ConfigurationKey::FieldsFile).map(PathBuf::from),
            guard_concurrent_writes: flag(&lookup, ConfigurationKey::GuardConcurrentWrites)?,
            strict_exit_status: flag(&lookup, ConfigurationKey::StrictExitStatus)?,
        })
    }

    /// The configured definitions file, or the built-in fee fields.
    pub async fn field_definitions(&self) -> Result<Vec<FieldDefinition>, Error> {
        match self.fields_file.as_deref() {
            Some(path) => load_fields(path).await,
            None => Ok(fees_fields()),
        }
    }
}

/// Loads `.env` from the working directory into the process environment, if present.
pub fn load_dotenv() -> Result<(), Error> {
    match dotenvy::dotenv() {
        Ok(path) => debug!("loaded {}", path.display()),
        Err(err) if err.not_found() => {}
        Err(err) => return Err(Error::Config(format!("failed to load .env: {err}"))),
    }
    Ok(())
}

fn value(lookup: &impl Fn(&str) -> Option<String>, key: ConfigurationKey) -> Option<String> {
    lookup(key.variable_name())
        .map(|it| it.trim().to_string())
        .filter(|it| !it.is_empty())
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, key: ConfigurationKey) -> Result<bool, Error> {
    match value(lookup, key) {
        None => Ok(false),
        Some(it) => parse_flag(&it).ok_or_else(|| {
            Error::Config(format!("{} must be a boolean, found {it}", key.variable_name()))
        }),
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn segment(key: ConfigurationKey, value: String) -> Result<String, Error> {
    if value.contains('/') {
        Err(Error::Config(format!(
            "{} must not contain '/', found {value}",
            key.variable_name()
        )))
    } else {
        Ok(value)
    }
}
