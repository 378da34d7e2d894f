use crate::custom_field::FieldDefinition;
use crate::env::Settings;
use crate::error::Error;
use crate::firestore::rest::FirestoreClient;
use crate::firestore::value::Value;
use crate::firestore::{DocumentPath, DocumentStore, Precondition};
use crate::organization::{merge_custom_fields, CUSTOM_FIELDS};
use std::io::Write;
use tracing::{debug, error, info};

pub struct CustomFieldsUpdate<'a> {
    pub organization: &'a DocumentPath,
    pub category: &'a str,
    pub fields: &'a [FieldDefinition],
    /// Write only if the document is still at the update time that was read.
    pub guard_concurrent_writes: bool,
}

#[derive(Debug, PartialEq)]
pub enum Outcome {
    NotFound,
    Updated {
        category: String,
        fields: Vec<FieldDefinition>,
    },
}

/// Replaces one category of the organization's `customFields`, leaving the rest of the
/// document as it is. A missing organization is not an error and nothing is written.
pub async fn add_custom_fields<S: DocumentStore>(
    store: &S,
    update: &CustomFieldsUpdate<'_>,
) -> Result<Outcome, Error> {
    let Some(document) = store.get(update.organization).await? else {
        info!("{} does not exist", update.organization);
        return Ok(Outcome::NotFound);
    };
    let custom_fields = merge_custom_fields(&document, update.category, update.fields);
    debug!(
        "{} categories in {CUSTOM_FIELDS} of {}",
        custom_fields.len(),
        update.organization
    );
    let precondition = match document.update_time {
        Some(update_time) if update.guard_concurrent_writes => {
            Precondition::UpdateTime(update_time)
        }
        _ => Precondition::Exists,
    };
    store
        .update(
            update.organization,
            CUSTOM_FIELDS,
            Value::map(custom_fields),
            precondition,
        )
        .await?;
    info!(
        "set {CUSTOM_FIELDS}.{} of {} ({} fields)",
        update.category,
        update.organization,
        update.fields.len()
    );
    Ok(Outcome::Updated {
        category: update.category.to_string(),
        fields: update.fields.to_vec(),
    })
}

/// Loads the field definitions, connects and applies the update described by `settings`.
pub async fn run(settings: &Settings) -> Result<Outcome, Error> {
    let fields = settings.field_definitions().await?;
    let store = FirestoreClient::connect(settings).await?;
    add_custom_fields(
        &store,
        &CustomFieldsUpdate {
            organization: &settings.organization,
            category: &settings.category,
            fields: &fields,
            guard_concurrent_writes: settings.guard_concurrent_writes,
        },
    )
    .await
}

/// Parses the settings from `lookup` and runs them, returning the result with its exit status.
///
/// `STRICT_EXIT_STATUS` is honoured even when another variable fails to parse.
pub async fn run_configured(lookup: impl Fn(&str) -> Option<String>) -> (Result<Outcome, Error>, u8) {
    let strict = Settings::strict_exit_status_from_lookup(&lookup);
    let result = match Settings::from_lookup(&lookup) {
        Ok(settings) => run(&settings).await,
        Err(err) => Err(err),
    };
    let status = exit_status(&result, strict);
    (result, status)
}

/// Console lines for the outcome of a run.
pub fn report(
    result: &Result<Outcome, Error>,
    out: &mut impl Write,
    err: &mut impl Write,
) -> std::io::Result<()> {
    match result {
        Ok(Outcome::NotFound) => writeln!(out, "Organization not found"),
        Ok(Outcome::Updated { category, fields }) => {
            writeln!(out, "✅ Added custom fields for {category} successfully!")?;
            writeln!(out, "Custom fields added:")?;
            for field in fields {
                writeln!(out, "  - {} ({})", field.label, field.field_type)?;
            }
            Ok(())
        }
        Err(failure) => {
            error!("{failure:?}");
            writeln!(err, "Error: {failure}")
        }
    }
}

/// Always 0 unless `strict`, in which case failures map to 1.
pub fn exit_status(result: &Result<Outcome, Error>, strict: bool) -> u8 {
    match result {
        Err(_) if strict => 1,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custom_field::fees_fields;
    use crate::firestore::memory::MemoryStore;
    use std::collections::BTreeMap;

    fn organization() -> DocumentPath {
        DocumentPath::new("orgs", "demo")
    }

    fn store(custom_fields: Option<Value>) -> MemoryStore {
        let store = MemoryStore::default();
        let mut fields = BTreeMap::new();
        fields.insert("name".to_string(), Value::from("Demo School"));
        fields.insert("plan".to_string(), Value::from("trial"));
        if let Some(custom_fields) = custom_fields {
            fields.insert(CUSTOM_FIELDS.to_string(), custom_fields);
        }
        store.insert(&organization(), fields);
        store
    }

    async fn apply(store: &MemoryStore, guard_concurrent_writes: bool) -> Result<Outcome, Error> {
        let organization = organization();
        let fields = fees_fields();
        add_custom_fields(
            store,
            &CustomFieldsUpdate {
                organization: &organization,
                category: "fees",
                fields: &fields,
                guard_concurrent_writes,
            },
        )
        .await
    }

    fn custom_fields(store: &MemoryStore) -> BTreeMap<String, Value> {
        store
            .document(&organization())
            .and_then(|it| it.fields.get(CUSTOM_FIELDS).and_then(Value::as_map).cloned())
            .expect("missing customFields")
    }

    fn fees_value() -> Value {
        Value::array(fees_fields().iter().map(Value::from))
    }

    fn printed(result: &Result<Outcome, Error>) -> (String, String) {
        let mut out = Vec::new();
        let mut err = Vec::new();
        report(result, &mut out, &mut err).unwrap();
        (
            String::from_utf8(out).unwrap(),
            String::from_utf8(err).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_absent_custom_fields() {
        let store = store(None);
        let outcome = apply(&store, false).await.unwrap();
        assert_eq!(
            outcome,
            Outcome::Updated {
                category: "fees".to_string(),
                fields: fees_fields(),
            }
        );
        let custom_fields = custom_fields(&store);
        assert_eq!(custom_fields.len(), 1);
        assert_eq!(custom_fields.get("fees"), Some(&fees_value()));
        let document = store.document(&organization()).unwrap();
        assert_eq!(document.fields.get("plan"), Some(&Value::from("trial")));
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn test_existing_categories() {
        let other = Value::array([Value::map(BTreeMap::from([
            ("key".to_string(), Value::from("rollNo")),
            ("maxLength".to_string(), Value::IntegerValue(12)),
        ]))]);
        let store = store(Some(Value::map(BTreeMap::from([
            ("other".to_string(), other.clone()),
            ("fees".to_string(), Value::array([Value::from("legacy")])),
        ]))));
        apply(&store, false).await.unwrap();
        let custom_fields = custom_fields(&store);
        assert_eq!(custom_fields.len(), 2);
        assert_eq!(custom_fields.get("other"), Some(&other));
        assert_eq!(custom_fields.get("fees"), Some(&fees_value()));
    }

    #[tokio::test]
    async fn test_not_found() {
        let store = MemoryStore::default();
        let result = apply(&store, false).await;
        assert!(matches!(result, Ok(Outcome::NotFound)));
        assert_eq!(store.writes(), 0);
        assert_eq!(
            printed(&result),
            ("Organization not found\n".to_string(), String::new())
        );
        assert_eq!(exit_status(&result, false), 0);
        assert_eq!(exit_status(&result, true), 0);
    }

    #[tokio::test]
    async fn test_idempotent() {
        let store = store(None);
        apply(&store, false).await.unwrap();
        let first = custom_fields(&store);
        apply(&store, false).await.unwrap();
        assert_eq!(custom_fields(&store), first);
        assert_eq!(store.writes(), 2);
    }

    #[tokio::test]
    async fn test_success_report() {
        let store = store(None);
        let result = apply(&store, false).await;
        let (out, err) = printed(&result);
        assert_eq!(
            out,
            "✅ Added custom fields for fees successfully!\n\
             Custom fields added:\n  \
             - Fee Type (enum)\n  \
             - Payment Method (enum)\n  \
             - Installment Number (number)\n  \
             - Remarks (string)\n"
        );
        assert!(err.is_empty());
        assert_eq!(exit_status(&result, false), 0);
    }

    // a failed write is only visible on stderr: the exit status stays 0 unless strict
    #[tokio::test]
    async fn test_write_failure_still_exits_zero() {
        let mut store = store(None);
        store.fail_writes = true;
        let result = apply(&store, false).await;
        assert!(matches!(result, Err(Error::Status { status: 503, .. })));
        assert_eq!(store.writes(), 1);
        assert!(store
            .document(&organization())
            .unwrap()
            .fields
            .get(CUSTOM_FIELDS)
            .is_none());
        let (out, err) = printed(&result);
        assert!(out.is_empty());
        assert_eq!(
            err,
            "Error: 503 UNAVAILABLE: The service is currently unavailable.\n"
        );
        assert_eq!(exit_status(&result, false), 0);
        assert_eq!(exit_status(&result, true), 1);
    }

    fn lookup(vars: &[(&'static str, &'static str)]) -> impl Fn(&str) -> Option<String> {
        let vars = vars.to_vec();
        move |name: &str| {
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.to_string())
        }
    }

    #[tokio::test]
    async fn test_configuration_error_exit_status() {
        let (result, status) =
            run_configured(lookup(&[("STRICT_EXIT_STATUS", "true"), ("ORG_ID", "a/b")])).await;
        assert!(matches!(result, Err(Error::Config(_))));
        assert_eq!(status, 1);
        let (out, err) = printed(&result);
        assert!(out.is_empty());
        assert_eq!(
            err,
            "Error: configuration error: ORG_ID must not contain '/', found a/b\n"
        );
        let (result, status) = run_configured(lookup(&[("ORG_ID", "a/b")])).await;
        assert!(result.is_err());
        assert_eq!(status, 0);
    }

    #[tokio::test]
    async fn test_missing_credentials_exit_status() {
        let (result, status) = run_configured(lookup(&[("STRICT_EXIT_STATUS", "1")])).await;
        assert!(matches!(result, Err(Error::Config(_))));
        assert_eq!(status, 1);
    }

    #[tokio::test]
    async fn test_concurrent_write_is_overwritten_by_default() {
        let mut store = store(None);
        store.concurrent_writer = true;
        assert!(apply(&store, false).await.is_ok());
        assert_eq!(custom_fields(&store).get("fees"), Some(&fees_value()));
    }

    #[tokio::test]
    async fn test_guarded_write_detects_concurrent_write() {
        let mut store = store(None);
        store.concurrent_writer = true;
        let result = apply(&store, true).await;
        assert!(matches!(result, Err(Error::Conflict(ref path)) if path == "orgs/demo"));
        assert!(store
            .document(&organization())
            .unwrap()
            .fields
            .get(CUSTOM_FIELDS)
            .is_none());
    }

    #[tokio::test]
    async fn test_guarded_write() {
        let store = store(None);
        assert!(apply(&store, true).await.is_ok());
        assert_eq!(custom_fields(&store).len(), 1);
    }
}
