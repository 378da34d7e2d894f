use crate::error::Error;
use crate::firestore::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    Enum,
    Number,
    String,
    Other(String),
}

impl FieldType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Enum => "enum",
            Self::Number => "number",
            Self::String => "string",
            Self::Other(name) => name.as_str(),
        }
    }
}

impl From<String> for FieldType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "enum" => Self::Enum,
            "number" => Self::Number,
            "string" => Self::String,
            _ => Self::Other(value),
        }
    }
}

impl From<FieldType> for String {
    fn from(value: FieldType) -> Self {
        match value {
            FieldType::Other(name) => name,
            it => it.as_str().to_string(),
        }
    }
}

impl Display for FieldType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tenant-configurable input field.
///
/// `options` only means something for [`FieldType::Enum`] and `max_length` for
/// [`FieldType::String`], but neither is checked against the type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    pub key: String,
    pub label: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u32>,
}

impl From<&FieldDefinition> for Value {
    fn from(field: &FieldDefinition) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("key".to_string(), Value::from(field.key.as_str()));
        fields.insert("label".to_string(), Value::from(field.label.as_str()));
        fields.insert("type".to_string(), Value::from(field.field_type.as_str()));
        if let Some(ref options) = field.options {
            fields.insert(
                "options".to_string(),
                Value::array(options.iter().map(|it| Value::from(it.as_str()))),
            );
        }
        fields.insert("required".to_string(), Value::BooleanValue(field.required));
        if let Some(max_length) = field.max_length {
            fields.insert("maxLength".to_string(), Value::IntegerValue(max_length.into()));
        }
        Value::map(fields)
    }
}

fn enum_field(key: &str, label: &str, options: &[&str]) -> FieldDefinition {
    FieldDefinition {
        key: key.to_string(),
        label: label.to_string(),
        field_type: FieldType::Enum,
        options: Some(options.iter().map(|it| it.to_string()).collect()),
        required: false,
        max_length: None,
    }
}

/// The four fee fields written when no definitions file is configured.
pub fn fees_fields() -> Vec<FieldDefinition> {
    vec![
        enum_field(
            "feeType",
            "Fee Type",
            &["Tuition", "Library", "Transport", "Exam", "Hostel", "Other"],
        ),
        enum_field(
            "paymentMethod",
            "Payment Method",
            &["Cash", "Online", "Cheque", "DD"],
        ),
        FieldDefinition {
            key: "installmentNo".to_string(),
            label: "Installment Number".to_string(),
            field_type: FieldType::Number,
            options: None,
            required: false,
            max_length: None,
        },
        FieldDefinition {
            key: "remarks".to_string(),
            label: "Remarks".to_string(),
            field_type: FieldType::String,
            options: None,
            required: false,
            max_length: Some(200),
        },
    ]
}

pub fn parse_fields(json: &str) -> Result<Vec<FieldDefinition>, Error> {
    serde_json::from_str(json).map_err(|err| Error::Fields(err.to_string()))
}

pub async fn load_fields(path: &Path) -> Result<Vec<FieldDefinition>, Error> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| Error::File {
            path: path.to_path_buf(),
            source,
        })?;
    parse_fields(&content)
}
