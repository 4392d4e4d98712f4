//! Data policy carried inside an encrypted payload
//!
//! The shapes follow the TDF policy object:
//!
//! ```json
//! {
//!   "uuid": "1111-2222-33333-44444-abddef-timestamp",
//!   "body": {
//!     "dataAttributes": [{ "attribute": "https://example.com/attr/classification/value/topsecret" }],
//!     "dissem": ["user-id@domain.com"]
//!   },
//!   "tdf_spec_version": "x.y.z"
//! }
//! ```
//!
//! Decoding is permissive: unknown fields are ignored and missing or `null`
//! fields read as empty. Use [`Policy::validate`] for the strict reading.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Validation error with structured information
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub error_type: ValidationErrorType,
    pub message: String,
    pub suggestion: Option<String>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, " (suggestion: {})", suggestion)?;
        }
        Ok(())
    }
}

/// Types of validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorType {
    Required,
    InvalidFormat,
    InvalidUuid,
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("Policy validation failed with {} error(s)", .0.len())]
    ValidationFailed(Vec<ValidationError>),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl PolicyError {
    /// Returns a suggestion for how to fix this error, if available
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            PolicyError::ValidationFailed(errors) if !errors.is_empty() => {
                errors[0].suggestion.as_deref()
            }
            _ => None,
        }
    }

    /// Returns a stable error code for programmatic error handling
    pub fn error_code(&self) -> &'static str {
        match self {
            PolicyError::ValidationFailed(_) => "OPENTDF_E_POLICY_VALIDATION",
            PolicyError::SerializationError(_) => "OPENTDF_E_POLICY_SERIALIZATION",
        }
    }
}

/// One data attribute, identified by its URI
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Attribute {
    #[serde(default)]
    pub attribute: String,
}

impl Attribute {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            attribute: uri.into(),
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.attribute)
    }
}

/// Ordered data attributes plus the dissemination list
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyBody {
    #[serde(
        rename = "dataAttributes",
        default,
        deserialize_with = "deserialize_null_as_empty_vec"
    )]
    pub data_attributes: Vec<Attribute>,
    #[serde(default, deserialize_with = "deserialize_null_as_empty_vec")]
    pub dissem: Vec<String>,
}

/// Deserialize null as empty Vec, as other SDKs emit `null` for empty lists
fn deserialize_null_as_empty_vec<'de, T, D>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    T: serde::Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    let opt = Option::<Vec<T>>::deserialize(deserializer)?;
    Ok(opt.unwrap_or_default())
}

/// A decoded data policy
///
/// Immutable in practice: it is a read projection of what the encrypting
/// party embedded in the payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub body: PolicyBody,
    #[serde(default)]
    pub tdf_spec_version: String,
}

impl Policy {
    pub fn new(
        uuid: impl Into<String>,
        data_attributes: Vec<Attribute>,
        dissem: Vec<String>,
        tdf_spec_version: impl Into<String>,
    ) -> Self {
        Self {
            uuid: uuid.into(),
            body: PolicyBody {
                data_attributes,
                dissem,
            },
            tdf_spec_version: tdf_spec_version.into(),
        }
    }

    /// Parse a policy document permissively
    pub fn from_json(json: &str) -> Result<Self, PolicyError> {
        serde_json::from_str(json).map_err(PolicyError::from)
    }

    pub fn to_json(&self) -> Result<String, PolicyError> {
        serde_json::to_string(self).map_err(PolicyError::from)
    }

    /// Serialize with a four-space indent
    pub fn to_json_pretty(&self) -> Result<String, PolicyError> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.serialize(&mut serializer)?;
        // serde_json only ever writes UTF-8
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    /// Attribute URIs in policy order
    pub fn attribute_uris(&self) -> Vec<&str> {
        self.body
            .data_attributes
            .iter()
            .map(|a| a.attribute.as_str())
            .collect()
    }

    /// Check the fields the permissive decoder lets through empty
    ///
    /// - `uuid` must be present and free of whitespace
    /// - `tdf_spec_version` must be present
    /// - every attribute must carry a non-empty URI
    /// - dissemination entries must be non-empty
    pub fn validate(&self) -> Result<(), PolicyError> {
        let mut errors = Vec::new();

        if self.uuid.trim().is_empty() {
            errors.push(ValidationError {
                field: "uuid".to_string(),
                error_type: ValidationErrorType::Required,
                message: "Policy has no uuid".to_string(),
                suggestion: Some("Use PolicyBuilder::id_auto() to generate a UUID".to_string()),
            });
        } else if self.uuid.chars().any(char::is_whitespace) {
            // Identifiers are not always RFC 4122, so only reject the clearly broken
            errors.push(ValidationError {
                field: "uuid".to_string(),
                error_type: ValidationErrorType::InvalidUuid,
                message: format!("Malformed policy identifier: {}", self.uuid),
                suggestion: None,
            });
        }

        if self.tdf_spec_version.trim().is_empty() {
            errors.push(ValidationError {
                field: "tdf_spec_version".to_string(),
                error_type: ValidationErrorType::Required,
                message: "Policy has no spec version".to_string(),
                suggestion: None,
            });
        }

        for (idx, attr) in self.body.data_attributes.iter().enumerate() {
            if attr.attribute.trim().is_empty() {
                errors.push(ValidationError {
                    field: format!("body.dataAttributes[{}]", idx),
                    error_type: ValidationErrorType::InvalidFormat,
                    message: "Empty attribute URI".to_string(),
                    suggestion: Some("Remove empty attributes".to_string()),
                });
            }
        }

        for (idx, entity) in self.body.dissem.iter().enumerate() {
            if entity.trim().is_empty() {
                errors.push(ValidationError {
                    field: format!("body.dissem[{}]", idx),
                    error_type: ValidationErrorType::InvalidFormat,
                    message: "Empty dissemination entity".to_string(),
                    suggestion: Some("Remove empty entries from dissemination list".to_string()),
                });
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(PolicyError::ValidationFailed(errors))
        }
    }
}

/// Builder for creating Policy instances
///
/// # Example
///
/// ```
/// use opentdf_client::PolicyBuilder;
///
/// let policy = PolicyBuilder::new()
///     .id_auto()
///     .attribute("https://example.com/attr/Classification/value/C")
///     .dissem("user@example.com")
///     .build();
/// assert_eq!(policy.body.data_attributes.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct PolicyBuilder {
    uuid: Option<String>,
    attributes: Vec<Attribute>,
    dissem: Vec<String>,
    spec_version: Option<String>,
}

impl PolicyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn id(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    /// Auto-generate a UUID v4 for the policy
    #[must_use]
    pub fn id_auto(mut self) -> Self {
        self.uuid = Some(uuid::Uuid::new_v4().to_string());
        self
    }

    #[must_use]
    pub fn attribute(mut self, uri: impl Into<String>) -> Self {
        self.attributes.push(Attribute::new(uri));
        self
    }

    #[must_use]
    pub fn attributes(mut self, uris: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.attributes.extend(uris.into_iter().map(Attribute::new));
        self
    }

    #[must_use]
    pub fn dissem(mut self, target: impl Into<String>) -> Self {
        self.dissem.push(target.into());
        self
    }

    #[must_use]
    pub fn dissemination(mut self, targets: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.dissem.extend(targets.into_iter().map(|t| t.into()));
        self
    }

    #[must_use]
    pub fn spec_version(mut self, version: impl Into<String>) -> Self {
        self.spec_version = Some(version.into());
        self
    }

    /// Build the Policy, generating a UUID if none was set
    pub fn build(self) -> Policy {
        Policy {
            uuid: self
                .uuid
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            body: PolicyBody {
                data_attributes: self.attributes,
                dissem: self.dissem,
            },
            tdf_spec_version: self.spec_version.unwrap_or_default(),
        }
    }
}
