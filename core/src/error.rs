//! Error types for the SuiteCRM client.
//!
//! # Design
//! SuiteCRM reports business failures in-band: the HTTP status is 200 and the
//! body is a `{name, description, number}` object. Those land in
//! `ApiError::Server` after `classify` has turned the numeric code into a
//! `FailureKind`. Transport and encoding problems get their own variants so
//! callers can tell "the server said no" apart from "we never got an answer".

use serde_json::Value;
use thiserror::Error;

/// Every failure kind the server documents, plus `Unknown` for the rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    NoError,
    InvalidLogin,
    InvalidSessionId,
    UserNotConfigured,
    InvalidPortalClient,
    ModuleDoesNotExist,
    FileDoesNotExist,
    ModuleNotSupported,
    RelationshipNotSupported,
    AccessDenied,
    DuplicateRecords,
    NoRecords,
    CannotAddOfflineClient,
    ClientDeactivated,
    NumberOfSessionsExceeded,
    UpgradeClient,
    AdminCredentialsRequired,
    CustomFieldTypeNotSupported,
    CustomFieldPropertyNotSupplied,
    ResourceManagementError,
    InvalidCall,
    InvalidDataFormat,
    InvalidSetCampaignMergeData,
    PasswordExpired,
    LdapAuthenticationFailed,
    Unknown,
}

/// Coarse grouping of failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCategory {
    Authentication,
    Authorization,
    Resource,
    Quota,
    MalformedRequest,
    Unknown,
}

/// Server error numbers and the kind each one stands for.
pub const ERROR_CODES: &[(i64, FailureKind)] = &[
    (0, FailureKind::NoError),
    (10, FailureKind::InvalidLogin),
    (11, FailureKind::InvalidSessionId),
    (12, FailureKind::UserNotConfigured),
    (13, FailureKind::InvalidPortalClient),
    (20, FailureKind::ModuleDoesNotExist),
    (21, FailureKind::FileDoesNotExist),
    (30, FailureKind::ModuleNotSupported),
    (31, FailureKind::RelationshipNotSupported),
    (40, FailureKind::AccessDenied),
    (50, FailureKind::DuplicateRecords),
    (51, FailureKind::NoRecords),
    (52, FailureKind::CannotAddOfflineClient),
    (53, FailureKind::ClientDeactivated),
    (60, FailureKind::NumberOfSessionsExceeded),
    (61, FailureKind::UpgradeClient),
    (70, FailureKind::AdminCredentialsRequired),
    (80, FailureKind::CustomFieldTypeNotSupported),
    (81, FailureKind::CustomFieldPropertyNotSupplied),
    (90, FailureKind::ResourceManagementError),
    (1000, FailureKind::InvalidCall),
    (1001, FailureKind::InvalidDataFormat),
    (1005, FailureKind::InvalidSetCampaignMergeData),
    (1009, FailureKind::PasswordExpired),
    (1012, FailureKind::LdapAuthenticationFailed),
];

impl FailureKind {
    /// Look up the kind for a server error number. Unlisted numbers are `Unknown`.
    pub fn from_code(code: i64) -> Self {
        ERROR_CODES
            .iter()
            .find(|(number, _)| *number == code)
            .map(|(_, kind)| *kind)
            .unwrap_or(FailureKind::Unknown)
    }

    /// The server error number for this kind, `None` for `Unknown`.
    pub fn code(self) -> Option<i64> {
        ERROR_CODES
            .iter()
            .find(|(_, kind)| *kind == self)
            .map(|(number, _)| *number)
    }

    pub fn category(self) -> FailureCategory {
        match self {
            FailureKind::InvalidLogin
            | FailureKind::InvalidSessionId
            | FailureKind::UserNotConfigured
            | FailureKind::InvalidPortalClient
            | FailureKind::PasswordExpired
            | FailureKind::LdapAuthenticationFailed => FailureCategory::Authentication,
            FailureKind::AccessDenied
            | FailureKind::ClientDeactivated
            | FailureKind::AdminCredentialsRequired => FailureCategory::Authorization,
            FailureKind::ModuleDoesNotExist
            | FailureKind::FileDoesNotExist
            | FailureKind::ModuleNotSupported
            | FailureKind::RelationshipNotSupported
            | FailureKind::DuplicateRecords
            | FailureKind::NoRecords => FailureCategory::Resource,
            FailureKind::CannotAddOfflineClient
            | FailureKind::NumberOfSessionsExceeded
            | FailureKind::ResourceManagementError => FailureCategory::Quota,
            FailureKind::UpgradeClient
            | FailureKind::CustomFieldTypeNotSupported
            | FailureKind::CustomFieldPropertyNotSupplied
            | FailureKind::InvalidCall
            | FailureKind::InvalidDataFormat
            | FailureKind::InvalidSetCampaignMergeData => FailureCategory::MalformedRequest,
            FailureKind::NoError | FailureKind::Unknown => FailureCategory::Unknown,
        }
    }
}

/// A business error declared by the server.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{name}: {description}")]
pub struct ServerError {
    pub kind: FailureKind,
    /// The raw error number, if the payload carried a readable one.
    pub number: Option<i64>,
    pub name: String,
    pub description: String,
}

/// Map a server error number to a typed error, keeping the text for diagnostics.
pub fn classify(number: Option<i64>, name: &str, description: &str) -> ServerError {
    ServerError {
        kind: number.map(FailureKind::from_code).unwrap_or(FailureKind::Unknown),
        number,
        name: name.to_string(),
        description: description.to_string(),
    }
}

impl ServerError {
    /// Classify a decoded error body. A missing or malformed payload is `Unknown`.
    pub fn from_payload(payload: Option<&Value>) -> Self {
        let Some(Value::Object(body)) = payload else {
            return classify(None, "Unknown Error", "the server returned no error details");
        };
        let number = body.get("number").and_then(lenient_i64);
        let name = body.get("name").and_then(Value::as_str).unwrap_or("Unknown Error");
        let description = body.get("description").and_then(Value::as_str).unwrap_or("");
        classify(number, name, description)
    }
}

/// The server is loose about numeric types: `11` and `"11"` both occur.
pub(crate) fn lenient_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Errors returned by the client.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The server answered with an error body.
    #[error("server error: {0}")]
    Server(ServerError),

    /// `login` was rejected for an authentication reason.
    #[error("authentication failed: {0}")]
    Auth(ServerError),

    /// The server returned a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The request never completed (DNS, TLS, connection reset, ...).
    #[error("transport failed: {0}")]
    Transport(String),

    /// The response body could not be decoded.
    #[error("deserialization failed: {0}")]
    DeserializationError(String),

    /// The request payload could not be encoded.
    #[error("serialization failed: {0}")]
    SerializationError(String),

    /// A successful response lacked a part the operation needs.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl ApiError {
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ApiError::Server(e) | ApiError::Auth(e) => Some(e.kind),
            _ => None,
        }
    }

    pub fn is_invalid_session(&self) -> bool {
        self.failure_kind() == Some(FailureKind::InvalidSessionId)
    }
}

/// Errors raised while resolving a `Config`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn every_listed_code_round_trips_through_its_kind() {
        for (code, kind) in ERROR_CODES {
            assert_eq!(FailureKind::from_code(*code), *kind, "code {code}");
            assert_eq!(kind.code(), Some(*code), "kind {kind:?}");
        }
    }

    #[test]
    fn table_lists_each_kind_once() {
        let kinds: std::collections::HashSet<FailureKind> =
            ERROR_CODES.iter().map(|(_, kind)| *kind).collect();
        assert_eq!(kinds.len(), ERROR_CODES.len());
        assert_eq!(ERROR_CODES.len(), 25);
        assert_eq!(FailureKind::Unknown.code(), None);
    }

    #[test]
    fn unlisted_codes_are_unknown() {
        for code in [-1, 1, 14, 99, 1002, 1013, i64::MAX] {
            assert_eq!(FailureKind::from_code(code), FailureKind::Unknown);
        }
        assert_eq!(FailureKind::Unknown.code(), None);
    }

    #[test]
    fn classify_keeps_description() {
        let err = classify(Some(40), "Access Denied", "You do not have access");
        assert_eq!(err.kind, FailureKind::AccessDenied);
        assert_eq!(err.description, "You do not have access");
        assert_eq!(err.to_string(), "Access Denied: You do not have access");
    }

    #[test]
    fn null_payload_is_unknown() {
        assert_eq!(ServerError::from_payload(None).kind, FailureKind::Unknown);
        assert_eq!(ServerError::from_payload(Some(&Value::Null)).kind, FailureKind::Unknown);
        assert_eq!(ServerError::from_payload(Some(&json!([1, 2]))).kind, FailureKind::Unknown);
    }

    #[test]
    fn payload_number_may_be_a_string() {
        let body = json!({"name": "Invalid Session ID", "description": "The session ID is invalid", "number": "11"});
        let err = ServerError::from_payload(Some(&body));
        assert_eq!(err.kind, FailureKind::InvalidSessionId);
        assert_eq!(err.number, Some(11));
    }

    #[test]
    fn categories_group_documented_codes() {
        assert_eq!(FailureKind::PasswordExpired.category(), FailureCategory::Authentication);
        assert_eq!(FailureKind::AdminCredentialsRequired.category(), FailureCategory::Authorization);
        assert_eq!(FailureKind::NoRecords.category(), FailureCategory::Resource);
        assert_eq!(FailureKind::NumberOfSessionsExceeded.category(), FailureCategory::Quota);
        assert_eq!(FailureKind::InvalidSetCampaignMergeData.category(), FailureCategory::MalformedRequest);
        assert_eq!(FailureKind::Unknown.category(), FailureCategory::Unknown);
    }

    #[test]
    fn api_error_exposes_invalid_session() {
        let err = ApiError::Server(classify(Some(11), "Invalid Session ID", ""));
        assert!(err.is_invalid_session());
        assert!(!ApiError::Transport("reset".into()).is_invalid_session());
    }
}
