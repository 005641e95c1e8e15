use std::fmt;
use thiserror::Error as ThisError;

///
/// InternalError
///
/// Structured runtime error with a stable internal classification.
/// Not a stable API; the `recgraph` facade maps it onto its public error.
///

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct InternalError {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,

    /// Optional structured error detail.
    /// The variant (if present) must correspond to `origin`.
    pub detail: Option<ErrorDetail>,
}

impl InternalError {
    /// Construct an InternalError without structured detail.
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
            detail: None,
        }
    }

    /// Construct a record-origin invariant violation.
    pub(crate) fn record_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Record,
            message.into(),
        )
    }

    /// Construct a schema-origin unsupported error.
    pub(crate) fn schema_unsupported(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unsupported, ErrorOrigin::Schema, message.into())
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self.class, ErrorClass::NotFound)
    }

    #[must_use]
    pub const fn is_whitelist_violation(&self) -> bool {
        matches!(
            self.detail,
            Some(ErrorDetail::Projection(
                ProjectionError::WhitelistViolation { .. }
            ))
        )
    }

    #[must_use]
    pub const fn is_duplicate_identity(&self) -> bool {
        matches!(
            self.detail,
            Some(ErrorDetail::Identity(IdentityError::DuplicateIdentity { .. }))
        )
    }
}

///
/// ErrorDetail
///
/// Structured, origin-specific error detail carried by [`InternalError`].
///

#[derive(Debug, ThisError)]
pub enum ErrorDetail {
    #[error("{0}")]
    Array(ArrayError),

    #[error("{0}")]
    Identity(IdentityError),

    #[error("{0}")]
    Projection(ProjectionError),

    #[error("{0}")]
    Record(RecordError),
}

///
/// ProjectionError
///

#[derive(Debug, ThisError)]
pub enum ProjectionError {
    #[error("attribute '{key}' is not in the whitelist of projection '{model_name}'")]
    WhitelistViolation { model_name: String, key: String },
}

impl From<ProjectionError> for InternalError {
    fn from(err: ProjectionError) -> Self {
        Self {
            class: ErrorClass::Unsupported,
            origin: ErrorOrigin::Projection,
            message: err.to_string(),
            detail: Some(ErrorDetail::Projection(err)),
        }
    }
}

///
/// IdentityError
///

#[derive(Debug, ThisError)]
pub enum IdentityError {
    #[error("a '{model_name}' record with id '{id}' already exists")]
    DuplicateIdentity { model_name: String, id: String },

    #[error("cannot assign id '{id}' to '{model_name}': ids of top-level records are set at creation or by the server")]
    IdNotAssignable { model_name: String, id: String },

    #[error("cannot change id of '{model_name}' from '{from}' to '{to}'")]
    IdentityReassignment {
        model_name: String,
        from: String,
        to: String,
    },

    #[error("value {value} cannot be used as a record id")]
    InvalidId { value: String },
}

impl From<IdentityError> for InternalError {
    fn from(err: IdentityError) -> Self {
        let class = match err {
            IdentityError::DuplicateIdentity { .. } => ErrorClass::Conflict,
            IdentityError::IdNotAssignable { .. }
            | IdentityError::IdentityReassignment { .. }
            | IdentityError::InvalidId { .. } => ErrorClass::Unsupported,
        };

        Self {
            class,
            origin: ErrorOrigin::Identity,
            message: err.to_string(),
            detail: Some(ErrorDetail::Identity(err)),
        }
    }
}

///
/// RecordError
///
/// Stale or foreign handles. Handles outlive the slots they name once a
/// record, facade, or array is torn down.
///

#[derive(Debug, ThisError)]
pub enum RecordError {
    #[error("record {handle} is not live")]
    RecordNotFound { handle: String },

    #[error("model {handle} is not live")]
    ModelNotFound { handle: String },

    #[error("array {handle} is not live")]
    ArrayNotFound { handle: String },
}

impl From<RecordError> for InternalError {
    fn from(err: RecordError) -> Self {
        Self {
            class: ErrorClass::NotFound,
            origin: ErrorOrigin::Record,
            message: err.to_string(),
            detail: Some(ErrorDetail::Record(err)),
        }
    }
}

///
/// ArrayError
///

#[derive(Debug, ThisError)]
pub enum ArrayError {
    #[error("index {index} out of bounds (len: {len})")]
    IndexOutOfBounds { index: usize, len: usize },

    #[error("{kind} arrays cannot hold {element}")]
    UnsupportedElement {
        kind: &'static str,
        element: &'static str,
    },
}

impl From<ArrayError> for InternalError {
    fn from(err: ArrayError) -> Self {
        let class = match err {
            ArrayError::IndexOutOfBounds { .. } => ErrorClass::NotFound,
            ArrayError::UnsupportedElement { .. } => ErrorClass::Unsupported,
        };

        Self {
            class,
            origin: ErrorOrigin::Array,
            message: err.to_string(),
            detail: Some(ErrorDetail::Array(err)),
        }
    }
}

impl From<serde_json::Error> for InternalError {
    fn from(err: serde_json::Error) -> Self {
        Self::schema_unsupported(format!("invalid schema config: {err}"))
    }
}

///
/// ErrorClass
/// Internal error taxonomy for runtime classification.
/// Not a stable API; may change without notice.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[remain::sorted]
pub enum ErrorClass {
    Conflict,
    Internal,
    InvariantViolation,
    NotFound,
    Unsupported,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Conflict => "conflict",
            Self::Internal => "internal",
            Self::InvariantViolation => "invariant_violation",
            Self::NotFound => "not_found",
            Self::Unsupported => "unsupported",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Internal origin taxonomy for runtime classification.
/// Not a stable API; may change without notice.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[remain::sorted]
pub enum ErrorOrigin {
    Array,
    Identity,
    Projection,
    Record,
    Schema,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Array => "array",
            Self::Identity => "identity",
            Self::Projection => "projection",
            Self::Record => "record",
            Self::Schema => "schema",
        };
        write!(f, "{label}")
    }
}

///
/// TESTS
///
