use derive_more::Display;
use recgraph_core::error::{
    ArrayError, ErrorClass, ErrorDetail, ErrorOrigin as CoreErrorOrigin, IdentityError,
    InternalError, ProjectionError, RecordError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

///
/// Error
/// Public error type with a stable kind + origin taxonomy.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, ThisError)]
#[error("{message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub origin: ErrorOrigin,
    pub message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            kind,
            origin,
            message: message.into(),
        }
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::Record(RecordErrorKind::NotFound)
                | ErrorKind::Array(ArrayErrorKind::IndexOutOfBounds)
        )
    }
}

impl From<InternalError> for Error {
    fn from(err: InternalError) -> Self {
        let origin = err.origin.into();
        let kind = match &err.detail {
            Some(detail) => ErrorKind::from(detail),
            None => ErrorKind::from_class(err.class),
        };

        Self::new(kind, origin, err.message)
    }
}

///
/// ErrorKind
/// Public error taxonomy for hosts.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ErrorKind {
    Array(ArrayErrorKind),
    Identity(IdentityErrorKind),
    Projection(ProjectionErrorKind),
    Record(RecordErrorKind),

    /// Schema configuration could not be loaded or is inconsistent.
    Schema,

    /// The caller cannot remediate this.
    Internal,
}

impl ErrorKind {
    const fn from_class(class: ErrorClass) -> Self {
        match class {
            ErrorClass::NotFound => Self::Record(RecordErrorKind::NotFound),
            ErrorClass::Unsupported => Self::Schema,
            ErrorClass::Conflict | ErrorClass::Internal | ErrorClass::InvariantViolation => {
                Self::Internal
            }
        }
    }
}

impl From<&ErrorDetail> for ErrorKind {
    fn from(detail: &ErrorDetail) -> Self {
        match detail {
            ErrorDetail::Array(err) => Self::Array(err.into()),
            ErrorDetail::Identity(err) => Self::Identity(err.into()),
            ErrorDetail::Projection(err) => Self::Projection(err.into()),
            ErrorDetail::Record(err) => Self::Record(err.into()),
        }
    }
}

///
/// ArrayErrorKind
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ArrayErrorKind {
    IndexOutOfBounds,

    /// The element does not fit the array kind (e.g. plain data pushed onto
    /// a reference array).
    UnsupportedElement,
}

impl From<&ArrayError> for ArrayErrorKind {
    fn from(err: &ArrayError) -> Self {
        match err {
            ArrayError::IndexOutOfBounds { .. } => Self::IndexOutOfBounds,
            ArrayError::UnsupportedElement { .. } => Self::UnsupportedElement,
        }
    }
}

///
/// IdentityErrorKind
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum IdentityErrorKind {
    /// A facade of the same model and id already exists.
    Duplicate,

    /// Top-level ids are fixed at creation or assigned by the server.
    NotAssignable,

    Reassignment,
    Invalid,
}

impl From<&IdentityError> for IdentityErrorKind {
    fn from(err: &IdentityError) -> Self {
        match err {
            IdentityError::DuplicateIdentity { .. } => Self::Duplicate,
            IdentityError::IdNotAssignable { .. } => Self::NotAssignable,
            IdentityError::IdentityReassignment { .. } => Self::Reassignment,
            IdentityError::InvalidId { .. } => Self::Invalid,
        }
    }
}

///
/// ProjectionErrorKind
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ProjectionErrorKind {
    WhitelistViolation,
}

impl From<&ProjectionError> for ProjectionErrorKind {
    fn from(err: &ProjectionError) -> Self {
        match err {
            ProjectionError::WhitelistViolation { .. } => Self::WhitelistViolation,
        }
    }
}

///
/// RecordErrorKind
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum RecordErrorKind {
    /// The handle names a record, facade, or array that was torn down.
    NotFound,
}

impl From<&RecordError> for RecordErrorKind {
    fn from(err: &RecordError) -> Self {
        match err {
            RecordError::RecordNotFound { .. }
            | RecordError::ModelNotFound { .. }
            | RecordError::ArrayNotFound { .. } => Self::NotFound,
        }
    }
}

///
/// ErrorOrigin
/// Public origin taxonomy for hosts.
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
pub enum ErrorOrigin {
    Array,
    Identity,
    Projection,
    Record,
    Schema,
}

impl From<CoreErrorOrigin> for ErrorOrigin {
    fn from(origin: CoreErrorOrigin) -> Self {
        match origin {
            CoreErrorOrigin::Array => Self::Array,
            CoreErrorOrigin::Identity => Self::Identity,
            CoreErrorOrigin::Projection => Self::Projection,
            CoreErrorOrigin::Record => Self::Record,
            CoreErrorOrigin::Schema => Self::Schema,
        }
    }
}

///
/// TESTS
///
