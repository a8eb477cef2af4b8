//! The error taxonomy exposed to callers of the core.
//!
//! Every mutation that can fail for a reason a caller should branch on
//! returns [`CoreError`]. Failures that are bugs or outages (a poisoned
//! lock, a corrupt row, an object store that's gone entirely AWOL) are
//! wrapped in [`CoreError::Internal`] instead of growing the enum.

use camino::Utf8PathBuf;
use thiserror::Error;

/// Stable, typed error taxonomy for the core's public API.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{path} already exists")]
    AlreadyExists { path: Utf8PathBuf },

    #[error("{path} not found")]
    NotFound { path: Utf8PathBuf },

    #[error("{path} is a directory")]
    IsADirectory { path: Utf8PathBuf },

    #[error("{path} is not a directory")]
    NotADirectory { path: Utf8PathBuf },

    #[error("parent of {path} does not exist")]
    MissingParent { path: Utf8PathBuf },

    #[error("malformed path: {reason}")]
    MalformedPath { reason: String },

    #[error("{path} exceeds the maximum upload size")]
    TooLarge { path: Utf8PathBuf },

    #[error("thumbnail unavailable for {path}")]
    ThumbnailUnavailable { path: Utf8PathBuf },

    #[error("action not allowed: {reason}")]
    ActionNotAllowed { reason: String },

    #[error("storage quota exceeded")]
    StorageQuotaExceeded,

    #[error("fingerprint already exists for file {file_id}")]
    FingerprintAlreadyExists { file_id: uuid::Uuid },

    #[error("content metadata not found for file {file_id}")]
    ContentMetadataNotFound { file_id: uuid::Uuid },

    #[error("mount not found")]
    MountNotFound,

    #[error("shared link not found")]
    SharedLinkNotFound,

    #[error("user not found")]
    UserNotFound,

    #[error("user already exists")]
    UserAlreadyExists,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("email already verified")]
    EmailAlreadyVerified,

    #[error("an OTP was already sent")]
    OTPAlreadySent,

    #[error("an email update was already started")]
    EmailUpdateAlreadyStarted,

    #[error("no email update is in progress")]
    EmailUpdateNotStarted,

    /// A bug, an outage, or anything else the caller can't act on beyond
    /// "this failed, log it and maybe retry."
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl CoreError {
    /// A stable `SCREAMING_SNAKE_CASE` code, the sort an outward HTTP layer
    /// maps to a status and a wire-visible string. This crate does not
    /// depend on any HTTP types; it just hands back the data.
    pub fn code(&self) -> &'static str {
        use CoreError::*;
        match self {
            AlreadyExists { .. } => "FILE_ALREADY_EXISTS",
            NotFound { .. } => "FILE_NOT_FOUND",
            IsADirectory { .. } => "IS_A_DIRECTORY",
            NotADirectory { .. } => "NOT_A_DIRECTORY",
            MissingParent { .. } => "MISSING_PARENT",
            MalformedPath { .. } => "MALFORMED_PATH",
            TooLarge { .. } => "FILE_TOO_LARGE",
            ThumbnailUnavailable { .. } => "THUMBNAIL_UNAVAILABLE",
            ActionNotAllowed { .. } => "ACTION_NOT_ALLOWED",
            StorageQuotaExceeded => "STORAGE_QUOTA_EXCEEDED",
            FingerprintAlreadyExists { .. } => "FINGERPRINT_ALREADY_EXISTS",
            ContentMetadataNotFound { .. } => "CONTENT_METADATA_NOT_FOUND",
            MountNotFound => "MOUNT_NOT_FOUND",
            SharedLinkNotFound => "SHARED_LINK_NOT_FOUND",
            UserNotFound => "USER_NOT_FOUND",
            UserAlreadyExists => "USER_ALREADY_EXISTS",
            InvalidCredentials => "INVALID_CREDENTIALS",
            EmailAlreadyVerified => "EMAIL_ALREADY_VERIFIED",
            OTPAlreadySent => "OTP_ALREADY_SENT",
            EmailUpdateAlreadyStarted => "EMAIL_UPDATE_ALREADY_STARTED",
            EmailUpdateNotStarted => "EMAIL_UPDATE_NOT_STARTED",
            Internal(_) => "INTERNAL",
        }
    }

    /// The status code an HTTP layer would report; 500 for anything internal.
    pub fn http_status(&self) -> u16 {
        use CoreError::*;
        match self {
            AlreadyExists { .. }
            | MalformedPath { .. }
            | TooLarge { .. }
            | IsADirectory { .. }
            | NotADirectory { .. }
            | MissingParent { .. }
            | UserAlreadyExists
            | EmailAlreadyVerified
            | OTPAlreadySent
            | EmailUpdateAlreadyStarted
            | EmailUpdateNotStarted => 400,
            InvalidCredentials => 401,
            ActionNotAllowed { .. } => 403,
            NotFound { .. }
            | ThumbnailUnavailable { .. }
            | FingerprintAlreadyExists { .. }
            | ContentMetadataNotFound { .. }
            | MountNotFound
            | SharedLinkNotFound
            | UserNotFound => 404,
            StorageQuotaExceeded => 507,
            Internal(_) => 500,
        }
    }

    pub fn not_found(path: impl Into<Utf8PathBuf>) -> Self {
        CoreError::NotFound { path: path.into() }
    }

    pub fn already_exists(path: impl Into<Utf8PathBuf>) -> Self {
        CoreError::AlreadyExists { path: path.into() }
    }
}

/// Convenience alias used throughout the crate's public functions.
pub type CoreResult<T> = Result<T, CoreError>;

impl From<rusqlite::Error> for CoreError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ref f, _) = e {
            if f.code == rusqlite::ErrorCode::ConstraintViolation {
                // Caller context (which path/id) is lost at this layer;
                // repository impls should catch unique-violation and
                // raise CoreError::AlreadyExists with a real path instead
                // of letting it fall through to here.
                return CoreError::Internal(anyhow::Error::new(e).context("constraint violation"));
            }
        }
        CoreError::Internal(anyhow::Error::new(e))
    }
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::NotFound {
            return CoreError::Internal(anyhow::Error::new(e).context("not found"));
        }
        CoreError::Internal(anyhow::Error::new(e))
    }
}
