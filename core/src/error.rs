use thiserror::Error;

/// Rejection reasons produced while validating an incoming scan request.
///
/// The `Display` text is returned verbatim to the client, so every message
/// names the offending field or value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid scan request format")]
    InvalidRequest,

    #[error("Target URL is required")]
    MissingTarget,

    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),

    #[error("Unsupported protocol '{0}': only HTTP and HTTPS protocols are supported")]
    UnsupportedProtocol(String),

    #[error("Target domain '{0}' is not in the allowed domains list")]
    DomainNotAllowed(String),

    #[error("Target IP '{0}' is not in the allowed IPs list")]
    IpNotAllowed(String),

    #[error("Invalid scan type '{given}'. Valid options are: {valid}")]
    InvalidProfile { given: String, valid: String },

    #[error("Options must be an object")]
    InvalidOptions,

    #[error("Option name '{0}' contains invalid characters")]
    InvalidOptionName(String),

    #[error("Option value for '{0}' must be a string, boolean, or number")]
    InvalidOptionType(String),

    #[error("Option '{0}' is not allowed for security reasons")]
    ForbiddenOption(String),
}

/// Errors surfaced by the job registry and the HTTP layer.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Scan not found: {0}")]
    NotFound(String),

    #[error("Too many concurrent scans (limit {0}), try again later")]
    CapacityExceeded(usize),

    #[error("Invalid or missing API key")]
    Unauthorized,

    #[error("Scan {0} has already finished")]
    AlreadyFinished(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;
