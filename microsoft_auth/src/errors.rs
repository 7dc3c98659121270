use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

pub type BoxError = Box<dyn StdError + Send + Sync>;

pub type HttpResult<T> = Result<T, HttpError>;
pub type PollResult<T> = Result<T, PollError>;
pub type AuthResult<T> = Result<T, AuthError>;

/// Failure of a single request/response exchange with one of the services.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("network error: {0}")]
    Network(#[source] BoxError),
    #[error("json error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("response is missing {0}")]
    MissingField(&'static str),
    #[error("xbox live refused the account: {0}")]
    XboxDenied(XboxDenial),
    #[error("request cancelled")]
    Cancelled,
}

/// Terminal outcome of device-code polling other than a granted token.
#[derive(Debug, Error)]
pub enum PollError {
    #[error("the user declined the sign-in request")]
    Declined,
    #[error("the device code expired before the user signed in")]
    Expired,
    #[error("the verification code was rejected")]
    BadVerificationCode,
    #[error("polling cancelled")]
    Cancelled,
    #[error("token endpoint returned unknown error {0:?}")]
    Unknown(String),
    #[error(transparent)]
    Http(HttpError),
}

impl From<HttpError> for PollError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Cancelled => PollError::Cancelled,
            other => PollError::Http(other),
        }
    }
}

/// The user-facing failure a login flow terminates with.
///
/// Every variant maps to exactly one message a front end shows, so callers
/// never have to look into nested causes.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("the sign-in request was declined")]
    Declined,
    #[error("the sign-in code expired, start again")]
    Expired,
    #[error("the sign-in code was not accepted")]
    BadVerificationCode,
    /// Transport failure; retrying the whole flow may help.
    #[error("network error: {0}")]
    Network(#[source] BoxError),
    #[error("malformed response: {0}")]
    Parse(#[source] serde_json::Error),
    /// Anything the services answered that the flow has no case for.
    #[error("unexpected server response: {0}")]
    UnknownServer(String),
    #[error("this Microsoft account does not own Minecraft")]
    NotEntitled,
    #[error("this account has no Minecraft profile yet")]
    ProfileNotCreated,
    #[error("xbox live refused the account: {0}")]
    XboxDenied(XboxDenial),
    #[error("sign-in cancelled")]
    Cancelled,
}

impl From<HttpError> for AuthError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Network(source) => AuthError::Network(source),
            HttpError::Parse(source) => AuthError::Parse(source),
            HttpError::Status { status, body } => {
                AuthError::UnknownServer(format!("HTTP {status}: {body}"))
            }
            HttpError::MissingField(field) => {
                AuthError::UnknownServer(format!("response is missing {field}"))
            }
            HttpError::XboxDenied(denial) => AuthError::XboxDenied(denial),
            HttpError::Cancelled => AuthError::Cancelled,
        }
    }
}

impl From<PollError> for AuthError {
    fn from(err: PollError) -> Self {
        match err {
            PollError::Declined => AuthError::Declined,
            PollError::Expired => AuthError::Expired,
            PollError::BadVerificationCode => AuthError::BadVerificationCode,
            PollError::Cancelled => AuthError::Cancelled,
            PollError::Unknown(code) => AuthError::UnknownServer(code),
            PollError::Http(err) => err.into(),
        }
    }
}

/// Reason XSTS refused to authorize an account, decoded from its `XErr` code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XboxDenial {
    Banned,
    NoXboxAccount,
    RegionUnavailable,
    AdultVerificationRequired,
    ChildAccount,
    Other(u64),
}

impl XboxDenial {
    pub fn from_code(code: u64) -> Self {
        match code {
            2148916227 => XboxDenial::Banned,
            2148916233 => XboxDenial::NoXboxAccount,
            2148916235 => XboxDenial::RegionUnavailable,
            2148916236 | 2148916237 => XboxDenial::AdultVerificationRequired,
            2148916238 => XboxDenial::ChildAccount,
            other => XboxDenial::Other(other),
        }
    }
}

impl fmt::Display for XboxDenial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            XboxDenial::Banned => f.write_str("the account is banned from Xbox Live"),
            XboxDenial::NoXboxAccount => {
                f.write_str("the account has no Xbox profile, create one at xbox.com")
            }
            XboxDenial::RegionUnavailable => {
                f.write_str("Xbox Live is not available in the account's region")
            }
            XboxDenial::AdultVerificationRequired => {
                f.write_str("the account needs adult verification on xbox.com")
            }
            XboxDenial::ChildAccount => {
                f.write_str("child accounts must be added to a family by an adult")
            }
            XboxDenial::Other(code) => write!(f, "XErr {code}"),
        }
    }
}
