use thiserror::Error;

use crate::sys::ApiKind;

/// Errors raised by the registration surface.
///
/// Value conversions never fail with an error: the host coerces or returns
/// a zero value, and allocation failures surface as `None`.
#[derive(Debug, Error)]
pub enum Error {
    #[error("host did not provide the {0:?} extension")]
    MissingExtension(ApiKind),

    #[error("name {0:?} contains an interior NUL byte")]
    InvalidName(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
