//! Command implementations.

pub mod catalog;
pub mod orders;
pub mod session;

use thiserror::Error;

use kaptaze_client::api::ApiError;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The command needs a signed-in user.
    #[error("Not signed in. Run `kaptaze session login` first.")]
    NotSignedIn,

    /// Invalid email.
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    /// The restaurant does not offer the requested bag.
    #[error("Package {package} not offered by restaurant {restaurant}")]
    UnknownPackage { restaurant: String, package: String },

    /// The store refused the action.
    #[error("{0}")]
    Refused(String),

    /// Backend call failed.
    #[error(transparent)]
    Api(#[from] ApiError),
}
