//! Port to the downstream user directory.
//!
//! Records are passed through as opaque JSON; their schema belongs to the
//! directory, not to this service.

use std::future::Future;

use parley_types::error::DirectoryError;
use parley_types::user::NewUser;
use serde_json::Value;

/// The user directory the bridge's tools call into.
///
/// Implementations live in parley-infra (e.g., `HttpUserDirectory`).
pub trait UserDirectory: Send + Sync + 'static {
    /// Create a user and return the directory's response body.
    fn add_user(&self, user: &NewUser)
    -> impl Future<Output = Result<Value, DirectoryError>> + Send;

    /// Fetch a user. `Ok(None)` when the id is unknown.
    fn get_user(&self, id: &str) -> impl Future<Output = Result<Option<Value>, DirectoryError>> + Send;

    /// Delete a user. `Ok(None)` when the id is unknown.
    fn delete_user(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<Value>, DirectoryError>> + Send;
}
