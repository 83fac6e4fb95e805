//! User management tools: `addUser`, `getUser`, `deleteUser`.
//!
//! Each handler makes exactly one directory call and classifies the outcome
//! into a [`ResultEnvelope`]. An unknown id is a normal outcome, reported as
//! `success: false` rather than an error.

use std::sync::Arc;

use parley_types::envelope::ResultEnvelope;
use parley_types::error::{FieldViolation, ToolError};
use parley_types::user::NewUser;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use tracing::{error, info, warn};

use super::catalog::{Tool, ToolCatalog};
use super::schema::{ValidateArgs, check_email, check_length};
use crate::directory::UserDirectory;

const ID_MAX: usize = 255;
const NAME_MAX: usize = 255;
const PASSWORD_MIN: usize = 6;
const PASSWORD_MAX: usize = 255;

/// Arguments of `addUser`.
#[derive(Deserialize, JsonSchema)]
pub struct AddUserArgs {
    #[schemars(length(min = 1, max = 255))]
    pub name: String,
    #[schemars(email)]
    pub email: String,
    #[schemars(length(min = 6, max = 255))]
    pub password: String,
}

impl ValidateArgs for AddUserArgs {
    fn validate(&self) -> Vec<FieldViolation> {
        let mut violations = Vec::new();
        check_length(&mut violations, "name", &self.name, 1, NAME_MAX);
        check_email(&mut violations, "email", &self.email);
        check_length(
            &mut violations,
            "password",
            &self.password,
            PASSWORD_MIN,
            PASSWORD_MAX,
        );
        violations
    }
}

/// Arguments of `getUser` and `deleteUser`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct UserIdArgs {
    #[schemars(length(min = 1, max = 255))]
    pub id: String,
}

impl ValidateArgs for UserIdArgs {
    fn validate(&self) -> Vec<FieldViolation> {
        let mut violations = Vec::new();
        check_length(&mut violations, "id", &self.id, 1, ID_MAX);
        violations
    }
}

pub struct AddUserTool<D> {
    directory: Arc<D>,
}

impl<D> AddUserTool<D> {
    pub fn new(directory: Arc<D>) -> Self {
        Self { directory }
    }
}

impl<D: UserDirectory> Tool for AddUserTool<D> {
    type Args = AddUserArgs;

    fn name(&self) -> &'static str {
        "addUser"
    }

    fn description(&self) -> &'static str {
        "Add a user to the database"
    }

    async fn call(&self, args: AddUserArgs) -> ResultEnvelope {
        let user = NewUser {
            name: args.name,
            email: args.email,
            password: args.password,
        };
        match self.directory.add_user(&user).await {
            Ok(created) => {
                info!(user_id = created_id(&created).unwrap_or("unknown"), "user added");
                ResultEnvelope::ok(created, "User added successfully")
            }
            Err(e) => {
                error!(error = %e, "failed to add user");
                ToolError::Upstream {
                    action: "add user",
                    message: e.to_string(),
                }
                .into_envelope()
            }
        }
    }
}

pub struct GetUserTool<D> {
    directory: Arc<D>,
}

impl<D> GetUserTool<D> {
    pub fn new(directory: Arc<D>) -> Self {
        Self { directory }
    }
}

impl<D: UserDirectory> Tool for GetUserTool<D> {
    type Args = UserIdArgs;

    fn name(&self) -> &'static str {
        "getUser"
    }

    fn description(&self) -> &'static str {
        "Get a user by id from the database"
    }

    async fn call(&self, args: UserIdArgs) -> ResultEnvelope {
        match self.directory.get_user(&args.id).await {
            Ok(Some(user)) => ResultEnvelope::ok(user, "User retrieved successfully"),
            Ok(None) => {
                warn!(user_id = %args.id, "user not found");
                ToolError::NotFound {
                    entity: "User",
                    id: args.id,
                }
                .into_envelope()
            }
            Err(e) => {
                error!(user_id = %args.id, error = %e, "failed to get user");
                ToolError::Upstream {
                    action: "get user",
                    message: e.to_string(),
                }
                .into_envelope()
            }
        }
    }
}

pub struct DeleteUserTool<D> {
    directory: Arc<D>,
}

impl<D> DeleteUserTool<D> {
    pub fn new(directory: Arc<D>) -> Self {
        Self { directory }
    }
}

impl<D: UserDirectory> Tool for DeleteUserTool<D> {
    type Args = UserIdArgs;

    fn name(&self) -> &'static str {
        "deleteUser"
    }

    fn description(&self) -> &'static str {
        "Delete a user by id from the database"
    }

    async fn call(&self, args: UserIdArgs) -> ResultEnvelope {
        match self.directory.delete_user(&args.id).await {
            Ok(Some(deleted)) => {
                info!(user_id = %args.id, "user deleted");
                ResultEnvelope::ok(deleted, "User deleted successfully")
            }
            Ok(None) => {
                warn!(user_id = %args.id, "user not found");
                ToolError::NotFound {
                    entity: "User",
                    id: args.id,
                }
                .into_envelope()
            }
            Err(e) => {
                error!(user_id = %args.id, error = %e, "failed to delete user");
                ToolError::Upstream {
                    action: "delete user",
                    message: e.to_string(),
                }
                .into_envelope()
            }
        }
    }
}

/// Register `addUser`, `getUser`, and `deleteUser` against one directory.
pub fn register_user_tools<D: UserDirectory>(catalog: &mut ToolCatalog, directory: Arc<D>) {
    catalog
        .register(AddUserTool::new(Arc::clone(&directory)))
        .register(GetUserTool::new(Arc::clone(&directory)))
        .register(DeleteUserTool::new(directory));
}

/// Id of a freshly created user: the directory answers with either the id
/// itself or the created record.
fn created_id(created: &Value) -> Option<&str> {
    created
        .as_str()
        .or_else(|| created.get("id").and_then(Value::as_str))
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parley_types::error::DirectoryError;
    use serde_json::{Value, json};

    use super::*;

    /// In-memory directory that counts every call.
    #[derive(Default)]
    pub(crate) struct FakeDirectory {
        users: Mutex<HashMap<String, Value>>,
        pub(crate) calls: AtomicUsize,
        pub(crate) fail_with: Mutex<Option<DirectoryError>>,
    }

    impl FakeDirectory {
        pub(crate) fn with_user(id: &str, name: &str) -> Self {
            let directory = Self::default();
            directory
                .users
                .lock()
                .unwrap()
                .insert(id.to_string(), json!({ "_id": id, "name": name }));
            directory
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn begin(&self) -> Result<(), DirectoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.fail_with.lock().unwrap().clone() {
                Some(e) => Err(e),
                None => Ok(()),
            }
        }
    }

    impl UserDirectory for FakeDirectory {
        async fn add_user(&self, user: &NewUser) -> Result<Value, DirectoryError> {
            self.begin()?;
            let mut users = self.users.lock().unwrap();
            let id = format!("u{}", users.len() + 1);
            users.insert(
                id.clone(),
                json!({ "_id": id, "name": user.name, "email": user.email }),
            );
            Ok(json!(id))
        }

        async fn get_user(&self, id: &str) -> Result<Option<Value>, DirectoryError> {
            self.begin()?;
            Ok(self.users.lock().unwrap().get(id).cloned())
        }

        async fn delete_user(&self, id: &str) -> Result<Option<Value>, DirectoryError> {
            self.begin()?;
            Ok(self
                .users
                .lock()
                .unwrap()
                .remove(id)
                .map(|_| json!({ "deleted": id })))
        }
    }
}
