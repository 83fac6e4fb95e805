//! Tool trait and the catalog of registered tools.
//!
//! Tools are typed: each declares an argument struct that is deserialized,
//! validated, and only then handed to the handler. The catalog erases the
//! argument type so tools of any shape can live side by side, and new tools
//! register without touching the protocol layer.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;

use futures_util::FutureExt;
use parley_types::envelope::ResultEnvelope;
use parley_types::error::{FieldViolation, ToolError};
use parley_types::protocol::ToolDefinition;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, error, warn};

use super::schema::{ValidateArgs, input_schema};

/// A named operation callable through the tool protocol.
///
/// `call` only runs on arguments that passed [`ValidateArgs::validate`], and
/// must fold every downstream failure into the returned envelope.
pub trait Tool: Send + Sync + 'static {
    type Args: DeserializeOwned + JsonSchema + ValidateArgs + Send;

    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn call(&self, args: Self::Args) -> impl Future<Output = ResultEnvelope> + Send;
}

/// Object-safe form of [`Tool`] taking raw JSON arguments.
pub trait ToolDyn: Send + Sync {
    fn name(&self) -> &'static str;

    fn definition(&self) -> ToolDefinition;

    fn invoke_boxed(&self, arguments: Value) -> Pin<Box<dyn Future<Output = ResultEnvelope> + Send + '_>>;
}

impl<T: Tool> ToolDyn for T {
    fn name(&self) -> &'static str {
        Tool::name(self)
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: Tool::name(self).to_string(),
            description: Tool::description(self).to_string(),
            input_schema: input_schema::<T::Args>(),
        }
    }

    fn invoke_boxed(&self, arguments: Value) -> Pin<Box<dyn Future<Output = ResultEnvelope> + Send + '_>> {
        Box::pin(async move {
            let name = Tool::name(self);
            let args = match parse_args::<T::Args>(name, arguments) {
                Ok(args) => args,
                Err(e) => {
                    debug!(tool = name, error = %e, "rejected tool arguments");
                    return e.into_envelope();
                }
            };
            self.call(args).await
        })
    }
}

fn parse_args<A>(tool: &str, arguments: Value) -> Result<A, ToolError>
where
    A: DeserializeOwned + ValidateArgs,
{
    // Callers may omit arguments entirely.
    let arguments = if arguments.is_null() {
        Value::Object(Default::default())
    } else {
        arguments
    };
    let args: A = serde_json::from_value(arguments).map_err(|e| ToolError::Validation {
        tool: tool.to_string(),
        violations: vec![FieldViolation::new("arguments", e.to_string())],
    })?;

    let violations = args.validate();
    if violations.is_empty() {
        Ok(args)
    } else {
        Err(ToolError::Validation {
            tool: tool.to_string(),
            violations,
        })
    }
}

/// Ordered, name-unique set of tools.
#[derive(Default)]
pub struct ToolCatalog {
    tools: Vec<Box<dyn ToolDyn>>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool. A tool with the same name replaces the earlier one.
    pub fn register<T: Tool>(&mut self, tool: T) -> &mut Self {
        let name = Tool::name(&tool);
        if let Some(pos) = self.tools.iter().position(|t| t.name() == name) {
            warn!(tool = name, "replacing registered tool");
            self.tools[pos] = Box::new(tool);
        } else {
            self.tools.push(Box::new(tool));
        }
        self
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    /// Definitions in registration order, as advertised by `tools/list`.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    /// Run a tool by name. Never fails: unknown tools, bad arguments, and
    /// panicking handlers all come back as failed envelopes.
    pub async fn invoke(&self, name: &str, arguments: Value) -> ResultEnvelope {
        let Some(tool) = self.tools.iter().find(|t| t.name() == name) else {
            warn!(tool = name, "call to unknown tool");
            return ToolError::UnknownTool(name.to_string()).into_envelope();
        };

        match AssertUnwindSafe(tool.invoke_boxed(arguments))
            .catch_unwind()
            .await
        {
            Ok(envelope) => envelope,
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "handler panicked".to_string());
                error!(tool = name, %message, "tool handler panicked");
                ToolError::Internal {
                    tool: name.to_string(),
                    message,
                }
                .into_envelope()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    use crate::tools::schema::check_length;

    #[derive(Deserialize, JsonSchema)]
    struct EchoArgs {
        #[schemars(length(min = 1, max = 5))]
        word: String,
    }

    impl ValidateArgs for EchoArgs {
        fn validate(&self) -> Vec<FieldViolation> {
            let mut violations = Vec::new();
            check_length(&mut violations, "word", &self.word, 1, 5);
            violations
        }
    }

    struct Echo;

    impl Tool for Echo {
        type Args = EchoArgs;

        fn name(&self) -> &'static str {
            "echo"
        }

        fn description(&self) -> &'static str {
            "Echo a short word"
        }

        async fn call(&self, args: EchoArgs) -> ResultEnvelope {
            if args.word == "panic" {
                panic!("echo exploded");
            }
            ResultEnvelope::ok(json!({ "word": args.word }), "echoed")
        }
    }

    #[derive(Deserialize, JsonSchema)]
    struct NoArgs {}

    impl ValidateArgs for NoArgs {
        fn validate(&self) -> Vec<FieldViolation> {
            Vec::new()
        }
    }

    struct Noop;

    impl Tool for Noop {
        type Args = NoArgs;

        fn name(&self) -> &'static str {
            "noop"
        }

        fn description(&self) -> &'static str {
            "Do nothing"
        }

        async fn call(&self, _args: NoArgs) -> ResultEnvelope {
            ResultEnvelope::ok(Value::Null, "done")
        }
    }

    fn catalog() -> ToolCatalog {
        let mut catalog = ToolCatalog::new();
        catalog.register(Echo).register(Noop);
        catalog
    }

    #[test]
    fn definitions_keep_registration_order() {
        let defs = catalog().definitions();
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].name, "echo");
        assert_eq!(defs[0].input_schema["properties"]["word"]["maxLength"], 5);
        assert_eq!(defs[1].name, "noop");
    }

    #[test]
    fn register_replaces_same_name() {
        let mut catalog = catalog();
        catalog.register(Echo);
        assert_eq!(catalog.len(), 2);
    }

    #[tokio::test]
    async fn invoke_runs_valid_calls() {
        let envelope = catalog().invoke("echo", json!({"word": "hi"})).await;
        assert!(envelope.success);
        assert_eq!(envelope.data.unwrap()["word"], "hi");
    }

    #[tokio::test]
    async fn invoke_rejects_invalid_fields() {
        let envelope = catalog().invoke("echo", json!({"word": "too long"})).await;
        assert!(!envelope.success);
        assert!(envelope.data.is_none());
        assert!(envelope.message.contains("word: must be between 1 and 5 characters"));
    }

    #[tokio::test]
    async fn invoke_rejects_wrong_shape() {
        let envelope = catalog().invoke("echo", json!({"word": 42})).await;
        assert!(!envelope.success);
        assert!(envelope.message.starts_with("Invalid arguments for 'echo': arguments:"));
    }

    #[tokio::test]
    async fn null_arguments_are_an_empty_object() {
        let envelope = catalog().invoke("noop", Value::Null).await;
        assert!(envelope.success);
    }

    #[tokio::test]
    async fn unknown_tool_is_a_failed_envelope() {
        let envelope = catalog().invoke("nope", json!({})).await;
        assert!(!envelope.success);
        assert_eq!(envelope.message, "Unknown tool 'nope'");
    }

    #[tokio::test]
    async fn panicking_handler_is_contained() {
        let envelope = catalog().invoke("echo", json!({"word": "panic"})).await;
        assert!(!envelope.success);
        assert_eq!(envelope.message, "Tool 'echo' failed: echo exploded");
    }
}
