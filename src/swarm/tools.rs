//! Typed tool registry and secret resolution.
//!
//! Tools register by name; each carries its parameter schema, which is
//! the single source of truth for validating inputs before dispatch.
//! [`SecretResolver`] is the seam composite callers use to fill
//! `{{NAME}}` placeholders in tool arguments from a vault.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{SwarmlinkError, SwarmlinkResult};

/// A callable tool with a named parameter schema.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique tool name.
    fn name(&self) -> &str;

    /// JSON schema describing the accepted parameters.
    fn parameters_schema(&self) -> Value;

    /// Run the tool.
    async fn execute(&self, params: Value) -> SwarmlinkResult<Value>;
}

/// Mapping of tool name to handle.
#[derive(Default)]
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, Arc<dyn Tool>>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under its own name, replacing any previous entry.
    pub fn register(&self, tool: Arc<dyn Tool>) {
        self.tools
            .write()
            .expect("tool registry lock")
            .insert(tool.name().to_string(), tool);
    }

    /// Look up a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools
            .read()
            .expect("tool registry lock")
            .get(name)
            .cloned()
    }

    /// The parameter schema for a registered tool.
    pub fn schema(&self, name: &str) -> Option<Value> {
        self.get(name).map(|t| t.parameters_schema())
    }

    /// Registered tool names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .tools
            .read()
            .expect("tool registry lock")
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Dispatch `name` with `params`.
    pub async fn run(&self, name: &str, params: Value) -> SwarmlinkResult<Value> {
        let tool = self
            .get(name)
            .ok_or_else(|| SwarmlinkError::method_not_found(name))?;
        tool.execute(params).await
    }
}

/// Resolves vault references to secret values.
#[async_trait]
pub trait SecretResolver: Send + Sync {
    /// Resolve `key` from `vault`, optionally scoped to an environment.
    async fn resolve(
        &self,
        vault: &str,
        key: &str,
        env: Option<&str>,
    ) -> SwarmlinkResult<String>;
}

/// Replace every `{{NAME}}` placeholder in `input` with the secret
/// resolved from `vault`. Unterminated placeholders are left verbatim.
pub async fn substitute_secrets(
    input: &str,
    resolver: &dyn SecretResolver,
    vault: &str,
    env: Option<&str>,
) -> SwarmlinkResult<String> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("{{") {
        let Some(end) = rest[start + 2..].find("}}") else {
            break;
        };
        let key = rest[start + 2..start + 2 + end].trim();
        out.push_str(&rest[..start]);
        out.push_str(&resolver.resolve(vault, key, env).await?);
        rest = &rest[start + 2 + end + 2..];
    }

    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"]
            })
        }

        async fn execute(&self, params: Value) -> SwarmlinkResult<Value> {
            Ok(json!({"echoed": params["text"]}))
        }
    }

    struct MapResolver;

    #[async_trait]
    impl SecretResolver for MapResolver {
        async fn resolve(
            &self,
            _vault: &str,
            key: &str,
            _env: Option<&str>,
        ) -> SwarmlinkResult<String> {
            match key {
                "API_KEY" => Ok("sk-123".to_string()),
                "HOST" => Ok("example.com".to_string()),
                other => Err(SwarmlinkError::internal_error(format!(
                    "unknown secret {other}"
                ))),
            }
        }
    }

    #[tokio::test]
    async fn registry_dispatches_by_name() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));

        assert_eq!(registry.names(), vec!["echo".to_string()]);
        assert!(registry.schema("echo").unwrap()["required"]
            .as_array()
            .unwrap()
            .contains(&json!("text")));

        let out = registry.run("echo", json!({"text": "hi"})).await.unwrap();
        assert_eq!(out["echoed"], "hi");

        let err = registry.run("missing", json!({})).await.unwrap_err();
        assert!(matches!(err, SwarmlinkError::MethodNotFound { .. }));
    }

    #[tokio::test]
    async fn placeholders_are_substituted() {
        let out = substitute_secrets(
            "curl -H 'x-key: {{API_KEY}}' https://{{HOST}}/v1",
            &MapResolver,
            "default",
            None,
        )
        .await
        .unwrap();
        assert_eq!(out, "curl -H 'x-key: sk-123' https://example.com/v1");
    }

    #[tokio::test]
    async fn unterminated_placeholder_left_verbatim() {
        let out = substitute_secrets("value {{API_KEY", &MapResolver, "default", None)
            .await
            .unwrap();
        assert_eq!(out, "value {{API_KEY");
    }

    #[tokio::test]
    async fn unknown_secret_propagates_error() {
        let err = substitute_secrets("{{NOPE}}", &MapResolver, "default", None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown secret"));
    }
}
