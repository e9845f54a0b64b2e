use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    async fn execute(&self, input: Value) -> Result<Value>;
}

/// Tools an agent may call, kept in registration order for the prompt catalogue.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn register<T>(&mut self, tool: T)
    where
        T: Tool + 'static,
    {
        self.register_shared(Arc::new(tool));
    }

    /// Registering a second tool under an existing name replaces the first.
    pub fn register_shared(&mut self, tool: Arc<dyn Tool>) {
        match self.tools.iter().position(|existing| existing.name() == tool.name()) {
            Some(index) => self.tools[index] = tool,
            None => self.tools.push(tool),
        }
    }

    /// Case-insensitive lookup; models are loose about tool-name casing.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        let name = name.trim();
        self.tools.iter().find(|tool| tool.name().eq_ignore_ascii_case(name)).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|tool| tool.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry").field("tools", &self.names()).finish()
    }
}

/// Reads a free-text argument: a bare string, or `field` of an object.
pub(crate) fn text_argument(tool: &str, input: &Value, field: &str) -> Result<String> {
    let text = match input {
        Value::String(text) => Some(text.as_str()),
        Value::Object(map) => map.get(field).and_then(Value::as_str),
        _ => None,
    };
    text.map(str::to_string).ok_or_else(|| {
        anyhow!("`{tool}` expects a string or an object with a string `{field}` field")
    })
}

/// Reads a JSON object argument, accepting an object encoded as a string.
pub(crate) fn object_argument(tool: &str, input: Value) -> Result<Map<String, Value>> {
    match input {
        Value::Object(map) => Ok(map),
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => Ok(map),
            _ => Err(anyhow!("`{tool}` expects a JSON object, got text")),
        },
        other => Err(anyhow!("`{tool}` expects a JSON object, got {}", json_type(&other))),
    }
}

pub(crate) fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use super::{object_argument, text_argument, Tool, ToolRegistry};

    struct Echo(&'static str);

    #[async_trait]
    impl Tool for Echo {
        fn name(&self) -> &'static str {
            self.0
        }

        fn description(&self) -> &'static str {
            "echoes its input"
        }

        async fn execute(&self, input: Value) -> Result<Value> {
            Ok(input)
        }
    }

    #[test]
    fn registry_keeps_order_and_replaces_duplicates() {
        let mut registry = ToolRegistry::default();
        registry.register(Echo("Metadata API"));
        registry.register(Echo("Validate API"));
        registry.register(Echo("Metadata API"));

        assert_eq!(registry.names(), vec!["Metadata API", "Validate API"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn lookup_ignores_case_and_surrounding_whitespace() {
        let mut registry = ToolRegistry::default();
        registry.register(Echo("World Event Database"));

        assert!(registry.get("  world event database ").is_some());
        assert!(registry.get("Metadata API").is_none());
    }

    #[test]
    fn text_argument_accepts_string_or_field() {
        assert_eq!(text_argument("t", &json!("storms"), "query").unwrap(), "storms");
        assert_eq!(text_argument("t", &json!({ "query": "floods" }), "query").unwrap(), "floods");
        assert!(text_argument("t", &json!(3), "query").is_err());
    }

    #[test]
    fn object_argument_decodes_encoded_objects() {
        let map = object_argument("t", json!("{\"peril\":\"hail\"}")).unwrap();
        assert_eq!(map["peril"], "hail");

        let error = object_argument("t", json!([1, 2])).unwrap_err();
        assert!(error.to_string().contains("got array"));
    }
}
