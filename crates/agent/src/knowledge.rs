//! Knowledge-base retrieval as agent tools.
//!
//! [`KnowledgeBaseTool`] backs the search service: it accepts the loose input
//! shapes models produce, normalizes them to one query string, and never fails
//! on retrieval problems (it answers with [`FALLBACK_RESPONSE`] instead).
//! [`KnowledgeLookupTool`] backs the matcher palette and propagates errors.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use covermatch_clients::{KnowledgeBaseClient, RetrievalResult};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{error, info};

use crate::tools::{json_type, Tool};

/// Passages requested per retrieval call.
pub const TOP_K: u32 = 5;

pub const FALLBACK_RESPONSE: &str =
    "No relevant information was found in the knowledge base for this query.";

#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str, top_k: u32) -> Result<Vec<RetrievalResult>>;
}

#[async_trait]
impl Retriever for KnowledgeBaseClient {
    async fn retrieve(&self, query: &str, top_k: u32) -> Result<Vec<RetrievalResult>> {
        Ok(KnowledgeBaseClient::retrieve(self, query, top_k).await?)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum QueryInputError {
    #[error("invalid query type: must be a string or an object, got {0}")]
    UnsupportedType(&'static str),
    #[error("invalid query: `{field}` must be a string, got {found}")]
    NonStringQuery { field: &'static str, found: &'static str },
    #[error("invalid query: must be a non-empty string")]
    EmptyQuery,
    #[error("invalid encoded query: {0}")]
    MalformedEncoding(String),
}

/// The shapes a retrieval tool input arrives in.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryInput {
    Text(String),
    /// A JSON object serialized into a string.
    ///
    /// Normalized exactly like `Mapping`, so `description` also stands in for an
    /// absent or empty `query` here.
    Encoded(String),
    Mapping(Map<String, Value>),
}

impl QueryInput {
    pub fn from_value(value: Value) -> Result<Self, QueryInputError> {
        match value {
            Value::String(text) => Ok(Self::from_text(text)),
            Value::Object(map) => Ok(Self::Mapping(map)),
            other => Err(QueryInputError::UnsupportedType(json_type(&other))),
        }
    }

    /// Strings that decode to a JSON object are `Encoded`; anything else is plain text.
    pub fn from_text(text: String) -> Self {
        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(_)) => Self::Encoded(text),
            _ => Self::Text(text),
        }
    }

    pub fn into_query(self) -> Result<String, QueryInputError> {
        match self {
            Self::Text(text) => normalize_text(text),
            Self::Encoded(encoded) => normalize_encoded(&encoded),
            Self::Mapping(map) => normalize_mapping(&map),
        }
    }
}

fn normalize_text(text: String) -> Result<String, QueryInputError> {
    if text.trim().is_empty() {
        return Err(QueryInputError::EmptyQuery);
    }
    Ok(text)
}

fn normalize_encoded(encoded: &str) -> Result<String, QueryInputError> {
    match serde_json::from_str::<Value>(encoded) {
        Ok(Value::Object(map)) => normalize_mapping(&map),
        Ok(other) => Err(QueryInputError::MalformedEncoding(format!(
            "expected an object, got {}",
            json_type(&other)
        ))),
        Err(error) => Err(QueryInputError::MalformedEncoding(error.to_string())),
    }
}

fn normalize_mapping(map: &Map<String, Value>) -> Result<String, QueryInputError> {
    for field in ["query", "description"] {
        match map.get(field) {
            None | Some(Value::Null) => {}
            Some(Value::String(text)) if text.trim().is_empty() => {}
            Some(Value::String(text)) => return Ok(text.clone()),
            Some(other) => {
                return Err(QueryInputError::NonStringQuery { field, found: json_type(other) })
            }
        }
    }
    Err(QueryInputError::EmptyQuery)
}

/// "Bedrock Knowledge Base Search": one retrieval, passages joined by newlines.
#[derive(Clone)]
pub struct KnowledgeBaseTool {
    retriever: Arc<dyn Retriever>,
}

impl KnowledgeBaseTool {
    pub fn new(retriever: Arc<dyn Retriever>) -> Self {
        Self { retriever }
    }

    /// Input-shape problems are errors; retrieval problems are not.
    pub async fn run(&self, input: Value) -> Result<String, QueryInputError> {
        let query = QueryInput::from_value(input)?.into_query()?;

        match self.retriever.retrieve(&query, TOP_K).await {
            Ok(results) if results.is_empty() => {
                info!(
                    event_name = "knowledge.search.empty",
                    query = %query,
                    "no passages found, returning fallback response"
                );
                Ok(FALLBACK_RESPONSE.to_string())
            }
            Ok(results) => Ok(results
                .into_iter()
                .map(|result| result.content)
                .collect::<Vec<_>>()
                .join("\n")),
            Err(err) => {
                error!(
                    event_name = "knowledge.search.failed",
                    query = %query,
                    error = %format!("{err:#}"),
                    "knowledge base retrieval failed, returning fallback response"
                );
                Ok(FALLBACK_RESPONSE.to_string())
            }
        }
    }
}

#[async_trait]
impl Tool for KnowledgeBaseTool {
    fn name(&self) -> &'static str {
        "Bedrock Knowledge Base Search"
    }

    fn description(&self) -> &'static str {
        "Searches an AWS Bedrock Knowledge Base for relevant information based on a query."
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        Ok(Value::String(self.run(input).await?))
    }
}

/// Matcher-palette retrieval returning the ranked `{content, score}` list as JSON.
#[derive(Clone)]
pub struct KnowledgeLookupTool {
    retriever: Arc<dyn Retriever>,
    name: &'static str,
    description: &'static str,
    query_prefix: &'static str,
}

impl KnowledgeLookupTool {
    pub fn knowledge_base(retriever: Arc<dyn Retriever>) -> Self {
        Self {
            retriever,
            name: "Bedrock Knowledge Base",
            description: "Query the Amazon Bedrock Knowledge Base",
            query_prefix: "",
        }
    }

    /// paramXEL documentation lives in the same knowledge base; queries are steered by prefix.
    pub fn paramxel_docs(retriever: Arc<dyn Retriever>) -> Self {
        Self {
            retriever,
            name: "paramXEL Documentation",
            description: "Parse paramXEL documentation for relevant information",
            query_prefix: "paramXEL documentation for ",
        }
    }

    pub async fn lookup(&self, query: &str) -> Result<String> {
        let query = format!("{}{query}", self.query_prefix);
        let results = self.retriever.retrieve(&query, TOP_K).await?;
        Ok(serde_json::to_string_pretty(&results)?)
    }
}

#[async_trait]
impl Tool for KnowledgeLookupTool {
    fn name(&self) -> &'static str {
        self.name
    }

    fn description(&self) -> &'static str {
        self.description
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let query = QueryInput::from_value(input)?.into_query()?;
        Ok(Value::String(self.lookup(&query).await?))
    }
}
