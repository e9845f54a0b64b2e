//! Riskwolf endpoints exposed to the matcher agent as tools.
//!
//! Every tool is a thin adapter: it shapes the model's `Action Input` into the
//! client call and hands back the response body untouched. Client failures
//! propagate to the executor, which reports them to the model as observations.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use covermatch_clients::RiskwolfClient;
use serde_json::{Map, Value};

use crate::tools::{object_argument, text_argument, Tool, ToolRegistry};

pub struct MetadataTool {
    client: RiskwolfClient,
}

#[async_trait]
impl Tool for MetadataTool {
    fn name(&self) -> &'static str {
        "Metadata API"
    }

    fn description(&self) -> &'static str {
        "Get metadata information from Riskwolf"
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let query = text_argument(self.name(), &input, "query")?;
        Ok(self.client.metadata(&query).await?)
    }
}

pub struct ValidateTool {
    client: RiskwolfClient,
}

#[async_trait]
impl Tool for ValidateTool {
    fn name(&self) -> &'static str {
        "Validate API"
    }

    fn description(&self) -> &'static str {
        "Validate coverage configurations"
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let config = object_argument(self.name(), input)?;
        Ok(self.client.validate(&Value::Object(config)).await?)
    }
}

/// Input: `{"index_id": "...", "params": {...}}`; `params` may be omitted.
pub struct IndexValuesTool {
    client: RiskwolfClient,
}

#[async_trait]
impl Tool for IndexValuesTool {
    fn name(&self) -> &'static str {
        "Index Values API"
    }

    fn description(&self) -> &'static str {
        "Get index values from Riskwolf"
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let mut args = object_argument(self.name(), input)?;
        let index_id = match args.remove("index_id") {
            Some(Value::String(id)) if !id.trim().is_empty() => id,
            _ => return Err(anyhow!("`{}` requires a string `index_id`", self.name())),
        };
        let params = match args.remove("params") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(params)) => params,
            Some(_) => return Err(anyhow!("`{}` expects `params` to be an object", self.name())),
        };
        Ok(self.client.index_values(&index_id, &params).await?)
    }
}

pub struct BuildCoverageTool {
    client: RiskwolfClient,
}

#[async_trait]
impl Tool for BuildCoverageTool {
    fn name(&self) -> &'static str {
        "Build Coverage Tool"
    }

    fn description(&self) -> &'static str {
        "Build coverage options and calculate burn cost"
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let params = object_argument(self.name(), input)?;
        Ok(self.client.build_coverage(&Value::Object(params)).await?)
    }
}

pub struct CoverageConfigTool {
    client: RiskwolfClient,
}

#[async_trait]
impl Tool for CoverageConfigTool {
    fn name(&self) -> &'static str {
        "Coverage Config API"
    }

    fn description(&self) -> &'static str {
        "Configure coverage details"
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let config = object_argument(self.name(), input)?;
        Ok(self.client.configure_coverage(&Value::Object(config)).await?)
    }
}

pub struct WorldEventTool {
    client: RiskwolfClient,
}

#[async_trait]
impl Tool for WorldEventTool {
    fn name(&self) -> &'static str {
        "World Event Database"
    }

    fn description(&self) -> &'static str {
        "Query the World Event/Coverage Database"
    }

    async fn execute(&self, input: Value) -> Result<Value> {
        let query = text_argument(self.name(), &input, "query")?;
        Ok(self.client.world_events(&query).await?)
    }
}

/// Registers the six Riskwolf tools, all sharing one client.
pub fn register_riskwolf_tools(registry: &mut ToolRegistry, client: &RiskwolfClient) {
    registry.register(MetadataTool { client: client.clone() });
    registry.register(ValidateTool { client: client.clone() });
    registry.register(IndexValuesTool { client: client.clone() });
    registry.register(BuildCoverageTool { client: client.clone() });
    registry.register(CoverageConfigTool { client: client.clone() });
    registry.register(WorldEventTool { client: client.clone() });
}
