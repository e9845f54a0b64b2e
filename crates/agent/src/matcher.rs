//! The coverage matcher: one agent running a Plan, Do, Check, Act crew.
//!
//! Every run executes the four stages once, in order. The Act stage may
//! describe a revision ("needs_revision") but nothing loops back to Plan.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use covermatch_clients::RiskwolfClient;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::info;

use crate::crew::{Agent, Crew, CrewExecutor, Task};
use crate::knowledge::{KnowledgeLookupTool, Retriever};
use crate::llm::LlmClient;
use crate::riskwolf_tools::register_riskwolf_tools;
use crate::tools::ToolRegistry;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InputSource {
    #[default]
    User,
    /// Output of the upstream profiler agent.
    Agent1,
}

impl InputSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Agent1 => "agent1",
        }
    }

    fn context_note(self) -> &'static str {
        match self {
            Self::User => {
                "This input comes directly from a user who has a clear definition of their needs."
            }
            Self::Agent1 => {
                "This input comes from Agent 1 (Profiler) and contains a risk profile."
            }
        }
    }
}

impl fmt::Display for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("unknown input source `{0}` (expected `user` or `agent1`)")]
pub struct UnknownSource(pub String);

impl FromStr for InputSource {
    type Err = UnknownSource;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "agent1" => Ok(Self::Agent1),
            _ => Err(UnknownSource(value.to_string())),
        }
    }
}

const ROLE: &str = "Coverage Matcher";
const GOAL: &str = "Match user requirements to optimal coverage options";
const BACKSTORY: &str = "You are an expert in matching user requirements to the optimal \
coverage options. You understand paramXEL documentation and can navigate complex coverage \
configurations. Your job is to take clear definitions from users and find the best matching \
coverage options.";

struct Stage {
    name: &'static str,
    description: &'static str,
    expected_output: &'static str,
}

const PLAN: Stage = Stage {
    name: "plan",
    description: "PLAN PHASE: Orchestrate and plan the matching process.

1. Analyze the input requirements (either from user or Agent 1)
2. Identify key parameters needed for matching
3. Determine which APIs and tools will be needed
4. Create a structured plan for the matching process

Your output should be a JSON with:
- requirements_analysis: summary of the key requirements
- parameters_needed: list of parameters needed for matching
- tools_to_use: list of tools/APIs to be used
- matching_plan: step-by-step plan for the matching process",
    expected_output: "A structured matching plan in JSON format",
};

const DO: Stage = Stage {
    name: "do",
    description: "DO PHASE: Execute the matching plan using the appropriate tools.

1. Use the Metadata API to get relevant metadata
2. Parse paramXEL documentation for configuration details
3. Use the Build Coverage Tool to create coverage options
4. Configure coverage details using the Coverage Config API

Your output should include:
- metadata_results: results from the Metadata API
- paramxel_details: relevant details from paramXEL documentation
- coverage_options: options generated by the Build Coverage Tool
- coverage_config: configuration details",
    expected_output: "Results from executing the matching plan",
};

const CHECK: Stage = Stage {
    name: "check",
    description: "CHECK PHASE: Validate and critique the matching results.

1. Use the Validate API to validate the coverage configuration
2. Check the results against the World Event Database
3. Verify against the Bedrock Knowledge Base
4. Critique the matching results for accuracy and completeness

Your output should include:
- validation_results: results from the Validate API
- event_check: relevant events from the World Event Database
- knowledge_check: verification from the Bedrock Knowledge Base
- critique: critical evaluation of the matching results
- pass_check: boolean indicating if the results pass validation",
    expected_output: "Validation results and critique",
};

const ACT: Stage = Stage {
    name: "act",
    description: "ACT PHASE: Finalize the matching results.

If the results passed validation:
1. Format the final coverage options
2. Provide a summary of the matching process
3. Include any recommendations for the user

If the results did not pass validation:
1. Identify the issues that need to be addressed
2. Recommend changes to the matching plan
3. Indicate that the process should return to the PLAN phase

Your output should be a JSON with:
- status: \"final\" or \"needs_revision\"
- coverage_options: final coverage options (if status is \"final\")
- summary: summary of the matching process
- recommendations: recommendations for the user
- issues: issues that need to be addressed (if status is \"needs_revision\")",
    expected_output: "Final matching results or revision plan",
};

const STAGES: [Stage; 4] = [PLAN, DO, CHECK, ACT];

/// The Riskwolf tools followed by the two knowledge-base tools.
pub fn matcher_tools(riskwolf: &RiskwolfClient, knowledge: Arc<dyn Retriever>) -> ToolRegistry {
    let mut tools = ToolRegistry::default();
    register_riskwolf_tools(&mut tools, riskwolf);
    tools.register(KnowledgeLookupTool::knowledge_base(knowledge.clone()));
    tools.register(KnowledgeLookupTool::paramxel_docs(knowledge));
    tools
}

pub fn matcher_agent(llm: Arc<dyn LlmClient>, tools: ToolRegistry) -> Agent {
    Agent::new(ROLE, GOAL, BACKSTORY, llm).with_tools(tools)
}

/// Context handed to the Plan stage; the only part of a run that depends on the source.
pub fn plan_context(input: &str, source: InputSource) -> String {
    format!("Input from {source}: {input}\n{}", source.context_note())
}

pub fn pdca_tasks(agent: &Arc<Agent>, input: &str, source: InputSource) -> Vec<Task> {
    STAGES
        .iter()
        .map(|stage| {
            let task =
                Task::new(stage.name, stage.description, stage.expected_output, agent.clone());
            if stage.name == PLAN.name {
                task.with_context(plan_context(input, source))
            } else {
                task
            }
        })
        .collect()
}

/// Best-effort JSON: a parseable reply is returned as-is, anything else is wrapped.
pub fn parse_matching_result(output: &str) -> Value {
    serde_json::from_str(output.trim()).unwrap_or_else(|_| json!({ "matching_results": output }))
}

pub struct MatcherPipeline {
    agent: Arc<Agent>,
    executor: Arc<dyn CrewExecutor>,
}

impl MatcherPipeline {
    pub fn new(agent: Agent, executor: Arc<dyn CrewExecutor>) -> Self {
        Self { agent: Arc::new(agent), executor }
    }

    pub fn crew(&self, input: &str, source: InputSource) -> Crew {
        Crew::sequential(pdca_tasks(&self.agent, input, source))
    }

    pub async fn process_input(&self, input: &str, source: InputSource) -> Result<Value> {
        info!(event_name = "matcher.run.started", source = %source, "starting matcher run");
        let output = self.executor.kickoff(&self.crew(input, source)).await?;
        let result = parse_matching_result(&output);
        let structured = !result.get("matching_results").is_some_and(Value::is_string);
        info!(
            event_name = "matcher.run.completed",
            source = %source,
            structured,
            "matcher run completed"
        );
        Ok(result)
    }
}
