//! Agents, tasks and crews, plus the executor that runs them.
//!
//! The pipelines only build a [`Crew`] and hand it to a [`CrewExecutor`];
//! [`SequentialExecutor`] is the bundled backend. It drives each task through a
//! ReAct-style exchange (`Action:` / `Action Input:` / `Observation:` /
//! `Final Answer:`) against the agent's [`LlmClient`].

use std::fmt;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::llm::LlmClient;
use crate::tools::ToolRegistry;

pub const DEFAULT_MAX_ITER: usize = 15;

const FINAL_ANSWER: &str = "Final Answer:";
const ACTION: &str = "Action:";
const ACTION_INPUT: &str = "Action Input:";
const OBSERVATION: &str = "Observation:";

pub struct Agent {
    pub role: String,
    pub goal: String,
    pub backstory: String,
    pub tools: ToolRegistry,
    pub llm: Arc<dyn LlmClient>,
    pub max_iter: usize,
}

impl Agent {
    pub fn new(
        role: impl Into<String>,
        goal: impl Into<String>,
        backstory: impl Into<String>,
        llm: Arc<dyn LlmClient>,
    ) -> Self {
        Self {
            role: role.into(),
            goal: goal.into(),
            backstory: backstory.into(),
            tools: ToolRegistry::default(),
            llm,
            max_iter: DEFAULT_MAX_ITER,
        }
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("role", &self.role)
            .field("tools", &self.tools)
            .field("max_iter", &self.max_iter)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug)]
pub struct Task {
    pub name: String,
    pub description: String,
    pub expected_output: String,
    pub context: Option<String>,
    pub agent: Arc<Agent>,
}

impl Task {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        expected_output: impl Into<String>,
        agent: Arc<Agent>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            expected_output: expected_output.into(),
            context: None,
            agent,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// Tasks run one after another, each seeing the outputs before it.
#[derive(Clone, Debug)]
pub struct Crew {
    pub tasks: Vec<Task>,
}

impl Crew {
    pub fn sequential(tasks: Vec<Task>) -> Self {
        Self { tasks }
    }
}

#[async_trait]
pub trait CrewExecutor: Send + Sync {
    /// Runs the crew and returns the final task's output.
    async fn kickoff(&self, crew: &Crew) -> Result<String>;
}

#[derive(Clone, Debug)]
pub struct TaskOutput {
    pub task: String,
    pub output: String,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SequentialExecutor;

#[async_trait]
impl CrewExecutor for SequentialExecutor {
    async fn kickoff(&self, crew: &Crew) -> Result<String> {
        if crew.tasks.is_empty() {
            bail!("crew has no tasks to run");
        }

        let total = crew.tasks.len();
        let mut completed: Vec<TaskOutput> = Vec::with_capacity(total);
        for (index, task) in crew.tasks.iter().enumerate() {
            info!(
                event_name = "crew.task.started",
                task = %task.name,
                position = index + 1,
                total,
                "running task"
            );
            let output = run_task(task, &completed)
                .await
                .with_context(|| format!("task `{}` failed", task.name))?;
            info!(event_name = "crew.task.completed", task = %task.name, "task completed");
            completed.push(TaskOutput { task: task.name.clone(), output });
        }

        Ok(completed.pop().map(|last| last.output).unwrap_or_default())
    }
}

async fn run_task(task: &Task, completed: &[TaskOutput]) -> Result<String> {
    let agent = &task.agent;
    let system = system_prompt(agent, true);
    let mut transcript = task_prompt(task, completed);

    for iteration in 1..=agent.max_iter.max(1) {
        let reply = agent.llm.complete(&system, &transcript).await?;
        match parse_reply(&reply) {
            AgentStep::FinalAnswer(answer) => return Ok(answer),
            AgentStep::Action { tool, input, raw_input } => {
                debug!(event_name = "crew.tool.called", tool = %tool, iteration, "agent chose tool");
                let observation = observe(&agent.tools, &tool, input).await;
                transcript.push_str(&format!(
                    "\n{ACTION} {tool}\n{ACTION_INPUT} {raw_input}\n{OBSERVATION} {observation}\n"
                ));
            }
        }
    }

    warn!(
        event_name = "crew.task.iteration_limit",
        task = %task.name,
        max_iter = agent.max_iter,
        "iteration budget exhausted, forcing final answer"
    );
    transcript.push_str(
        "\nYou have reached the maximum number of tool calls. \
         Give your best final answer now, without calling any tool.\n",
    );
    let reply = agent.llm.complete(&system_prompt(agent, false), &transcript).await?;
    Ok(match parse_reply(&reply) {
        AgentStep::FinalAnswer(answer) => answer,
        AgentStep::Action { .. } => reply.trim().to_string(),
    })
}

async fn observe(tools: &ToolRegistry, name: &str, input: Value) -> String {
    let Some(tool) = tools.get(name) else {
        warn!(event_name = "crew.tool.unknown", tool = %name, "agent requested unknown tool");
        return format!(
            "Unknown tool `{name}`. Available tools: {}",
            tools.names().join(", ")
        );
    };

    match tool.execute(input).await {
        Ok(Value::String(text)) => text,
        Ok(value) => serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()),
        Err(error) => {
            warn!(
                event_name = "crew.tool.failed",
                tool = %name,
                error = %format!("{error:#}"),
                "tool call failed"
            );
            format!("Tool `{name}` failed: {error:#}")
        }
    }
}

fn system_prompt(agent: &Agent, with_tools: bool) -> String {
    let mut prompt = format!(
        "You are {}. {}\nYour personal goal is: {}\n",
        agent.role,
        collapse_whitespace(&agent.backstory),
        agent.goal
    );

    if with_tools && !agent.tools.is_empty() {
        prompt.push_str("\nYou have access to the following tools:\n");
        for tool in agent.tools.iter() {
            prompt.push_str(&format!("- {}: {}\n", tool.name(), tool.description()));
        }
        prompt.push_str(&format!(
            "\nTo use a tool, reply with exactly these two lines and nothing after them:\n\
             {ACTION} <tool name>\n\
             {ACTION_INPUT} <tool input as JSON>\n\
             You will receive the result as an {OBSERVATION} line.\n"
        ));
    }
    prompt.push_str(&format!(
        "\nWhen you have the answer, reply with:\n{FINAL_ANSWER} <your complete answer>\n"
    ));
    prompt
}

fn task_prompt(task: &Task, completed: &[TaskOutput]) -> String {
    let mut prompt = format!(
        "Current Task: {}\n\nThis is the expected criteria for your final answer: {}\n",
        task.description.trim(),
        task.expected_output
    );
    if let Some(context) = &task.context {
        prompt.push_str(&format!("\nContext:\n{}\n", context.trim()));
    }
    if !completed.is_empty() {
        prompt.push_str("\nOutputs of previous tasks:\n");
        for previous in completed {
            prompt.push_str(&format!("## {}\n{}\n", previous.task, previous.output));
        }
    }
    prompt.push_str("\nBegin!\n");
    prompt
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Clone, Debug, PartialEq)]
enum AgentStep {
    Action { tool: String, input: Value, raw_input: String },
    FinalAnswer(String),
}

/// A reply without an action is treated as the final answer.
fn parse_reply(reply: &str) -> AgentStep {
    if let Some(index) = reply.find(FINAL_ANSWER) {
        return AgentStep::FinalAnswer(reply[index + FINAL_ANSWER.len()..].trim().to_string());
    }

    let Some(action_at) = reply.find(ACTION) else {
        return AgentStep::FinalAnswer(reply.trim().to_string());
    };
    let after_action = &reply[action_at + ACTION.len()..];
    let Some(input_at) = after_action.find(ACTION_INPUT) else {
        return AgentStep::FinalAnswer(reply.trim().to_string());
    };

    let tool = after_action[..input_at].trim().to_string();
    let mut raw_input = &after_action[input_at + ACTION_INPUT.len()..];
    if let Some(hallucinated) = raw_input.find(OBSERVATION) {
        raw_input = &raw_input[..hallucinated];
    }
    let raw_input = strip_code_fence(raw_input.trim()).to_string();
    let input = serde_json::from_str(&raw_input).unwrap_or_else(|_| {
        Value::String(raw_input.trim_matches('"').to_string())
    });

    AgentStep::Action { tool, input, raw_input }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(body) = text.strip_prefix("```") else {
        return text;
    };
    let body = body.strip_prefix("json").unwrap_or(body);
    body.strip_suffix("```").unwrap_or(body).trim()
}
