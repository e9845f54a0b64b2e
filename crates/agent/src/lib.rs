//! Agent orchestration for covermatch.
//!
//! - `crew` - agents, tasks, and the sequential executor
//! - `matcher` - the Plan/Do/Check/Act coverage matcher
//! - `search` - the single-task knowledge search crew
//! - `knowledge`, `riskwolf_tools` - the tools those crews call

pub mod crew;
pub mod knowledge;
pub mod llm;
pub mod matcher;
pub mod riskwolf_tools;
pub mod search;
pub mod tools;

pub use crew::{Agent, Crew, CrewExecutor, SequentialExecutor, Task};
pub use knowledge::{KnowledgeBaseTool, QueryInput, QueryInputError, Retriever, FALLBACK_RESPONSE};
pub use llm::{BedrockLlm, LlmClient};
pub use matcher::{InputSource, MatcherPipeline};
pub use tools::{Tool, ToolRegistry};
