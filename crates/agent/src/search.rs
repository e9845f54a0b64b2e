use std::sync::Arc;

use anyhow::Result;

use crate::crew::{Agent, Crew, CrewExecutor, Task};
use crate::knowledge::KnowledgeBaseTool;
use crate::llm::LlmClient;
use crate::tools::ToolRegistry;

pub const SEARCH_AGENT_MAX_ITER: usize = 5;

pub fn search_agent(tool: KnowledgeBaseTool, llm: Arc<dyn LlmClient>) -> Agent {
    let mut tools = ToolRegistry::default();
    tools.register(tool);

    Agent::new(
        "Knowledge Base Search Agent",
        "Search the AWS Bedrock Knowledge Base to provide accurate answers to user queries.",
        "You are an expert researcher with access to a vast knowledge base powered by AWS Bedrock.",
        llm,
    )
    .with_tools(tools)
    .with_max_iter(SEARCH_AGENT_MAX_ITER)
}

pub fn search_task(query: &str, agent: Arc<Agent>) -> Task {
    Task::new(
        "search",
        format!("Search the knowledge base for: {query}"),
        "The exact content retrieved from the Bedrock Knowledge Base for the query.",
        agent,
    )
}

/// One agent, one task, one run.
pub async fn run_search(
    executor: &dyn CrewExecutor,
    query: &str,
    tool: KnowledgeBaseTool,
    llm: Arc<dyn LlmClient>,
) -> Result<String> {
    let agent = Arc::new(search_agent(tool, llm));
    let crew = Crew::sequential(vec![search_task(query, agent)]);
    executor.kickoff(&crew).await
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use anyhow::Result;
    use async_trait::async_trait;
    use covermatch_clients::RetrievalResult;

    use super::{run_search, SEARCH_AGENT_MAX_ITER};
    use crate::crew::SequentialExecutor;
    use crate::knowledge::{KnowledgeBaseTool, Retriever};
    use crate::llm::LlmClient;

    struct OnePassage;

    #[async_trait]
    impl Retriever for OnePassage {
        async fn retrieve(&self, query: &str, _top_k: u32) -> Result<Vec<RetrievalResult>> {
            Ok(vec![RetrievalResult { content: format!("passage about {query}"), score: 0.8 }])
        }
    }

    /// Calls the search tool once, then answers with the observation it saw.
    #[derive(Default)]
    struct EchoingLlm {
        systems: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LlmClient for EchoingLlm {
        async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
            self.systems.lock().expect("systems lock").push(system.to_string());
            match prompt.split_once("Observation: ") {
                Some((_, observation)) => Ok(format!("Final Answer: {}", observation.trim())),
                None => Ok("Action: Bedrock Knowledge Base Search\nAction Input: {\"query\": \"hail cover\"}"
                    .to_string()),
            }
        }
    }

    #[tokio::test]
    async fn search_crew_retrieves_through_the_tool() {
        let llm = Arc::new(EchoingLlm::default());
        let tool = KnowledgeBaseTool::new(Arc::new(OnePassage));

        let answer = run_search(&SequentialExecutor, "hail cover", tool, llm.clone())
            .await
            .expect("search runs");

        assert_eq!(answer, "passage about hail cover");
        let systems = llm.systems.lock().unwrap();
        assert!(systems[0].starts_with("You are Knowledge Base Search Agent."));
        assert!(systems[0].contains("- Bedrock Knowledge Base Search:"));
    }

    #[test]
    fn search_agent_is_capped_at_five_iterations() {
        let agent = super::search_agent(
            KnowledgeBaseTool::new(Arc::new(OnePassage)),
            Arc::new(EchoingLlm::default()),
        );
        assert_eq!(agent.max_iter, SEARCH_AGENT_MAX_ITER);
        assert_eq!(agent.tools.names(), vec!["Bedrock Knowledge Base Search"]);
    }
}
