use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use covermatch_agent::matcher::{matcher_agent, matcher_tools};
use covermatch_agent::{BedrockLlm, InputSource, MatcherPipeline, SequentialExecutor};
use covermatch_clients::{BedrockRuntimeClient, HttpClient, KnowledgeBaseClient, RiskwolfClient};
use covermatch_core::config::{AppConfig, LoadOptions, LogFormat};
use tracing_subscriber::EnvFilter;

use crate::commands::CommandResult;

const COMMAND: &str = "match";

pub const SAMPLE_USER_INPUT: &str = "I need coverage for flight delay insurance with the following parameters:
- Coverage for flights between JFK and LAX
- Coverage period: January 1, 2024 to March 31, 2024
- Payout trigger: Delays of 2+ hours
- Payout amount: $200 per incident
- Maximum coverage: $1000 per customer";

pub const SAMPLE_AGENT1_INPUT: &str = "Risk Profile for AirTravelers Inc:

Company: AirTravelers Inc
Industry: Travel Insurance
Primary Risk Factors:
- Offering flight delay insurance for domestic US routes
- Historical data shows 15% of flights delayed by 2+ hours
- Peak delay seasons: Winter (Dec-Feb) and Summer (Jun-Aug)
- Target customer base: Business travelers

Recommended Coverage Structure:
- Parametric trigger based on flight delay time
- Tiered payout structure based on delay duration
- Seasonal pricing adjustments
- Integration with flight tracking APIs";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MatchInput {
    Text(String),
    File(PathBuf),
    /// The built-in example for the chosen source.
    Sample,
}

pub fn sample_for(source: InputSource) -> &'static str {
    match source {
        InputSource::User => SAMPLE_USER_INPUT,
        InputSource::Agent1 => SAMPLE_AGENT1_INPUT,
    }
}

pub fn resolve_input(input: MatchInput, source: InputSource) -> Result<String, String> {
    let text = match input {
        MatchInput::Text(text) => text,
        MatchInput::File(path) => fs::read_to_string(&path)
            .map_err(|error| format!("could not read input file `{}`: {error}", path.display()))?,
        MatchInput::Sample => sample_for(source).to_string(),
    };

    if text.trim().is_empty() {
        return Err("matcher input must not be empty".to_string());
    }
    Ok(text)
}

pub fn run(source: &str, input: MatchInput) -> CommandResult {
    let source = match source.parse::<InputSource>() {
        Ok(source) => source,
        Err(error) => return CommandResult::failure(COMMAND, "invalid_input", error.to_string(), 4),
    };
    let text = match resolve_input(input, source) {
        Ok(text) => text,
        Err(message) => return CommandResult::failure(COMMAND, "invalid_input", message, 4),
    };

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };
    init_logging(&config);

    let pipeline = match build_pipeline(&config) {
        Ok(pipeline) => pipeline,
        Err(message) => return CommandResult::failure(COMMAND, "config_validation", message, 2),
    };

    run_with(&pipeline, &text, source)
}

/// Runs `pipeline` once on a fresh current-thread runtime.
pub fn run_with(pipeline: &MatcherPipeline, text: &str, source: InputSource) -> CommandResult {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    match runtime.block_on(pipeline.process_input(text, source)) {
        Ok(result) => CommandResult::success_with_result(
            COMMAND,
            format!("matcher completed for {source} input"),
            result,
        ),
        Err(error) => CommandResult::failure(COMMAND, "matcher_run", format!("{error:#}"), 5),
    }
}

fn build_pipeline(config: &AppConfig) -> Result<MatcherPipeline, String> {
    let knowledge_base_id = config.bedrock.knowledge_base_id.clone().ok_or_else(|| {
        "bedrock.knowledge_base_id (BEDROCK_KB_ID) is required by the matcher".to_string()
    })?;
    let http = HttpClient::builder()
        .build()
        .map_err(|error| format!("failed to build http client: {error}"))?;

    let riskwolf = RiskwolfClient::from_config(http.clone(), &config.riskwolf);
    let knowledge =
        Arc::new(KnowledgeBaseClient::from_config(http.clone(), &config.bedrock, knowledge_base_id));
    let llm = BedrockLlm::from_config(
        BedrockRuntimeClient::from_config(http, &config.bedrock, &config.llm),
        &config.llm,
    );

    let agent = matcher_agent(Arc::new(llm), matcher_tools(&riskwolf, knowledge));
    Ok(MatcherPipeline::new(agent, Arc::new(SequentialExecutor)))
}

/// Logs go to stderr so stdout stays a single JSON document.
fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder =
        tracing_subscriber::fmt().with_target(false).with_env_filter(filter).with_writer(std::io::stderr);

    let _ = match config.logging.format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
