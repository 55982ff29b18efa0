//! LLM-backed content oracle over an OpenAI-compatible endpoint.
//!
//! One rig agent is built per call with the role's preamble; responses are
//! handed to [`super::grammar`] before anything leaves this module.

use anyhow::{Context, Result};
use async_trait::async_trait;
use coordination::QualityAssessment;
use rig::agent::Agent;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::openai;
use tracing::{debug, warn};

use super::grammar::{parse_assessment, parse_comparison};
use super::{Comparison, ContentOracle, ConversationTurn, DirectionContext, Generation, TurnRole};
use crate::config::OracleEndpointConfig;
use crate::errors::OracleError;
use crate::prompts;

/// Type alias for agents built from OpenAI-compatible endpoints.
pub type OaiAgent = Agent<openai::completion::CompletionModel>;

/// Oracle role; selects preamble and temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Generator,
    Critic,
    Judge,
    Expert,
}

impl Role {
    fn name(self) -> &'static str {
        match self {
            Self::Generator => "generator",
            Self::Critic => "critic",
            Self::Judge => "judge",
            Self::Expert => "expert",
        }
    }

    fn preamble(self) -> &'static str {
        match self {
            Self::Generator => prompts::GENERATOR_PREAMBLE,
            Self::Critic => prompts::CRITIC_PREAMBLE,
            Self::Judge => prompts::JUDGE_PREAMBLE,
            Self::Expert => prompts::EXPERT_PREAMBLE,
        }
    }
}

/// [`ContentOracle`] backed by a rig completions client.
pub struct LlmOracle {
    client: openai::CompletionsClient,
    config: OracleEndpointConfig,
}

impl LlmOracle {
    pub fn new(config: OracleEndpointConfig) -> Result<Self> {
        let client = openai::CompletionsClient::builder()
            .api_key(&config.api_key)
            .base_url(&config.base_url)
            .build()
            .with_context(|| format!("Failed to build oracle client ({})", config.base_url))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &OracleEndpointConfig {
        &self.config
    }

    fn agent(&self, role: Role) -> OaiAgent {
        let temperature = match role {
            Role::Generator => self.config.generator_temperature,
            _ => self.config.judge_temperature,
        };
        self.client
            .agent(&self.config.model)
            .name(role.name())
            .preamble(role.preamble())
            .temperature(temperature)
            .build()
    }

    async fn ask(&self, role: Role, prompt: &str) -> Result<String, OracleError> {
        debug!(
            role = role.name(),
            model = %self.config.model,
            prompt_version = prompts::PROMPT_VERSION,
            chars = prompt.len(),
            "oracle request"
        );
        let response = self
            .agent(role)
            .prompt(prompt)
            .await
            .map_err(|e| classify_error(&e.to_string()))?;
        if response.trim().is_empty() {
            return Err(OracleError::Parse(format!("empty {} response", role.name())));
        }
        Ok(response)
    }
}

#[async_trait]
impl ContentOracle for LlmOracle {
    async fn generate(
        &self,
        task: &str,
        context: &DirectionContext,
    ) -> Result<Generation, OracleError> {
        let prompt = format!("{}\n\n{task}", context.render());
        let raw = self.ask(Role::Generator, &prompt).await?;
        Ok(Generation {
            content: raw.trim().to_string(),
            raw_trace: raw,
        })
    }

    async fn score(
        &self,
        content: &str,
        context: &DirectionContext,
    ) -> Result<QualityAssessment, OracleError> {
        let prompt = format!("{}\n\nScenario:\n{content}", context.render());
        let raw = self.ask(Role::Critic, &prompt).await?;
        let assessment = parse_assessment(&raw);
        if assessment.is_low_confidence() {
            warn!(chars = raw.len(), "assessment missing fields, defaults applied");
        }
        Ok(assessment)
    }

    async fn compare(
        &self,
        content_a: &str,
        content_b: &str,
        context: &str,
    ) -> Result<Comparison, OracleError> {
        let prompt = format!(
            "{context}\n\nSCENARIO 1:\n{content_a}\n\nSCENARIO 2:\n{content_b}"
        );
        let raw = self.ask(Role::Judge, &prompt).await?;
        Ok(Comparison {
            verdict: parse_comparison(&raw),
            reasoning: raw,
        })
    }

    async fn converse(
        &self,
        prompt: &str,
        history: &[ConversationTurn],
    ) -> Result<String, OracleError> {
        self.ask(Role::Expert, &flatten_history(prompt, history)).await
    }
}

/// Flatten a conversation into one prompt.
fn flatten_history(prompt: &str, history: &[ConversationTurn]) -> String {
    let mut text = String::new();
    for turn in history {
        let label = match turn.role {
            TurnRole::User => "PROMPT",
            TurnRole::Assistant => "YOU",
        };
        text.push_str(&format!("[{label}]\n{}\n\n", turn.content));
    }
    text.push_str(&format!("[PROMPT]\n{prompt}"));
    text
}

/// Map a provider error message onto the oracle taxonomy.
fn classify_error(message: &str) -> OracleError {
    let lower = message.to_ascii_lowercase();
    if message.contains("429") || lower.contains("rate limit") || lower.contains("too many requests")
    {
        OracleError::RateLimit(message.to_string())
    } else if lower.contains("connection refused")
        || lower.contains("dns error")
        || lower.contains("error sending request")
    {
        OracleError::Unavailable(message.to_string())
    } else if lower.contains("jsonerror") || lower.contains("no message or tool call") {
        OracleError::Parse(message.to_string())
    } else {
        OracleError::Request(message.to_string())
    }
}
