use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, warn};

use crate::extraction::{ExtractionModel, RawExtraction};
use crate::external::{ExternalError, LLMEngine};

pub const ALLOWED_NODES: &[&str] = &[
    "Person",
    "Organization",
    "Project",
    "Product",
    "Technology",
    "Concept",
];

pub const ALLOWED_RELATIONSHIPS: &[&str] = &[
    "WORKS_FOR",
    "WORKS_ON",
    "MANAGES",
    "LAUNCHED",
    "USES",
    "ASSOCIATED_WITH",
];

/// Extraction model backed by a generative LLM asked to reply in JSON
pub struct LlmExtractor {
    engine: LLMEngine,
}

impl LlmExtractor {
    pub fn new(engine: LLMEngine) -> Self {
        Self { engine }
    }

    pub fn build_prompt(text: &str) -> String {
        format!(
            "Extract a knowledge graph from the text below. \
             Reply with a single JSON object and nothing else, shaped as:\n\
             {{\"entities\": [{{\"name\": \"...\", \"type\": \"...\"}}], \
             \"relationships\": [{{\"source\": \"...\", \"target\": \"...\", \"label\": \"...\"}}]}}\n\
             Allowed entity types: {}.\n\
             Allowed relationship labels: {}.\n\
             Use entity names exactly as written in the text.\n\n\
             Text:\n{}",
            ALLOWED_NODES.join(", "),
            ALLOWED_RELATIONSHIPS.join(", "),
            text
        )
    }

    /// Parse an LLM reply. Anything that is not a usable JSON object is a
    /// permanent failure: asking again with the same text rarely helps.
    pub fn parse_reply(reply: &str) -> Result<RawExtraction, ExternalError> {
        let sanitized = sanitize_json(reply);
        serde_json::from_str::<RawExtraction>(&sanitized).map_err(|e| {
            warn!(error = %e, "unparseable extraction reply");
            let preview: String = reply.chars().take(200).collect();
            ExternalError::PermanentExtraction(format!("{} (reply: {})", e, preview))
        })
    }
}

fn trailing_commas() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r",(\s*[\]}])").expect("valid trailing comma pattern"))
}

/// Strip markdown fences and surrounding chatter, isolate the outermost JSON
/// object and remove trailing commas
fn sanitize_json(reply: &str) -> String {
    let trimmed = reply.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_end().trim_end_matches("```"))
        .unwrap_or(trimmed);

    let object = match (unfenced.find('{'), unfenced.rfind('}')) {
        (Some(start), Some(end)) if start < end => &unfenced[start..=end],
        _ => unfenced,
    };

    trailing_commas().replace_all(object, "$1").into_owned()
}

#[async_trait]
impl ExtractionModel for LlmExtractor {
    async fn extract(&self, text: &str) -> Result<RawExtraction, ExternalError> {
        let prompt = Self::build_prompt(text);
        let reply = self.engine.generate(&prompt).await.map_err(|e| match e {
            ExternalError::ConfigError(_) => e,
            other => ExternalError::RetryableExtraction(other.to_string()),
        })?;
        debug!(model = %self.engine.model(), reply_len = reply.len(), "extraction reply received");
        Self::parse_reply(&reply)
    }
}
