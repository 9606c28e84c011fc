use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::env;
use tracing::warn;

use crate::config::AnthropicConfig;
use crate::models::{Difficulty, JobRole, OfferStatus};

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Placeholder some model outputs use for missing values. The prompts forbid
/// it and the notification quality gate rejects any description carrying it.
pub const UNKNOWN_SENTINEL: &str = "<UNKNOWN>";

const CLASSIFY_MAX_TOKENS: u32 = 1024;
const DETAILS_MAX_TOKENS: u32 = 4096;

const CLASSIFY_PROMPT: &str = "\
Determine if this is an interview experience. An interview experience is a post \
where a candidate shares how their interview at a company went, given as a title \
and summary, usually with the company name in the title and details such as \
duration, number of rounds and job role. If it is one, extract the company name.";

const DETAILS_PROMPT_TAIL: &str = "\
Analyze the interview experience. Match it to the MOST appropriate internal job \
role ID from the list above; if no perfect match exists, pick the closest one \
(e.g. Software Engineer) or the most generic. Then extract the rest of the \
interview details with the interview_experience_extraction tool.
Write every answer from the candidate's point of view, never as a third person. \
Keep the candidate's wording intact rather than summarizing, and convert any HTML \
or rich text to markdown. When a value is not present, leave the field empty \
instead of writing <UNKNOWN>. If the post hints at a seniority level, reflect it \
in the role match.

CONFIDENCE SCORE INSTRUCTIONS:
Assign a confidence_score (0-100) for the quality of this interview experience.
- High (>80): detailed rounds, clear questions asked, good structure.
- Medium (50-79): some details, but missing specific questions or very brief.
- Low (<50): extremely vague, one-liners, or just an outcome with no process.
- ZERO ROUNDS: if no specific interview rounds are described, the score MUST be below 40.
Provide confidence_reasoning explaining your score.";

/// The two-stage extraction seam. Both calls return None on any service
/// failure; the driver decides what that means for the visited ledger.
pub trait Extractor {
    fn classify(&self, title: &str, content: &str) -> Option<CompanyExtraction>;
    fn extract_details(
        &self,
        title: &str,
        content: &str,
        roles: &[JobRole],
    ) -> Option<InterviewDetails>;
}

/// First-stage result: interview-or-not plus a free-text company name.
#[derive(Debug, Clone, Deserialize)]
pub struct CompanyExtraction {
    #[serde(default)]
    pub is_interview_experience: bool,
    #[serde(default)]
    pub company_name: Option<String>,
}

/// Fully-coerced second-stage extraction. Built from the raw tool payload at
/// the service boundary; nothing past this point sees untyped values.
#[derive(Debug, Clone)]
pub struct InterviewDetails {
    pub location: Option<String>,
    pub job_role_id: Option<String>,
    pub number_of_rounds: i64,
    pub offer_status: OfferStatus,
    pub preparation_source: Option<String>,
    pub interview_process: Option<String>,
    pub difficulty: Difficulty,
    pub overall_rating: f64,
    pub confidence_score: i64,
    pub confidence_reasoning: Option<String>,
    pub is_anonymous: bool,
    pub rounds: Vec<RoundDetails>,
}

#[derive(Debug, Clone)]
pub struct RoundDetails {
    pub sequence: i64,
    pub name: String,
    pub duration: Option<String>,
    pub experience: String,
    pub difficulty: Difficulty,
    pub key_takeaways: Option<String>,
}

// Lenient mirror of the tool payload. Numbers may arrive as strings or
// floats; every field may be missing.
#[derive(Debug, Deserialize)]
struct RawInterviewExtraction {
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    job_role_id: Option<String>,
    #[serde(default)]
    number_of_rounds: Option<Value>,
    #[serde(default)]
    offer_status: Option<String>,
    #[serde(default)]
    preparation_source: Option<String>,
    #[serde(default)]
    company_interview_process: Option<String>,
    #[serde(default)]
    interview_difficulty: Option<String>,
    #[serde(default)]
    overall_rating: Option<Value>,
    #[serde(default)]
    confidence_score: Option<Value>,
    #[serde(default)]
    confidence_reasoning: Option<String>,
    #[serde(default)]
    is_anonymous: Option<bool>,
    #[serde(default)]
    interview_rounds: Vec<RawRound>,
}

#[derive(Debug, Deserialize)]
struct RawRound {
    #[serde(default)]
    sequence: Option<Value>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    duration: Option<String>,
    #[serde(default)]
    experience: Option<String>,
    #[serde(default)]
    difficulty: Option<String>,
    #[serde(default)]
    key_takeaways: Option<String>,
}

impl InterviewDetails {
    fn from_raw(raw: RawInterviewExtraction) -> Self {
        InterviewDetails {
            location: non_empty(raw.location),
            job_role_id: non_empty(raw.job_role_id),
            number_of_rounds: coerce_i64(raw.number_of_rounds.as_ref(), 0),
            offer_status: raw
                .offer_status
                .as_deref()
                .map(OfferStatus::from_label)
                .unwrap_or(OfferStatus::Pending),
            preparation_source: non_empty(raw.preparation_source),
            interview_process: non_empty(raw.company_interview_process),
            difficulty: raw
                .interview_difficulty
                .as_deref()
                .map(Difficulty::from_label)
                .unwrap_or(Difficulty::Medium),
            overall_rating: coerce_f64(raw.overall_rating.as_ref(), 0.0),
            confidence_score: coerce_i64(raw.confidence_score.as_ref(), 0),
            confidence_reasoning: non_empty(raw.confidence_reasoning),
            is_anonymous: raw.is_anonymous.unwrap_or(false),
            rounds: raw.interview_rounds.into_iter().map(RoundDetails::from_raw).collect(),
        }
    }
}

impl RoundDetails {
    fn from_raw(raw: RawRound) -> Self {
        let sequence = coerce_i64(raw.sequence.as_ref(), 1);
        let name = non_empty(raw.name).unwrap_or_else(|| format!("Round {}", sequence));
        RoundDetails {
            sequence,
            name,
            duration: non_empty(raw.duration),
            experience: raw.experience.unwrap_or_default(),
            difficulty: raw
                .difficulty
                .as_deref()
                .map(Difficulty::from_label)
                .unwrap_or(Difficulty::Medium),
            key_takeaways: non_empty(raw.key_takeaways),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn coerce_i64(value: Option<&Value>, default: i64) -> i64 {
    match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(default),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
        _ => default,
    }
}

fn coerce_f64(value: Option<&Value>, default: f64) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(default),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
        _ => default,
    }
}

// --- Anthropic Messages API client ---

#[derive(Debug)]
pub struct ExtractionClient {
    api_key: String,
    model_id: String,
    client: reqwest::blocking::Client,
}

impl ExtractionClient {
    pub fn new(config: &AnthropicConfig) -> Result<Self> {
        let api_key = match &config.api_key {
            Some(key) => key.clone(),
            None => env::var("ANTHROPIC_API_KEY").context(
                "ANTHROPIC_API_KEY environment variable not set and no anthropic.api_key in config",
            )?,
        };
        let client = reqwest::blocking::Client::new();
        Ok(Self {
            api_key,
            model_id: config.model_id.clone(),
            client,
        })
    }

    /// One forced-tool call: deterministic decoding, bounded output, and the
    /// named tool's input returned as raw JSON.
    fn call_tool(&self, text_blocks: &[&str], tool: Tool, max_tokens: u32) -> Result<Value> {
        let request = MessagesRequest {
            model: &self.model_id,
            max_tokens,
            temperature: 0.0,
            messages: vec![Message {
                role: "user",
                content: text_blocks
                    .iter()
                    .map(|text| TextBlock {
                        block_type: "text",
                        text,
                    })
                    .collect(),
            }],
            tool_choice: ToolChoice {
                choice_type: "tool",
                name: tool.name,
            },
            tools: vec![tool],
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .context("Failed to send request to extraction service")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().unwrap_or_default();
            return Err(anyhow!(
                "Extraction request failed with status {}: {}",
                status,
                error_text
            ));
        }

        let api_response: MessagesResponse = response
            .json()
            .context("Failed to parse extraction service response")?;

        extract_tool_input(api_response)
            .ok_or_else(|| anyhow!("No tool_use block in extraction response"))
    }
}

impl Extractor for ExtractionClient {
    fn classify(&self, title: &str, content: &str) -> Option<CompanyExtraction> {
        let content_text = format!("Title: {}\nSummary: {}", title, content);
        let input = match self.call_tool(
            &[content_text.as_str(), CLASSIFY_PROMPT],
            company_extraction_tool(),
            CLASSIFY_MAX_TOKENS,
        ) {
            Ok(input) => input,
            Err(e) => {
                warn!("company extraction failed: {e:#}");
                return None;
            }
        };

        match serde_json::from_value(input) {
            Ok(extraction) => Some(extraction),
            Err(e) => {
                warn!("malformed company extraction payload: {e}");
                None
            }
        }
    }

    fn extract_details(
        &self,
        title: &str,
        content: &str,
        roles: &[JobRole],
    ) -> Option<InterviewDetails> {
        let content_text = format!("Title: {}\nSummary: {}", title, content);

        let mut roles_text = String::from("Internal Job Roles:\n");
        for role in roles {
            roles_text.push_str(&format!("- ID: {}, Name: {}\n", role.id, role.name));
        }
        let prompt = format!("{}\n{}", roles_text, DETAILS_PROMPT_TAIL);

        let input = match self.call_tool(
            &[content_text.as_str(), prompt.as_str()],
            interview_extraction_tool(),
            DETAILS_MAX_TOKENS,
        ) {
            Ok(input) => input,
            Err(e) => {
                warn!("detail extraction failed: {e:#}");
                return None;
            }
        };

        match serde_json::from_value::<RawInterviewExtraction>(input) {
            Ok(raw) => Some(InterviewDetails::from_raw(raw)),
            Err(e) => {
                warn!("malformed detail extraction payload: {e}");
                None
            }
        }
    }
}

// --- Tool schemas (v1, never mixed) ---

fn company_extraction_tool() -> Tool {
    Tool {
        name: "company_extraction",
        description: "Extract the company name from the interview experience.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "is_interview_experience": {
                    "type": "boolean",
                    "description": "True if this is an interview experience, false if general discussion."
                },
                "company_name": {
                    "type": "string",
                    "description": "Name of the company."
                }
            },
            "required": ["is_interview_experience"]
        }),
    }
}

fn interview_extraction_tool() -> Tool {
    Tool {
        name: "interview_experience_extraction",
        description: "Interview experience extraction.",
        input_schema: json!({
            "type": "object",
            "properties": {
                "location": {
                    "type": "string",
                    "description": "Which location this interview was for."
                },
                "job_role_id": {
                    "type": "string",
                    "description": "ID of the internal job role this interview best matches."
                },
                "number_of_rounds": {
                    "type": "integer",
                    "description": "Number of interview rounds."
                },
                "offer_status": {
                    "type": "string",
                    "description": "Status of the offer.",
                    "enum": ["Offer", "Pending", "Rejected", "Unknown"]
                },
                "preparation_source": {
                    "type": "string",
                    "description": "Preparation sources or advice useful to other candidates, kept in the candidate's own words. Empty when absent; never <UNKNOWN>."
                },
                "company_interview_process": {
                    "type": "string",
                    "description": "How the company ran the process from first contact to result, written as the candidate's experience, not summarized and not third person. Empty when absent; never <UNKNOWN>."
                },
                "interview_difficulty": {
                    "type": "string",
                    "description": "Overall difficulty.",
                    "enum": ["Easy", "Medium", "Hard"]
                },
                "overall_rating": {
                    "type": "number",
                    "description": "Rating out of 5."
                },
                "confidence_score": {
                    "type": "integer",
                    "description": "Confidence score 0-100 for the quality and completeness of this interview experience."
                },
                "confidence_reasoning": {
                    "type": "string",
                    "description": "Reasoning for the given confidence score."
                },
                "is_anonymous": {
                    "type": "boolean",
                    "description": "Whether the author is anonymous."
                },
                "interview_rounds": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "sequence": {
                                "type": "integer",
                                "description": "Round order as the candidate reports it, usually starting at 1."
                            },
                            "name": {
                                "type": "string",
                                "description": "Round title as the candidate reports it."
                            },
                            "duration": {
                                "type": "string",
                                "description": "Duration."
                            },
                            "experience": {
                                "type": "string",
                                "description": "The candidate's account of the round, kept as written. Empty when absent; never <UNKNOWN>."
                            },
                            "difficulty": {
                                "type": "string",
                                "enum": ["Easy", "Medium", "Hard"]
                            },
                            "key_takeaways": {
                                "type": "string",
                                "description": "Key takeaways from the round as the candidate reports them."
                            }
                        },
                        "required": ["sequence", "name", "experience", "difficulty"]
                    }
                }
            },
            "required": ["job_role_id", "confidence_score"]
        }),
    }
}

// --- Wire types ---

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<Message<'a>>,
    tools: Vec<Tool>,
    tool_choice: ToolChoice,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: Vec<TextBlock<'a>>,
}

#[derive(Debug, Serialize)]
struct TextBlock<'a> {
    #[serde(rename = "type")]
    block_type: &'static str,
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct Tool {
    name: &'static str,
    description: &'static str,
    input_schema: Value,
}

#[derive(Debug, Serialize)]
struct ToolChoice {
    #[serde(rename = "type")]
    choice_type: &'static str,
    name: &'static str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    input: Option<Value>,
}

fn extract_tool_input(response: MessagesResponse) -> Option<Value> {
    response
        .content
        .into_iter()
        .find(|block| block.block_type == "tool_use")
        .and_then(|block| block.input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_client_requires_api_key() {
        let original = env::var("ANTHROPIC_API_KEY").ok();
        unsafe {
            env::remove_var("ANTHROPIC_API_KEY");
        }

        let result = ExtractionClient::new(&AnthropicConfig::default());

        if let Some(val) = original {
            unsafe {
                env::set_var("ANTHROPIC_API_KEY", val);
            }
        }

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn test_extraction_client_accepts_config_key() {
        let config = AnthropicConfig {
            api_key: Some("k-test".to_string()),
            ..AnthropicConfig::default()
        };
        assert!(ExtractionClient::new(&config).is_ok());
    }

    #[test]
    fn test_tool_input_extraction_from_response() {
        let raw = r#"{
            "content": [
                { "type": "text", "text": "Using the tool." },
                { "type": "tool_use", "id": "tu_1", "name": "company_extraction",
                  "input": { "is_interview_experience": true, "company_name": "Acme" } }
            ]
        }"#;
        let response: MessagesResponse = serde_json::from_str(raw).unwrap();
        let input = extract_tool_input(response).unwrap();
        let extraction: CompanyExtraction = serde_json::from_value(input).unwrap();
        assert!(extraction.is_interview_experience);
        assert_eq!(extraction.company_name.as_deref(), Some("Acme"));
    }

    #[test]
    fn test_schemas_declare_required_fields() {
        let company = company_extraction_tool();
        assert_eq!(
            company.input_schema["required"],
            json!(["is_interview_experience"])
        );

        let details = interview_extraction_tool();
        assert_eq!(
            details.input_schema["required"],
            json!(["job_role_id", "confidence_score"])
        );
        let round_required =
            &details.input_schema["properties"]["interview_rounds"]["items"]["required"];
        assert_eq!(
            *round_required,
            json!(["sequence", "name", "experience", "difficulty"])
        );
    }

    #[test]
    fn test_details_coercion_defaults() {
        let raw: RawInterviewExtraction = serde_json::from_value(json!({
            "job_role_id": "r1",
            "number_of_rounds": "three",
            "overall_rating": "4.5",
            "confidence_score": 88.6,
            "offer_status": "Unknown",
            "interview_difficulty": "Impossible",
            "location": "   ",
            "interview_rounds": [
                { "sequence": "2", "difficulty": "Hard", "experience": "Graph question" },
                { "name": "HM chat" }
            ]
        }))
        .unwrap();
        let details = InterviewDetails::from_raw(raw);

        // Non-parseable numerics fall back instead of raising
        assert_eq!(details.number_of_rounds, 0);
        assert_eq!(details.overall_rating, 4.5);
        assert_eq!(details.confidence_score, 88);
        // Enum fields land on the documented defaults
        assert_eq!(details.offer_status, OfferStatus::Pending);
        assert_eq!(details.difficulty, Difficulty::Medium);
        // Whitespace-only strings become absent
        assert!(details.location.is_none());

        assert_eq!(details.rounds.len(), 2);
        assert_eq!(details.rounds[0].sequence, 2);
        assert_eq!(details.rounds[0].name, "Round 2");
        assert_eq!(details.rounds[0].difficulty, Difficulty::Hard);
        assert_eq!(details.rounds[1].sequence, 1);
        assert_eq!(details.rounds[1].name, "HM chat");
        assert_eq!(details.rounds[1].experience, "");
        assert_eq!(details.rounds[1].difficulty, Difficulty::Medium);
    }

    #[test]
    fn test_details_full_payload() {
        let raw: RawInterviewExtraction = serde_json::from_value(json!({
            "location": "Bangalore",
            "job_role_id": "r9",
            "number_of_rounds": 2,
            "offer_status": "Offer",
            "preparation_source": "Neetcode 150",
            "company_interview_process": "Recruiter reached out on LinkedIn...",
            "interview_difficulty": "Hard",
            "overall_rating": 4,
            "confidence_score": 91,
            "confidence_reasoning": "Detailed rounds with concrete questions.",
            "is_anonymous": true,
            "interview_rounds": [
                { "sequence": 1, "name": "Coding", "experience": "Two mediums", "difficulty": "Medium" }
            ]
        }))
        .unwrap();
        let details = InterviewDetails::from_raw(raw);

        assert_eq!(details.location.as_deref(), Some("Bangalore"));
        assert_eq!(details.job_role_id.as_deref(), Some("r9"));
        assert_eq!(details.number_of_rounds, 2);
        assert_eq!(details.offer_status, OfferStatus::Offered);
        assert_eq!(details.difficulty, Difficulty::Hard);
        assert_eq!(details.overall_rating, 4.0);
        assert!(details.is_anonymous);
        assert_eq!(details.rounds.len(), 1);
    }
}
