//! Chat-assistant session around an external `AssistantClient`.
//!
//! The assistant is a collaborator, not a source of truth:
//!   - its `updatedData` is an untrusted patch, merged through `ProfilePatch`
//!   - any failure (transport, timeout, unparsable reply, bad update) keeps
//!     the last-known-good profile and answers with `RETRY_MESSAGE`
//!   - nothing here blocks on a clock; the transport owns its timeout
//!
//! One turn = one request with the full transcript plus the current profile.

use crate::{
    config::EngineConfig,
    error::{UpliftError, UpliftResult},
    patch::{FieldAdjustment, MergeOutcome, ProfilePatch},
    profile::InputProfile,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub const RETRY_MESSAGE: &str = "I'm sorry, I encountered an error. Could you please try again?";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub messages: Vec<ChatTurn>,
    pub collected_data: InputProfile,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub message: String,
    #[serde(default)]
    pub updated_data: Value,
    #[serde(default)]
    pub is_complete: bool,
}

/// Transport to the hosted assistant.
///
/// Returns the raw reply text. Timeouts and HTTP failures are reported as
/// `UpliftError::AssistantUnavailable`.
pub trait AssistantClient {
    fn send(&self, request: &ChatRequest) -> UpliftResult<String>;
}

// ── Reply parsing ──────────────────────────────────────────────────

static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```(?:json|JSON)?[ \t]*\r?\n?").expect("valid regex"));

static ANNUAL_GROSS_REVENUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bannual\s+gross\s+revenue\b").expect("valid regex"));
static GROSS_REVENUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bgross\s+revenue\b").expect("valid regex"));
static REVENUE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\brevenue\b").expect("valid regex"));

/// Remove markdown code fences the assistant sometimes wraps its JSON in.
pub fn strip_code_fences(raw: &str) -> String {
    CODE_FENCE.replace_all(raw, "").trim().to_string()
}

/// The product speaks of GMV attempts, never revenue.
pub fn normalize_terminology(text: &str) -> String {
    let text = ANNUAL_GROSS_REVENUE.replace_all(text, "annual GMV attempts");
    let text = GROSS_REVENUE.replace_all(&text, "Annual GMV Attempts");
    REVENUE.replace_all(&text, "GMV").into_owned()
}

pub fn parse_reply(raw: &str) -> UpliftResult<ChatReply> {
    let body = strip_code_fences(raw);
    let mut reply: ChatReply =
        serde_json::from_str(&body).map_err(|e| UpliftError::MalformedReply {
            reason: e.to_string(),
        })?;
    reply.message = normalize_terminology(&reply.message);
    Ok(reply)
}

// ── Session ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum TurnOutcome {
    Applied {
        message: String,
        updated_fields: Vec<String>,
        adjustments: Vec<FieldAdjustment>,
        is_complete: bool,
    },
    /// The profile is unchanged; `message` is the retry prompt to show.
    Failed { message: String, error: String },
}

impl TurnOutcome {
    pub fn message(&self) -> &str {
        match self {
            Self::Applied { message, .. } | Self::Failed { message, .. } => message,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

pub struct ChatSession<C: AssistantClient> {
    id: Uuid,
    client: C,
    config: EngineConfig,
    /// Last-known-good profile. Replaced only by a fully merged update.
    profile: InputProfile,
    transcript: Vec<ChatTurn>,
    complete: bool,
}

impl<C: AssistantClient> ChatSession<C> {
    pub fn new(client: C, config: EngineConfig) -> Self {
        let profile = InputProfile::new(&config);
        Self::with_profile(client, config, profile)
    }

    /// Resume from a profile the form already filled in.
    pub fn with_profile(client: C, config: EngineConfig, profile: InputProfile) -> Self {
        let id = Uuid::new_v4();
        log::debug!("Chat session {id} started");
        Self {
            id,
            client,
            config,
            profile,
            transcript: Vec::new(),
            complete: false,
        }
    }

    pub fn profile(&self) -> &InputProfile {
        &self.profile
    }

    pub fn transcript(&self) -> &[ChatTurn] {
        &self.transcript
    }

    /// Set once the assistant reports it has everything it needs.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn submit(&mut self, user_text: &str) -> TurnOutcome {
        self.transcript.push(ChatTurn::user(user_text));
        let request = ChatRequest {
            messages: self.transcript.clone(),
            collected_data: self.profile.clone(),
        };

        match self.exchange(&request) {
            Ok((reply, merged)) => {
                self.profile = merged.profile;
                self.complete |= reply.is_complete;
                self.transcript.push(ChatTurn::assistant(reply.message.clone()));
                TurnOutcome::Applied {
                    message: reply.message,
                    updated_fields: merged.updated_fields,
                    adjustments: merged.adjustments,
                    is_complete: reply.is_complete,
                }
            }
            Err(e) => {
                log::warn!("Chat session {}: turn failed, keeping last profile: {e}", self.id);
                self.transcript.push(ChatTurn::assistant(RETRY_MESSAGE));
                TurnOutcome::Failed {
                    message: RETRY_MESSAGE.to_string(),
                    error: e.to_string(),
                }
            }
        }
    }

    fn exchange(&self, request: &ChatRequest) -> UpliftResult<(ChatReply, MergeOutcome)> {
        let raw = self.client.send(request)?;
        let reply = parse_reply(&raw)?;
        let patch = ProfilePatch::from_assistant_json(&reply.updated_data)?;
        let merged = patch.apply(&self.profile, &self.config)?;
        Ok((reply, merged))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fences_are_stripped() {
        let raw = "```json\n{\"message\": \"hi\"}\n```";
        assert_eq!(strip_code_fences(raw), "{\"message\": \"hi\"}");
        assert_eq!(strip_code_fences("  {}  "), "{}");
    }

    #[test]
    fn revenue_wording_becomes_gmv() {
        assert_eq!(
            normalize_terminology("What is your Annual Gross Revenue?"),
            "What is your annual GMV attempts?"
        );
        assert_eq!(normalize_terminology("gross revenue"), "Annual GMV Attempts");
        assert_eq!(normalize_terminology("Revenue by region"), "GMV by region");
        // word boundaries
        assert_eq!(normalize_terminology("revenues"), "revenues");
    }

    #[test]
    fn reply_without_update_parses() {
        let reply = parse_reply(r#"{"message": "Which region next?"}"#).unwrap();
        assert_eq!(reply.updated_data, Value::Null);
        assert!(!reply.is_complete);
    }

    #[test]
    fn plain_text_reply_is_malformed() {
        let err = parse_reply("Sure! What is your AMER GMV?").unwrap_err();
        assert!(matches!(err, UpliftError::MalformedReply { .. }));
    }
}
