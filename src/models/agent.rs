use crate::utils::time;
use serde::{Deserialize, Serialize};

const ADJECTIVES: [&str; 15] = [
    "swift", "bright", "calm", "bold", "keen", "wise", "dark", "pure", "wild", "cool", "warm",
    "deep", "soft", "sharp", "quick",
];

const NOUNS: [&str; 15] = [
    "wolf", "hawk", "fox", "bear", "lynx", "crow", "deer", "owl", "hare", "seal", "orca", "raven",
    "tiger", "lotus", "storm",
];

/// Generate a human-readable agent id such as `swift-wolf-3f2a`.
pub fn generate_friendly_name() -> String {
    let bytes = *uuid::Uuid::new_v4().as_bytes();
    let adjective = ADJECTIVES[bytes[0] as usize % ADJECTIVES.len()];
    let noun = NOUNS[bytes[1] as usize % NOUNS.len()];
    format!("{}-{}-{:02x}{:02x}", adjective, noun, bytes[2], bytes[3])
}

/// Self-reported details an agent registers with.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AgentRegistration {
    pub context: Option<String>,
    pub model: Option<String>,
    #[serde(default)]
    pub credits_spent: i64,
    #[serde(default)]
    pub tool_calls: i64,
    #[serde(default)]
    pub files_changed: i64,
}

/// A named agent identity kept by the history store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentIdentity {
    pub agent_id: String,
    pub context: Option<String>,
    pub model: Option<String>,
    pub credits_spent: i64,
    pub tool_calls: i64,
    pub files_changed: i64,
    pub created_at: String,
    pub last_activity: String,
}

impl AgentIdentity {
    /// Build a new identity with a freshly generated id.
    pub fn register(registration: AgentRegistration) -> Self {
        let now = time::now_utc();
        Self {
            agent_id: generate_friendly_name(),
            context: registration.context,
            model: registration.model,
            credits_spent: registration.credits_spent,
            tool_calls: registration.tool_calls,
            files_changed: registration.files_changed,
            created_at: now.clone(),
            last_activity: now,
        }
    }

    /// Record activity, optionally replacing the context.
    pub fn touch(&mut self, context: Option<&str>) {
        self.last_activity = time::now_utc();
        if let Some(context) = context.filter(|c| !c.is_empty()) {
            self.context = Some(context.to_string());
        }
    }
}
