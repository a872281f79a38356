use std::num::NonZeroU32;

use serde::de::{Error as _, Unexpected};
use serde::{Deserialize, Deserializer, Serialize};

use crate::upstream::{ConversationTurn, GenerationParams};

pub const ROADMAP_PARAMS: GenerationParams = GenerationParams {
    temperature: 0.4,
    max_tokens: 1500,
};

/// Number of weeks the prompt asks for.
pub const EXPECTED_WEEKS: usize = 4;

// ─── Roadmap Types ──────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RoadmapWeek {
    pub week: NonZeroU32,
    #[serde(deserialize_with = "non_blank")]
    pub title: String,
    #[serde(default)]
    pub completed: bool,
    pub tasks: Vec<Task>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Task {
    #[serde(deserialize_with = "id_as_text")]
    pub id: String,
    #[serde(deserialize_with = "non_blank")]
    pub title: String,
    #[serde(default)]
    pub completed: bool,
}

// Models sometimes number tasks 1, 2, 3 instead of "1-1", "1-2", ...
fn id_as_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(serde_json::Number),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    })
}

fn non_blank<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    if s.trim().is_empty() {
        return Err(D::Error::invalid_value(Unexpected::Str(&s), &"a non-empty title"));
    }
    Ok(s)
}

// ─── Prompt ─────────────────────────────────────────────────────────────────

const SYSTEM_PROMPT: &str = "You are an expert learning path designer AI.";

fn build_roadmap_prompt(goal: &str) -> String {
    format!(
        r#"Create a detailed {weeks}-week learning roadmap for the goal: "{goal}". Each week should include:
- A clear and meaningful title
- 4 to 6 specific tasks
Use this exact JSON format (no markdown, no explanation):

[
  {{
    "week": 1,
    "title": "string",
    "completed": false,
    "tasks": [
      {{ "id": "1-1", "title": "task title", "completed": false }}
    ]
  }}
]"#,
        weeks = EXPECTED_WEEKS,
        goal = goal,
    )
}

/// The two turns sent upstream for a roadmap request.
pub fn roadmap_turns(goal: &str) -> [ConversationTurn; 2] {
    [
        ConversationTurn::system(SYSTEM_PROMPT),
        ConversationTurn::user(build_roadmap_prompt(goal)),
    ]
}
