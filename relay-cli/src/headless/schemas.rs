use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CalendarEvent {
    pub name: String,
    pub date: String,
    pub participants: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Step {
    pub explanation: String,
    pub output: String,
}

/// Step by step solution, `refusal` lets the model decline inside the schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MathReasoning {
    pub steps: Vec<Step>,
    pub final_answer: String,
    pub refusal: bool,
    pub refusal_reason: Option<String>,
}
