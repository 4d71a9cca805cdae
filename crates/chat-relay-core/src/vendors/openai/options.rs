/// OpenAI reasoning effort hint (when supported by the selected model/API).
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenAiReasoningEffort {
    /// Lower latency / cost-oriented reasoning.
    Low,
    /// Balanced reasoning.
    Medium,
    /// Higher effort reasoning.
    High,
}

impl std::str::FromStr for OpenAiReasoningEffort {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(format!("unknown reasoning effort: {other}")),
        }
    }
}
