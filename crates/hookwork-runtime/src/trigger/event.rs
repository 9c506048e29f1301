use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Spec-authoring system that publishes triggers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerSystem {
    Speckit,
    Openspec,
    Gatomia,
}

impl TriggerSystem {
    pub const ALL: [TriggerSystem; 3] = [
        TriggerSystem::Speckit,
        TriggerSystem::Openspec,
        TriggerSystem::Gatomia,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerSystem::Speckit => "speckit",
            TriggerSystem::Openspec => "openspec",
            TriggerSystem::Gatomia => "gatomia",
        }
    }
}

impl fmt::Display for TriggerSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerSystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|sys| sys.as_str() == s)
            .ok_or_else(|| format!("Unknown trigger system '{}'", s))
    }
}

/// Workflow stage whose completion publishes a trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationType {
    Research,
    Datamodel,
    Design,
    Specify,
    Clarify,
    Plan,
    Tasks,
    Taskstoissues,
    Analyze,
    Checklist,
    Constitution,
    Implement,
    UnitTest,
    IntegrationTest,
}

impl OperationType {
    pub const ALL: [OperationType; 14] = [
        OperationType::Research,
        OperationType::Datamodel,
        OperationType::Design,
        OperationType::Specify,
        OperationType::Clarify,
        OperationType::Plan,
        OperationType::Tasks,
        OperationType::Taskstoissues,
        OperationType::Analyze,
        OperationType::Checklist,
        OperationType::Constitution,
        OperationType::Implement,
        OperationType::UnitTest,
        OperationType::IntegrationTest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Research => "research",
            OperationType::Datamodel => "datamodel",
            OperationType::Design => "design",
            OperationType::Specify => "specify",
            OperationType::Clarify => "clarify",
            OperationType::Plan => "plan",
            OperationType::Tasks => "tasks",
            OperationType::Taskstoissues => "taskstoissues",
            OperationType::Analyze => "analyze",
            OperationType::Checklist => "checklist",
            OperationType::Constitution => "constitution",
            OperationType::Implement => "implement",
            OperationType::UnitTest => "unit-test",
            OperationType::IntegrationTest => "integration-test",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| format!("Unknown operation '{}'", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerTiming {
    Before,
    #[default]
    After,
}

impl fmt::Display for TriggerTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TriggerTiming::Before => "before",
            TriggerTiming::After => "after",
        })
    }
}

impl FromStr for TriggerTiming {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "before" => Ok(TriggerTiming::Before),
            "after" => Ok(TriggerTiming::After),
            other => Err(format!("Unknown timing '{}'", other)),
        }
    }
}

/// Output produced by the upstream operation, forwarded to hooks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerOutput {
    pub output_path: Option<String>,
    pub output_content: Option<String>,
    pub metadata: Option<Map<String, Value>>,
}

/// Event published when an upstream workflow operation completes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerEvent {
    pub system: TriggerSystem,
    pub operation: OperationType,
    /// Unix epoch milliseconds
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timing: Option<TriggerTiming>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_content: Option<String>,
}

impl TriggerEvent {
    pub fn new(system: TriggerSystem, operation: OperationType) -> Self {
        Self {
            system,
            operation,
            timestamp: chrono::Utc::now().timestamp_millis(),
            timing: None,
            metadata: None,
            output_path: None,
            output_content: None,
        }
    }

    pub fn with_timing(mut self, timing: TriggerTiming) -> Self {
        self.timing = Some(timing);
        self
    }

    pub fn with_output(mut self, output: TriggerOutput) -> Self {
        self.output_path = output.output_path;
        self.output_content = output.output_content;
        self.metadata = output.metadata;
        self
    }

    /// Timing defaults to `after` when the publisher omits it
    pub fn effective_timing(&self) -> TriggerTiming {
        self.timing.unwrap_or_default()
    }

    /// Schema check applied at the registry boundary
    pub fn validate(&self) -> Result<(), String> {
        if self.timestamp <= 0 {
            return Err(format!("Invalid timestamp {}", self.timestamp));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operation_round_trips_through_str() {
        for op in OperationType::ALL {
            assert_eq!(op.as_str().parse::<OperationType>().unwrap(), op);
        }
        assert!("deploy".parse::<OperationType>().is_err());
        assert!("SPECKIT".parse::<TriggerSystem>().is_err());
    }

    #[test]
    fn test_event_deserializes_camel_case() {
        let event: TriggerEvent = serde_json::from_value(json!({
            "system": "speckit",
            "operation": "unit-test",
            "timestamp": 1700000000000i64,
            "outputPath": "specs/001/spec.md"
        }))
        .unwrap();
        assert_eq!(event.operation, OperationType::UnitTest);
        assert_eq!(event.output_path.as_deref(), Some("specs/001/spec.md"));
        assert_eq!(event.effective_timing(), TriggerTiming::After);
    }

    #[test]
    fn test_non_positive_timestamp_rejected() {
        let mut event = TriggerEvent::new(TriggerSystem::Speckit, OperationType::Plan);
        assert!(event.validate().is_ok());
        event.timestamp = 0;
        assert!(event.validate().is_err());
    }
}
