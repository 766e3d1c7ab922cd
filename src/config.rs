use crate::error::{PipelineError, Result};
use crate::message::MAX_MSG_TYPES;
use serde::de::{self, Deserializer};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Allowed instance count range for producers, processors and strategies
pub const MAX_COMPONENT_COUNT: u32 = 16;

/// Producer section of the configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProducerConfig {
    #[serde(default = "default_producer_count")]
    pub count: u32,
    #[serde(default = "default_messages_per_sec")]
    pub messages_per_sec: u64,
    /// Message type distribution, keyed `msg_type_N` in the document
    #[serde(default, deserialize_with = "de_msg_type_f64_map")]
    pub distribution: HashMap<u8, f64>,
}

/// Processor section of the configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessorConfig {
    #[serde(default = "default_processor_count")]
    pub count: u32,
    /// Per-type busy-wait service time, keyed `msg_type_N` in the document
    #[serde(default, deserialize_with = "de_msg_type_u64_map")]
    pub processing_times_ns: HashMap<u8, u64>,
}

/// Strategy section of the configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    #[serde(default = "default_strategy_count")]
    pub count: u32,
    /// Per-strategy busy-wait service time, keyed `strategy_N` in the document
    #[serde(default, deserialize_with = "de_strategy_u64_map")]
    pub processing_times_ns: HashMap<u8, u64>,
}

/// Stage1 routing rule: candidate processors for one message type
#[derive(Debug, Clone, Deserialize)]
pub struct Stage1Rule {
    pub msg_type: u8,
    pub processors: Vec<u8>,
}

/// Stage2 routing rule: terminal strategy for one message type
#[derive(Debug, Clone, Deserialize)]
pub struct Stage2Rule {
    pub msg_type: u8,
    pub strategy: u8,
    #[serde(default = "default_true")]
    pub ordering_required: bool,
}

/// Full system configuration, loaded from a JSON document.
#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfig {
    #[serde(default = "default_scenario")]
    pub scenario: String,
    #[serde(default = "default_duration_secs")]
    pub duration_secs: u32,
    #[serde(default)]
    pub producers: ProducerConfig,
    #[serde(default)]
    pub processors: ProcessorConfig,
    #[serde(default)]
    pub strategies: StrategyConfig,
    #[serde(default)]
    pub stage1_rules: Vec<Stage1Rule>,
    #[serde(default)]
    pub stage2_rules: Vec<Stage2Rule>,
}

impl SystemConfig {
    /// Load and validate a configuration document.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: SystemConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every constraint the pipeline relies on.
    ///
    /// Rule ids out of bounds, empty candidate lists and missing rules are
    /// hard errors; a distribution whose probabilities do not sum to ~1.0 is
    /// only warned about.
    pub fn validate(&self) -> Result<()> {
        if self.duration_secs == 0 {
            return Err(PipelineError::Config(
                "duration_secs must be greater than 0".into(),
            ));
        }

        check_count("producers", self.producers.count)?;
        check_count("processors", self.processors.count)?;
        check_count("strategies", self.strategies.count)?;

        if self.producers.messages_per_sec == 0 {
            return Err(PipelineError::Config(
                "producers.messages_per_sec must be greater than 0".into(),
            ));
        }

        if self.producers.distribution.is_empty() {
            return Err(PipelineError::Config(
                "producers.distribution must contain at least one message type".into(),
            ));
        }
        for (&msg_type, &prob) in &self.producers.distribution {
            if usize::from(msg_type) >= MAX_MSG_TYPES {
                return Err(PipelineError::Config(format!(
                    "distribution references msg_type {msg_type}, valid range is 0..{MAX_MSG_TYPES}"
                )));
            }
            if !prob.is_finite() || prob < 0.0 {
                return Err(PipelineError::Config(format!(
                    "distribution probability for msg_type {msg_type} must be a non-negative number"
                )));
            }
        }
        let sum: f64 = self.producers.distribution.values().sum();
        if (sum - 1.0).abs() > 0.01 {
            warn!(sum, "distribution probabilities do not sum to 1.0");
        }
        if sum == 0.0 {
            return Err(PipelineError::Config(
                "producers.distribution probabilities are all zero".into(),
            ));
        }

        if self.stage1_rules.is_empty() {
            return Err(PipelineError::Config(
                "at least one stage1 rule is required".into(),
            ));
        }
        for rule in &self.stage1_rules {
            if usize::from(rule.msg_type) >= MAX_MSG_TYPES {
                return Err(PipelineError::Config(format!(
                    "stage1 rule references msg_type {}, valid range is 0..{MAX_MSG_TYPES}",
                    rule.msg_type
                )));
            }
            if rule.processors.is_empty() {
                return Err(PipelineError::Config(format!(
                    "stage1 rule for msg_type {} has no processors",
                    rule.msg_type
                )));
            }
            for &processor_id in &rule.processors {
                if u32::from(processor_id) >= self.processors.count {
                    return Err(PipelineError::Config(format!(
                        "stage1 rule for msg_type {} references unknown processor {processor_id}",
                        rule.msg_type
                    )));
                }
            }
        }

        if self.stage2_rules.is_empty() {
            return Err(PipelineError::Config(
                "at least one stage2 rule is required".into(),
            ));
        }
        for rule in &self.stage2_rules {
            if usize::from(rule.msg_type) >= MAX_MSG_TYPES {
                return Err(PipelineError::Config(format!(
                    "stage2 rule references msg_type {}, valid range is 0..{MAX_MSG_TYPES}",
                    rule.msg_type
                )));
            }
            if u32::from(rule.strategy) >= self.strategies.count {
                return Err(PipelineError::Config(format!(
                    "stage2 rule for msg_type {} references unknown strategy {}",
                    rule.msg_type, rule.strategy
                )));
            }
        }

        Ok(())
    }
}

fn check_count(section: &str, count: u32) -> Result<()> {
    if count == 0 || count > MAX_COMPONENT_COUNT {
        return Err(PipelineError::Config(format!(
            "{section}.count must be between 1 and {MAX_COMPONENT_COUNT}, got {count}"
        )));
    }
    Ok(())
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            count: default_producer_count(),
            messages_per_sec: default_messages_per_sec(),
            distribution: HashMap::new(),
        }
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            count: default_processor_count(),
            processing_times_ns: HashMap::new(),
        }
    }
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            count: default_strategy_count(),
            processing_times_ns: HashMap::new(),
        }
    }
}

fn default_scenario() -> String {
    "unknown".into()
}

fn default_duration_secs() -> u32 {
    10
}

fn default_producer_count() -> u32 {
    4
}

fn default_messages_per_sec() -> u64 {
    1_000_000
}

fn default_processor_count() -> u32 {
    4
}

fn default_strategy_count() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

// The document encodes id-keyed maps as objects with `msg_type_N` /
// `strategy_N` string keys.
fn de_prefixed_map<'de, D, V>(deserializer: D, prefix: &'static str) -> std::result::Result<HashMap<u8, V>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    let raw = HashMap::<String, V>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(key, value)| {
            key.strip_prefix(prefix)
                .and_then(|suffix| suffix.parse::<u8>().ok())
                .map(|id| (id, value))
                .ok_or_else(|| de::Error::custom(format!("expected key `{prefix}N`, got `{key}`")))
        })
        .collect()
}

fn de_msg_type_f64_map<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<HashMap<u8, f64>, D::Error> {
    de_prefixed_map(deserializer, "msg_type_")
}

fn de_msg_type_u64_map<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<HashMap<u8, u64>, D::Error> {
    de_prefixed_map(deserializer, "msg_type_")
}

fn de_strategy_u64_map<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<HashMap<u8, u64>, D::Error> {
    de_prefixed_map(deserializer, "strategy_")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> SystemConfig {
        serde_json::from_str(json).expect("parse failed")
    }

    #[test]
    fn full_document_parses() {
        let config = parse(
            r#"{
                "scenario": "fan_out",
                "duration_secs": 5,
                "producers": {
                    "count": 4,
                    "messages_per_sec": 500000,
                    "distribution": {"msg_type_0": 0.25, "msg_type_1": 0.25,
                                     "msg_type_2": 0.25, "msg_type_3": 0.25}
                },
                "processors": {
                    "count": 4,
                    "processing_times_ns": {"msg_type_0": 100, "msg_type_1": 200}
                },
                "strategies": {
                    "count": 3,
                    "processing_times_ns": {"strategy_0": 100, "strategy_2": 500}
                },
                "stage1_rules": [
                    {"msg_type": 0, "processors": [0]},
                    {"msg_type": 1, "processors": [1]},
                    {"msg_type": 2, "processors": [2]},
                    {"msg_type": 3, "processors": [3]}
                ],
                "stage2_rules": [
                    {"msg_type": 0, "strategy": 0, "ordering_required": true},
                    {"msg_type": 1, "strategy": 1, "ordering_required": true},
                    {"msg_type": 2, "strategy": 2, "ordering_required": false},
                    {"msg_type": 3, "strategy": 2, "ordering_required": false}
                ]
            }"#,
        );

        assert_eq!(config.scenario, "fan_out");
        assert_eq!(config.producers.count, 4);
        assert_eq!(config.producers.distribution[&2], 0.25);
        assert_eq!(config.processors.processing_times_ns[&1], 200);
        assert_eq!(config.strategies.processing_times_ns[&2], 500);
        assert_eq!(config.stage1_rules.len(), 4);
        assert!(!config.stage2_rules[3].ordering_required);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn sections_default_when_absent() {
        let config = parse(r#"{"scenario": "minimal"}"#);
        assert_eq!(config.duration_secs, 10);
        assert_eq!(config.producers.count, 4);
        assert_eq!(config.producers.messages_per_sec, 1_000_000);
        assert_eq!(config.processors.count, 4);
        assert_eq!(config.strategies.count, 3);
    }

    #[test]
    fn ordering_required_defaults_to_true() {
        let config = parse(
            r#"{"stage2_rules": [{"msg_type": 0, "strategy": 0}]}"#,
        );
        assert!(config.stage2_rules[0].ordering_required);
    }

    #[test]
    fn malformed_distribution_key_is_rejected() {
        let result: std::result::Result<SystemConfig, _> = serde_json::from_str(
            r#"{"producers": {"distribution": {"type_0": 1.0}}}"#,
        );
        assert!(result.is_err());
    }

    fn valid_base() -> SystemConfig {
        parse(
            r#"{
                "duration_secs": 1,
                "producers": {"count": 1, "messages_per_sec": 1000,
                              "distribution": {"msg_type_0": 1.0}},
                "processors": {"count": 1},
                "strategies": {"count": 1},
                "stage1_rules": [{"msg_type": 0, "processors": [0]}],
                "stage2_rules": [{"msg_type": 0, "strategy": 0}]
            }"#,
        )
    }

    #[test]
    fn zero_duration_is_rejected() {
        let mut config = valid_base();
        config.duration_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn component_count_out_of_range_is_rejected() {
        let mut config = valid_base();
        config.processors.count = 17;
        assert!(config.validate().is_err());
        config.processors.count = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_distribution_is_rejected() {
        let mut config = valid_base();
        config.producers.distribution.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn stage1_rule_with_unknown_processor_is_rejected() {
        let mut config = valid_base();
        config.stage1_rules[0].processors = vec![5];
        assert!(config.validate().is_err());
    }

    #[test]
    fn stage1_rule_without_processors_is_rejected() {
        let mut config = valid_base();
        config.stage1_rules[0].processors.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn stage2_rule_with_unknown_strategy_is_rejected() {
        let mut config = valid_base();
        config.stage2_rules[0].strategy = 9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_rules_are_rejected() {
        let mut config = valid_base();
        config.stage1_rules.clear();
        assert!(config.validate().is_err());

        let mut config = valid_base();
        config.stage2_rules.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn off_by_a_little_distribution_only_warns() {
        let mut config = valid_base();
        config.producers.distribution.insert(0, 0.995);
        assert!(config.validate().is_ok());
    }
}
