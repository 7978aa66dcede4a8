//! Priority engine configuration entities.
//!
//! Persisted inside the task document so every process sharing the
//! document recalculates with the same parameters. All setters clamp
//! out-of-range values into their documented bounds instead of failing.

use serde::{Deserialize, Serialize};

use crate::errors::EngineError;

/// Time decay model selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DecayModel {
    #[default]
    Linear,
    Exponential,
    Logarithmic,
    Sigmoid,
    Adaptive,
}

impl std::fmt::Display for DecayModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Linear => write!(f, "linear"),
            Self::Exponential => write!(f, "exponential"),
            Self::Logarithmic => write!(f, "logarithmic"),
            Self::Sigmoid => write!(f, "sigmoid"),
            Self::Adaptive => write!(f, "adaptive"),
        }
    }
}

impl std::str::FromStr for DecayModel {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "linear" => Ok(Self::Linear),
            "exponential" => Ok(Self::Exponential),
            "logarithmic" => Ok(Self::Logarithmic),
            "sigmoid" => Ok(Self::Sigmoid),
            "adaptive" => Ok(Self::Adaptive),
            _ => Err(EngineError::InvalidDecayModel {
                model: s.to_string(),
            }),
        }
    }
}

/// Time decay stage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeDecayConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub model: DecayModel,

    /// Decay rate, clamped to [0.001, 0.2]
    #[serde(default = "default_rate")]
    pub rate: f64,

    /// Days a todo task may sit before decay kicks in, clamped to [1, 365]
    #[serde(default = "default_threshold", rename = "threshold")]
    pub threshold_days: u32,

    /// Upper bound on the decay boost, clamped to [0, 500]
    #[serde(default = "default_max_boost", rename = "maxBoost")]
    pub max_boost: f64,

    /// Scale boosts down for already-high priorities
    #[serde(default = "default_true", rename = "priorityWeight")]
    pub priority_weight: bool,
}

fn default_true() -> bool {
    true
}

fn default_rate() -> f64 {
    0.05
}

fn default_threshold() -> u32 {
    7
}

fn default_max_boost() -> f64 {
    100.0
}

impl Default for TimeDecayConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: DecayModel::default(),
            rate: default_rate(),
            threshold_days: default_threshold(),
            max_boost: default_max_boost(),
            priority_weight: true,
        }
    }
}

impl TimeDecayConfig {
    /// Return a copy with every parameter forced into bounds
    pub fn clamped(&self) -> Self {
        Self {
            enabled: self.enabled,
            model: self.model,
            rate: self.rate.clamp(0.001, 0.2),
            threshold_days: self.threshold_days.clamp(1, 365),
            max_boost: self.max_boost.clamp(0.0, 500.0),
            priority_weight: self.priority_weight,
        }
    }
}

/// Effort weighting stage configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffortWeightConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Overall contribution of the effort score, clamped to [0, 1]
    #[serde(default = "default_score_weight", rename = "scoreWeight")]
    pub score_weight: f64,

    #[serde(default = "default_complexity_weight", rename = "complexityWeight")]
    pub complexity_weight: f64,

    #[serde(default = "default_impact_weight", rename = "impactWeight")]
    pub impact_weight: f64,

    #[serde(default = "default_urgency_weight", rename = "urgencyWeight")]
    pub urgency_weight: f64,

    /// Per-day score decay, clamped to [0, 0.1]
    #[serde(default = "default_decay_rate", rename = "decayRate")]
    pub decay_rate: f64,

    /// Decayed score above this earns the fixed boost, clamped to [0, 1]
    #[serde(default = "default_boost_threshold", rename = "boostThreshold")]
    pub boost_threshold: f64,
}

fn default_score_weight() -> f64 {
    0.5
}

fn default_complexity_weight() -> f64 {
    0.4
}

fn default_impact_weight() -> f64 {
    0.35
}

fn default_urgency_weight() -> f64 {
    0.25
}

fn default_decay_rate() -> f64 {
    0.01
}

fn default_boost_threshold() -> f64 {
    0.6
}

impl Default for EffortWeightConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            score_weight: default_score_weight(),
            complexity_weight: default_complexity_weight(),
            impact_weight: default_impact_weight(),
            urgency_weight: default_urgency_weight(),
            decay_rate: default_decay_rate(),
            boost_threshold: default_boost_threshold(),
        }
    }
}

impl EffortWeightConfig {
    /// Return a copy with every parameter forced into bounds
    pub fn clamped(&self) -> Self {
        Self {
            enabled: self.enabled,
            score_weight: self.score_weight.clamp(0.0, 1.0),
            complexity_weight: self.complexity_weight.clamp(0.0, 1.0),
            impact_weight: self.impact_weight.clamp(0.0, 1.0),
            urgency_weight: self.urgency_weight.clamp(0.0, 1.0),
            decay_rate: self.decay_rate.clamp(0.0, 0.1),
            boost_threshold: self.boost_threshold.clamp(0.0, 1.0),
        }
    }
}

/// Process-wide priority engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorityEngineConfig {
    /// Dependency boost stage toggle
    #[serde(default = "default_true", rename = "dependencyBoost")]
    pub dependency_boost: bool,

    #[serde(default, rename = "timeDecay")]
    pub time_decay: TimeDecayConfig,

    #[serde(default, rename = "effortWeighting")]
    pub effort_weighting: EffortWeightConfig,
}

impl Default for PriorityEngineConfig {
    fn default() -> Self {
        Self {
            dependency_boost: true,
            time_decay: TimeDecayConfig::default(),
            effort_weighting: EffortWeightConfig::default(),
        }
    }
}

/// Per-call overrides for `recalculatePriorities`; unset fields fall back
/// to the persisted configuration and nothing here is written back.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigOverrides {
    #[serde(default, rename = "dependencyBoost")]
    pub dependency_boost: Option<bool>,

    #[serde(default, rename = "timeDecay")]
    pub time_decay: Option<TimeDecayConfig>,

    #[serde(default, rename = "effortWeighting")]
    pub effort_weighting: Option<EffortWeightConfig>,
}

impl PriorityEngineConfig {
    /// Apply per-call overrides, clamping the result into bounds
    pub fn with_overrides(&self, overrides: &ConfigOverrides) -> Self {
        Self {
            dependency_boost: overrides.dependency_boost.unwrap_or(self.dependency_boost),
            time_decay: overrides
                .time_decay
                .as_ref()
                .unwrap_or(&self.time_decay)
                .clamped(),
            effort_weighting: overrides
                .effort_weighting
                .as_ref()
                .unwrap_or(&self.effort_weighting)
                .clamped(),
        }
    }
}
