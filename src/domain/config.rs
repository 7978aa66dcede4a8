//! Algorithm configuration operations over a loaded document.
//!
//! The priority engine configuration is persisted inside the document
//! so every process sharing it recalculates identically. Setters clamp
//! parameters into their documented bounds rather than rejecting them.

use crate::entities::{
    EffortWeightConfig, PriorityEngineConfig, TaskDocument, TimeDecayConfig,
};

/// Apply a time decay configuration, returning the clamped form stored
pub fn configure_time_decay(doc: &mut TaskDocument, config: TimeDecayConfig) -> TimeDecayConfig {
    let clamped = config.clamped();
    doc.config.time_decay = clamped.clone();
    doc.touch();
    clamped
}

/// Apply an effort weighting configuration, returning the clamped form stored
pub fn configure_effort_weighting(
    doc: &mut TaskDocument,
    config: EffortWeightConfig,
) -> EffortWeightConfig {
    let clamped = config.clamped();
    doc.config.effort_weighting = clamped.clone();
    doc.touch();
    clamped
}

/// Toggle the dependency boost stage
pub fn configure_dependency_boost(doc: &mut TaskDocument, enabled: bool) -> bool {
    doc.config.dependency_boost = enabled;
    doc.touch();
    enabled
}

/// Snapshot of the full advanced algorithm configuration
pub fn algorithm_config(doc: &TaskDocument) -> PriorityEngineConfig {
    doc.config.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::DecayModel;

    #[test]
    fn test_configure_time_decay_clamps_and_persists() {
        let mut doc = TaskDocument::new();
        let applied = configure_time_decay(
            &mut doc,
            TimeDecayConfig {
                model: DecayModel::Sigmoid,
                rate: 99.0,
                ..TimeDecayConfig::default()
            },
        );

        assert_eq!(applied.rate, 0.2);
        assert_eq!(doc.config.time_decay.model, DecayModel::Sigmoid);
    }

    #[test]
    fn test_configure_effort_weighting() {
        let mut doc = TaskDocument::new();
        let applied = configure_effort_weighting(
            &mut doc,
            EffortWeightConfig {
                boost_threshold: 7.0,
                ..EffortWeightConfig::default()
            },
        );

        assert_eq!(applied.boost_threshold, 1.0);
        assert_eq!(doc.config.effort_weighting, applied);
    }

    #[test]
    fn test_algorithm_config_snapshot() {
        let mut doc = TaskDocument::new();
        configure_dependency_boost(&mut doc, false);
        assert!(!algorithm_config(&doc).dependency_boost);
    }
}
