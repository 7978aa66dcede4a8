//! Priority recalculation pipeline.
//!
//! Four stages run in a fixed order over the whole document:
//! dependency boost, time decay, effort weighting, and distribution
//! optimization. Every stage starts from each task's base priority
//! rather than its previous output, so repeated runs with an unchanged
//! configuration and task set produce identical assignments.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use crate::entities::{
    clamp_priority, DecayModel, PriorityEngineConfig, TaskDocument, TaskStatus, MAX_PRIORITY,
    MIN_PRIORITY,
};

/// Per-dependent flat contribution to the dependency boost
const DEPENDENT_BASE_BOOST: f64 = 10.0;
/// Divisor converting a dependent's base priority into extra boost
const DEPENDENT_PRIORITY_DIVISOR: f64 = 20.0;
/// Normalization window for the logarithmic decay model
const REFERENCE_SPAN_DAYS: f64 = 365.0;
/// Fixed midpoint offset for the sigmoid decay model, in days
const SIGMOID_MIDPOINT_DAYS: f64 = 30.0;
/// Priority below which the adaptive model behaves linearly
const ADAPTIVE_SPLIT: f64 = 500.0;
/// Fixed increment granted when the effort score clears its threshold
const EFFORT_BOOST: f64 = 50.0;
/// Priority span below which the whole set is considered clustered
const NARROW_BAND: u16 = 100;
/// Target range a clustered set is stretched onto
const SPREAD_LO: f64 = 100.0;
const SPREAD_HI: f64 = 900.0;

/// Summary returned by a recalculation run
#[derive(Debug, Clone, Serialize)]
pub struct RecalculationSummary {
    /// Number of tasks the pipeline visited
    pub recalculated: usize,
    /// Number of tasks whose stored priority changed
    pub changed: usize,
}

/// Priority distribution summary for `getPriorityStatistics`
#[derive(Debug, Clone, Serialize)]
pub struct PriorityStatistics {
    pub count: usize,
    pub min: u16,
    pub max: u16,
    pub mean: f64,
    /// Tasks holding a priority shared with at least one other task
    pub duplicates: usize,
    /// Task counts per 100-wide band, "1-100" through "901-1000"
    pub histogram: Vec<HistogramBand>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistogramBand {
    pub range: String,
    pub count: usize,
}

/// Priority recalculation pipeline bound to a configuration
pub struct PriorityEngine<'a> {
    config: &'a PriorityEngineConfig,
}

impl<'a> PriorityEngine<'a> {
    pub fn new(config: &'a PriorityEngineConfig) -> Self {
        Self { config }
    }

    /// Recompute every task's priority. `now` is injected so callers
    /// (and tests) control the clock the decay stages see.
    pub fn recalculate(&self, doc: &mut TaskDocument, now: DateTime<Utc>) -> RecalculationSummary {
        let recalculated = doc.tasks.len();
        if recalculated == 0 {
            return RecalculationSummary {
                recalculated: 0,
                changed: 0,
            };
        }

        // Seed working values from base priorities; backfill the base
        // field on documents that predate it.
        let mut values: Vec<f64> = Vec::with_capacity(recalculated);
        for task in &mut doc.tasks {
            let base = task.effective_base();
            task.base_priority = Some(base);
            values.push(f64::from(base));
        }

        if self.config.dependency_boost {
            self.apply_dependency_boost(doc, &mut values);
        }
        if self.config.time_decay.enabled {
            self.apply_time_decay(doc, &mut values, now);
        }
        if self.config.effort_weighting.enabled {
            self.apply_effort_weighting(doc, &mut values, now);
        }
        let finals = optimize_distribution(doc, &values);

        let mut changed = 0;
        for (task, new_priority) in doc.tasks.iter_mut().zip(finals) {
            if task.priority != new_priority {
                task.priority = new_priority;
                changed += 1;
            }
        }

        debug!(recalculated, changed, "priority recalculation complete");
        RecalculationSummary {
            recalculated,
            changed,
        }
    }

    /// Stage 1: raise tasks other tasks are waiting on. The boost grows
    /// with the number of dependents and with their base priorities, and
    /// is bounded so the running value never exceeds the range maximum.
    fn apply_dependency_boost(&self, doc: &TaskDocument, values: &mut [f64]) {
        let mut boosts: HashMap<u64, f64> = HashMap::new();
        for task in &doc.tasks {
            let weight =
                DEPENDENT_BASE_BOOST + f64::from(task.effective_base()) / DEPENDENT_PRIORITY_DIVISOR;
            for &dep in &task.depends_on {
                *boosts.entry(dep).or_insert(0.0) += weight;
            }
        }

        for (task, value) in doc.tasks.iter().zip(values.iter_mut()) {
            if let Some(boost) = boosts.get(&task.id) {
                *value = (*value + boost).min(f64::from(MAX_PRIORITY));
            }
        }
    }

    /// Stage 2: age-based boost for stale todo tasks
    fn apply_time_decay(&self, doc: &TaskDocument, values: &mut [f64], now: DateTime<Utc>) {
        let decay = &self.config.time_decay;

        for (task, value) in doc.tasks.iter().zip(values.iter_mut()) {
            if task.status != TaskStatus::Todo {
                continue;
            }
            // age since the last status change, not creation, so a task
            // bounced back to todo starts aging afresh
            let anchor = task.updated_at.max(task.created_at);
            let age_days = (now - anchor).num_seconds() as f64 / 86_400.0;
            let over_days = age_days - f64::from(decay.threshold_days);
            if over_days <= 0.0 {
                continue;
            }

            let raw = decay_boost(decay.model, decay.rate, decay.max_boost, over_days, *value);
            let boost = if decay.priority_weight {
                // diminishing returns for already-high priorities
                raw * ((f64::from(MAX_PRIORITY) - *value).max(0.0) / f64::from(MAX_PRIORITY))
            } else {
                raw
            };

            *value = (*value + boost).min(f64::from(MAX_PRIORITY));
        }
    }

    /// Stage 3: contribution from complexity/impact/urgency scores,
    /// decayed over task age
    fn apply_effort_weighting(&self, doc: &TaskDocument, values: &mut [f64], now: DateTime<Utc>) {
        let effort = &self.config.effort_weighting;

        for (task, value) in doc.tasks.iter().zip(values.iter_mut()) {
            let complexity = normalized(task.complexity);
            let impact = normalized(task.impact);
            let urgency = normalized(task.urgency);

            let score = effort.score_weight
                * (effort.complexity_weight * complexity
                    + effort.impact_weight * impact
                    + effort.urgency_weight * urgency);

            let age_days = ((now - task.created_at).num_seconds() as f64 / 86_400.0).max(0.0);
            let decayed = score * (-effort.decay_rate * age_days).exp();

            if decayed > effort.boost_threshold {
                *value = (*value + EFFORT_BOOST).min(f64::from(MAX_PRIORITY));
            }
        }
    }
}

/// Boost for a single task under the selected decay model
fn decay_boost(model: DecayModel, rate: f64, max_boost: f64, over_days: f64, current: f64) -> f64 {
    match model {
        DecayModel::Linear => (rate * over_days).min(max_boost),
        DecayModel::Exponential => max_boost * (1.0 - (-rate * over_days).exp()),
        DecayModel::Logarithmic => {
            let span = (1.0 + rate * REFERENCE_SPAN_DAYS).ln();
            if span > 0.0 {
                max_boost * (1.0 + rate * over_days).ln() / span
            } else {
                0.0
            }
        }
        DecayModel::Sigmoid => {
            max_boost / (1.0 + (-rate * (over_days - SIGMOID_MIDPOINT_DAYS)).exp())
        }
        DecayModel::Adaptive => {
            // urgency grows gently for low-priority work and sharply for
            // work already near the front of the queue
            if current < ADAPTIVE_SPLIT {
                decay_boost(DecayModel::Linear, rate, max_boost, over_days, current)
            } else {
                decay_boost(DecayModel::Exponential, rate, max_boost, over_days, current)
            }
        }
    }
}

fn normalized(score: Option<u8>) -> f64 {
    f64::from(score.unwrap_or(0).min(10)) / 10.0
}

/// Stage 4: clamp into range, resolve collisions by nudging the
/// later-processed (higher-id) task upward by the smallest delta that
/// preserves the relative order, and stretch clustered sets across the
/// range. The widened span keeps the stretch a no-op on the next run.
fn optimize_distribution(doc: &TaskDocument, values: &[f64]) -> Vec<u16> {
    let mut finals: Vec<u16> = values
        .iter()
        .map(|v| clamp_priority(v.round() as i64))
        .collect();

    dedupe(doc, &mut finals);

    if let (Some(&min), Some(&max)) = (finals.iter().min(), finals.iter().max()) {
        let distinct = finals.iter().collect::<std::collections::HashSet<_>>().len();
        if distinct >= 2 && max - min < NARROW_BAND {
            let span = f64::from(max - min);
            for value in &mut finals {
                let fraction = f64::from(*value - min) / span;
                *value =
                    clamp_priority((SPREAD_LO + fraction * (SPREAD_HI - SPREAD_LO)).round() as i64);
            }
            // integer rounding of a stretch this wide cannot merge two
            // distinct inputs, but a cautious second pass keeps the
            // uniqueness guarantee unconditional
            dedupe(doc, &mut finals);
        }
    }

    finals
}

/// Make priorities unique without reordering: process in (value, id)
/// order and push each collision up by one, so among equal values the
/// higher-id task is the one shifted.
fn dedupe(doc: &TaskDocument, finals: &mut [u16]) {
    let mut order: Vec<usize> = (0..finals.len()).collect();
    order.sort_by_key(|&i| (finals[i], doc.tasks[i].id));

    let mut prev: Option<u16> = None;
    for &i in &order {
        if let Some(p) = prev {
            if finals[i] <= p {
                finals[i] = p.saturating_add(1).min(MAX_PRIORITY);
            }
        }
        prev = Some(finals[i]);
    }

    // the range holds at most 1000 distinct values; if the upward pass
    // hit the ceiling, walk back down from the top
    if finals.len() >= 2 {
        let mut ceiling = MAX_PRIORITY;
        for &i in order.iter().rev() {
            if finals[i] > ceiling {
                finals[i] = ceiling;
            }
            ceiling = finals[i].saturating_sub(1).max(MIN_PRIORITY);
        }
    }
}

/// Distribution summary over the current priorities; read-only
pub fn priority_statistics(doc: &TaskDocument) -> PriorityStatistics {
    let count = doc.tasks.len();
    let mut histogram: Vec<HistogramBand> = (0..10)
        .map(|band| HistogramBand {
            range: format!("{}-{}", band * 100 + 1, (band + 1) * 100),
            count: 0,
        })
        .collect();

    if count == 0 {
        return PriorityStatistics {
            count: 0,
            min: 0,
            max: 0,
            mean: 0.0,
            duplicates: 0,
            histogram,
        };
    }

    let mut occurrences: HashMap<u16, usize> = HashMap::new();
    let mut sum: u64 = 0;
    let mut min = MAX_PRIORITY;
    let mut max = MIN_PRIORITY;

    for task in &doc.tasks {
        let p = task.priority;
        sum += u64::from(p);
        min = min.min(p);
        max = max.max(p);
        *occurrences.entry(p).or_insert(0) += 1;
        let band = usize::from((p.clamp(MIN_PRIORITY, MAX_PRIORITY) - 1) / 100);
        histogram[band].count += 1;
    }

    let duplicates = occurrences.values().filter(|&&n| n > 1).copied().sum();

    PriorityStatistics {
        count,
        min,
        max,
        mean: sum as f64 / count as f64,
        duplicates,
        histogram,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{EffortWeightConfig, Task, TimeDecayConfig};
    use chrono::Duration;

    fn fixed_now() -> DateTime<Utc> {
        "2026-06-01T00:00:00Z".parse().unwrap()
    }

    fn doc_with(tasks: Vec<Task>) -> TaskDocument {
        TaskDocument {
            tasks,
            ..TaskDocument::new()
        }
    }

    fn task(id: u64, base: u16) -> Task {
        let mut t = Task::new(id, format!("Task {id}"), "");
        t.priority = base;
        t.base_priority = Some(base);
        t
    }

    fn aged_task(id: u64, base: u16, days_old: i64, now: DateTime<Utc>) -> Task {
        let mut t = task(id, base);
        t.created_at = now - Duration::days(days_old);
        t.updated_at = t.created_at;
        t
    }

    fn quiet_config() -> PriorityEngineConfig {
        PriorityEngineConfig {
            dependency_boost: false,
            time_decay: TimeDecayConfig {
                enabled: false,
                ..TimeDecayConfig::default()
            },
            effort_weighting: EffortWeightConfig {
                enabled: false,
                ..EffortWeightConfig::default()
            },
        }
    }

    #[test]
    fn test_priorities_stay_in_range() {
        let now = fixed_now();
        let mut doc = doc_with(vec![
            aged_task(1, 990, 200, now),
            aged_task(2, 1, 0, now),
            aged_task(3, 1000, 400, now),
        ]);
        doc.tasks[0].depends_on = vec![3];
        doc.tasks[1].depends_on = vec![3];

        let config = PriorityEngineConfig::default();
        PriorityEngine::new(&config).recalculate(&mut doc, now);

        for t in &doc.tasks {
            assert!((MIN_PRIORITY..=MAX_PRIORITY).contains(&t.priority));
        }
    }

    #[test]
    fn test_recalculation_is_idempotent() {
        let now = fixed_now();
        let mut doc = doc_with(vec![
            aged_task(1, 400, 30, now),
            aged_task(2, 400, 10, now),
            aged_task(3, 700, 90, now),
        ]);
        doc.tasks[1].depends_on = vec![1];
        doc.tasks[2].depends_on = vec![1];

        let config = PriorityEngineConfig::default();
        let engine = PriorityEngine::new(&config);

        engine.recalculate(&mut doc, now);
        let first: Vec<u16> = doc.tasks.iter().map(|t| t.priority).collect();

        let summary = engine.recalculate(&mut doc, now);
        let second: Vec<u16> = doc.tasks.iter().map(|t| t.priority).collect();

        assert_eq!(first, second);
        assert_eq!(summary.changed, 0);
    }

    #[test]
    fn test_dependency_boost_raises_blockers() {
        let now = fixed_now();
        let mut doc = doc_with(vec![task(1, 300), task(2, 300), task(3, 300)]);
        doc.tasks[1].depends_on = vec![1];
        doc.tasks[2].depends_on = vec![1];

        let mut config = quiet_config();
        config.dependency_boost = true;
        PriorityEngine::new(&config).recalculate(&mut doc, now);

        assert!(doc.tasks[0].priority > doc.tasks[1].priority);
        assert!(doc.tasks[0].priority > doc.tasks[2].priority);
    }

    #[test]
    fn test_time_decay_skips_fresh_and_non_todo() {
        let now = fixed_now();
        let mut doc = doc_with(vec![
            aged_task(1, 300, 2, now),
            aged_task(2, 300, 60, now),
            aged_task(3, 300, 60, now),
        ]);
        doc.tasks[2].status = TaskStatus::Done;

        let mut config = quiet_config();
        config.time_decay = TimeDecayConfig {
            enabled: true,
            threshold_days: 7,
            ..TimeDecayConfig::default()
        };
        PriorityEngine::new(&config).recalculate(&mut doc, now);

        // only the stale todo task moves (modulo stage-4 deduplication)
        assert!(doc.tasks[1].priority > doc.tasks[0].priority);
        assert!(doc.tasks[1].priority > doc.tasks[2].priority);
    }

    #[test]
    fn test_decay_models_bounded_by_max_boost() {
        for model in [
            DecayModel::Linear,
            DecayModel::Exponential,
            DecayModel::Logarithmic,
            DecayModel::Sigmoid,
            DecayModel::Adaptive,
        ] {
            let boost = decay_boost(model, 0.2, 100.0, 10_000.0, 600.0);
            assert!(
                boost <= 100.0 + 1e-9,
                "{model} produced boost {boost} above max"
            );
            assert!(boost >= 0.0);
        }
    }

    #[test]
    fn test_adaptive_splits_on_current_priority() {
        let low = decay_boost(DecayModel::Adaptive, 0.1, 100.0, 20.0, 200.0);
        let linear = decay_boost(DecayModel::Linear, 0.1, 100.0, 20.0, 200.0);
        assert_eq!(low, linear);

        let high = decay_boost(DecayModel::Adaptive, 0.1, 100.0, 20.0, 800.0);
        let exponential = decay_boost(DecayModel::Exponential, 0.1, 100.0, 20.0, 800.0);
        assert_eq!(high, exponential);
    }

    #[test]
    fn test_priority_weight_damps_high_priorities() {
        let now = fixed_now();
        let mut doc = doc_with(vec![aged_task(1, 950, 60, now), aged_task(2, 100, 60, now)]);

        let mut config = quiet_config();
        config.time_decay = TimeDecayConfig {
            enabled: true,
            model: DecayModel::Exponential,
            priority_weight: true,
            ..TimeDecayConfig::default()
        };
        PriorityEngine::new(&config).recalculate(&mut doc, now);

        let high_gain = i64::from(doc.tasks[0].priority) - 950;
        let low_gain = i64::from(doc.tasks[1].priority) - 100;
        assert!(low_gain > high_gain);
    }

    #[test]
    fn test_effort_boost_above_threshold() {
        let now = fixed_now();
        let mut strong = task(1, 400);
        strong.created_at = now;
        strong.complexity = Some(9);
        strong.impact = Some(9);
        strong.urgency = Some(9);
        let weak = task(2, 400);
        let mut doc = doc_with(vec![strong, weak]);

        let mut config = quiet_config();
        config.effort_weighting = EffortWeightConfig {
            enabled: true,
            score_weight: 1.0,
            complexity_weight: 0.4,
            impact_weight: 0.35,
            urgency_weight: 0.25,
            decay_rate: 0.0,
            boost_threshold: 0.6,
        };
        PriorityEngine::new(&config).recalculate(&mut doc, now);

        assert!(doc.tasks[0].priority >= 450);
        assert!(doc.tasks[1].priority < 450);
    }

    #[test]
    fn test_collision_shifts_higher_id() {
        let now = fixed_now();
        // the task at 200 keeps the span wide enough that no rescale runs
        let mut doc = doc_with(vec![task(1, 700), task(2, 700), task(3, 200)]);

        let config = quiet_config();
        PriorityEngine::new(&config).recalculate(&mut doc, now);

        assert_eq!(doc.tasks[0].priority, 700);
        assert_eq!(doc.tasks[1].priority, 701);
        assert_eq!(doc.tasks[2].priority, 200);
    }

    #[test]
    fn test_clustered_set_is_spread() {
        let now = fixed_now();
        let mut doc = doc_with(vec![task(1, 498), task(2, 500), task(3, 502)]);

        let config = quiet_config();
        PriorityEngine::new(&config).recalculate(&mut doc, now);

        let ps: Vec<u16> = doc.tasks.iter().map(|t| t.priority).collect();
        assert_eq!(ps[0], 100);
        assert_eq!(ps[2], 900);
        // ordering preserved
        assert!(ps[0] < ps[1] && ps[1] < ps[2]);

        // spreading is a no-op on the second run
        PriorityEngine::new(&config).recalculate(&mut doc, now);
        let again: Vec<u16> = doc.tasks.iter().map(|t| t.priority).collect();
        assert_eq!(ps, again);
    }

    #[test]
    fn test_manual_edit_survives_until_recalculation() {
        let now = fixed_now();
        let mut doc = doc_with(vec![task(1, 500)]);
        let config = quiet_config();
        PriorityEngine::new(&config).recalculate(&mut doc, now);

        // a manual edit resets the base, so the next run keeps it
        doc.tasks[0].priority = 42;
        doc.tasks[0].base_priority = Some(42);
        PriorityEngine::new(&config).recalculate(&mut doc, now);
        assert_eq!(doc.tasks[0].priority, 42);
    }

    #[test]
    fn test_statistics() {
        let doc = doc_with(vec![task(1, 100), task(2, 100), task(3, 950)]);
        let stats = priority_statistics(&doc);

        assert_eq!(stats.count, 3);
        assert_eq!(stats.min, 100);
        assert_eq!(stats.max, 950);
        assert_eq!(stats.duplicates, 2);
        assert_eq!(stats.histogram[0].count, 2);
        assert_eq!(stats.histogram[9].count, 1);
        assert!((stats.mean - (100.0 + 100.0 + 950.0) / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_statistics_empty_document() {
        let stats = priority_statistics(&TaskDocument::new());
        assert_eq!(stats.count, 0);
        assert_eq!(stats.duplicates, 0);
    }
}
