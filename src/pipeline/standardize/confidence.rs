use serde::{Deserialize, Serialize};

use crate::config::ComponentWeights;
use crate::models::Component;
use crate::pipeline::extraction::clamp_confidence;

/// Per-component confidence of a mapped quote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentScores {
    pub pricing: f64,
    pub timeline: f64,
    pub scope: f64,
    pub terms: f64,
}

impl ComponentScores {
    pub fn get(&self, component: Component) -> f64 {
        match component {
            Component::Pricing => self.pricing,
            Component::Timeline => self.timeline,
            Component::Scope => self.scope,
            Component::Terms => self.terms,
        }
    }

    fn set(&mut self, component: Component, value: f64) {
        let slot = match component {
            Component::Pricing => &mut self.pricing,
            Component::Timeline => &mut self.timeline,
            Component::Scope => &mut self.scope,
            Component::Terms => &mut self.terms,
        };
        *slot = clamp_confidence(value);
    }

    /// Weighted mean over the four components. Weights are normalized first.
    pub fn overall(&self, weights: &ComponentWeights) -> f64 {
        let w = weights.normalized();
        clamp_confidence(
            self.pricing * w.pricing + self.timeline * w.timeline + self.scope * w.scope + self.terms * w.terms,
        )
    }

    /// Components scoring under `threshold`, in canonical order.
    pub fn below(&self, threshold: f64) -> Vec<Component> {
        Component::all()
            .iter()
            .copied()
            .filter(|c| self.get(*c) < threshold)
            .collect()
    }
}

/// Score each component as the mean confidence of its selected fields.
///
/// `selected` holds (component, field name, confidence) for every field the
/// mapper chose a value for. A component with nothing selected scores 0, and
/// pricing scores 0 without a total.
pub fn score_components(selected: &[(Component, &str, f64)], has_total: bool) -> ComponentScores {
    let mut scores = ComponentScores::default();
    for component in Component::all() {
        let values: Vec<f64> = selected
            .iter()
            .filter(|(c, _, _)| c == component)
            .map(|(_, _, confidence)| *confidence)
            .collect();
        let mean = if values.is_empty() {
            0.0
        } else {
            values.iter().sum::<f64>() / values.len() as f64
        };
        let score = if *component == Component::Pricing && !has_total { 0.0 } else { mean };
        scores.set(*component, score);
    }
    scores
}
