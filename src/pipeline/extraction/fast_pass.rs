//! Stage A: a quick provisional total and trade category so a quote can be
//! listed before the deep pass finishes.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::category::detect_category;
use super::patterns::quick_total;
use super::ExtractionInput;
use crate::models::{Channel, TradeCategory};
use crate::pipeline::intake::form::QuoteForm;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvisionalSketch {
    pub total: Option<f64>,
    pub category: Option<TradeCategory>,
}

impl ProvisionalSketch {
    pub fn is_empty(&self) -> bool {
        self.total.is_none() && self.category.is_none()
    }
}

/// Compute the sketch synchronously. Never fails: anything unreadable yields an empty sketch.
pub fn sketch(input: &ExtractionInput) -> ProvisionalSketch {
    if input.channel == Channel::StructuredForm {
        let Ok(form) = QuoteForm::parse(&input.payload) else {
            return ProvisionalSketch::default();
        };
        let mut words: Vec<&str> = form.scope_included.iter().map(String::as_str).collect();
        words.extend(form.line_items.iter().map(|item| item.description.as_str()));
        if let Some(notes) = form.notes.as_deref() {
            words.push(notes);
        }
        return ProvisionalSketch {
            total: form.total_amount,
            category: detect_category(&words.join("\n")),
        };
    }

    match input.text_str() {
        Some(text) => ProvisionalSketch {
            total: quick_total(text),
            category: detect_category(text),
        },
        None => ProvisionalSketch::default(),
    }
}

/// Run [`sketch`] on the blocking pool. A timeout or panic yields an empty sketch.
pub async fn run_fast_pass(input: Arc<ExtractionInput>, timeout: Duration) -> ProvisionalSketch {
    let submission_id = input.submission_id;
    match tokio::time::timeout(timeout, tokio::task::spawn_blocking(move || sketch(&input))).await {
        Ok(Ok(sketch)) => sketch,
        Ok(Err(e)) => {
            tracing::warn!(submission_id = %submission_id, error = %e, "Fast pass task failed");
            ProvisionalSketch::default()
        }
        Err(_) => {
            tracing::warn!(
                submission_id = %submission_id,
                timeout_ms = timeout.as_millis() as u64,
                "Fast pass timed out"
            );
            ProvisionalSketch::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use uuid::Uuid;

    use super::*;
    use crate::pipeline::extraction::{RecognizedText, TextSource};

    fn text_input(text: &str) -> ExtractionInput {
        ExtractionInput {
            submission_id: Uuid::new_v4(),
            channel: Channel::InboundMessage,
            mime: "text/plain".into(),
            payload: text.as_bytes().to_vec(),
            reference_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            text: Some(RecognizedText::new(text, 1.0, TextSource::MessageBody)),
        }
    }

    #[test]
    fn text_sketch_has_total_and_category() {
        let sketch = sketch(&text_input("Replace kitchen faucet and drain. Total $340"));
        assert_eq!(sketch.total, Some(340.0));
        assert_eq!(sketch.category, Some(TradeCategory::Plumbing));
    }

    #[test]
    fn form_sketch_reads_declared_total() {
        let mut input = text_input("");
        input.channel = Channel::StructuredForm;
        input.text = None;
        input.payload = br#"{"total_amount": 2200, "scope_included": ["Replace furnace"]}"#.to_vec();
        let sketch = sketch(&input);
        assert_eq!(sketch.total, Some(2200.0));
        assert_eq!(sketch.category, Some(TradeCategory::Hvac));
    }

    #[test]
    fn image_without_text_is_empty() {
        let mut input = text_input("");
        input.channel = Channel::PhotoCapture;
        input.text = None;
        assert!(sketch(&input).is_empty());
    }

    #[tokio::test]
    async fn fast_pass_returns_sketch() {
        let sketch = run_fast_pass(Arc::new(text_input("Estimate: $75")), Duration::from_secs(5)).await;
        assert_eq!(sketch.total, Some(75.0));
    }
}
