//! In-process fallback engine.
//!
//! A deterministic stand-in for the model capability, installed when no
//! guest module could be loaded. Responses echo the input so that
//! downstream callers observe a working (if unintelligent) system.

use std::sync::atomic::{AtomicU64, Ordering};
use synapse_types::call::{CognitiveResponse, ResponseSource, SensoryInput};

/// Confidence reported for inputs with enough content to echo usefully.
const CONFIDENT: f32 = 0.8;

/// Confidence reported for trivially small inputs.
const HESITANT: f32 = 0.6;

/// Deterministic echo-style engine.
#[derive(Debug, Default)]
pub struct FallbackEngine {
    processed: AtomicU64,
}

impl FallbackEngine {
    /// Create a new fallback engine.
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce an echo response for `input`.
    pub fn process(&self, input: &SensoryInput) -> CognitiveResponse {
        let seq = self.processed.fetch_add(1, Ordering::Relaxed) + 1;
        let summary = input
            .task
            .clone()
            .unwrap_or_else(|| input.data.to_string());
        let confidence = if summary.len() > 10 { CONFIDENT } else { HESITANT };

        CognitiveResponse {
            success: true,
            payload: serde_json::json!({
                "response": format!("Processed: {summary}"),
                "echo": input.data,
                "sequence": seq,
            }),
            error: None,
            confidence,
            processing_time_ms: 0,
            source: ResponseSource::Fallback,
        }
    }

    /// How many inputs this engine has answered.
    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }
}
