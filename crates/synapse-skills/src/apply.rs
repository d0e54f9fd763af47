//! Driving an adapter update into a guest module.

use crate::error::SkillError;
use crate::payload::SkillResponse;
use crate::weights;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use std::sync::Arc;
use synapse_bridge::GuestModule;
use synapse_events::EventBroadcaster;
use synapse_types::adapter::AdapterUpdate;
use synapse_types::event::EventKind;
use tracing::{debug, warn};

/// Applies skill payloads to guest modules.
pub struct SkillApplicator {
    events: Arc<EventBroadcaster>,
}

impl SkillApplicator {
    /// Create an applicator that announces outcomes on `events`.
    pub fn new(events: Arc<EventBroadcaster>) -> Self {
        Self { events }
    }

    /// Decode `payload` and load the resulting adapter into `module`.
    ///
    /// Returns the module's boolean acceptance. Emits `SkillApplied` or
    /// `SkillApplicationFailed` for observability; validation errors
    /// reject the whole call — there is no partial application.
    pub async fn apply_skill(
        &self,
        module: &GuestModule,
        payload: &[u8],
    ) -> Result<bool, SkillError> {
        let update = match decode_payload(payload) {
            Ok(update) => update,
            Err(e) => {
                warn!(error = %e, "Skill payload rejected");
                return Err(e);
            }
        };
        let skill_id = update.skill_id.clone();

        match module.load_adapter(&update).await {
            Ok(true) => {
                debug!(skill = %skill_id, "Adapter loaded");
                self.events
                    .emit(EventKind::SkillApplied { skill_id })
                    .await;
                Ok(true)
            }
            Ok(false) => {
                self.events
                    .emit(EventKind::SkillApplicationFailed {
                        skill_id,
                        reason: "module rejected adapter".to_string(),
                    })
                    .await;
                Ok(false)
            }
            Err(e) => {
                self.events
                    .emit(EventKind::SkillApplicationFailed {
                        skill_id,
                        reason: e.to_string(),
                    })
                    .await;
                Err(e.into())
            }
        }
    }
}

/// Decode a raw skill payload into a validated [`AdapterUpdate`].
pub fn decode_payload(payload: &[u8]) -> Result<AdapterUpdate, SkillError> {
    let response: SkillResponse =
        serde_json::from_slice(payload).map_err(|e| SkillError::Decode(e.to_string()))?;
    let record = response.skill.ok_or(SkillError::EmptyPayload)?;

    let raw_a = BASE64
        .decode(&record.weights_a)
        .map_err(|e| SkillError::Decode(format!("weights_a base64: {e}")))?;
    let raw_b = BASE64
        .decode(&record.weights_b)
        .map_err(|e| SkillError::Decode(format!("weights_b base64: {e}")))?;

    let weights_a = weights::decode_weights(&raw_a)?;
    let weights_b = weights::decode_weights(&raw_b)?;
    let scale = weights::scale(record.alpha, record.rank)?;
    debug!(
        skill = %record.skill_id,
        rank = record.rank,
        scale,
        a_len = weights_a.len(),
        b_len = weights_b.len(),
        "Decoded adapter payload"
    );

    Ok(AdapterUpdate {
        skill_id: record.skill_id,
        name: record.name,
        weights_a,
        weights_b,
        rank: record.rank,
        alpha: record.alpha,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use synapse_bridge::{Bridge, BridgeConfig};
    use synapse_types::module::ModuleRole;

    /// Minimal standard-dialect module whose load_adapter accepts
    /// non-empty buffers.
    const ADAPTER_WAT: &str = r#"
        (module
            (memory (export "memory") 2)
            (global $bump (mut i32) (i32.const 4096))
            (func (export "alloc") (param $size i32) (result i32)
                (local $ptr i32)
                (local.set $ptr (global.get $bump))
                (global.set $bump (i32.add (global.get $bump) (local.get $size)))
                (local.get $ptr)
            )
            (func (export "execute") (param i32 i32 i32 i32) (result i64) (i64.const 0))
            (func (export "load_adapter") (param i32 i32) (result i32)
                (i32.ne (local.get 1) (i32.const 0))
            )
            (func (export "get_status") (result i64) (i64.const 0))
        )
    "#;

    fn encoded_floats(values: &[f32]) -> String {
        let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_be_bytes()).collect();
        BASE64.encode(bytes)
    }

    fn payload(rank: u32) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "request_id": "r-1",
            "status": "ok",
            "skill": {
                "skill_id": "skill-42",
                "name": "pathfinding",
                "weights_a": encoded_floats(&[1.0, 0.5, -0.25, 2.0]),
                "weights_b": encoded_floats(&[0.0, -1.0]),
                "rank": rank,
                "alpha": 16.0,
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_decode_payload() {
        let update = decode_payload(&payload(8)).unwrap();
        assert_eq!(update.skill_id, "skill-42");
        assert_eq!(update.weights_a, vec![1.0, 0.5, -0.25, 2.0]);
        assert_eq!(update.weights_b, vec![0.0, -1.0]);
        assert_eq!(update.scale(), 2.0);
    }

    #[test]
    fn test_missing_record_is_empty_payload() {
        let bytes = serde_json::to_vec(&json!({"request_id": "r-1"})).unwrap();
        let err = decode_payload(&bytes).unwrap_err();
        assert!(matches!(err, SkillError::EmptyPayload));
    }

    #[test]
    fn test_ragged_weights_rejected() {
        let bytes = serde_json::to_vec(&json!({
            "skill": {
                "skill_id": "s",
                "weights_a": BASE64.encode([0u8; 5]),
                "weights_b": BASE64.encode([0u8; 4]),
                "rank": 2,
                "alpha": 1.0,
            }
        }))
        .unwrap();
        let err = decode_payload(&bytes).unwrap_err();
        assert!(matches!(err, SkillError::MalformedWeights(_)));
    }

    #[test]
    fn test_zero_rank_rejected() {
        let err = decode_payload(&payload(0)).unwrap_err();
        assert!(matches!(err, SkillError::InvalidAdapterConfig(_)));
    }

    #[tokio::test]
    async fn test_apply_emits_skill_applied() {
        let events = Arc::new(EventBroadcaster::new());
        let bridge = Bridge::new(BridgeConfig::default(), events.clone()).unwrap();
        let module = bridge
            .instantiate(ADAPTER_WAT.as_bytes(), ModuleRole::Model)
            .await
            .unwrap();

        let applicator = SkillApplicator::new(events.clone());
        let applied = applicator.apply_skill(&module, &payload(8)).await.unwrap();
        assert!(applied);

        let history = events.history(10).await;
        assert!(history.iter().any(|e| matches!(
            &e.kind,
            EventKind::SkillApplied { skill_id } if skill_id == "skill-42"
        )));
    }

    #[tokio::test]
    async fn test_validation_failure_rejects_whole_call() {
        let events = Arc::new(EventBroadcaster::new());
        let bridge = Bridge::new(BridgeConfig::default(), events.clone()).unwrap();
        let module = bridge
            .instantiate(ADAPTER_WAT.as_bytes(), ModuleRole::Model)
            .await
            .unwrap();

        let applicator = SkillApplicator::new(events.clone());
        let err = applicator
            .apply_skill(&module, &payload(0))
            .await
            .unwrap_err();
        assert!(matches!(err, SkillError::InvalidAdapterConfig(_)));

        // Nothing reached the module, so no applied/failed event either.
        let history = events.history(10).await;
        assert!(!history.iter().any(|e| matches!(
            e.kind,
            EventKind::SkillApplied { .. } | EventKind::SkillApplicationFailed { .. }
        )));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_applies_serialize() {
        let events = Arc::new(EventBroadcaster::new());
        let bridge = Bridge::new(BridgeConfig::default(), events.clone()).unwrap();
        let module = Arc::new(
            bridge
                .instantiate(ADAPTER_WAT.as_bytes(), ModuleRole::Model)
                .await
                .unwrap(),
        );
        let applicator = Arc::new(SkillApplicator::new(events.clone()));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let module = module.clone();
                let applicator = applicator.clone();
                tokio::spawn(async move { applicator.apply_skill(&module, &payload(8)).await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().unwrap());
        }

        let history = events.history(10).await;
        let applied = history
            .iter()
            .filter(|e| matches!(e.kind, EventKind::SkillApplied { .. }))
            .count();
        assert_eq!(applied, 4);
    }
}
