//! Patch engine - applies opaque delta patches through a pluggable format

use bsa_core::{BsaResult, StateData, StateSnapshot};

use crate::DirectivePatch;

/// A versioned patch encoding
///
/// Implementations must be deterministic (same `(base, patch)` pair, same
/// output) and must never mutate the base document.
pub trait PatchFormat: Send + Sync {
    /// Stable name of the encoding, e.g. `directive/v1`
    fn name(&self) -> &'static str;

    /// Validate syntax without applying
    fn check(&self, patch: &str) -> BsaResult<()>;

    /// Apply `patch` to `base`, producing a new document
    fn apply(&self, base: &StateData, patch: &str) -> BsaResult<StateData>;
}

/// Applies delta patches to state snapshots
pub struct PatchEngine {
    format: Box<dyn PatchFormat>,
}

impl PatchEngine {
    /// Engine with the default encoding
    pub fn new() -> Self {
        PatchEngine::with_format(Box::new(DirectivePatch))
    }

    /// Engine with a custom encoding
    pub fn with_format(format: Box<dyn PatchFormat>) -> Self {
        PatchEngine { format }
    }

    /// Name of the active encoding
    pub fn format_name(&self) -> &'static str {
        self.format.name()
    }

    /// Validate a patch without applying it (used at proposal admission)
    pub fn check(&self, patch: &str) -> BsaResult<()> {
        self.format.check(patch)
    }

    /// Apply a patch against a fully-materialized snapshot
    ///
    /// Returns a new pending snapshot; the base is never mutated. A failed
    /// precondition returns a conflict naming the offending paths and
    /// applies nothing.
    pub fn apply(&self, base: &StateSnapshot, patch: &str) -> BsaResult<StateSnapshot> {
        let data = self.format.apply(&base.data, patch)?;
        Ok(StateSnapshot::pending(data))
    }
}

impl Default for PatchEngine {
    fn default() -> Self {
        Self::new()
    }
}


#[cfg(test)]
mod props {
    use super::*;
    use proptest::prelude::*;
    use serde_json::Value;

    fn arb_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<i64>().prop_map(Value::from),
            any::<bool>().prop_map(Value::from),
            "[a-z0-9 ]{0,12}".prop_map(Value::from),
        ]
    }

    fn arb_data() -> impl Strategy<Value = StateData> {
        proptest::collection::btree_map("[a-z]{1,4}", arb_value(), 0..8).prop_map(|m| {
            m.into_iter().collect::<StateData>()
        })
    }

    fn arb_patch() -> impl Strategy<Value = String> {
        proptest::collection::vec(("[a-z]{1,4}", arb_value()), 1..6).prop_map(|sets| {
            sets.into_iter()
                .map(|(k, v)| format!("set {} = {}", k, v))
                .collect::<Vec<_>>()
                .join("\n")
        })
    }

    proptest! {
        #[test]
        fn prop_apply_is_deterministic(data in arb_data(), patch in arb_patch()) {
            let engine = PatchEngine::new();
            let base = StateSnapshot::pending(data);

            let first = engine.apply(&base, &patch).unwrap();
            let second = engine.apply(&base, &patch).unwrap();
            prop_assert_eq!(first, second);
        }

        #[test]
        fn prop_apply_never_mutates_base(data in arb_data(), patch in arb_patch()) {
            let engine = PatchEngine::new();
            let before = StateSnapshot::pending(data);
            let base = before.clone();

            let _ = engine.apply(&base, &patch);
            prop_assert_eq!(base, before);
        }

        #[test]
        fn prop_unconditional_set_is_idempotent(data in arb_data(), patch in arb_patch()) {
            let engine = PatchEngine::new();
            let base = StateSnapshot::pending(data);

            let once = engine.apply(&base, &patch).unwrap();
            let twice = engine.apply(&once, &patch).unwrap();
            prop_assert_eq!(once, twice);
        }
    }
}
