//! Dialect detection over a module's export table.
//!
//! A guest module's calling convention is detected once, at load time,
//! from a closed set of known signatures. The result is a fixed
//! [`DialectProfile`] mapping the uniform capability contract onto
//! whatever the module actually exports; capabilities with no matching
//! export are patched with deterministic mock responses.

use crate::error::BridgeError;
use std::collections::{HashMap, HashSet};
use synapse_types::module::Dialect;
use wasmtime::{ExternType, Module};

/// Managed-runtime marker exports. A supermajority of these present
/// selects the alternate-runtime dialect and its memory strategy.
const MANAGED_MARKERS: [&str; 5] = ["__new", "__pin", "__unpin", "__collect", "__rtti_base"];

/// How many markers constitute a supermajority.
const MANAGED_MARKER_QUORUM: usize = 4;

/// Instantiation fails when at least this many of the five required
/// capabilities are missing and no dialect was recognized. Fewer missing
/// exports are patched with mocks instead: a handful of absent optional
/// exports should not block an otherwise-working module, but a
/// near-empty export table means the artifact is not a cognitive module.
const MISSING_FAILURE_THRESHOLD: usize = 4;

/// The uniform capability contract every guest module is adapted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Execute,
    ExecuteTool,
    LoadAdapter,
    ApplySkill,
    GetStatus,
}

impl Capability {
    /// All five required capabilities.
    pub const ALL: [Capability; 5] = [
        Capability::Execute,
        Capability::ExecuteTool,
        Capability::LoadAdapter,
        Capability::ApplySkill,
        Capability::GetStatus,
    ];

    /// Uniform name of this capability.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Execute => "execute",
            Self::ExecuteTool => "execute_tool",
            Self::LoadAdapter => "load_adapter",
            Self::ApplySkill => "apply_skill",
            Self::GetStatus => "get_status",
        }
    }

    /// Export names this capability may resolve to, probed in order.
    /// Covers the uniform contract plus the naming conventions observed
    /// in the wild (camelCase and `agent_core_`-prefixed builds).
    fn candidates(&self) -> &'static [&'static str] {
        match self {
            Self::Execute => &["execute", "agent_core_execute"],
            Self::ExecuteTool => &["execute_tool", "executeTool", "agent_core_execute_tool"],
            Self::LoadAdapter => &["load_adapter", "loadAdapter", "agent_core_load_lora"],
            Self::ApplySkill => &["apply_skill", "applySkill", "agent_core_apply_skill"],
            Self::GetStatus => &["get_status", "getStatus", "agent_core_get_status"],
        }
    }

    /// Whether invoking this capability requires writing arguments into
    /// guest memory.
    fn needs_guest_write(&self) -> bool {
        !matches!(self, Self::GetStatus)
    }
}

/// How the bridge allocates guest memory for host→guest writes.
#[derive(Debug, Clone)]
pub(crate) enum MemoryPlan {
    /// `alloc(size) -> ptr`, optionally `dealloc(ptr, size)`.
    Standard { has_dealloc: bool },
    /// `__new(size, class) -> ptr`, pinned while borrowed.
    Managed { has_pin: bool, has_unpin: bool },
    /// No allocator export. Only read-only capabilities can stay native.
    ReadOnly,
}

/// The fixed adapter produced by dialect detection.
#[derive(Debug, Clone)]
pub struct DialectProfile {
    /// Detected calling convention.
    pub dialect: Dialect,
    /// Capability → export name, or None for a mock.
    slots: HashMap<Capability, Option<String>>,
    /// Memory strategy for host-side allocation.
    pub(crate) plan: MemoryPlan,
    /// How many capabilities resolved to a real export.
    pub native_count: usize,
}

impl DialectProfile {
    /// The export name backing a capability, or None when it is mocked.
    pub fn slot(&self, cap: Capability) -> Option<&str> {
        self.slots.get(&cap).and_then(|s| s.as_deref())
    }

    /// Names of the capabilities that resolved to a real export.
    pub fn native_capabilities(&self) -> Vec<String> {
        Capability::ALL
            .iter()
            .filter(|c| self.slot(**c).is_some())
            .map(|c| c.name().to_string())
            .collect()
    }
}

/// Probe a compiled module's export table and build its dialect profile.
///
/// Fails with [`BridgeError::MissingExports`] when the table is too
/// sparse (see [`MISSING_FAILURE_THRESHOLD`]).
pub(crate) fn detect(module: &Module) -> Result<DialectProfile, BridgeError> {
    let mut funcs: HashSet<&str> = HashSet::new();
    let mut any_export: HashSet<&str> = HashSet::new();
    for export in module.exports() {
        any_export.insert(export.name());
        if matches!(export.ty(), ExternType::Func(_)) {
            funcs.insert(export.name());
        }
    }

    // Markers may be funcs or globals (__rtti_base is a global).
    let marker_count = MANAGED_MARKERS
        .iter()
        .filter(|m| any_export.contains(**m))
        .count();
    let managed = marker_count >= MANAGED_MARKER_QUORUM;

    let mut slots: HashMap<Capability, Option<String>> = HashMap::new();
    let mut native_count = 0;
    for cap in Capability::ALL {
        let resolved = cap
            .candidates()
            .iter()
            .find(|name| funcs.contains(*name))
            .map(|name| name.to_string());
        if resolved.is_some() {
            native_count += 1;
        }
        slots.insert(cap, resolved);
    }

    let missing = Capability::ALL.len() - native_count;
    if missing >= MISSING_FAILURE_THRESHOLD && !managed {
        return Err(BridgeError::MissingExports {
            present: native_count,
            required: Capability::ALL.len(),
        });
    }

    let plan = if managed {
        if !funcs.contains("__new") {
            return Err(BridgeError::Instantiation(
                "managed-runtime module has no __new export".to_string(),
            ));
        }
        MemoryPlan::Managed {
            has_pin: funcs.contains("__pin"),
            has_unpin: funcs.contains("__unpin"),
        }
    } else if funcs.contains("alloc") {
        MemoryPlan::Standard {
            has_dealloc: funcs.contains("dealloc"),
        }
    } else {
        MemoryPlan::ReadOnly
    };

    // Without an allocator the bridge cannot marshal arguments in, so
    // write-needing capabilities fall back to mocks even when exported.
    if matches!(plan, MemoryPlan::ReadOnly) {
        for cap in Capability::ALL {
            if cap.needs_guest_write() {
                slots.insert(cap, None);
            }
        }
        native_count = slots.values().filter(|s| s.is_some()).count();
    }

    let dialect = if managed {
        Dialect::AlternateRuntime
    } else {
        Dialect::Standard
    };

    Ok(DialectProfile {
        dialect,
        slots,
        plan,
        native_count,
    })
}
