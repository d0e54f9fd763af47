//! A loaded guest module and its uniform call surface.

use crate::bridge::HostState;
use crate::dialect::{Capability, DialectProfile, MemoryPlan};
use crate::error::BridgeError;
use crate::memory::{self, GuestArena};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use synapse_events::EventBroadcaster;
use synapse_types::adapter::AdapterUpdate;
use synapse_types::call::CallContext;
use synapse_types::event::EventKind;
use synapse_types::module::{Dialect, ModuleId, ModuleInfo, ModuleRole};
use tokio::sync::Mutex;
use tracing::debug;
use wasmtime::{Instance, Memory, Store, Trap};

/// Interior state of an instantiated module. Held behind a mutex: the
/// bridge contract forbids overlapping calls into one instance, so all
/// guest-side allocation happens under a single lock.
struct GuestState {
    store: Store<HostState>,
    instance: Instance,
    memory: Memory,
    plan: MemoryPlan,
    fuel_limit: u64,
}

impl GuestState {
    fn refuel(&mut self) -> Result<(), BridgeError> {
        if self.fuel_limit > 0 {
            self.store
                .set_fuel(self.fuel_limit)
                .map_err(|e| BridgeError::Trap(format!("fuel reset failed: {e}")))?;
        }
        Ok(())
    }

    fn map_call_error(&self, e: anyhow::Error) -> BridgeError {
        if let Some(Trap::OutOfFuel) = e.downcast_ref::<Trap>() {
            return BridgeError::Trap("fuel exhausted: call exceeded CPU budget".to_string());
        }
        if let Some(detail) = &self.store.data().abort {
            return BridgeError::Trap(format!("guest abort: {detail}"));
        }
        BridgeError::Trap(e.to_string())
    }

    fn take_abort(&mut self) -> Option<String> {
        self.store.data_mut().abort.take()
    }

    fn release(&mut self, arena: GuestArena) {
        memory::release(&mut self.store, &self.instance, &self.plan, arena);
    }

    /// Call a `(ptr, len, ptr, len) -> packed` export with two text args.
    fn call_text2(&mut self, export: &str, a: &str, b: &str) -> Result<String, BridgeError> {
        self.refuel()?;
        let mut arena = GuestArena::default();
        let result = self.call_text2_inner(export, a, b, &mut arena);
        self.release(arena);
        result
    }

    fn call_text2_inner(
        &mut self,
        export: &str,
        a: &str,
        b: &str,
        arena: &mut GuestArena,
    ) -> Result<String, BridgeError> {
        let sa = memory::write_bytes(
            &mut self.store,
            &self.instance,
            self.memory,
            &self.plan,
            a.as_bytes(),
            arena,
        )?;
        let sb = memory::write_bytes(
            &mut self.store,
            &self.instance,
            self.memory,
            &self.plan,
            b.as_bytes(),
            arena,
        )?;
        let func = self
            .instance
            .get_typed_func::<(i32, i32, i32, i32), i64>(&mut self.store, export)
            .map_err(|e| BridgeError::MissingCapability(format!("{export}: {e}")))?;
        let packed = match func.call(&mut self.store, (sa.ptr, sa.len, sb.ptr, sb.len)) {
            Ok(v) => v,
            Err(e) => return Err(self.map_call_error(e)),
        };
        memory::read_packed_string(&self.store, self.memory, packed)
    }

    /// Call a `(ptr, len, ptr, len, ptr, len) -> packed` export.
    fn call_text3(
        &mut self,
        export: &str,
        a: &str,
        b: &str,
        c: &str,
    ) -> Result<String, BridgeError> {
        self.refuel()?;
        let mut arena = GuestArena::default();
        let result = self.call_text3_inner(export, a, b, c, &mut arena);
        self.release(arena);
        result
    }

    fn call_text3_inner(
        &mut self,
        export: &str,
        a: &str,
        b: &str,
        c: &str,
        arena: &mut GuestArena,
    ) -> Result<String, BridgeError> {
        let sa = memory::write_bytes(
            &mut self.store,
            &self.instance,
            self.memory,
            &self.plan,
            a.as_bytes(),
            arena,
        )?;
        let sb = memory::write_bytes(
            &mut self.store,
            &self.instance,
            self.memory,
            &self.plan,
            b.as_bytes(),
            arena,
        )?;
        let sc = memory::write_bytes(
            &mut self.store,
            &self.instance,
            self.memory,
            &self.plan,
            c.as_bytes(),
            arena,
        )?;
        let func = self
            .instance
            .get_typed_func::<(i32, i32, i32, i32, i32, i32), i64>(&mut self.store, export)
            .map_err(|e| BridgeError::MissingCapability(format!("{export}: {e}")))?;
        let packed = match func.call(
            &mut self.store,
            (sa.ptr, sa.len, sb.ptr, sb.len, sc.ptr, sc.len),
        ) {
            Ok(v) => v,
            Err(e) => return Err(self.map_call_error(e)),
        };
        memory::read_packed_string(&self.store, self.memory, packed)
    }

    /// Call a `(ptr, len) -> i32` boolean export with one byte buffer.
    fn call_bytes_bool(&mut self, export: &str, payload: &[u8]) -> Result<bool, BridgeError> {
        self.refuel()?;
        let mut arena = GuestArena::default();
        let result = self.call_bytes_bool_inner(export, payload, &mut arena);
        self.release(arena);
        result
    }

    fn call_bytes_bool_inner(
        &mut self,
        export: &str,
        payload: &[u8],
        arena: &mut GuestArena,
    ) -> Result<bool, BridgeError> {
        let s = memory::write_bytes(
            &mut self.store,
            &self.instance,
            self.memory,
            &self.plan,
            payload,
            arena,
        )?;
        let func = self
            .instance
            .get_typed_func::<(i32, i32), i32>(&mut self.store, export)
            .map_err(|e| BridgeError::MissingCapability(format!("{export}: {e}")))?;
        match func.call(&mut self.store, (s.ptr, s.len)) {
            Ok(v) => Ok(v != 0),
            Err(e) => Err(self.map_call_error(e)),
        }
    }

    /// Call a `() -> packed` export.
    fn call_packed0(&mut self, export: &str) -> Result<String, BridgeError> {
        self.refuel()?;
        let func = self
            .instance
            .get_typed_func::<(), i64>(&mut self.store, export)
            .map_err(|e| BridgeError::MissingCapability(format!("{export}: {e}")))?;
        let packed = match func.call(&mut self.store, ()) {
            Ok(v) => v,
            Err(e) => return Err(self.map_call_error(e)),
        };
        memory::read_packed_string(&self.store, self.memory, packed)
    }
}

/// An instantiated, dialect-adapted guest module.
///
/// Owned by the orchestrator. All calls against one instance are
/// serialized internally; a trap surfaces as [`BridgeError::Trap`] to
/// the caller and leaves the module loaded.
pub struct GuestModule {
    id: ModuleId,
    role: ModuleRole,
    profile: DialectProfile,
    ready: AtomicBool,
    name: std::sync::RwLock<Option<String>>,
    state: Mutex<GuestState>,
    events: Arc<EventBroadcaster>,
}

impl GuestModule {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: ModuleId,
        role: ModuleRole,
        profile: DialectProfile,
        store: Store<HostState>,
        instance: Instance,
        memory: Memory,
        fuel_limit: u64,
        events: Arc<EventBroadcaster>,
    ) -> Self {
        let plan = profile.plan.clone();
        Self {
            id,
            role,
            profile,
            ready: AtomicBool::new(true),
            name: std::sync::RwLock::new(None),
            state: Mutex::new(GuestState {
                store,
                instance,
                memory,
                plan,
                fuel_limit,
            }),
            events,
        }
    }

    /// Instance identifier.
    pub fn id(&self) -> ModuleId {
        self.id
    }

    /// Role this module was loaded for.
    pub fn role(&self) -> ModuleRole {
        self.role
    }

    /// Detected calling convention.
    pub fn dialect(&self) -> Dialect {
        self.profile.dialect
    }

    /// Whether the module is believed healthy: true after instantiation,
    /// cleared when a call traps, refreshed from the guest's
    /// self-reported status by [`GuestModule::status`].
    pub fn ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Clear readiness after a guest fault. Non-trap errors (missing
    /// capability, serialization) say nothing about module health.
    fn record_outcome<T>(&self, result: &Result<T, BridgeError>) {
        if matches!(result, Err(BridgeError::Trap(_))) {
            self.ready.store(false, Ordering::Release);
        }
    }

    /// Snapshot of this module for callers.
    pub fn info(&self) -> ModuleInfo {
        let name = self
            .name
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        ModuleInfo {
            id: self.id,
            role: self.role,
            dialect: self.profile.dialect,
            name,
            ready: self.ready(),
            native_capabilities: self.profile.native_capabilities(),
        }
    }

    /// Execute the module's main entry point with a JSON input and
    /// per-call context.
    pub async fn execute(
        &self,
        input: &Value,
        ctx: &CallContext,
    ) -> Result<Value, BridgeError> {
        let Some(export) = self.profile.slot(Capability::Execute).map(String::from) else {
            debug!(module = %self.id, "execute capability mocked");
            return Ok(mock_result(Capability::Execute));
        };
        let input_text = serde_json::to_string(input)?;
        let ctx_text = serde_json::to_string(ctx)?;

        let (result, abort) = {
            let mut state = self.state.lock().await;
            let r = state.call_text2(&export, &input_text, &ctx_text);
            (r, state.take_abort())
        };
        self.record_outcome(&result);
        self.note_abort(abort).await;
        let text = result?;
        serde_json::from_str(&text).map_err(Into::into)
    }

    /// Execute a named tool inside the module.
    pub async fn execute_tool(
        &self,
        tool: &str,
        params: &Value,
        ctx: &CallContext,
    ) -> Result<Value, BridgeError> {
        let Some(export) = self.profile.slot(Capability::ExecuteTool).map(String::from) else {
            return Ok(json!({
                "mock": true,
                "capability": Capability::ExecuteTool.name(),
                "tool": tool,
                "success": true,
            }));
        };
        let params_text = serde_json::to_string(params)?;
        let ctx_text = serde_json::to_string(ctx)?;

        let (result, abort) = {
            let mut state = self.state.lock().await;
            let r = state.call_text3(&export, tool, &params_text, &ctx_text);
            (r, state.take_abort())
        };
        self.record_outcome(&result);
        self.note_abort(abort).await;
        let text = result?;
        serde_json::from_str(&text).map_err(Into::into)
    }

    /// Hand a validated adapter update to the module.
    pub async fn load_adapter(&self, adapter: &AdapterUpdate) -> Result<bool, BridgeError> {
        let Some(export) = self.profile.slot(Capability::LoadAdapter).map(String::from) else {
            debug!(module = %self.id, skill = %adapter.skill_id, "load_adapter capability mocked");
            return Ok(true);
        };
        let adapter_text = serde_json::to_string(adapter)?;

        let (result, abort) = {
            let mut state = self.state.lock().await;
            let r = state.call_bytes_bool(&export, adapter_text.as_bytes());
            (r, state.take_abort())
        };
        self.record_outcome(&result);
        self.note_abort(abort).await;
        result
    }

    /// Hand a raw skill payload to the module.
    pub async fn apply_skill(&self, payload: &[u8]) -> Result<bool, BridgeError> {
        let Some(export) = self.profile.slot(Capability::ApplySkill).map(String::from) else {
            return Ok(true);
        };
        let (result, abort) = {
            let mut state = self.state.lock().await;
            let r = state.call_bytes_bool(&export, payload);
            (r, state.take_abort())
        };
        self.record_outcome(&result);
        self.note_abort(abort).await;
        result
    }

    /// Query the module's self-reported status.
    pub async fn status(&self) -> Result<Value, BridgeError> {
        let Some(export) = self.profile.slot(Capability::GetStatus).map(String::from) else {
            return Ok(json!({
                "mock": true,
                "capability": Capability::GetStatus.name(),
                "initialized": true,
            }));
        };
        let (result, abort) = {
            let mut state = self.state.lock().await;
            let r = state.call_packed0(&export);
            (r, state.take_abort())
        };
        self.record_outcome(&result);
        self.note_abort(abort).await;
        let text = result?;
        let status: Value = serde_json::from_str(&text)?;

        // Cache the module's self-reported name for info().
        let reported = status
            .get("name")
            .or_else(|| status.get("agentName"))
            .and_then(|v| v.as_str());
        if let Some(reported) = reported {
            let mut name = self.name.write().unwrap_or_else(|e| e.into_inner());
            *name = Some(reported.to_string());
        }

        // A module that answers its status probe speaks for its own
        // readiness; absent the field, answering at all counts as ready.
        let initialized = status
            .get("initialized")
            .and_then(|v| v.as_bool())
            .unwrap_or(true);
        self.ready.store(initialized, Ordering::Release);
        Ok(status)
    }

    async fn note_abort(&self, abort: Option<String>) {
        if let Some(message) = abort {
            self.events
                .emit(EventKind::GuestAbort {
                    module_id: self.id,
                    message,
                })
                .await;
        }
    }
}

impl std::fmt::Debug for GuestModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestModule")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("dialect", &self.profile.dialect)
            .field("ready", &self.ready())
            .finish()
    }
}

fn mock_result(cap: Capability) -> Value {
    json!({
        "mock": true,
        "capability": cap.name(),
        "success": true,
        "result": Value::Null,
    })
}
