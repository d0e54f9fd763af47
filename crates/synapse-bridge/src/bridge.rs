//! Bridge engine: compiles and instantiates guest modules.

use crate::dialect;
use crate::error::BridgeError;
use crate::module::GuestModule;
use std::sync::Arc;
use synapse_events::EventBroadcaster;
use synapse_types::module::{ModuleId, ModuleRole};
use tracing::{debug, info, warn};
use wasmtime::{Caller, Config, Engine, Linker, Module, Store};

/// Configuration for the bridge engine.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Fuel budget per guest call (CPU instruction metering). 0 = unlimited.
    pub fuel_limit: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            fuel_limit: 1_000_000,
        }
    }
}

/// State carried in each guest Store, accessible by host imports.
pub(crate) struct HostState {
    /// The owning module instance.
    pub module_id: ModuleId,
    /// Set by the `abort` import before trapping; drained by the caller.
    pub abort: Option<String>,
}

/// The host-guest bridge.
///
/// Create one per runtime and reuse it: the `Engine` is expensive to
/// build but compiles and instantiates many modules.
pub struct Bridge {
    engine: Engine,
    config: BridgeConfig,
    events: Arc<EventBroadcaster>,
}

impl Bridge {
    /// Create a new bridge engine. Fuel metering is enabled whenever a
    /// per-call budget is configured.
    pub fn new(config: BridgeConfig, events: Arc<EventBroadcaster>) -> Result<Self, BridgeError> {
        let mut wasm_config = Config::new();
        wasm_config.consume_fuel(config.fuel_limit > 0);
        let engine =
            Engine::new(&wasm_config).map_err(|e| BridgeError::Compile(e.to_string()))?;
        Ok(Self {
            engine,
            config,
            events,
        })
    }

    /// Compile and instantiate a guest module.
    ///
    /// Compilation is offloaded to a blocking thread; CPU-bound WASM work
    /// should not run on the async executor. The returned [`GuestModule`]
    /// serializes all calls against its instance.
    pub async fn instantiate(
        &self,
        bytes: &[u8],
        role: ModuleRole,
    ) -> Result<GuestModule, BridgeError> {
        let engine = self.engine.clone();
        let bytes = bytes.to_vec();
        let fuel_limit = self.config.fuel_limit;
        let events = self.events.clone();

        tokio::task::spawn_blocking(move || {
            Self::instantiate_sync(&engine, &bytes, role, fuel_limit, events)
        })
        .await
        .map_err(|e| BridgeError::Instantiation(format!("spawn_blocking join failed: {e}")))?
    }

    fn instantiate_sync(
        engine: &Engine,
        bytes: &[u8],
        role: ModuleRole,
        fuel_limit: u64,
        events: Arc<EventBroadcaster>,
    ) -> Result<GuestModule, BridgeError> {
        // Accepts both .wasm binary and .wat text.
        let module = Module::new(engine, bytes).map_err(|e| BridgeError::Compile(e.to_string()))?;

        // Dialect detection happens against the export table before
        // instantiation: a near-empty table is a hard validation error,
        // not something to patch around.
        let profile = dialect::detect(&module)?;

        let id = ModuleId::new();
        let mut store = Store::new(
            engine,
            HostState {
                module_id: id,
                abort: None,
            },
        );
        if fuel_limit > 0 {
            store
                .set_fuel(fuel_limit)
                .map_err(|e| BridgeError::Instantiation(e.to_string()))?;
        }

        let mut linker = Linker::new(engine);
        register_imports(&mut linker)?;

        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(|e| BridgeError::Instantiation(e.to_string()))?;

        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| BridgeError::Instantiation("module must export 'memory'".to_string()))?;

        info!(
            module = %id,
            role = %role,
            dialect = %profile.dialect,
            native_capabilities = profile.native_count,
            "Guest module instantiated"
        );

        Ok(GuestModule::new(
            id, role, profile, store, instance, memory, fuel_limit, events,
        ))
    }
}

/// Register the host import surface in the `"env"` module.
fn register_imports(linker: &mut Linker<HostState>) -> Result<(), BridgeError> {
    // abort: converts a guest abort into a host-observable trap. The
    // raw operands are recorded rather than dereferenced; guest string
    // encodings vary by dialect.
    linker
        .func_wrap(
            "env",
            "abort",
            |mut caller: Caller<'_, HostState>,
             msg: i32,
             file: i32,
             line: i32,
             col: i32|
             -> Result<(), anyhow::Error> {
                let detail = format!("abort(msg@{msg}, file@{file}) at {line}:{col}");
                warn!(module = %caller.data().module_id, "Guest abort: {detail}");
                caller.data_mut().abort = Some(detail);
                anyhow::bail!("guest abort at {line}:{col}")
            },
        )
        .map_err(|e| BridgeError::Instantiation(e.to_string()))?;

    // seed: randomness source for the guest runtime.
    linker
        .func_wrap("env", "seed", |_caller: Caller<'_, HostState>| -> f64 {
            rand::random::<f64>()
        })
        .map_err(|e| BridgeError::Instantiation(e.to_string()))?;

    // consoleLog / consoleError: forwarded to tracing.
    linker
        .func_wrap(
            "env",
            "consoleLog",
            |mut caller: Caller<'_, HostState>, ptr: i32, len: i32| -> Result<(), anyhow::Error> {
                let text = read_guest_text(&mut caller, ptr, len)?;
                debug!(module = %caller.data().module_id, "[guest] {text}");
                Ok(())
            },
        )
        .map_err(|e| BridgeError::Instantiation(e.to_string()))?;

    linker
        .func_wrap(
            "env",
            "consoleError",
            |mut caller: Caller<'_, HostState>, ptr: i32, len: i32| -> Result<(), anyhow::Error> {
                let text = read_guest_text(&mut caller, ptr, len)?;
                warn!(module = %caller.data().module_id, "[guest] {text}");
                Ok(())
            },
        )
        .map_err(|e| BridgeError::Instantiation(e.to_string()))?;

    Ok(())
}

/// Read a UTF-8 string out of the calling guest's memory.
fn read_guest_text(
    caller: &mut Caller<'_, HostState>,
    ptr: i32,
    len: i32,
) -> Result<String, anyhow::Error> {
    let memory = caller
        .get_export("memory")
        .and_then(|e| e.into_memory())
        .ok_or_else(|| anyhow::anyhow!("no memory export"))?;
    let data = memory.data(&caller);
    let start = ptr as usize;
    let end = start + len as usize;
    if end > data.len() {
        anyhow::bail!("console message out of bounds");
    }
    Ok(String::from_utf8_lossy(&data[start..end]).into_owned())
}
