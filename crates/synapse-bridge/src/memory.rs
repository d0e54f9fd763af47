//! Guest memory marshalling.
//!
//! The guest's linear memory is treated as an arena: the host holds
//! offset+length handles, never raw pointers. Every allocation made on
//! behalf of a host→guest write is tracked in a [`GuestArena`] and
//! released before the enclosing call returns — on success, on error,
//! and after traps (release after a trap is best-effort).

use crate::bridge::HostState;
use crate::dialect::MemoryPlan;
use crate::error::BridgeError;
use tracing::trace;
use wasmtime::{Instance, Memory, Store};

/// Class id passed to the managed runtime's `__new` for raw byte
/// buffers. The guest side treats marshalled payloads as untyped bytes.
const MANAGED_BUFFER_CLASS: i32 = 1;

/// A host-side handle into guest memory.
#[derive(Debug, Clone, Copy)]
pub(crate) struct GuestSlice {
    pub ptr: i32,
    pub len: i32,
}

/// Tracks allocations made during one marshalling operation.
#[derive(Debug, Default)]
pub(crate) struct GuestArena {
    slices: Vec<GuestSlice>,
}

impl GuestArena {
    fn track(&mut self, slice: GuestSlice) {
        self.slices.push(slice);
    }
}

/// Allocate guest memory per the module's plan and copy `bytes` in.
/// The allocation is tracked in `arena` for release.
pub(crate) fn write_bytes(
    store: &mut Store<HostState>,
    instance: &Instance,
    memory: Memory,
    plan: &MemoryPlan,
    bytes: &[u8],
    arena: &mut GuestArena,
) -> Result<GuestSlice, BridgeError> {
    let len = i32::try_from(bytes.len())
        .map_err(|_| BridgeError::Memory("payload exceeds addressable guest memory".to_string()))?;

    let ptr = match plan {
        MemoryPlan::Standard { .. } => {
            let alloc = instance
                .get_typed_func::<i32, i32>(&mut *store, "alloc")
                .map_err(|e| BridgeError::Memory(format!("alloc export unusable: {e}")))?;
            alloc
                .call(&mut *store, len)
                .map_err(|e| BridgeError::Memory(format!("alloc call failed: {e}")))?
        }
        MemoryPlan::Managed { has_pin, .. } => {
            let new_fn = instance
                .get_typed_func::<(i32, i32), i32>(&mut *store, "__new")
                .map_err(|e| BridgeError::Memory(format!("__new export unusable: {e}")))?;
            let ptr = new_fn
                .call(&mut *store, (len, MANAGED_BUFFER_CLASS))
                .map_err(|e| BridgeError::Memory(format!("__new call failed: {e}")))?;
            if *has_pin {
                let pin = instance
                    .get_typed_func::<i32, i32>(&mut *store, "__pin")
                    .map_err(|e| BridgeError::Memory(format!("__pin export unusable: {e}")))?;
                pin.call(&mut *store, ptr)
                    .map_err(|e| BridgeError::Memory(format!("__pin call failed: {e}")))?;
            }
            ptr
        }
        MemoryPlan::ReadOnly => {
            return Err(BridgeError::Memory(
                "module exposes no allocator for host writes".to_string(),
            ));
        }
    };

    let slice = GuestSlice { ptr, len };
    arena.track(slice);

    let start = ptr as usize;
    let end = start
        .checked_add(bytes.len())
        .ok_or_else(|| BridgeError::Memory("allocation overflows address space".to_string()))?;
    let data = memory.data_mut(&mut *store);
    if end > data.len() {
        return Err(BridgeError::Memory(format!(
            "write of {} bytes at {start} exceeds memory bounds ({})",
            bytes.len(),
            data.len()
        )));
    }
    data[start..end].copy_from_slice(bytes);
    trace!(ptr, len, "wrote guest buffer");
    Ok(slice)
}

/// Release every allocation tracked in `arena`.
///
/// Failures are swallowed: after a trap the guest may refuse further
/// calls, and the memory dies with the instance anyway.
pub(crate) fn release(
    store: &mut Store<HostState>,
    instance: &Instance,
    plan: &MemoryPlan,
    arena: GuestArena,
) {
    for slice in arena.slices {
        match plan {
            MemoryPlan::Standard { has_dealloc: true } => {
                if let Ok(dealloc) =
                    instance.get_typed_func::<(i32, i32), ()>(&mut *store, "dealloc")
                {
                    let _ = dealloc.call(&mut *store, (slice.ptr, slice.len));
                }
            }
            MemoryPlan::Managed {
                has_unpin: true, ..
            } => {
                if let Ok(unpin) = instance.get_typed_func::<i32, ()>(&mut *store, "__unpin") {
                    let _ = unpin.call(&mut *store, slice.ptr);
                }
            }
            // Bump allocators and pin-less managed runtimes reclaim on
            // their own; nothing to call.
            _ => {}
        }
    }
}

/// Read a UTF-8 string out of guest memory at a packed `(ptr << 32) | len`.
pub(crate) fn read_packed_string(
    store: &Store<HostState>,
    memory: Memory,
    packed: i64,
) -> Result<String, BridgeError> {
    let ptr = (packed >> 32) as u32 as usize;
    let len = (packed & 0xFFFF_FFFF) as u32 as usize;
    let data = memory.data(store);
    let end = ptr
        .checked_add(len)
        .ok_or_else(|| BridgeError::Memory("result pointer overflows".to_string()))?;
    if end > data.len() {
        return Err(BridgeError::Memory(format!(
            "result at {ptr}+{len} exceeds memory bounds ({})",
            data.len()
        )));
    }
    String::from_utf8(data[ptr..end].to_vec())
        .map_err(|e| BridgeError::Memory(format!("result is not valid UTF-8: {e}")))
}
