//! Host-guest bridge for sandboxed cognitive modules.
//!
//! Uses Wasmtime to compile and instantiate untrusted WASM modules, then
//! exposes the uniform five-capability contract
//! (`execute` / `execute_tool` / `load_adapter` / `apply_skill` /
//! `get_status`) regardless of which calling convention the module was
//! compiled against.
//!
//! # Guest ABI
//!
//! Every module must export `memory`. A standard-dialect module also
//! exports `alloc(size: i32) -> i32` (and optionally
//! `dealloc(ptr: i32, size: i32)`) plus the capability functions. An
//! alternate-runtime module instead carries the managed-runtime exports
//! (`__new`/`__pin`/`__unpin`/`__collect`/`__rtti_base`), which the
//! bridge detects and adapts to at load time.
//!
//! String-returning capabilities use a packed `i64` return:
//! `(ptr << 32) | len` pointing at JSON bytes in guest memory. Boolean
//! capabilities return `i32` (nonzero = true).
//!
//! # Host ABI
//!
//! The host provides (in the `"env"` import module):
//! - `abort(msg, file, line, col)` — converts guest aborts into traps
//! - `seed() -> f64` — randomness for the guest runtime
//! - `consoleLog(ptr, len)` / `consoleError(ptr, len)` — logging

mod bridge;
mod dialect;
mod error;
mod memory;
mod module;

pub use bridge::{Bridge, BridgeConfig};
pub use dialect::{Capability, DialectProfile};
pub use error::BridgeError;
pub use module::GuestModule;
