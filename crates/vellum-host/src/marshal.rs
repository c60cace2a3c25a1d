//! Marshalling helpers shared by the import-table functions.
//!
//! Every host function resolves the guest's exports it needs (memory, the
//! allocator) through its [`Caller`]. Nothing is cached across calls, so a
//! reallocation can never leave a helper holding a stale buffer.

use wasmtime::{Caller, Extern};

use vellum_common::BridgeError;
use vellum_core::value::format_number;
use vellum_core::{BridgeState, GuestAllocator, HostValue, MemoryViews, codec};

/// Resolve the guest's exported linear memory.
pub fn guest_views(caller: &mut Caller<'_, BridgeState>) -> Result<MemoryViews, BridgeError> {
    let memory = caller
        .get_export("memory")
        .and_then(Extern::into_memory)
        .ok_or_else(|| BridgeError::missing_export("memory"))?;
    Ok(MemoryViews::new(memory))
}

/// Read and validate a UTF-8 string from guest memory.
pub fn read_guest_str(
    caller: &mut Caller<'_, BridgeState>,
    ptr: u32,
    len: u32,
) -> Result<String, BridgeError> {
    let views = guest_views(caller)?;
    codec::decode(&*caller, &views, ptr, len)
}

/// Encode a host string into freshly allocated guest memory.
///
/// Calls back into the guest's exported allocator, which may grow guest
/// memory mid-host-call; the returned pointer is derived after the final
/// allocator call.
pub fn pass_str_to_guest(
    caller: &mut Caller<'_, BridgeState>,
    text: &str,
) -> Result<(u32, u32), BridgeError> {
    let views = guest_views(caller)?;
    let alloc = GuestAllocator::from_caller(caller)?;
    codec::encode(caller, &alloc, &views, text)
}

/// Write a `(ptr, len)` pair into the guest's return area.
///
/// Layout: pointer at `retptr`, length at `retptr + 4`, both little-endian
/// 32-bit lanes.
pub fn write_str_out(
    caller: &mut Caller<'_, BridgeState>,
    retptr: u32,
    ptr: u32,
    len: u32,
) -> Result<(), BridgeError> {
    let views = guest_views(caller)?;
    views.write_i32(caller, retptr + 4, len as i32)?;
    views.write_i32(caller, retptr, ptr as i32)?;
    Ok(())
}

/// Coerce a value into a property key.
pub fn property_key(value: &HostValue) -> Result<String, BridgeError> {
    match value {
        HostValue::Str(s) => Ok(s.clone()),
        HostValue::Number(n) => Ok(format_number(*n)),
        other => Err(BridgeError::marshalling(format!(
            "invalid property key: {}",
            other.type_name()
        ))),
    }
}
