//! UTF-8 string transport between host strings and guest memory.
//!
//! Encoding writes into memory owned by the guest, obtained from its
//! exported allocator. The common case is ASCII-only text, which is copied
//! directly after a single allocation; on the first non-ASCII code point the
//! remaining suffix is written into a region grown optimistically to three
//! bytes per remaining UTF-16 unit, then shrunk to the exact final size.
//!
//! Decoding validates well-formedness and fails on malformed input: the
//! guest handing back invalid UTF-8 is a marshalling fault, never silently
//! patched over with replacement characters.

use wasmtime::{AsContextMut, Caller, Extern, Instance, TypedFunc};

use vellum_common::BridgeError;

use crate::memory::MemoryViews;
use crate::state::BridgeState;

/// Export name of the guest's allocation entry point.
pub const EXPORT_MALLOC: &str = "__wbindgen_malloc";
/// Export name of the guest's reallocation entry point.
pub const EXPORT_REALLOC: &str = "__wbindgen_realloc";

/// The guest's exported allocator.
///
/// Every call may grow the guest's linear memory, so every call bumps the
/// memory epoch. Pointers derived before an allocator call must not be
/// trusted after it without a freshness check.
#[derive(Clone)]
pub struct GuestAllocator {
    malloc: TypedFunc<(u32, u32), u32>,
    realloc: TypedFunc<(u32, u32, u32, u32), u32>,
}

impl GuestAllocator {
    /// Capture the allocator exports from an instantiated guest.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::MissingExport`] if either export is absent or
    /// mistyped.
    pub fn from_instance<S: AsContextMut>(
        mut ctx: S,
        instance: &Instance,
    ) -> Result<Self, BridgeError> {
        let malloc = instance
            .get_typed_func::<(u32, u32), u32>(&mut ctx, EXPORT_MALLOC)
            .map_err(|_| BridgeError::missing_export(EXPORT_MALLOC))?;
        let realloc = instance
            .get_typed_func::<(u32, u32, u32, u32), u32>(&mut ctx, EXPORT_REALLOC)
            .map_err(|_| BridgeError::missing_export(EXPORT_REALLOC))?;
        Ok(Self { malloc, realloc })
    }

    /// Capture the allocator exports from inside a host function.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::MissingExport`] if either export is absent or
    /// mistyped.
    pub fn from_caller(caller: &mut Caller<'_, BridgeState>) -> Result<Self, BridgeError> {
        let malloc = caller
            .get_export(EXPORT_MALLOC)
            .and_then(Extern::into_func)
            .and_then(|f| f.typed::<(u32, u32), u32>(&*caller).ok())
            .ok_or_else(|| BridgeError::missing_export(EXPORT_MALLOC))?;
        let realloc = caller
            .get_export(EXPORT_REALLOC)
            .and_then(Extern::into_func)
            .and_then(|f| f.typed::<(u32, u32, u32, u32), u32>(&*caller).ok())
            .ok_or_else(|| BridgeError::missing_export(EXPORT_REALLOC))?;
        Ok(Self { malloc, realloc })
    }

    /// Allocate `size` bytes in guest memory.
    pub fn malloc<S: AsContextMut<Data = BridgeState>>(
        &self,
        ctx: &mut S,
        size: u32,
        align: u32,
    ) -> Result<u32, BridgeError> {
        let ptr = self
            .malloc
            .call(&mut *ctx, (size, align))
            .map_err(|e| BridgeError::guest_fault(format!("guest allocator trapped: {e}")))?;
        ctx.as_context_mut().data_mut().bump_memory_epoch();
        Ok(ptr)
    }

    /// Resize a guest allocation, returning its (possibly moved) pointer.
    pub fn realloc<S: AsContextMut<Data = BridgeState>>(
        &self,
        ctx: &mut S,
        ptr: u32,
        old_size: u32,
        new_size: u32,
        align: u32,
    ) -> Result<u32, BridgeError> {
        let ptr = self
            .realloc
            .call(&mut *ctx, (ptr, old_size, new_size, align))
            .map_err(|e| BridgeError::guest_fault(format!("guest allocator trapped: {e}")))?;
        ctx.as_context_mut().data_mut().bump_memory_epoch();
        Ok(ptr)
    }
}

impl std::fmt::Debug for GuestAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestAllocator").finish_non_exhaustive()
    }
}

/// Encode a host string into freshly allocated guest memory.
///
/// Returns the `(pointer, length)` pair of the written UTF-8 bytes. The
/// allocation is sized at the text's UTF-16 length up front (exact for the
/// ASCII fast path) and grown to `processed + remaining_units * 3` when a
/// non-ASCII code point forces the slow path, then shrunk to the final size.
///
/// # Errors
///
/// Returns a guest fault if the allocator traps, or a marshalling fault if
/// the allocator hands back an out-of-range pointer.
pub fn encode<S: AsContextMut<Data = BridgeState>>(
    ctx: &mut S,
    alloc: &GuestAllocator,
    views: &MemoryViews,
    text: &str,
) -> Result<(u32, u32), BridgeError> {
    let bytes = text.as_bytes();
    let ascii_end = bytes
        .iter()
        .position(|&b| b >= 0x80)
        .unwrap_or(bytes.len());

    if ascii_end == bytes.len() {
        let len = bytes.len() as u32;
        let ptr = alloc.malloc(ctx, len, 1)?;
        views.write_bytes(ctx, ptr, bytes)?;
        return Ok((ptr, len));
    }

    let suffix = &text[ascii_end..];
    let units = ascii_end + suffix.encode_utf16().count();

    let mut ptr = alloc.malloc(ctx, units as u32, 1)?;
    views.write_bytes(ctx, ptr, &bytes[..ascii_end])?;

    // Worst case three UTF-8 bytes per remaining UTF-16 unit.
    let capacity = ascii_end + (units - ascii_end) * 3;
    ptr = alloc.realloc(ctx, ptr, units as u32, capacity as u32, 1)?;
    views.write_bytes(ctx, ptr + ascii_end as u32, suffix.as_bytes())?;

    let written = ascii_end + suffix.len();
    ptr = alloc.realloc(ctx, ptr, capacity as u32, written as u32, 1)?;

    Ok((ptr, written as u32))
}

/// Decode `len` bytes of guest memory starting at `ptr` as UTF-8.
///
/// # Errors
///
/// Returns a marshalling fault on an out-of-bounds range or invalid UTF-8.
/// Malformed sequences are never substituted.
pub fn decode<S: wasmtime::AsContext>(
    ctx: &S,
    views: &MemoryViews,
    ptr: u32,
    len: u32,
) -> Result<String, BridgeError> {
    let bytes = views.read_bytes(ctx, ptr, len)?;
    let text = std::str::from_utf8(bytes).map_err(|e| {
        BridgeError::marshalling(format!(
            "guest produced invalid UTF-8 (valid up to byte {} of {len})",
            e.valid_up_to()
        ))
    })?;
    Ok(text.to_owned())
}
