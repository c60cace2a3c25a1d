//! Bounds-checked access to the guest's linear memory.
//!
//! The guest has a single contiguous, resizable byte buffer. Reads and
//! writes go through [`MemoryViews`], which re-derives every access from the
//! live buffer. A raw slice is never held across an operation that can
//! resize memory (the borrow checker enforces this structurally, since a
//! held slice pins the store).
//!
//! Invalidation is explicit rather than heuristic: [`BridgeState`] carries a
//! memory epoch bumped by every resize-capable operation (allocator calls,
//! guest entry calls). [`MemoryViews::stamp`] captures the epoch and
//! [`MemoryViews::is_fresh`] lets consumers assert that no such operation
//! happened since the stamp was taken.

use wasmtime::{AsContext, AsContextMut, Memory};

use vellum_common::BridgeError;

use crate::state::BridgeState;

/// A captured memory epoch.
///
/// Anything derived from guest memory (a pointer, a length pair read from a
/// return area) is only meaningful while the stamp it was derived under is
/// still fresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStamp(u64);

/// Accessors over the guest's exported linear memory.
#[derive(Clone, Copy)]
pub struct MemoryViews {
    memory: Memory,
}

impl MemoryViews {
    /// Wrap the guest's exported memory.
    pub fn new(memory: Memory) -> Self {
        Self { memory }
    }

    /// The underlying memory export.
    pub fn memory(&self) -> Memory {
        self.memory
    }

    /// Current memory size in bytes.
    pub fn len<S: AsContext>(&self, ctx: &S) -> usize {
        self.memory.data_size(ctx)
    }

    /// Returns `true` if the guest memory is empty (it never is for a real
    /// guest, which exports at least one page).
    pub fn is_empty<S: AsContext>(&self, ctx: &S) -> bool {
        self.len(ctx) == 0
    }

    /// Capture the current memory epoch.
    pub fn stamp<S: AsContext<Data = BridgeState>>(&self, ctx: &S) -> MemoryStamp {
        MemoryStamp(ctx.as_context().data().memory_epoch())
    }

    /// Returns `true` if no resize-capable operation happened since `stamp`
    /// was taken.
    pub fn is_fresh<S: AsContext<Data = BridgeState>>(&self, ctx: &S, stamp: MemoryStamp) -> bool {
        ctx.as_context().data().memory_epoch() == stamp.0
    }

    /// The full memory as a byte slice.
    pub fn bytes<'a, S: AsContext>(&self, ctx: &'a S) -> &'a [u8] {
        self.memory.data(ctx)
    }

    /// A bounds-checked byte range.
    ///
    /// # Errors
    ///
    /// Returns a marshalling fault if `ptr + len` overflows or exceeds the
    /// live buffer.
    pub fn read_bytes<'a, S: AsContext>(
        &self,
        ctx: &'a S,
        ptr: u32,
        len: u32,
    ) -> Result<&'a [u8], BridgeError> {
        let data = self.memory.data(ctx);
        range(data.len(), ptr, len).map(|r| &data[r])
    }

    /// Copy bytes into guest memory at `ptr`.
    ///
    /// # Errors
    ///
    /// Returns a marshalling fault on an out-of-bounds write.
    pub fn write_bytes<S: AsContextMut>(
        &self,
        ctx: &mut S,
        ptr: u32,
        bytes: &[u8],
    ) -> Result<(), BridgeError> {
        let data = self.memory.data_mut(ctx);
        let r = range(data.len(), ptr, bytes.len() as u32)?;
        data[r].copy_from_slice(bytes);
        Ok(())
    }

    /// Read a little-endian 32-bit integer at `addr`.
    pub fn read_i32<S: AsContext>(&self, ctx: &S, addr: u32) -> Result<i32, BridgeError> {
        let bytes = self.read_bytes(ctx, addr, 4)?;
        Ok(i32::from_le_bytes(bytes.try_into().expect("4-byte slice")))
    }

    /// Write a little-endian 32-bit integer at `addr`.
    pub fn write_i32<S: AsContextMut>(
        &self,
        ctx: &mut S,
        addr: u32,
        value: i32,
    ) -> Result<(), BridgeError> {
        self.write_bytes(ctx, addr, &value.to_le_bytes())
    }

    /// Read a little-endian 64-bit float at `addr`.
    pub fn read_f64<S: AsContext>(&self, ctx: &S, addr: u32) -> Result<f64, BridgeError> {
        let bytes = self.read_bytes(ctx, addr, 8)?;
        Ok(f64::from_le_bytes(bytes.try_into().expect("8-byte slice")))
    }

    /// Write a little-endian 64-bit float at `addr`.
    pub fn write_f64<S: AsContextMut>(
        &self,
        ctx: &mut S,
        addr: u32,
        value: f64,
    ) -> Result<(), BridgeError> {
        self.write_bytes(ctx, addr, &value.to_le_bytes())
    }
}

impl std::fmt::Debug for MemoryViews {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryViews").finish_non_exhaustive()
    }
}

fn range(size: usize, ptr: u32, len: u32) -> Result<std::ops::Range<usize>, BridgeError> {
    let start = ptr as usize;
    let end = start
        .checked_add(len as usize)
        .ok_or_else(|| BridgeError::marshalling(format!("pointer {ptr} + length {len} overflows")))?;
    if end > size {
        return Err(BridgeError::marshalling(format!(
            "memory access {start}..{end} out of bounds (size {size})"
        )));
    }
    Ok(start..end)
}
