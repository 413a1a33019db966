//! Linear-memory marshaling primitives.
//!
//! Every read and write against the module's linear memory goes through this
//! module. Two rules from the interop contract are enforced here:
//!
//! - All accesses are bounds-checked against the current memory size; the
//!   module's pointers are untrusted input.
//! - A view over memory is never retained across module calls. Linear memory
//!   may grow during any export call, which moves the backing buffer; a
//!   stale view would yield wrong or out-of-range reads. [`F64View`] is
//!   therefore constructed fresh from the live memory region at every decode.

use wasmtime::{Memory, Store};

use crate::abi::GuestPtr;
use particles_bridge_common::BridgeError;

/// Size of one marshaled floating-point field in bytes.
pub const F64_SIZE: usize = 8;

/// Write a byte slice into the module's memory at `ptr`.
///
/// # Errors
///
/// Returns [`BridgeError::Memory`] if the destination range falls outside
/// the current memory size.
pub fn write_bytes<T>(
    memory: &Memory,
    store: &mut Store<T>,
    ptr: GuestPtr,
    data: &[u8],
) -> Result<(), BridgeError> {
    let start = ptr.raw() as usize;
    let end = start
        .checked_add(data.len())
        .ok_or_else(|| BridgeError::memory("Pointer + length overflow"))?;

    let mem = memory.data_mut(&mut *store);
    if end > mem.len() {
        return Err(BridgeError::memory(format!(
            "Write of {} bytes at {start} exceeds memory size {}",
            data.len(),
            mem.len()
        )));
    }

    mem[start..end].copy_from_slice(data);
    Ok(())
}

/// Read a NUL-terminated string out of the module's memory.
///
/// The length is discovered by scanning for the terminator, matching the
/// module's C-string convention.
///
/// # Errors
///
/// Returns [`BridgeError::Memory`] if the pointer is out of range, no
/// terminator exists before the end of memory, or the bytes are not UTF-8.
pub fn read_cstring<T>(
    memory: &Memory,
    store: &Store<T>,
    ptr: GuestPtr,
) -> Result<String, BridgeError> {
    let start = ptr.raw() as usize;
    let mem = memory.data(store);

    if start >= mem.len() {
        return Err(BridgeError::memory(format!(
            "String pointer {start} exceeds memory size {}",
            mem.len()
        )));
    }

    let tail = &mem[start..];
    let len = tail
        .iter()
        .position(|b| *b == 0)
        .ok_or_else(|| BridgeError::memory("Unterminated string in module memory"))?;

    std::str::from_utf8(&tail[..len])
        .map(str::to_string)
        .map_err(|e| BridgeError::memory(format!("Invalid UTF-8 in module string: {e}")))
}

/// A bounds-checked view of linear memory as little-endian `f64` records.
///
/// Construct one from the live memory region immediately before decoding and
/// drop it before the next module call; see the module docs for why.
pub struct F64View<'a> {
    data: &'a [u8],
}

impl<'a> F64View<'a> {
    /// Create a view over the current memory contents.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Read `count` consecutive `f64` values starting at the byte pointer.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Memory`] if the pointer is not 8-byte aligned
    /// or the range exceeds the view.
    pub fn read_slice(&self, ptr: GuestPtr, count: usize) -> Result<Vec<f64>, BridgeError> {
        let start = ptr.raw() as usize;
        if start % F64_SIZE != 0 {
            return Err(BridgeError::memory(format!(
                "Misaligned f64 pointer: {start}"
            )));
        }

        let byte_len = count
            .checked_mul(F64_SIZE)
            .ok_or_else(|| BridgeError::memory("f64 slice length overflow"))?;
        let end = start
            .checked_add(byte_len)
            .ok_or_else(|| BridgeError::memory("f64 slice range overflow"))?;

        if end > self.data.len() {
            return Err(BridgeError::memory(format!(
                "Read of {count} f64s at {start} exceeds memory size {}",
                self.data.len()
            )));
        }

        Ok(self.data[start..end]
            .chunks_exact(F64_SIZE)
            .map(|chunk| {
                let mut bytes = [0u8; F64_SIZE];
                bytes.copy_from_slice(chunk);
                f64::from_le_bytes(bytes)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WasmEngine;
    use wasmtime::MemoryType;

    fn test_memory() -> (Memory, Store<()>) {
        let engine = WasmEngine::new().unwrap();
        let mut store = Store::new(engine.inner(), ());
        let memory = Memory::new(&mut store, MemoryType::new(1, None)).unwrap();
        (memory, store)
    }

    #[test]
    fn test_write_and_read_back() {
        let (memory, mut store) = test_memory();

        write_bytes(&memory, &mut store, GuestPtr::from_raw(16), b"hello\0").unwrap();
        let s = read_cstring(&memory, &store, GuestPtr::from_raw(16)).unwrap();
        assert_eq!(s, "hello");
    }

    #[test]
    fn test_write_out_of_bounds() {
        let (memory, mut store) = test_memory();
        let size = memory.data_size(&store);

        let result = write_bytes(
            &memory,
            &mut store,
            GuestPtr::from_raw(u32::try_from(size - 2).unwrap()),
            b"toolong",
        );
        assert!(matches!(result, Err(BridgeError::Memory { .. })));
    }

    #[test]
    fn test_read_cstring_pointer_out_of_range() {
        let (memory, store) = test_memory();

        let result = read_cstring(&memory, &store, GuestPtr::from_raw(u32::MAX));
        assert!(matches!(result, Err(BridgeError::Memory { .. })));
    }

    #[test]
    fn test_f64_view_reads_little_endian() {
        let mut data = vec![0u8; 64];
        data[8..16].copy_from_slice(&1.0f64.to_le_bytes());
        data[16..24].copy_from_slice(&2.5f64.to_le_bytes());

        let view = F64View::new(&data);
        let values = view.read_slice(GuestPtr::from_raw(8), 2).unwrap();
        assert_eq!(values, vec![1.0, 2.5]);
    }

    #[test]
    fn test_f64_view_zero_count() {
        let data = vec![0u8; 8];
        let view = F64View::new(&data);
        let values = view.read_slice(GuestPtr::from_raw(0), 0).unwrap();
        assert!(values.is_empty());
    }

    #[test]
    fn test_f64_view_rejects_misaligned_pointer() {
        let data = vec![0u8; 64];
        let view = F64View::new(&data);

        let result = view.read_slice(GuestPtr::from_raw(4), 1);
        assert!(matches!(result, Err(BridgeError::Memory { .. })));
    }

    #[test]
    fn test_f64_view_rejects_out_of_bounds() {
        let data = vec![0u8; 16];
        let view = F64View::new(&data);

        let result = view.read_slice(GuestPtr::from_raw(8), 2);
        assert!(matches!(result, Err(BridgeError::Memory { .. })));
    }
}
