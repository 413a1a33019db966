//! Module byte acquisition, compilation, and process-wide caching.
//!
//! This module provides:
//! - [`ModuleSource`]: where the module bytes come from (embedded payload,
//!   file, or URL); an embedded payload always wins over a fetch
//! - [`CompiledModule`]: a wrapper around Wasmtime's [`Module`] with header
//!   validation and a content hash
//! - [`ModuleLoader`]: compile-once caching; the first caller triggers
//!   compilation and every later caller receives the cached artifact
//!
//! Byte acquisition is the only asynchronous part of the bridge: fetching
//! over the network suspends the caller until the response arrives.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, info, instrument};
use url::Url;
use wasmtime::Module;

use crate::WasmEngine;
use particles_bridge_common::BridgeError;

/// Where the compiled module's bytes come from.
#[derive(Debug, Clone)]
pub enum ModuleSource {
    /// Bytes bundled with the host (e.g. via `include_bytes!`).
    Embedded(Vec<u8>),

    /// A `.wasm` file on disk.
    File(PathBuf),

    /// Bytes fetched over HTTP(S).
    Url(Url),
}

impl ModuleSource {
    /// Pick between an embedded payload and a fallback source.
    ///
    /// When both are structurally available the embedded payload takes
    /// precedence.
    pub fn select(embedded: Option<Vec<u8>>, fallback: ModuleSource) -> ModuleSource {
        match embedded {
            Some(bytes) => ModuleSource::Embedded(bytes),
            None => fallback,
        }
    }

    /// Obtain the raw module bytes.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Load`] if the file cannot be read or the fetch
    /// fails (network error or non-success status).
    pub async fn bytes(&self) -> Result<Vec<u8>, BridgeError> {
        match self {
            ModuleSource::Embedded(bytes) => Ok(bytes.clone()),
            ModuleSource::File(path) => tokio::fs::read(path).await.map_err(|e| {
                BridgeError::load(format!("Failed to read module from {}: {e}", path.display()))
            }),
            ModuleSource::Url(url) => {
                debug!(url = %url, "Fetching module bytes");
                let response = reqwest::get(url.clone())
                    .await
                    .map_err(|e| BridgeError::load(format!("Module fetch failed: {e}")))?
                    .error_for_status()
                    .map_err(|e| BridgeError::load(format!("Module fetch failed: {e}")))?;

                let body = response
                    .bytes()
                    .await
                    .map_err(|e| BridgeError::load(format!("Module fetch failed: {e}")))?;

                Ok(body.to_vec())
            }
        }
    }
}

/// A compiled WebAssembly module.
///
/// Thread-safe and cheap to clone; the same artifact backs every
/// instantiation in the process.
#[derive(Clone)]
pub struct CompiledModule {
    inner: Module,

    /// Hash of the original Wasm bytes, for cache diagnostics.
    content_hash: String,
}

impl CompiledModule {
    /// Compile a module from WebAssembly bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid Wasm binary.
    #[instrument(skip(engine, bytes), fields(bytes_len = bytes.len()))]
    pub fn from_bytes(engine: &WasmEngine, bytes: &[u8]) -> Result<Self, BridgeError> {
        let start = Instant::now();

        Self::validate_wasm_header(bytes)?;

        let module = Module::new(engine.inner(), bytes)
            .map_err(|e| BridgeError::load(format!("Module compilation failed: {e}")))?;

        let content_hash = compute_hash(bytes);
        let duration = start.elapsed();

        info!(
            content_hash = %content_hash,
            duration_ms = duration.as_millis(),
            "Module compiled"
        );

        Ok(Self {
            inner: module,
            content_hash,
        })
    }

    /// Compile a module from WAT (WebAssembly Text Format).
    ///
    /// This is primarily for testing purposes.
    ///
    /// # Errors
    ///
    /// Returns an error if compilation fails.
    #[instrument(skip(engine, wat))]
    pub fn from_wat(engine: &WasmEngine, wat: &str) -> Result<Self, BridgeError> {
        let module = Module::new(engine.inner(), wat)
            .map_err(|e| BridgeError::load(format!("WAT compilation failed: {e}")))?;

        Ok(Self {
            inner: module,
            content_hash: compute_hash(wat.as_bytes()),
        })
    }

    /// Get the content hash of the original Wasm bytes.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Get the inner Wasmtime module.
    pub fn inner(&self) -> &Module {
        &self.inner
    }

    /// Validate WebAssembly header (magic number).
    fn validate_wasm_header(bytes: &[u8]) -> Result<(), BridgeError> {
        if bytes.len() < 8 {
            return Err(BridgeError::load("Invalid Wasm: file too small"));
        }

        if &bytes[0..4] != b"\0asm" {
            return Err(BridgeError::load("Invalid Wasm: bad magic number"));
        }

        Ok(())
    }
}

impl std::fmt::Debug for CompiledModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledModule")
            .field("content_hash", &self.content_hash)
            .finish_non_exhaustive()
    }
}

/// Compile-once module cache.
///
/// The first call to [`ModuleLoader::load`] obtains the bytes and compiles
/// them; every subsequent call returns the cached artifact regardless of the
/// source argument. The loader is an injectable dependency: construct one per
/// application (or use [`ModuleLoader::global`]) and share it by clone.
#[derive(Clone, Default)]
pub struct ModuleLoader {
    cached: Arc<Mutex<Option<CompiledModule>>>,
}

impl ModuleLoader {
    /// Create a new, empty loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide loader instance.
    pub fn global() -> &'static ModuleLoader {
        static GLOBAL: OnceLock<ModuleLoader> = OnceLock::new();
        GLOBAL.get_or_init(ModuleLoader::new)
    }

    /// Load the module, compiling at most once.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Load`] if the bytes cannot be obtained or do
    /// not parse as a Wasm module.
    pub async fn load(
        &self,
        engine: &WasmEngine,
        source: &ModuleSource,
    ) -> Result<CompiledModule, BridgeError> {
        if let Some(cached) = self.cached.lock().as_ref() {
            debug!(content_hash = %cached.content_hash(), "Using cached module artifact");
            return Ok(cached.clone());
        }

        let bytes = source.bytes().await?;
        let compiled = CompiledModule::from_bytes(engine, &bytes)?;

        let mut slot = self.cached.lock();
        // A racing loader may have filled the slot while we compiled; the
        // first artifact wins so every caller sees the same module.
        if let Some(cached) = slot.as_ref() {
            return Ok(cached.clone());
        }
        *slot = Some(compiled.clone());

        Ok(compiled)
    }

    /// Returns `true` if an artifact has been compiled and cached.
    pub fn is_loaded(&self) -> bool {
        self.cached.lock().is_some()
    }
}

impl std::fmt::Debug for ModuleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleLoader")
            .field("is_loaded", &self.is_loaded())
            .finish()
    }
}

/// Compute a hash of the given bytes.
fn compute_hash(bytes: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Minimal valid Wasm module (empty module)
    const MINIMAL_WASM: &[u8] = &[
        0x00, 0x61, 0x73, 0x6d, // magic: \0asm
        0x01, 0x00, 0x00, 0x00, // version: 1
    ];

    #[test]
    fn test_validate_wasm_header_valid() {
        assert!(CompiledModule::validate_wasm_header(MINIMAL_WASM).is_ok());
    }

    #[test]
    fn test_validate_wasm_header_too_small() {
        let result = CompiledModule::validate_wasm_header(&[0x00, 0x61]);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_wasm_header_bad_magic() {
        let bad_wasm = &[0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00];
        let result = CompiledModule::validate_wasm_header(bad_wasm);
        assert!(result.is_err());
    }

    #[test]
    fn test_compute_hash() {
        let hash1 = compute_hash(b"hello");
        let hash2 = compute_hash(b"hello");
        let hash3 = compute_hash(b"world");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.len(), 16); // 64-bit hex
    }

    #[test]
    fn test_module_compilation() {
        let engine = WasmEngine::new().unwrap();
        let module = CompiledModule::from_bytes(&engine, MINIMAL_WASM);

        assert!(module.is_ok());
        assert!(!module.unwrap().content_hash().is_empty());
    }

    #[test]
    fn test_compilation_rejects_garbage() {
        let engine = WasmEngine::new().unwrap();
        let result = CompiledModule::from_bytes(&engine, b"not a wasm module");

        assert!(matches!(result, Err(BridgeError::Load { .. })));
    }

    #[test]
    fn test_source_select_prefers_embedded() {
        let fallback = ModuleSource::File(PathBuf::from("particles.wasm"));

        let picked = ModuleSource::select(Some(vec![1, 2, 3]), fallback.clone());
        assert!(matches!(picked, ModuleSource::Embedded(ref b) if b == &vec![1, 2, 3]));

        let picked = ModuleSource::select(None, fallback);
        assert!(matches!(picked, ModuleSource::File(_)));
    }

    #[tokio::test]
    async fn test_loader_compiles_once() {
        let engine = WasmEngine::new().unwrap();
        let loader = ModuleLoader::new();
        assert!(!loader.is_loaded());

        let source = ModuleSource::Embedded(MINIMAL_WASM.to_vec());
        let first = loader.load(&engine, &source).await.unwrap();
        assert!(loader.is_loaded());

        // A different (invalid) source still returns the cached artifact.
        let other = ModuleSource::Embedded(b"garbage".to_vec());
        let second = loader.load(&engine, &other).await.unwrap();
        assert_eq!(first.content_hash(), second.content_hash());
    }

    #[tokio::test]
    async fn test_loader_missing_file() {
        let engine = WasmEngine::new().unwrap();
        let loader = ModuleLoader::new();
        let source = ModuleSource::File(PathBuf::from("/nonexistent/particles.wasm"));

        let result = loader.load(&engine, &source).await;
        assert!(matches!(result, Err(BridgeError::Load { .. })));
        assert!(!loader.is_loaded());
    }

    #[tokio::test]
    async fn test_embedded_bytes_round_trip() {
        let source = ModuleSource::Embedded(MINIMAL_WASM.to_vec());
        let bytes = source.bytes().await.unwrap();
        assert_eq!(bytes, MINIMAL_WASM);
    }
}
