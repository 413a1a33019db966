//! Error types for particles-bridge.
//!
//! This module defines the bridge error taxonomy using `thiserror`:
//! - Fatal initialization failures ([`BridgeError::Load`], [`BridgeError::VersionMismatch`])
//! - Local call failures ([`BridgeError::InvalidArgument`], [`BridgeError::Call`])
//! - Host-side invariant violations ([`BridgeError::HandleMisuse`])

use std::io;

use thiserror::Error;

/// Errors produced by the host/module interop layer.
///
/// No operation in the bridge retries automatically; fetch failures and
/// version mismatches surface to the caller as-is. Initialization is a
/// one-shot path, not a long-running service.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Module bytes could not be obtained or parsed.
    ///
    /// Covers fetch failures (network, non-success status), unreadable
    /// files, invalid Wasm, and a module missing a required export.
    #[error("Module load failed: {reason}")]
    Load {
        /// Description of the load failure.
        reason: String,
    },

    /// Host and module build identifiers disagree.
    ///
    /// The marshaling layout is a silent contract with the module's compiled
    /// layout; a skew risks memory corruption rather than a loud error, so
    /// initialization aborts here.
    #[error("Build ID mismatch for '{build_id}' (module returned {code})")]
    VersionMismatch {
        /// The host-side build identifier that was checked.
        build_id: String,
        /// The verification result returned by the module.
        code: i32,
    },

    /// A value was rejected before crossing the memory boundary.
    #[error("Invalid argument: {reason}")]
    InvalidArgument {
        /// Description of why the argument was rejected.
        reason: String,
    },

    /// An operation was invoked on a destroyed or unconstructed handle.
    ///
    /// The module is not required to detect this; the host guards for it
    /// defensively and treats it as a programming error.
    #[error("Handle misuse: {reason}")]
    HandleMisuse {
        /// Description of the misuse.
        reason: String,
    },

    /// A module export trapped or could not be called.
    #[error("Module call '{export}' failed: {reason}")]
    Call {
        /// Name of the export that failed.
        export: String,
        /// Description of the failure.
        reason: String,
    },

    /// A marshaling access fell outside the module's linear memory.
    #[error("Memory access error: {reason}")]
    Memory {
        /// Description of the out-of-range or misaligned access.
        reason: String,
    },

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl BridgeError {
    /// Create a new `Load` error.
    pub fn load(reason: impl Into<String>) -> Self {
        Self::Load {
            reason: reason.into(),
        }
    }

    /// Create a new `InvalidArgument` error.
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Create a new `HandleMisuse` error.
    pub fn handle_misuse(reason: impl Into<String>) -> Self {
        Self::HandleMisuse {
            reason: reason.into(),
        }
    }

    /// Create a new `Call` error.
    pub fn call(export: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Call {
            export: export.into(),
            reason: reason.into(),
        }
    }

    /// Create a new `Memory` error.
    pub fn memory(reason: impl Into<String>) -> Self {
        Self::Memory {
            reason: reason.into(),
        }
    }

    /// Returns `true` if this error aborts initialization.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Load { .. } | Self::VersionMismatch { .. })
    }

    /// Returns `true` if this is a version guard failure.
    pub fn is_version_mismatch(&self) -> bool {
        matches!(self, Self::VersionMismatch { .. })
    }
}
