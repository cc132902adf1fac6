//! Fatal pre-flight errors. These abort startup before the stakker runtime ever
//! begins executing; everything downstream of a successful preflight uses
//! [`utils::error::Result`]'s log-and-drop convention instead (transient update
//! failures, malformed telemetry records, etc. are logged and skipped, not
//! propagated).

use std::process::ExitCode;

#[derive(Debug, thiserror::Error)]
pub enum PreflightError {
	#[error("kernel {found} is older than the minimum required {required}")]
	KernelTooOld { found: String, required: String },

	#[error("failed to read kernel version: {0}")]
	KernelVersionUnreadable(#[source] nix::Error),

	#[error("failed to raise RLIMIT_MEMLOCK: {0}")]
	MemlockRaiseFailed(#[source] nix::Error),

	#[error("egress interface {0:?} not found")]
	InterfaceNotFound(String),

	#[error("failed to enumerate network interfaces: {0}")]
	InterfaceEnumerationFailed(#[source] nix::Error),

	#[error("classifier object missing at {0}")]
	ClassifierAssetMissing(std::path::PathBuf),

	#[error("failed to parse external BTF blob at {path:?}: {source}")]
	ExternalBtfLoadFailed { path: std::path::PathBuf, #[source] source: aya::BtfError },

	#[error("failed to load classifier bytecode: {0}")]
	ClassifierLoadFailed(#[source] aya::EbpfError),

	#[error("failed to attach classifier program {name:?} to {iface:?}: {source}")]
	ClassifierAttachFailed { name: String, iface: String, #[source] source: anyhow::Error },

	#[error("map {0:?} not found in the loaded classifier object")]
	MapBindingNotFound(String),

	#[error("failed to load config file {path:?}: {source}")]
	ConfigLoadFailed { path: std::path::PathBuf, #[source] source: std::io::Error },

	#[error("failed to parse config file {path:?}: {source}")]
	ConfigParseFailed { path: std::path::PathBuf, #[source] source: serde_yaml::Error },

	#[error("event loop aborted")]
	RuntimeExecFailed,
}

impl PreflightError {
	/// Maps each failure category to the process exit code an operator's
	/// monitoring would key off, distinguishing "fix the environment" failures
	/// from "fix the config" failures.
	pub fn exit_code(&self) -> ExitCode {
		use PreflightError::*;
		match self {
			KernelTooOld { .. } | KernelVersionUnreadable(_) | MemlockRaiseFailed(_) => ExitCode::from(70),
			InterfaceNotFound(_) | InterfaceEnumerationFailed(_) => ExitCode::from(71),
			ClassifierAssetMissing(_) | ExternalBtfLoadFailed { .. } | ClassifierLoadFailed(_) | ClassifierAttachFailed { .. } | MapBindingNotFound(_) => ExitCode::from(72),
			ConfigLoadFailed { .. } | ConfigParseFailed { .. } => ExitCode::from(78),
			RuntimeExecFailed => ExitCode::from(73),
		}
	}
}
