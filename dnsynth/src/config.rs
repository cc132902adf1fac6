//! Process configuration and the static domain list, both loaded from YAML.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::PreflightError;

fn default_ttl() -> u64 {
	30
}

fn default_reconcile_interval_ms() -> u64 {
	1_000
}

#[derive(Debug, Deserialize)]
pub struct Config {
	/// Egress interface the classifier attaches to. `None` triggers auto-detection
	/// in [`crate::env::Probe`] against the first non-loopback UP interface.
	pub interface: Option<String>,

	/// Path to the static domain file, relative to the config file's directory
	/// if not absolute.
	pub domain_file: PathBuf,

	/// Path to an external BTF blob to relocate the classifier's typed field
	/// accesses against, relative to the config file's directory if not
	/// absolute. `None` (the common case) uses the host's own `/sys/kernel/btf/vmlinux`.
	pub ext_btf: Option<PathBuf>,

	/// Default TTL (seconds) advertised for synthesized A records that don't
	/// specify their own.
	#[serde(default = "default_ttl")]
	pub default_ttl_secs: u64,

	/// How often the reconciler re-merges static and watcher sources even absent
	/// a change notification, as a correctness backstop.
	#[serde(default = "default_reconcile_interval_ms")]
	pub reconcile_interval_ms: u64,

	/// Kubernetes service-watcher source. Absent or `enabled: false` disables it
	/// entirely; the static source still runs.
	#[serde(default)]
	pub kubernetes: KubernetesConfig,
}

impl Config {
	pub fn reconcile_interval(&self) -> Duration {
		Duration::from_millis(self.reconcile_interval_ms)
	}

	pub fn load(path: &Path) -> Result<Self, PreflightError> {
		let text = std::fs::read_to_string(path).map_err(|source| PreflightError::ConfigLoadFailed { path: path.to_owned(), source })?;
		let mut cfg: Self = serde_yaml::from_str(&text).map_err(|source| PreflightError::ConfigParseFailed { path: path.to_owned(), source })?;

		if let Some(dir) = path.parent() {
			if cfg.domain_file.is_relative() {
				cfg.domain_file = dir.join(&cfg.domain_file);
			}
			if let Some(btf) = &cfg.ext_btf {
				if btf.is_relative() {
					cfg.ext_btf = Some(dir.join(btf));
				}
			}
		}

		Ok(cfg)
	}
}

#[derive(Debug, Default, Deserialize)]
pub struct KubernetesConfig {
	#[serde(default)]
	pub enabled: bool,

	/// Obtain cluster credentials from in-pod discovery (service account token
	/// and `KUBERNETES_SERVICE_HOST`) rather than `kubeconfig`. Only meaningful
	/// to whatever concrete [`crate::watcher::ServiceEventSource`] a deployment
	/// wires in; this crate's own watcher plumbing treats the source as opaque.
	#[serde(default)]
	pub in_cluster: bool,

	/// Kubeconfig path, used when `in_cluster` is false.
	pub kubeconfig: Option<PathBuf>,

	/// Only services in this namespace are watched; `None` watches all namespaces.
	pub namespace: Option<String>,

	/// Suffix appended to `<service>.<namespace>` to form the synthesized hostname,
	/// e.g. `svc.cluster.local`.
	#[serde(default = "default_cluster_domain")]
	pub cluster_domain: String,
}

fn default_cluster_domain() -> String {
	"svc.cluster.local".to_owned()
}

/// A single static entry from the domain file: hostname to synthesize, and the
/// address to answer with.
#[derive(Debug, Clone, Deserialize)]
pub struct DomainEntry {
	pub hostname: String,
	pub address: Ipv4Addr,
	pub ttl_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct DomainFile {
	#[serde(default)]
	domains: Vec<DomainEntry>,
}

/// Loads the static domain list referenced by [`Config::domain_file`].
pub fn load_domain_file(path: &Path) -> Result<Vec<DomainEntry>, PreflightError> {
	let text = std::fs::read_to_string(path).map_err(|source| PreflightError::ConfigLoadFailed { path: path.to_owned(), source })?;
	let parsed: DomainFile = serde_yaml::from_str(&text).map_err(|source| PreflightError::ConfigParseFailed { path: path.to_owned(), source })?;
	Ok(parsed.domains)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	#[test]
	fn loads_a_minimal_config() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "domain_file: domains.yaml").unwrap();
		let cfg = Config::load(file.path()).unwrap();
		assert_eq!(cfg.default_ttl_secs, 30);
		assert_eq!(cfg.reconcile_interval_ms, 1_000);
		assert!(!cfg.kubernetes.enabled);
	}

	#[test]
	fn resolves_relative_domain_file_against_config_dir() {
		let dir = tempfile::tempdir().unwrap();
		let cfg_path = dir.path().join("config.yaml");
		std::fs::write(&cfg_path, "domain_file: domains.yaml\n").unwrap();
		let cfg = Config::load(&cfg_path).unwrap();
		assert_eq!(cfg.domain_file, dir.path().join("domains.yaml"));
	}

	#[test]
	fn loads_domain_entries() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		writeln!(file, "domains:\n  - hostname: svc.internal\n    address: 10.0.0.1\n    ttl_secs: 30").unwrap();
		let entries = load_domain_file(file.path()).unwrap();
		assert_eq!(entries.len(), 1);
		assert_eq!(entries[0].hostname, "svc.internal");
		assert_eq!(entries[0].address, Ipv4Addr::new(10, 0, 0, 1));
	}
}
