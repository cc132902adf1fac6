//! Environment pre-flight: the checks that must succeed before the classifier
//! can be loaded at all. Failures here are fatal and reported through
//! [`PreflightError`], never logged-and-skipped.

use std::net::Ipv4Addr;

use nix::sys::resource::{setrlimit, Resource};
use nix::sys::utsname::uname;

use crate::error::PreflightError;

/// Oldest kernel the classifier's helper usage (`bpf_skb_change_tail`,
/// `bpf_clone_redirect`, BTF-typed maps) is expected to run correctly on.
const MIN_KERNEL: (u32, u32) = (4, 15);

pub struct Probe;

impl Probe {
	/// Parses `uname -r` and fails closed if it can't be parsed or is older
	/// than [`MIN_KERNEL`]. A kernel string the probe can't parse (unusual
	/// vendor suffixes, etc.) is treated as too old rather than assumed fine.
	pub fn check_kernel_version() -> Result<(), PreflightError> {
		let info = uname().map_err(PreflightError::KernelVersionUnreadable)?;
		let release = info.release().to_string_lossy().into_owned();

		let (major, minor) = parse_kernel_version(&release).ok_or_else(|| PreflightError::KernelTooOld {
			found: release.clone(),
			required: format!("{}.{}", MIN_KERNEL.0, MIN_KERNEL.1),
		})?;

		if (major, minor) < MIN_KERNEL {
			return Err(PreflightError::KernelTooOld { found: release, required: format!("{}.{}", MIN_KERNEL.0, MIN_KERNEL.1) });
		}

		Ok(())
	}

	/// Raises `RLIMIT_MEMLOCK` to unlimited, as loading BPF maps and programs
	/// charges locked-memory accounting that the default limit is usually too
	/// small for.
	pub fn raise_memlock_rlimit() -> Result<(), PreflightError> {
		setrlimit(Resource::RLIMIT_MEMLOCK, nix::libc::RLIM_INFINITY, nix::libc::RLIM_INFINITY).map_err(PreflightError::MemlockRaiseFailed)
	}

	/// Resolves the configured interface name, or auto-detects the first
	/// non-loopback interface that is UP and carries an IPv4 address.
	pub fn resolve_interface(configured: Option<&str>) -> Result<String, PreflightError> {
		if let Some(name) = configured {
			return Self::interface_exists(name).map(|()| name.to_owned());
		}

		let addrs = nix::ifaddrs::getifaddrs().map_err(PreflightError::InterfaceEnumerationFailed)?;

		for iface in addrs {
			if iface.interface_name == "lo" {
				continue;
			}
			if !iface.flags.contains(nix::net::if_::InterfaceFlags::IFF_UP) {
				continue;
			}
			if iface.address.as_ref().and_then(|a| a.as_sockaddr_in()).is_some() {
				return Ok(iface.interface_name);
			}
		}

		Err(PreflightError::InterfaceNotFound("<auto-detected>".to_owned()))
	}

	fn interface_exists(name: &str) -> Result<(), PreflightError> {
		let addrs = nix::ifaddrs::getifaddrs().map_err(PreflightError::InterfaceEnumerationFailed)?;
		if addrs.into_iter().any(|i| i.interface_name == name) {
			Ok(())
		} else {
			Err(PreflightError::InterfaceNotFound(name.to_owned()))
		}
	}

	/// The host's first non-loopback IPv4 address, used to filter out
	/// synthesizing answers that would point traffic back at the node itself.
	pub fn local_ipv4() -> Option<Ipv4Addr> {
		let addrs = nix::ifaddrs::getifaddrs().ok()?;
		addrs
			.into_iter()
			.filter(|i| i.interface_name != "lo")
			.find_map(|i| i.address?.as_sockaddr_in().map(|sin| Ipv4Addr::from(sin.ip())))
	}
}

fn parse_kernel_version(release: &str) -> Option<(u32, u32)> {
	let core = release.split(['-', '+']).next()?;
	let mut parts = core.split('.');
	let major: u32 = parts.next()?.parse().ok()?;
	let minor: u32 = parts.next()?.parse().ok()?;
	Some((major, minor))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_a_plain_release_string() {
		assert_eq!(parse_kernel_version("5.15.0"), Some((5, 15)));
	}

	#[test]
	fn parses_a_distro_suffixed_release_string() {
		assert_eq!(parse_kernel_version("5.15.0-91-generic"), Some((5, 15)));
	}

	#[test]
	fn rejects_unparseable_release_strings() {
		assert_eq!(parse_kernel_version("not-a-version"), None);
	}

	#[test]
	fn orders_versions_numerically_not_lexically() {
		assert!((4, 9) < MIN_KERNEL);
		assert!((5, 2) > MIN_KERNEL);
		assert!((4, 15) == MIN_KERNEL);
	}
}
