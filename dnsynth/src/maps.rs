//! Typed layouts for the two maps shared with the classifier (`ebpf/tc_dns.c`):
//! `dns_a_records` (hash map keyed by question name + type/class) and
//! `dns_capture_events` (perf event array carrying match telemetry).
//!
//! Field order and size must track the C struct definitions exactly; the
//! `#[derive(Cast)]` macro enforces at compile time that there is no implicit
//! padding, so a drift between the two sides fails to build rather than
//! silently misaligning at runtime.

use std::net::Ipv4Addr;

use utils::bytes::Cast;
use utils::endian::{u32be, u64le};

/// Key into `dns_a_records`. Mirrors `struct dns_query_key` in the classifier.
/// Userland code keys its own bookkeeping by [`crate::wire::WireName`] instead
/// of this type directly; `DnsQueryKey` only exists at the map-write boundary.
///
/// `record_type`/`class` are plain host-endian `u16`s, not `u16be`: the
/// classifier assigns them as bare `__u16` literals (`key.record_type =
/// DNS_TYPE_A;`, no `bpf_htons`), so the map key's in-memory representation is
/// whatever the target's native byte order is, same as the classifier's.
#[repr(C)]
#[derive(Cast, Clone, Copy)]
pub struct DnsQueryKey {
	pub record_type: u16,
	pub class: u16,
	pub name: [u8; crate::wire::NAME_LEN],
}

impl DnsQueryKey {
	pub const TYPE_A: u16 = 1;
	pub const CLASS_IN: u16 = 1;

	pub fn for_hostname(name: &crate::wire::WireName) -> Self {
		Self { record_type: Self::TYPE_A, class: Self::CLASS_IN, name: *name.as_bytes() }
	}
}

// SAFETY: both types are `#[repr(C)]`, contain no padding (enforced by the
// `Cast` derive's size check) and no invalid bit patterns, matching `Pod`'s
// requirements for use as aya map key/value types.
unsafe impl aya::Pod for DnsQueryKey {}
unsafe impl aya::Pod for DnsRecordValue {}

/// Value in `dns_a_records`. Mirrors `struct dns_record_value`.
///
/// `ip` is `u32be`: the classifier writes it straight into the answer RR with
/// no `bpf_htonl`, so it must already be network-order in the map. `ttl` is
/// plain host-endian `u32`: the classifier reads `rec->ttl` natively and
/// applies `bpf_htonl` itself when building the RR, so storing it pre-swapped
/// here would double-swap.
#[repr(C)]
#[derive(Cast, Clone, Copy)]
pub struct DnsRecordValue {
	pub ip: u32be,
	pub ttl: u32,
}

impl DnsRecordValue {
	pub fn new(ip: Ipv4Addr, ttl_secs: u32) -> Self {
		Self { ip: u32::from(ip).into(), ttl: ttl_secs }
	}
}

/// Layout of `dns_capture_event` as emitted onto the perf ring. `ts` is read
/// off the kernel's monotonic `bpf_ktime_get_ns()` clock, so it is decoded
/// relative to process start rather than wall-clock time. `record_type` is
/// host-endian for the same reason as [`DnsQueryKey::record_type`].
#[repr(C)]
#[derive(Cast, Clone, Copy)]
pub struct DnsCaptureEvent {
	pub ts: u64le,
	pub record_type: u16,
	pub is_match: u8,
	pub _pad0: u8,
	pub name: [u8; crate::wire::NAME_LEN],
	pub _pad1: [u8; 4],
}

#[cfg(test)]
mod tests {
	use super::*;
	use utils::bytes::{as_slice, cast};

	#[test]
	fn dns_query_key_has_no_implicit_padding() {
		assert_eq!(std::mem::size_of::<DnsQueryKey>(), 4 + crate::wire::NAME_LEN);
	}

	#[test]
	fn dns_record_value_round_trips_through_bytes() {
		let rec = DnsRecordValue::new(Ipv4Addr::new(10, 0, 0, 5), 30);
		let bytes: &[u8] = as_slice(&rec);
		let back: &DnsRecordValue = cast(bytes);
		assert_eq!(back.ip.get(), u32::from(Ipv4Addr::new(10, 0, 0, 5)));
		assert_eq!(back.ttl, 30);
	}

	#[test]
	fn capture_event_size_matches_classifier_layout() {
		assert_eq!(std::mem::size_of::<DnsCaptureEvent>(), 8 + 2 + 1 + 1 + crate::wire::NAME_LEN + 4);
	}
}
