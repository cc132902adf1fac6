//! Wire-format hostname codec shared between the userland map writer and the
//! in-kernel classifier's expectations: a fixed `NAME_LEN`-byte buffer holding
//! length-prefixed labels terminated by a zero octet, matching `dns_query_key.name`
//! in `ebpf/tc_dns.c`.

use std::fmt;

/// Size of the fixed name buffer used as a BPF map key component. Chosen to match
/// the classifier's `DNS_NAME_LEN`; longer names cannot be matched and are rejected
/// at the provider boundary rather than truncated silently.
pub const NAME_LEN: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum NameError {
	#[error("hostname {0:?} is empty")]
	Empty(String),
	#[error("hostname {0:?} exceeds the {NAME_LEN}-byte wire budget")]
	TooLong(String),
	#[error("hostname {0:?} has a label longer than 63 bytes")]
	LabelTooLong(String),
	#[error("hostname {0:?} contains a non-ASCII byte")]
	NotAscii(String),
}

/// A hostname encoded in DNS wire format: `[len][label...][len][label...]...[0]`,
/// zero-padded out to [`NAME_LEN`] bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct WireName([u8; NAME_LEN]);

impl WireName {
	pub fn encode(host: &str) -> Result<Self, NameError> {
		if host.is_empty() {
			return Err(NameError::Empty(host.to_owned()));
		}
		if !host.is_ascii() {
			return Err(NameError::NotAscii(host.to_owned()));
		}

		let mut buf = [0u8; NAME_LEN];
		let mut cursor = 0usize;

		for label in host.trim_end_matches('.').split('.') {
			if label.len() > 63 {
				return Err(NameError::LabelTooLong(host.to_owned()));
			}
			// +1 for this label's length prefix, +1 reserved for the terminating zero.
			if cursor + 1 + label.len() + 1 > NAME_LEN {
				return Err(NameError::TooLong(host.to_owned()));
			}
			buf[cursor] = label.len() as u8;
			buf[cursor + 1..cursor + 1 + label.len()].copy_from_slice(label.as_bytes());
			cursor += 1 + label.len();
		}

		// cursor < NAME_LEN verified above; buf[cursor] is already 0.
		Ok(Self(buf))
	}

	pub fn as_bytes(&self) -> &[u8; NAME_LEN] {
		&self.0
	}

	/// Wraps a raw wire-format buffer, e.g. one decoded off a telemetry event,
	/// without re-validating it as a legal hostname encoding.
	pub fn from_bytes(buf: [u8; NAME_LEN]) -> Self {
		Self(buf)
	}

	/// Decodes back to a dotted hostname string. Used by telemetry consumers
	/// rendering `dns_capture_event.name` for logging.
	pub fn decode(&self) -> String {
		let mut out = String::new();
		let mut i = 0usize;

		while i < NAME_LEN {
			let len = self.0[i] as usize;
			if len == 0 {
				break;
			}
			if i + 1 + len > NAME_LEN {
				break;
			}
			if !out.is_empty() {
				out.push('.');
			}
			out.push_str(&String::from_utf8_lossy(&self.0[i + 1..i + 1 + len]));
			i += 1 + len;
		}

		out
	}
}

impl fmt::Debug for WireName {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "WireName({:?})", self.decode())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn round_trips_a_simple_hostname() {
		let name = WireName::encode("svc.internal.example").unwrap();
		assert_eq!(name.decode(), "svc.internal.example");
	}

	#[test]
	fn round_trips_a_trailing_dot() {
		let name = WireName::encode("svc.internal.example.").unwrap();
		assert_eq!(name.decode(), "svc.internal.example");
	}

	#[test]
	fn rejects_empty_hostnames() {
		assert!(matches!(WireName::encode(""), Err(NameError::Empty(_))));
	}

	#[test]
	fn rejects_labels_over_63_bytes() {
		let host = format!("{}.example", "a".repeat(64));
		assert!(matches!(WireName::encode(&host), Err(NameError::LabelTooLong(_))));
	}

	#[test]
	fn rejects_names_over_the_wire_budget() {
		let host = (0..40).map(|_| "abcdefg").collect::<Vec<_>>().join(".");
		assert!(matches!(WireName::encode(&host), Err(NameError::TooLong(_))));
	}

	#[test]
	fn rejects_non_ascii_hostnames() {
		assert!(matches!(WireName::encode("café.example"), Err(NameError::NotAscii(_))));
	}

	#[test]
	fn pads_the_remainder_with_zero_bytes() {
		let name = WireName::encode("a.b").unwrap();
		assert!(name.as_bytes()[5..].iter().all(|&b| b == 0));
	}
}
