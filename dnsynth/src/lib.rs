//! In-kernel DNS response synthesizer for egress traffic.
//!
//! The kernel-side classifier lives at `../ebpf/tc_dns.c` and is compiled by
//! `build.rs`; everything in this crate is the userland control plane that
//! loads it, keeps its name table in sync with configured sources, and reads
//! its telemetry ring.

pub mod classifier;
pub mod config;
pub mod env;
pub mod error;
pub mod maps;
pub mod provider;
pub mod reconciler;
pub mod watcher;
pub mod wire;
