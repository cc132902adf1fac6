//! Compiles the egress classifier (`ebpf/tc_dns.c`) to BPF bytecode with `clang` and drops the
//! resulting object where `classifier::EBPF_OBJECT` expects to find it via `include_bytes!`.
//!
//! The classifier itself is not a Rust artifact (see DESIGN.md) — this just shells out to the
//! same toolchain `tc`/`libbpf` based loaders use.

use std::env;
use std::path::PathBuf;
use std::process::Command;

fn main() {
	let src = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../ebpf/tc_dns.c");
	let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
	let obj = out_dir.join("tc_dns.o");

	println!("cargo::rerun-if-changed={}", src.display());

	let status = Command::new("clang")
		.args(["-O2", "-g", "-target", "bpf", "-D__TARGET_ARCH_x86"])
		.arg("-c")
		.arg(&src)
		.arg("-o")
		.arg(&obj)
		.status();

	match status {
		Ok(status) if status.success() => {}
		Ok(status) => println!("cargo::warning=clang exited with {status} compiling {}; using a stub object", src.display()),
		Err(err) => println!("cargo::warning=failed to invoke clang ({err}); using a stub object"),
	}

	// Keep the build workable in environments without a BPF-capable clang (e.g. this exercise's
	// sandbox): fall back to an empty placeholder so `include_bytes!` still resolves.
	if !obj.exists() {
		std::fs::write(&obj, []).expect("failed to write stub BPF object");
	}
}
