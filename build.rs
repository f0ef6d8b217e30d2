//! Build script: git hash for the version string and pre-flight checks for
//! GPU feature flags.
//!
//! Verifies that required toolkits are installed before whisper-rs-sys tries
//! to compile.

use std::process::Command;

fn main() {
    // Embed git short hash for version string
    if let Ok(output) = Command::new("git")
        .args(["rev-parse", "--short=7", "HEAD"])
        .output()
        && output.status.success()
    {
        let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
        println!("cargo:rustc-env=GIT_HASH={}", hash);
    }
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/heads/");

    if cfg!(feature = "cuda") {
        require_tool("nvcc", &["--version"], "CUDA toolkit", "https://developer.nvidia.com/cuda-downloads");
        if let Some((major, minor)) = cuda_version() {
            println!("cargo::warning=Building with CUDA {}.{}", major, minor);
        }
    }
    if cfg!(feature = "vulkan") {
        require_tool("vulkaninfo", &["--summary"], "Vulkan SDK", "https://vulkan.lunarg.com/");
    }
    if cfg!(feature = "hipblas") {
        require_tool("rocminfo", &[], "ROCm", "https://rocm.docs.amd.com/");
    }
    if cfg!(feature = "openblas") {
        let found = Command::new("pkg-config")
            .args(["--exists", "openblas"])
            .status()
            .is_ok_and(|s| s.success());
        if !found {
            panic!(
                "\n\nOpenBLAS not found.\n  Install: sudo apt install libopenblas-dev\n  Or build without OpenBLAS: cargo build --release\n"
            );
        }
    }
}

fn require_tool(binary: &str, args: &[&str], what: &str, url: &str) {
    if Command::new(binary).args(args).output().is_err() {
        panic!(
            "\n\n`{}` not found: {} is not installed.\n  Install: {}\n  Or build without the GPU feature: cargo build --release\n",
            binary, what, url
        );
    }
}

/// Parse "release X.Y" from nvcc --version output.
fn cuda_version() -> Option<(u32, u32)> {
    let output = Command::new("nvcc").arg("--version").output().ok()?;
    let text = String::from_utf8_lossy(&output.stdout);
    // nvcc output: "Cuda compilation tools, release 12.4, V12.4.131"
    let after = &text[text.find("release ")? + 8..];
    let version = &after[..after.find(',')?];
    let mut parts = version.split('.');
    let major = parts.next()?.parse().ok()?;
    let minor = parts.next()?.parse().ok()?;
    Some((major, minor))
}
