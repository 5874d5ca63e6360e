#![cfg(test)]

// Tiny test-only helper for temp paths
use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

/// Create a unique, empty temporary directory under the OS temp dir.
pub fn temp_dir(stem: &str) -> PathBuf {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_nanos();
    let mut p = std::env::temp_dir();
    p.push(format!("meversedb_{stem}_{now}"));
    if p.exists() {
        let _ = fs::remove_dir_all(&p);
    }
    fs::create_dir_all(&p).expect("create temp_dir failed");
    p
}
