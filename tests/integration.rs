// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Integration Tests
//!
//! This file makes the integration test modules in `integration/` directory
//! discoverable by cargo and tarpaulin.

// Test utilities shared with the integration test modules
mod tests {
    use std::path::PathBuf;
    use uuid::Uuid;

    pub fn unique_socket_path_with_prefix(prefix: &str) -> PathBuf {
        PathBuf::from(format!("/tmp/test_{}_{}.sock", prefix, Uuid::new_v4()))
    }

    pub fn cleanup_socket(socket_path: &PathBuf) {
        let _ = std::fs::remove_file(socket_path);
    }
}

#[path = "integration/cli.rs"]
mod cli; // 3 tests: the binary's run and worker modes end to end

#[path = "integration/fan_in.rs"]
mod fan_in; // 5 tests: listener lifecycle, filtering and history through the library API
