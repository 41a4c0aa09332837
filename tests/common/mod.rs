//! Shared fixtures for integration tests.

use std::io::Write;

use route_stack::config::load_config;
use route_stack::routing::{AssembleOptions, ContainerValue, Containers, Params, Router};
use tempfile::NamedTempFile;

/// Build params from string pairs.
pub fn params(pairs: &[(&str, &str)]) -> Params {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Write `toml` to a temporary file and build a router from it.
pub fn router_from_toml(toml: &str) -> Router {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(toml.as_bytes()).unwrap();
    let config = load_config(file.path()).unwrap();
    Router::from_config(&config).unwrap()
}

/// Assemble options carrying container overrides; an empty value strips.
#[allow(dead_code)]
pub fn containers(pairs: &[(&str, &str)]) -> AssembleOptions {
    let containers: Containers = pairs
        .iter()
        .map(|(k, v)| {
            let value = if v.is_empty() {
                ContainerValue::Strip
            } else {
                ContainerValue::Path(v.to_string())
            };
            (k.to_string(), value)
        })
        .collect();
    AssembleOptions::default().with_containers(containers)
}
