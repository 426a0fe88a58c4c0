// Worker name generation from host identity

use stevedore_core::domain::error::Result;
use stevedore_core::domain::WorkerName;
use stevedore_core::port::NameProvider;
use sysinfo::System;

const FALLBACK_HOST: &str = "localhost";

/// Generates `{hostname}.{pid}.{8 hex}` worker names
pub struct HostNameProvider {
    host: String,
    pid: u32,
}

impl HostNameProvider {
    pub fn new() -> Self {
        let host = System::host_name()
            .map(|h| sanitize(&h))
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| FALLBACK_HOST.to_string());
        Self {
            host,
            pid: std::process::id(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }
}

impl Default for HostNameProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl NameProvider for HostNameProvider {
    fn worker_name(&self) -> Result<WorkerName> {
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        WorkerName::parse(format!("{}.{}.{}", self.host, self.pid, &suffix[..8]))
    }
}

/// Worker names cannot contain whitespace
fn sanitize(host: &str) -> String {
    host.trim()
        .chars()
        .map(|c| if c.is_whitespace() || c.is_control() { '-' } else { c })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_format() {
        let provider = HostNameProvider::new();
        let name = provider.worker_name().unwrap().to_string();

        let prefix = format!("{}.{}.", provider.host(), std::process::id());
        assert!(name.starts_with(&prefix), "{name}");
        let suffix = &name[prefix.len()..];
        assert_eq!(suffix.len(), 8);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_names_are_unique() {
        let provider = HostNameProvider::new();
        let a = provider.worker_name().unwrap();
        let b = provider.worker_name().unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize(" my host\n"), "my-host");
    }
}
