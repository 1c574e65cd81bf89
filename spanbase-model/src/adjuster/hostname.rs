use std::collections::HashMap;

use crate::adjuster::Adjuster;
use crate::keyvalue::{sort_by_key, KeyValue};
use crate::span::Trace;

const IP_TAG: &str = "ip";
const HOSTNAME_TAG: &str = "hostname";

/// Resolves an IP address to a host name.
///
/// A seam so deployments can plug in their inventory service; the default
/// [`TableResolver`] answers from a static table.
pub trait HostResolver: Send + Sync {
    fn resolve(&self, ip: &str) -> Option<String>;
}

/// A [`HostResolver`] backed by a fixed ip → hostname table.
#[derive(Debug, Default)]
pub struct TableResolver {
    entries: HashMap<String, String>,
}

impl TableResolver {
    pub fn new(entries: HashMap<String, String>) -> Self {
        TableResolver { entries }
    }
}

impl HostResolver for TableResolver {
    fn resolve(&self, ip: &str) -> Option<String> {
        self.entries.get(ip).cloned()
    }
}

/// Attaches a `hostname` process tag derived from the `ip` process tag when
/// the resolver knows the address. Processes that already carry a hostname
/// are left alone, which keeps the adjuster idempotent.
pub struct HostnameTags<R> {
    resolver: R,
}

impl<R> std::fmt::Debug for HostnameTags<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostnameTags").finish_non_exhaustive()
    }
}

impl<R: HostResolver> HostnameTags<R> {
    pub fn new(resolver: R) -> Self {
        HostnameTags { resolver }
    }
}

impl<R: HostResolver> Adjuster for HostnameTags<R> {
    fn adjust(&self, trace: &mut Trace) {
        for span in &mut trace.spans {
            let process = &mut span.process;
            if process.tags.iter().any(|kv| kv.key == HOSTNAME_TAG) {
                continue;
            }
            let resolved = process
                .tags
                .iter()
                .find(|kv| kv.key == IP_TAG)
                .and_then(|kv| kv.as_str())
                .and_then(|ip| self.resolver.resolve(ip));
            if let Some(hostname) = resolved {
                process.tags.push(KeyValue::string(HOSTNAME_TAG, hostname));
                sort_by_key(&mut process.tags);
            }
        }
    }
}
