//! Built-in providers backed by `sysinfo`.
//!
//! | Provider  | Container | Objects                                |
//! |-----------|-----------|----------------------------------------|
//! | `cpu`     | `cpu`     | `all`, `cpu0`..`cpuN`                   |
//! | `memory`  | `memory`  | `physical`, `swap`                      |
//! | `disk`    | `disk`    | `all`, one per mounted volume           |
//! | `network` | `network` | `all`, one per interface (except `lo`)  |

mod cpu;
mod disk;
mod memory;
mod network;

pub use cpu::CpuProvider;
pub use disk::DiskProvider;
pub use memory::MemoryProvider;
pub use network::NetworkProvider;

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::ProviderToggles;
use crate::provider::SensorProvider;

/// Object holding the summed values of a container.
pub const AGGREGATE_OBJECT: &str = "all";

/// Ticks between rescans of volumes and interfaces.
pub(crate) const RESCAN_TICKS: u64 = 10;

/// Builds the enabled built-in providers in registration order.
pub fn builtin_providers(toggles: &ProviderToggles) -> Vec<Box<dyn SensorProvider>> {
    let mut providers: Vec<Box<dyn SensorProvider>> = Vec::new();

    if toggles.cpu {
        providers.push(Box::new(CpuProvider::new()));
    }
    if toggles.memory {
        providers.push(Box::new(MemoryProvider::new()));
    }
    if toggles.disk {
        providers.push(Box::new(DiskProvider::new()));
    }
    if toggles.network {
        providers.push(Box::new(NetworkProvider::new()));
    }

    providers
}

/// Turns a mount point or interface name into an object id.
///
/// Path separators and anything outside `[A-Za-z0-9_.-]` become `_`;
/// leading and trailing separators are dropped. `/` maps to `root`, and a
/// name that collides with the aggregate object gets a suffix.
pub fn object_id_for(name: &str) -> String {
    let trimmed = name.trim_matches('/');
    if trimmed.is_empty() {
        return "root".to_string();
    }

    let id: String = trimmed
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if id == AGGREGATE_OBJECT {
        format!("{id}_")
    } else {
        id
    }
}

/// Maps system names to object ids, keeping ids already handed out.
///
/// `known` is the current id → name map. A new name whose id is taken gets
/// the first free numeric suffix (`mnt_data_2`). Returns id → name for
/// every name in `names`.
pub(crate) fn assign_object_ids<'a>(
    names: impl IntoIterator<Item = &'a str>,
    known: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut assigned = BTreeMap::new();
    let mut fresh = Vec::new();

    for name in names {
        match known.iter().find(|(_, known_name)| known_name.as_str() == name) {
            Some((id, _)) => {
                assigned.insert(id.clone(), name.to_string());
            }
            None => fresh.push(name),
        }
    }

    fresh.sort_unstable();
    fresh.dedup();

    for name in fresh {
        let base = object_id_for(name);
        let mut id = base.clone();
        let mut suffix = 2;
        while assigned.contains_key(&id) || known.contains_key(&id) {
            id = format!("{base}_{suffix}");
            suffix += 1;
        }
        if id != base {
            debug!(name, id = %id, "Object id already taken, using suffix");
        }
        assigned.insert(id, name.to_string());
    }

    assigned
}
