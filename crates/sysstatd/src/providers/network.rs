//! Network interface throughput.
//!
//! Rates are byte-counter deltas divided by the wall time between two
//! samples, so ticks skipped while nobody is subscribed do not skew them.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use sysinfo::Networks;
use tracing::debug;

use sysstat_core::{
    property_path, AggregateSpec, ObjectMatch, SensorContainer, SensorInfo, SensorObject, SensorProperty, Unit,
    ValueType,
};

use super::{assign_object_ids, AGGREGATE_OBJECT, RESCAN_TICKS};
use crate::provider::{ProviderContext, ProviderError, SensorProvider};

const CONTAINER: &str = "network";

/// Interfaces that never carry interesting traffic.
const IGNORED_INTERFACES: &[&str] = &["lo"];

/// Byte counters of one interface at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Counters {
    received: u64,
    transmitted: u64,
}

pub struct NetworkProvider {
    networks: Networks,

    /// Object id → interface name
    interfaces: BTreeMap<String, String>,

    last: HashMap<String, Counters>,
    last_sample: Option<Instant>,
    ticks: u64,
}

impl NetworkProvider {
    pub fn new() -> Self {
        Self {
            networks: Networks::new(),
            interfaces: BTreeMap::new(),
            last: HashMap::new(),
            last_sample: None,
            ticks: 0,
        }
    }

    fn sync_interfaces(&mut self, ctx: &mut ProviderContext<'_>) -> Result<(), ProviderError> {
        self.networks.refresh_list();
        // The tree is authoritative if an earlier failed tick was rolled back.
        self.interfaces.retain(|id, _| ctx.has_object(CONTAINER, id));

        let names = self
            .networks
            .list()
            .keys()
            .map(String::as_str)
            .filter(|name| !IGNORED_INTERFACES.contains(name));
        let current = assign_object_ids(names, &self.interfaces);

        let gone: Vec<String> = ctx
            .object_ids(CONTAINER)
            .into_iter()
            .filter(|id| id != AGGREGATE_OBJECT && !current.contains_key(id))
            .collect();
        for id in gone {
            debug!(interface = %id, "Interface removed");
            ctx.remove_object(CONTAINER, &id)?;
            self.interfaces.remove(&id);
            self.last.remove(&id);
        }

        for (id, name) in current {
            if !ctx.has_object(CONTAINER, &id) {
                debug!(interface = %name, "Interface added");
                ctx.add_object(CONTAINER, interface_object(&id, &name))?;
            }
            self.interfaces.insert(id, name);
        }

        Ok(())
    }

    fn sample(&mut self, ctx: &mut ProviderContext<'_>) -> Result<(), ProviderError> {
        self.networks.refresh();

        let now = Instant::now();
        let elapsed = self.last_sample.map(|then| now.duration_since(then).as_secs_f64());
        self.last_sample = Some(now);

        for (id, name) in &self.interfaces {
            let Some(data) = self.networks.list().get(name) else {
                continue;
            };
            let counters = Counters {
                received: data.total_received(),
                transmitted: data.total_transmitted(),
            };
            let previous = self.last.insert(id.clone(), counters);

            ctx.set_value(&property_path(CONTAINER, id, "totalDownload"), counters.received)?;
            ctx.set_value(&property_path(CONTAINER, id, "totalUpload"), counters.transmitted)?;

            if let Some((download, upload)) = previous.zip(elapsed).and_then(|(p, secs)| rates(p, counters, secs)) {
                ctx.set_value(&property_path(CONTAINER, id, "download"), download)?;
                ctx.set_value(&property_path(CONTAINER, id, "upload"), upload)?;
            }
        }

        Ok(())
    }
}

impl Default for NetworkProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Download and upload rates in bytes per second.
///
/// `None` when no time has passed. A counter that went backwards (interface
/// reset) counts as zero traffic.
fn rates(previous: Counters, current: Counters, secs: f64) -> Option<(f64, f64)> {
    if secs <= 0.0 {
        return None;
    }

    let down = current.received.saturating_sub(previous.received) as f64 / secs;
    let up = current.transmitted.saturating_sub(previous.transmitted) as f64 / secs;
    Some((down, up))
}

fn rate_info(name: &str, short_name: &str) -> SensorInfo {
    SensorInfo::new(name)
        .with_short_name(short_name)
        .with_unit(Unit::ByteRate)
        .with_min(0.0)
        .with_value_type(ValueType::Double)
}

fn interface_object(id: &str, name: &str) -> SensorObject {
    let total = |label: &str, short: &str| {
        SensorInfo::new(label)
            .with_short_name(short)
            .with_prefix(name)
            .with_unit(Unit::Byte)
            .with_min(0.0)
            .with_value_type(ValueType::UInt)
    };

    SensorObject::new(id, name)
        .with_property(SensorProperty::new("download", rate_info("Download Rate", "Download").with_prefix(name)))
        .with_property(SensorProperty::new("upload", rate_info("Upload Rate", "Upload").with_prefix(name)))
        .with_property(SensorProperty::new("totalDownload", total("Data Received", "Received")))
        .with_property(SensorProperty::new("totalUpload", total("Data Sent", "Sent")))
}

fn aggregate_object() -> SensorObject {
    let sum = |id: &str, name: &str, short: &str| {
        SensorProperty::aggregate(
            id,
            rate_info(name, short).with_prefix("All Interfaces"),
            AggregateSpec::new(ObjectMatch::All, id),
        )
    };

    SensorObject::new(AGGREGATE_OBJECT, "All Network Interfaces")
        .with_property(sum("download", "Download Rate", "Download"))
        .with_property(sum("upload", "Upload Rate", "Upload"))
}

impl SensorProvider for NetworkProvider {
    fn name(&self) -> &str {
        CONTAINER
    }

    fn containers(&mut self) -> Vec<SensorContainer> {
        vec![SensorContainer::new(CONTAINER, "Network Devices").with_object(aggregate_object())]
    }

    fn update(&mut self, ctx: &mut ProviderContext<'_>) -> Result<(), ProviderError> {
        if self.ticks % RESCAN_TICKS == 0 {
            self.sync_interfaces(ctx)?;
        }
        self.ticks += 1;

        if !ctx.is_container_subscribed(CONTAINER) {
            return Ok(());
        }
        self.sample(ctx)
    }
}
