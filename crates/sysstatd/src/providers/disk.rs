//! Mounted volumes and their free space.
//!
//! The volume list is rescanned on the tick every few ticks. Space figures
//! come from `statvfs`, which can hang on network mounts, so they are
//! queried on the blocking pool and land through a deferred update. At most
//! one query is in flight at a time.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sysinfo::Disks;
use tracing::debug;

use sysstat_core::{
    property_path, AggregateSpec, ObjectMatch, SensorContainer, SensorInfo, SensorObject, SensorProperty,
    SensorValue, Unit, ValueType,
};

use super::{assign_object_ids, AGGREGATE_OBJECT, RESCAN_TICKS};
use crate::provider::{DeferredValues, ProviderContext, ProviderError, SensorProvider};

const CONTAINER: &str = "disk";

pub struct DiskProvider {
    disks: Disks,

    /// Object id → mount point
    volumes: BTreeMap<String, String>,

    in_flight: Arc<AtomicBool>,
    ticks: u64,
}

impl DiskProvider {
    pub fn new() -> Self {
        Self {
            disks: Disks::new(),
            volumes: BTreeMap::new(),
            in_flight: Arc::new(AtomicBool::new(false)),
            ticks: 0,
        }
    }

    /// Mount points currently present, keyed by object id.
    fn scan(&mut self) -> BTreeMap<String, String> {
        self.disks.refresh_list();
        let mounts: Vec<String> = self
            .disks
            .list()
            .iter()
            .map(|disk| disk.mount_point().to_string_lossy().into_owned())
            .collect();
        assign_object_ids(mounts.iter().map(String::as_str), &self.volumes)
    }

    fn sync_volumes(&mut self, ctx: &mut ProviderContext<'_>) -> Result<(), ProviderError> {
        // The tree is authoritative if an earlier failed tick was rolled back.
        self.volumes.retain(|id, _| ctx.has_object(CONTAINER, id));
        let current = self.scan();

        let gone: Vec<String> = ctx
            .object_ids(CONTAINER)
            .into_iter()
            .filter(|id| id != AGGREGATE_OBJECT && !current.contains_key(id))
            .collect();
        for id in gone {
            debug!(volume = %id, "Volume unmounted");
            ctx.remove_object(CONTAINER, &id)?;
            self.volumes.remove(&id);
        }

        for (id, mount) in current {
            if !ctx.has_object(CONTAINER, &id) {
                debug!(volume = %id, mount = %mount, "Volume mounted");
                ctx.add_object(CONTAINER, volume_object(&id, &mount))?;
            }
            self.volumes.insert(id, mount);
        }

        Ok(())
    }

    /// Copies each object's total into the max of its used/free sensors.
    fn sync_maxima(&self, ctx: &mut ProviderContext<'_>) -> Result<(), ProviderError> {
        let objects = self
            .volumes
            .keys()
            .map(String::as_str)
            .chain(std::iter::once(AGGREGATE_OBJECT));

        for object in objects {
            let total = ctx
                .tree()
                .resolve(&property_path(CONTAINER, object, "total"))
                .and_then(|p| p.value())
                .and_then(SensorValue::as_f64);

            if let Some(total) = total {
                ctx.set_max(&property_path(CONTAINER, object, "used"), total)?;
                ctx.set_max(&property_path(CONTAINER, object, "free"), total)?;
            }
        }

        Ok(())
    }

    fn start_query(&self, ctx: &ProviderContext<'_>) {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            return;
        }

        let volumes = self.volumes.clone();
        let in_flight = Arc::clone(&self.in_flight);

        let started = ctx.defer(async move {
            let result = tokio::task::spawn_blocking(move || query_space(&volumes))
                .await
                .map_err(ProviderError::deferred);
            in_flight.store(false, Ordering::Release);
            result
        });

        if !started {
            self.in_flight.store(false, Ordering::Release);
        }
    }
}

impl Default for DiskProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads space figures for the known volumes. Runs on the blocking pool.
fn query_space(volumes: &BTreeMap<String, String>) -> DeferredValues {
    let by_mount: BTreeMap<&str, &str> = volumes.iter().map(|(id, mount)| (mount.as_str(), id.as_str())).collect();
    let disks = Disks::new_with_refreshed_list();
    let mut values = Vec::new();

    for disk in disks.list() {
        let mount = disk.mount_point().to_string_lossy();
        let Some(id) = by_mount.get(&*mount) else {
            continue;
        };

        let total = disk.total_space();
        let free = disk.available_space();
        values.extend(space_values(id, total, free));
    }

    values
}

fn space_values(object: &str, total: u64, free: u64) -> DeferredValues {
    vec![
        (property_path(CONTAINER, object, "total"), SensorValue::UInt(total)),
        (
            property_path(CONTAINER, object, "used"),
            SensorValue::UInt(total.saturating_sub(free)),
        ),
        (property_path(CONTAINER, object, "free"), SensorValue::UInt(free)),
    ]
}

fn bytes_info(name: &str, short_name: &str) -> SensorInfo {
    SensorInfo::new(name)
        .with_short_name(short_name)
        .with_unit(Unit::Byte)
        .with_min(0.0)
        .with_value_type(ValueType::UInt)
}

fn percentages(object: SensorObject) -> SensorObject {
    object
        .with_property(SensorProperty::percentage("usedPercent", "Percentage Used", "used"))
        .with_property(SensorProperty::percentage("freePercent", "Percentage Free", "free"))
}

fn volume_object(id: &str, mount: &str) -> SensorObject {
    let object = SensorObject::new(id, mount)
        .with_property(SensorProperty::new("total", bytes_info("Total Space", "Total").with_prefix(mount)))
        .with_property(SensorProperty::new("used", bytes_info("Used Space", "Used").with_prefix(mount)))
        .with_property(SensorProperty::new("free", bytes_info("Free Space", "Free").with_prefix(mount)));
    percentages(object)
}

fn aggregate_object() -> SensorObject {
    let sum = |id: &str, name: &str, short: &str| {
        SensorProperty::aggregate(
            id,
            bytes_info(name, short).with_prefix("All Disks"),
            AggregateSpec::new(ObjectMatch::All, id),
        )
    };

    let object = SensorObject::new(AGGREGATE_OBJECT, "All Disks")
        .with_property(sum("total", "Total Space", "Total"))
        .with_property(sum("used", "Used Space", "Used"))
        .with_property(sum("free", "Free Space", "Free"));
    percentages(object)
}

impl SensorProvider for DiskProvider {
    fn name(&self) -> &str {
        CONTAINER
    }

    fn containers(&mut self) -> Vec<SensorContainer> {
        vec![SensorContainer::new(CONTAINER, "Disks").with_object(aggregate_object())]
    }

    fn update(&mut self, ctx: &mut ProviderContext<'_>) -> Result<(), ProviderError> {
        if self.ticks % RESCAN_TICKS == 0 {
            self.sync_volumes(ctx)?;
        }
        self.ticks += 1;

        self.sync_maxima(ctx)?;

        if ctx.is_container_subscribed(CONTAINER) {
            self.start_query(ctx);
        }
        Ok(())
    }
}
