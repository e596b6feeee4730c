//! Physical memory and swap usage.

use sysinfo::System;

use sysstat_core::{property_path, SensorContainer, SensorInfo, SensorObject, SensorProperty, Unit, ValueType};

use crate::provider::{ProviderContext, ProviderError, SensorProvider};

const CONTAINER: &str = "memory";

/// One memory pool reading in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PoolUsage {
    total: u64,
    used: u64,
    free: u64,
}

pub struct MemoryProvider {
    system: System,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn bytes(id: &str, name: &str, short_name: &str) -> SensorProperty {
    SensorProperty::new(
        id,
        SensorInfo::new(name)
            .with_short_name(short_name)
            .with_unit(Unit::Byte)
            .with_min(0.0)
            .with_value_type(ValueType::UInt),
    )
}

fn pool_object(id: &str, name: &str) -> SensorObject {
    SensorObject::new(id, name)
        .with_property(bytes("total", &format!("Total {name}"), "Total"))
        .with_property(bytes("used", &format!("Used {name}"), "Used"))
        .with_property(bytes("free", &format!("Free {name}"), "Free"))
        .with_property(SensorProperty::percentage(
            "usedPercent",
            format!("Used {name} Percentage"),
            "used",
        ))
}

/// Writes one pool. `used` carries `total` as its max so the percentage
/// can be derived.
fn publish(ctx: &mut ProviderContext<'_>, object: &str, usage: PoolUsage) -> Result<(), ProviderError> {
    let total = property_path(CONTAINER, object, "total");
    let used = property_path(CONTAINER, object, "used");
    let free = property_path(CONTAINER, object, "free");

    ctx.set_value(&total, usage.total)?;
    ctx.set_max(&used, usage.total as f64)?;
    ctx.set_max(&free, usage.total as f64)?;
    ctx.set_value(&used, usage.used)?;
    ctx.set_value(&free, usage.free)?;
    Ok(())
}

impl SensorProvider for MemoryProvider {
    fn name(&self) -> &str {
        CONTAINER
    }

    fn containers(&mut self) -> Vec<SensorContainer> {
        vec![SensorContainer::new(CONTAINER, "Memory")
            .with_object(pool_object("physical", "Physical Memory"))
            .with_object(pool_object("swap", "Swap Memory"))]
    }

    fn update(&mut self, ctx: &mut ProviderContext<'_>) -> Result<(), ProviderError> {
        if !ctx.is_container_subscribed(CONTAINER) {
            return Ok(());
        }

        self.system.refresh_memory();

        publish(
            ctx,
            "physical",
            PoolUsage {
                total: self.system.total_memory(),
                used: self.system.used_memory(),
                free: self.system.free_memory(),
            },
        )?;
        publish(
            ctx,
            "swap",
            PoolUsage {
                total: self.system.total_swap(),
                used: self.system.used_swap(),
                free: self.system.free_swap(),
            },
        )
    }
}
