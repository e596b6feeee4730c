//! CPU load and frequency.

use sysinfo::System;

use sysstat_core::{property_path, SensorContainer, SensorInfo, SensorObject, SensorProperty, Unit, ValueType};

use super::AGGREGATE_OBJECT;
use crate::provider::{ProviderContext, ProviderError, SensorProvider};

const CONTAINER: &str = "cpu";

pub struct CpuProvider {
    system: System,
    cores: usize,
}

impl CpuProvider {
    pub fn new() -> Self {
        Self {
            system: System::new(),
            cores: 0,
        }
    }
}

impl Default for CpuProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn usage_property(name: &str) -> SensorProperty {
    SensorProperty::new(
        "usage",
        SensorInfo::new(name)
            .with_short_name("CPU")
            .with_unit(Unit::Percent)
            .with_min(0.0)
            .with_max(100.0)
            .with_value_type(ValueType::Double),
    )
}

fn core_object(index: usize) -> SensorObject {
    SensorObject::new(format!("cpu{index}"), format!("CPU {}", index + 1))
        .with_property(usage_property(&format!("CPU {} Usage", index + 1)))
        .with_property(SensorProperty::new(
            "frequency",
            SensorInfo::new(format!("CPU {} Clock Frequency", index + 1))
                .with_short_name("Clock")
                .with_unit(Unit::Hertz)
                .with_min(0.0)
                .with_value_type(ValueType::UInt),
        ))
}

impl SensorProvider for CpuProvider {
    fn name(&self) -> &str {
        CONTAINER
    }

    fn containers(&mut self) -> Vec<SensorContainer> {
        self.system.refresh_cpu_all();
        self.cores = self.system.cpus().len();

        let all = SensorObject::new(AGGREGATE_OBJECT, "All CPUs")
            .with_property(usage_property("Total CPU Usage"))
            .with_property(
                SensorProperty::new(
                    "cores",
                    SensorInfo::new("Number of CPU Cores").with_value_type(ValueType::UInt),
                )
                .with_value(self.cores as u64),
            );

        let mut container = SensorContainer::new(CONTAINER, "CPUs").with_object(all);
        for index in 0..self.cores {
            container = container.with_object(core_object(index));
        }

        vec![container]
    }

    fn update(&mut self, ctx: &mut ProviderContext<'_>) -> Result<(), ProviderError> {
        // Usage is a delta between two refreshes; skipping a few ticks only
        // widens the window.
        if !ctx.is_container_subscribed(CONTAINER) {
            return Ok(());
        }

        self.system.refresh_cpu_all();

        ctx.set_value(
            &property_path(CONTAINER, AGGREGATE_OBJECT, "usage"),
            f64::from(self.system.global_cpu_usage()),
        )?;

        for (index, cpu) in self.system.cpus().iter().enumerate().take(self.cores) {
            let object = format!("cpu{index}");
            if !ctx.is_object_subscribed(CONTAINER, &object) {
                continue;
            }

            ctx.set_value(&property_path(CONTAINER, &object, "usage"), f64::from(cpu.cpu_usage()))?;
            ctx.set_value(
                &property_path(CONTAINER, &object, "frequency"),
                cpu.frequency().saturating_mul(1_000_000),
            )?;
        }

        Ok(())
    }
}
