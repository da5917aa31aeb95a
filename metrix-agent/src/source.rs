// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Metric source
//!
//! The agent consumes a capability, "yields named gauge samples", rather
//! than a fixed struct. [`SystemSource`] backs it with `sysinfo`.

use parking_lot::Mutex;
use sysinfo::System;

pub trait MetricSource: Send + Sync {
    /// One poll's worth of named gauge samples.
    fn sample(&self) -> Vec<(String, f64)>;
}

/// A named numeric reading off a refreshed [`System`].
struct Accessor {
    name: &'static str,
    read: fn(&System) -> f64,
}

const ACCESSORS: &[Accessor] = &[
    Accessor {
        name: "TotalMemory",
        read: |sys| sys.total_memory() as f64,
    },
    Accessor {
        name: "FreeMemory",
        read: |sys| sys.free_memory() as f64,
    },
    Accessor {
        name: "UsedMemory",
        read: |sys| sys.used_memory() as f64,
    },
    Accessor {
        name: "AvailableMemory",
        read: |sys| sys.available_memory() as f64,
    },
    Accessor {
        name: "TotalSwap",
        read: |sys| sys.total_swap() as f64,
    },
    Accessor {
        name: "UsedSwap",
        read: |sys| sys.used_swap() as f64,
    },
];

/// System information source - keeps the sysinfo::System alive for accurate
/// CPU usage deltas between polls
pub struct SystemSource {
    system: Mutex<System>,
}

impl SystemSource {
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_memory();
        sys.refresh_cpu_usage();

        Self {
            system: Mutex::new(sys),
        }
    }
}

impl Default for SystemSource {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricSource for SystemSource {
    fn sample(&self) -> Vec<(String, f64)> {
        let mut sys = self.system.lock();
        sys.refresh_memory();
        sys.refresh_cpu_usage();

        let mut samples: Vec<(String, f64)> = ACCESSORS
            .iter()
            .map(|accessor| (accessor.name.to_string(), (accessor.read)(&sys)))
            .collect();
        samples.push(("LoadAverage1".to_string(), System::load_average().one));
        samples.extend(
            sys.cpus()
                .iter()
                .enumerate()
                .map(|(i, cpu)| (format!("CPUutilization{}", i + 1), f64::from(cpu.cpu_usage()))),
        );
        samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_source_names() {
        let source = SystemSource::new();
        let samples = source.sample();
        let names: Vec<&str> = samples.iter().map(|(name, _)| name.as_str()).collect();

        for expected in ["TotalMemory", "FreeMemory", "UsedSwap", "LoadAverage1"] {
            assert!(names.contains(&expected), "missing {expected}");
        }
    }

    #[test]
    fn test_total_memory_is_reported() {
        let samples = SystemSource::new().sample();
        let total = samples
            .iter()
            .find(|(name, _)| name == "TotalMemory")
            .map(|(_, v)| *v)
            .unwrap();
        assert!(total > 0.0);
    }
}
