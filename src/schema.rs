//! Output schemas of the instrumented pmemkv benchmark.
//!
//! Every revision of the benchmark prints its cycle counters as `<label>,<cycles>` lines
//! at fixed positions. A [`Schema`] records which line holds which counter, where the
//! total lives, and how counters turn into charted percentage columns.
//!
//! # Variants
//!
//! - **Pmdk** (`pmdk`): durability, logging, locking and allocation inside libpmemobj.
//! - **PmdkKv** (`pmdk-kv`): the PMDK counters plus five tree-level counters.
//! - **PmdkKvNoMaintenance** (`pmdk-kv-no-maintenance`): adds a maintenance counter and a
//!   second KV breakdown computed against `total - maintenance`.
//! - **PmdkKvPool** (`pmdk-kv-pool`): seven KV counters where pool maintenance is a
//!   composite bucket, broken down further into four sub-counters and a derived remainder.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Line holding the total cycle count in every variant.
const TOTAL_LINE: usize = 6;

/// Field holding the cycle count on every counter line.
const VALUE_FIELD: usize = 1;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum SchemaVariant {
    Pmdk,
    PmdkKv,
    PmdkKvNoMaintenance,
    PmdkKvPool,
}

impl SchemaVariant {
    pub const ALL: [SchemaVariant; 4] = [
        SchemaVariant::Pmdk,
        SchemaVariant::PmdkKv,
        SchemaVariant::PmdkKvNoMaintenance,
        SchemaVariant::PmdkKvPool,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SchemaVariant::Pmdk => "pmdk",
            SchemaVariant::PmdkKv => "pmdk-kv",
            SchemaVariant::PmdkKvNoMaintenance => "pmdk-kv-no-maintenance",
            SchemaVariant::PmdkKvPool => "pmdk-kv-pool",
        }
    }

    /// Build the offset table for this variant.
    pub fn schema(self) -> Schema {
        let mut schema = Schema::new(self);
        schema.add_pmdk();
        match self {
            SchemaVariant::Pmdk => {}
            SchemaVariant::PmdkKv => {
                let kv = schema.add_kv_counters();
                for (label, counter) in kv {
                    schema.push_column(label, Subsystem::Kv, Source::Counter(counter), Basis::Total);
                }
            }
            SchemaVariant::PmdkKvNoMaintenance => {
                let maintenance = schema.push_counter("maintenance", 5);
                let mut kv = schema.add_kv_counters();
                kv.push(("Volatile index", schema.push_counter("volatile-index", 12)));
                for &(label, counter) in &kv {
                    schema.push_column(label, Subsystem::Kv, Source::Counter(counter), Basis::Total);
                }
                schema.push_column(
                    "Maintenance",
                    Subsystem::Kv,
                    Source::Counter(maintenance),
                    Basis::Total,
                );
                for (label, counter) in kv {
                    schema.push_column(
                        label,
                        Subsystem::KvNoMaintenance,
                        Source::Counter(counter),
                        Basis::TotalMinus(maintenance),
                    );
                }
            }
            SchemaVariant::PmdkKvPool => {
                let mut kv = schema.add_kv_counters();
                kv.push(("Volatile index", schema.push_counter("volatile-index", 12)));
                let pool = schema.push_counter("pool-maintenance", 13);
                kv.push(("Pool maintenance", pool));
                for (label, counter) in kv {
                    schema.push_column(label, Subsystem::Kv, Source::Counter(counter), Basis::Total);
                }

                let parts = [
                    ("Pool alloc", schema.push_counter("pool-alloc", 14)),
                    ("Pool free", schema.push_counter("pool-free", 15)),
                    ("Pool persist", schema.push_counter("pool-persist", 16)),
                    ("Pool log", schema.push_counter("pool-log", 17)),
                ];
                for (label, counter) in parts {
                    schema.push_column(label, Subsystem::Pool, Source::Counter(counter), Basis::Total);
                }
                schema.push_column(
                    "Pool other",
                    Subsystem::Pool,
                    Source::Remainder {
                        composite: pool,
                        parts: parts.map(|(_, counter)| counter),
                    },
                    Basis::Total,
                );
            }
        }
        schema
    }
}

impl Display for SchemaVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Store layer a charted column belongs to. One chart is drawn per subsystem and phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Subsystem {
    Pmdk,
    Kv,
    KvNoMaintenance,
    Pool,
}

impl Subsystem {
    pub fn as_str(self) -> &'static str {
        match self {
            Subsystem::Pmdk => "pmdk",
            Subsystem::Kv => "kv",
            Subsystem::KvNoMaintenance => "kv-no-maintenance",
            Subsystem::Pool => "pool",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Subsystem::Pmdk => "PMDK",
            Subsystem::Kv => "KV engine",
            Subsystem::KvNoMaintenance => "KV engine (excluding maintenance)",
            Subsystem::Pool => "Pool maintenance",
        }
    }
}

impl Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named cycle counter read from `field` of output line `line` (both 0-indexed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Counter {
    pub name: &'static str,
    pub line: usize,
    pub field: usize,
}

/// Denominator a column's cycles are divided by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Basis {
    Total,
    /// Total minus the counter at this index.
    TotalMinus(usize),
}

/// Where a column's cycles come from. Indices point into [`Schema::counters`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Counter(usize),
    /// Composite percentage minus the percentages of its detailed parts, floored at 0.
    Remainder { composite: usize, parts: [usize; 4] },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub label: &'static str,
    pub subsystem: Subsystem,
    pub source: Source,
    pub basis: Basis,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    variant: SchemaVariant,
    counters: Vec<Counter>,
    total: Counter,
    columns: Vec<Column>,
}

impl Schema {
    fn new(variant: SchemaVariant) -> Self {
        Self {
            variant,
            counters: Vec::new(),
            total: Counter {
                name: "total",
                line: TOTAL_LINE,
                field: VALUE_FIELD,
            },
            columns: Vec::new(),
        }
    }

    fn push_counter(&mut self, name: &'static str, line: usize) -> usize {
        self.counters.push(Counter {
            name,
            line,
            field: VALUE_FIELD,
        });
        self.counters.len() - 1
    }

    fn push_column(&mut self, label: &'static str, subsystem: Subsystem, source: Source, basis: Basis) {
        self.columns.push(Column {
            label,
            subsystem,
            source,
            basis,
        });
    }

    fn add_pmdk(&mut self) {
        for (label, name, line) in [
            ("Durability", "durability", 1),
            ("Logging", "logging", 2),
            ("Locking", "locking", 3),
            ("Allocation", "allocation", 4),
        ] {
            let counter = self.push_counter(name, line);
            self.push_column(label, Subsystem::Pmdk, Source::Counter(counter), Basis::Total);
        }
    }

    fn add_kv_counters(&mut self) -> Vec<(&'static str, usize)> {
        vec![
            ("Lookup", self.push_counter("lookup", 7)),
            ("Leaf fill", self.push_counter("leaf-fill", 8)),
            ("Leaf split", self.push_counter("leaf-split", 9)),
            ("Inner update", self.push_counter("inner-update", 10)),
            ("Recovery", self.push_counter("recovery", 11)),
        ]
    }

    pub fn variant(&self) -> SchemaVariant {
        self.variant
    }

    pub fn counters(&self) -> &[Counter] {
        &self.counters
    }

    pub fn total(&self) -> &Counter {
        &self.total
    }

    /// Charted columns, in the order percentage records store them.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn labels(&self) -> Vec<&'static str> {
        self.columns.iter().map(|column| column.label).collect()
    }

    /// Highest line index the parser has to read.
    pub fn max_line(&self) -> usize {
        self.counters
            .iter()
            .map(|counter| counter.line)
            .chain(std::iter::once(self.total.line))
            .max()
            .unwrap_or(self.total.line)
    }

    /// Subsystems in first-appearance order.
    pub fn subsystems(&self) -> Vec<Subsystem> {
        let mut subsystems = Vec::new();
        for column in &self.columns {
            if !subsystems.contains(&column.subsystem) {
                subsystems.push(column.subsystem);
            }
        }
        subsystems
    }

    /// Column indices belonging to `subsystem`, in legend order.
    pub fn columns_of(&self, subsystem: Subsystem) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, column)| column.subsystem == subsystem)
            .map(|(idx, _)| idx)
            .collect()
    }
}
