//! Kernel Configuration
//!
//! Serde model of a kernel's JSON configuration file. Loop nests are written
//! recursively (`"nest": { ... }`, with `{}` closing the nest) and are
//! flattened into `LoopLevel`s when a `KernelDescriptor` is built.

use crate::descriptor::{ArrayOptions, KernelDescriptor, LoopLevel, OperatingPoints};
use crate::error::DescriptorError;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Kernel configuration as stored in `<kernel>.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Parent experiment this config patches (resolved by the config source)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherits: Option<String>,
    /// Clock periods in ns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub periods: Option<Vec<f64>>,
    /// Clock frequencies in MHz
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequencies: Option<Vec<f64>>,
    /// Top-level loop nests
    #[serde(default)]
    pub loops: Vec<LoopConfig>,
    /// Arrays in declaration order
    #[serde(default)]
    pub arrays: ArrayTable,
    /// Arrays kept off-chip (never partitioned)
    #[serde(default)]
    pub offchip: Vec<String>,
    /// Target platform handed to the synthesis tool
    #[serde(default)]
    pub platform: String,
    /// Loop the tool analyses
    #[serde(default)]
    pub loopid: u32,
    /// Enable vectorisation in the tool
    #[serde(default)]
    pub vectorise: bool,
    /// DDR scheduling policy
    #[serde(default)]
    pub ddrpolicy: u8,
    /// Enable DDR banking
    #[serde(default)]
    pub banking: bool,
}

/// One loop of a nest, possibly containing the next deeper loop
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoopConfig {
    /// Full trip count
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound: Option<u64>,
    /// Source line of the loop header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Legal unroll factors
    #[serde(default)]
    pub unrolling: Vec<u32>,
    /// Whether the loop may be pipelined
    #[serde(default)]
    pub pipelining: bool,
    /// Next deeper loop; an empty object ends the nest
    #[serde(
        default,
        deserialize_with = "deserialize_nest",
        skip_serializing_if = "Option::is_none"
    )]
    pub nest: Option<Box<LoopConfig>>,
}

/// Partitioning options of one array
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayConfig {
    /// Block partitioning factors
    #[serde(default)]
    pub block: Vec<u32>,
    /// Cyclic partitioning factors
    #[serde(default)]
    pub cyclic: Vec<u32>,
    /// Whether complete partitioning is allowed
    #[serde(default)]
    pub complete: bool,
}

/// Arrays keyed by name, keeping the order they were declared in
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArrayTable(pub Vec<(String, ArrayConfig)>);

/// Tool parameters that are not design knobs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ToolSettings {
    /// Target platform
    pub platform: String,
    /// Loop the tool analyses
    pub loop_id: u32,
    /// Enable vectorisation
    pub vectorise: bool,
    /// DDR scheduling policy
    pub ddr_policy: u8,
    /// Enable DDR banking
    pub banking: bool,
}

impl KernelConfig {
    /// Parse a kernel config from JSON text
    pub fn from_json(text: &str) -> Result<Self, DescriptorError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Parse a kernel config from an already-resolved JSON value
    pub fn from_value(value: serde_json::Value) -> Result<Self, DescriptorError> {
        Ok(serde_json::from_value(value)?)
    }

    /// Tool parameters carried alongside the knobs
    pub fn tool_settings(&self) -> ToolSettings {
        ToolSettings {
            platform: self.platform.clone(),
            loop_id: self.loopid,
            vectorise: self.vectorise,
            ddr_policy: self.ddrpolicy,
            banking: self.banking,
        }
    }

    /// Flatten and validate into a `KernelDescriptor`
    pub fn descriptor(&self) -> Result<KernelDescriptor, DescriptorError> {
        let operating_points = match (&self.periods, &self.frequencies) {
            (Some(periods), None) => OperatingPoints::periods(periods.clone()),
            (None, Some(frequencies)) => OperatingPoints::frequencies(frequencies.clone()),
            (Some(_), Some(_)) => return Err(DescriptorError::ConflictingOperatingPoints),
            (None, None) => return Err(DescriptorError::MissingOperatingPoints),
        };

        let mut loops = Vec::new();
        for (level_id, nest) in self.loops.iter().enumerate() {
            let mut depth = 1;
            let mut current = Some(nest);
            while let Some(lop) = current {
                loops.push(LoopLevel {
                    level_id,
                    depth,
                    bound: lop.bound,
                    line: lop.line,
                    unrolling: lop.unrolling.clone(),
                    pipelining: lop.pipelining,
                });
                depth += 1;
                current = lop.nest.as_deref();
            }
        }

        if let Some(unknown) = self
            .offchip
            .iter()
            .find(|name| !self.arrays.0.iter().any(|(declared, _)| declared == *name))
        {
            return Err(DescriptorError::UnknownArray(unknown.clone()));
        }

        let arrays = self
            .arrays
            .0
            .iter()
            .filter(|(name, _)| !self.offchip.contains(name))
            .map(|(name, cfg)| ArrayOptions {
                name: name.clone(),
                block: cfg.block.clone(),
                cyclic: cfg.cyclic.clone(),
                complete: cfg.complete,
            })
            .collect();

        KernelDescriptor::new(loops, arrays, operating_points)
    }
}

fn deserialize_nest<'de, D>(deserializer: D) -> Result<Option<Box<LoopConfig>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::Object(map)) if map.is_empty() => Ok(None),
        Some(other) => serde_json::from_value(other)
            .map(|lop| Some(Box::new(lop)))
            .map_err(de::Error::custom),
    }
}

impl<'de> Deserialize<'de> for ArrayTable {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ArrayTableVisitor;

        impl<'de> Visitor<'de> for ArrayTableVisitor {
            type Value = ArrayTable;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of array names to partitioning options")
            }

            fn visit_map<A>(self, mut access: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((name, cfg)) = access.next_entry::<String, ArrayConfig>()? {
                    if entries.iter().any(|(existing, _): &(String, ArrayConfig)| *existing == name) {
                        return Err(de::Error::custom(format!("array \"{}\" declared twice", name)));
                    }
                    entries.push((name, cfg));
                }
                Ok(ArrayTable(entries))
            }
        }

        deserializer.deserialize_map(ArrayTableVisitor)
    }
}

impl Serialize for ArrayTable {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, cfg) in &self.0 {
            map.serialize_entry(name, cfg)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::OperatingUnit;

    const GEMM: &str = r#"{
        "periods": [10.0, 5.0],
        "loops": [
            {
                "bound": 32, "line": 10, "unrolling": [2, 4], "pipelining": true,
                "nest": {
                    "bound": 32, "unrolling": [2], "pipelining": true,
                    "nest": { "bound": 32, "unrolling": [], "pipelining": false, "nest": {} }
                }
            },
            { "bound": 16, "unrolling": [], "pipelining": true, "nest": {} }
        ],
        "arrays": {
            "C": { "block": [], "cyclic": [2, 4], "complete": false },
            "A": { "block": [2], "cyclic": [], "complete": true },
            "B": { "block": [2], "cyclic": [], "complete": false }
        },
        "offchip": ["B"],
        "platform": "zcu102",
        "loopid": 1
    }"#;

    #[test]
    fn test_flattens_nests() {
        let config = KernelConfig::from_json(GEMM).unwrap();
        let descriptor = config.descriptor().unwrap();

        let levels: Vec<(usize, u32)> = descriptor
            .loops()
            .iter()
            .map(|l| (l.level_id, l.depth))
            .collect();
        assert_eq!(levels, vec![(0, 1), (0, 2), (0, 3), (1, 1)]);
        assert_eq!(descriptor.loops()[0].line, Some(10));
        assert_eq!(descriptor.loops()[1].unrolling, vec![2]);
        assert_eq!(descriptor.loops()[3].bound, Some(16));
    }

    #[test]
    fn test_keeps_array_order_and_drops_offchip() {
        let config = KernelConfig::from_json(GEMM).unwrap();
        let descriptor = config.descriptor().unwrap();

        let names: Vec<&str> = descriptor.arrays().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["C", "A"]);
    }

    #[test]
    fn test_operating_unit_selection() {
        let config = KernelConfig::from_json(GEMM).unwrap();
        let descriptor = config.descriptor().unwrap();
        assert_eq!(descriptor.operating_points().unit, OperatingUnit::Period);

        let mut config = config;
        config.periods = None;
        assert!(matches!(
            config.descriptor(),
            Err(DescriptorError::MissingOperatingPoints)
        ));

        config.frequencies = Some(vec![100.0]);
        config.periods = Some(vec![10.0]);
        assert!(matches!(
            config.descriptor(),
            Err(DescriptorError::ConflictingOperatingPoints)
        ));
    }

    #[test]
    fn test_unknown_offchip_array() {
        let config = KernelConfig::from_json(
            r#"{ "frequencies": [100.0], "arrays": {}, "offchip": ["X"] }"#,
        )
        .unwrap();
        assert!(matches!(
            config.descriptor(),
            Err(DescriptorError::UnknownArray(name)) if name == "X"
        ));
    }

    #[test]
    fn test_tool_settings() {
        let config = KernelConfig::from_json(GEMM).unwrap();
        let settings = config.tool_settings();
        assert_eq!(settings.platform, "zcu102");
        assert_eq!(settings.loop_id, 1);
        assert!(!settings.vectorise);
    }
}
