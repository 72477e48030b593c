//! Kernel Sources
//!
//! Finds kernel configs under the sources tree, resolves `inherits`, and
//! maps kernels to their work directories.

use crate::config::DseConfig;
use hlsdse_core::{DescriptorError, KernelConfig, KernelDescriptor, ToolSettings};
use serde_json::Value;
use std::path::{MAIN_SEPARATOR, Path, PathBuf};
use thiserror::Error;

/// Name of the per-kernel directory holding shared job state
pub const BASE_DIR: &str = "base";

/// Problems finding or loading kernel configs
#[derive(Debug, Error)]
pub enum KernelSourceError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is not valid JSON: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path} must contain a JSON object")]
    NotAnObject { path: PathBuf },

    #[error("{path} inherits from \"{parent}\", which inherits again")]
    NestedInheritance { path: PathBuf, parent: String },

    #[error("invalid kernel \"{kernel}\": {source}")]
    Descriptor {
        kernel: String,
        #[source]
        source: DescriptorError,
    },

    #[error("experiment \"{0}\" has no kernels")]
    NoKernels(String),
}

/// A kernel ready to be enumerated
#[derive(Debug, Clone)]
pub struct LoadedKernel {
    /// Kernel name
    pub name: String,
    /// Config after inheritance
    pub config: KernelConfig,
    /// Validated knob ranges
    pub descriptor: KernelDescriptor,
    /// Non-knob tool parameters
    pub settings: ToolSettings,
}

/// Resolved project directories
#[derive(Debug, Clone)]
pub struct Layout {
    sources: PathBuf,
    workspace: PathBuf,
    csvs: PathBuf,
}

impl Layout {
    /// Layout from configured paths
    pub fn from_config(config: &DseConfig) -> Self {
        Self {
            sources: config.resolve(&config.paths.sources),
            workspace: config.resolve(&config.paths.workspace),
            csvs: config.resolve(&config.paths.csvs),
        }
    }

    /// Layout rooted at explicit directories
    pub fn new(sources: PathBuf, workspace: PathBuf, csvs: PathBuf) -> Self {
        Self {
            sources,
            workspace,
            csvs,
        }
    }

    /// `<sources>/<experiment>/<kernel>/<kernel>.json`
    pub fn kernel_config(&self, experiment: &str, kernel: &str) -> PathBuf {
        self.sources
            .join(experiment)
            .join(kernel)
            .join(format!("{}.json", kernel))
    }

    /// Parent config named by an `inherits` value.
    ///
    /// The value is a path relative to the sources root, e.g. `baseline/gemm`.
    /// From the child's directory it climbs one level per path segment, then
    /// descends into the value; the file keeps the child's kernel name.
    pub fn parent_config(&self, experiment: &str, kernel: &str, inherits: &str) -> PathBuf {
        let mut dir = self.sources.join(experiment).join(kernel);
        for _ in 0..inherits.matches(MAIN_SEPARATOR).count() + 1 {
            dir.push("..");
        }
        dir.join(inherits).join(format!("{}.json", kernel))
    }

    /// `<workspace>/<experiment>/<kernel>`
    pub fn kernel_dir(&self, experiment: &str, kernel: &str) -> PathBuf {
        self.workspace.join(experiment).join(kernel)
    }

    /// `<workspace>/<experiment>/<kernel>/base`
    pub fn base_dir(&self, experiment: &str, kernel: &str) -> PathBuf {
        self.kernel_dir(experiment, kernel).join(BASE_DIR)
    }

    /// `<csvs>/<experiment>/<kernel>.csv`
    pub fn csv_path(&self, experiment: &str, kernel: &str) -> PathBuf {
        self.csvs.join(experiment).join(format!("{}.csv", kernel))
    }

    /// Kernel names of an experiment, sorted
    pub fn list_kernels(&self, experiment: &str) -> Result<Vec<String>, KernelSourceError> {
        let dir = self.sources.join(experiment);
        let entries = std::fs::read_dir(&dir).map_err(|source| KernelSourceError::Io {
            path: dir.clone(),
            source,
        })?;

        let mut kernels = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| KernelSourceError::Io {
                path: dir.clone(),
                source,
            })?;
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if self.kernel_config(experiment, &name).is_file() {
                kernels.push(name);
            }
        }

        if kernels.is_empty() {
            return Err(KernelSourceError::NoKernels(experiment.to_string()));
        }
        kernels.sort();
        Ok(kernels)
    }

    /// Load one kernel, following `inherits` one level (see `parent_config`)
    pub fn load_kernel(
        &self,
        experiment: &str,
        kernel: &str,
    ) -> Result<LoadedKernel, KernelSourceError> {
        let path = self.kernel_config(experiment, kernel);
        let child = read_object(&path)?;

        let value = match inherited_from(&child) {
            Some(parent) => {
                let parent_path = self.parent_config(experiment, kernel, &parent);
                let base = read_object(&parent_path)?;
                if inherited_from(&base).is_some() {
                    return Err(KernelSourceError::NestedInheritance { path, parent });
                }
                tracing::debug!(kernel, parent = %parent, "Applying inherited config");
                patch(base, child)
            }
            None => child,
        };

        let descriptor_error = |source| KernelSourceError::Descriptor {
            kernel: kernel.to_string(),
            source,
        };
        let config = KernelConfig::from_value(value).map_err(descriptor_error)?;
        let descriptor = config.descriptor().map_err(descriptor_error)?;
        let settings = config.tool_settings();

        tracing::info!(
            kernel,
            loops = descriptor.loops().len(),
            arrays = descriptor.arrays().len(),
            space = %descriptor.space_size(),
            "Loaded kernel"
        );

        Ok(LoadedKernel {
            name: kernel.to_string(),
            config,
            descriptor,
            settings,
        })
    }
}

fn read_object(path: &Path) -> Result<Value, KernelSourceError> {
    let text = std::fs::read_to_string(path).map_err(|source| KernelSourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_json::from_str(&text).map_err(|source| KernelSourceError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    if !value.is_object() {
        return Err(KernelSourceError::NotAnObject {
            path: path.to_path_buf(),
        });
    }
    Ok(value)
}

fn inherited_from(value: &Value) -> Option<String> {
    value
        .get("inherits")
        .and_then(Value::as_str)
        .filter(|parent| !parent.is_empty())
        .map(str::to_string)
}

/// Replace the parent's top-level keys with the child's, `inherits` excepted
fn patch(mut base: Value, child: Value) -> Value {
    if let (Some(base_map), Value::Object(child_map)) = (base.as_object_mut(), child) {
        base_map.remove("inherits");
        for (key, value) in child_map {
            if key != "inherits" {
                base_map.insert(key, value);
            }
        }
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;
    use hlsdse_core::OperatingUnit;
    use std::fs;

    const BASE_GEMM: &str = r#"{
        "periods": [10.0],
        "loops": [{ "bound": 8, "unrolling": [2, 4], "pipelining": true, "nest": {} }],
        "arrays": { "A": { "cyclic": [2] }, "B": { "block": [4] } },
        "platform": "zcu102"
    }"#;

    fn write_kernel(root: &Path, experiment: &str, kernel: &str, json: &str) {
        let dir = root.join("sources").join(experiment).join(kernel);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{}.json", kernel)), json).unwrap();
    }

    fn layout(root: &Path) -> Layout {
        Layout::new(
            root.join("sources"),
            root.join("workspace"),
            root.join("csvs"),
        )
    }

    #[test]
    fn test_list_kernels_sorted() {
        let dir = tempfile::tempdir().unwrap();
        write_kernel(dir.path(), "exp", "syrk", BASE_GEMM);
        write_kernel(dir.path(), "exp", "gemm", BASE_GEMM);
        fs::create_dir_all(dir.path().join("sources/exp/notes")).unwrap();

        let kernels = layout(dir.path()).list_kernels("exp").unwrap();
        assert_eq!(kernels, vec!["gemm", "syrk"]);
    }

    #[test]
    fn test_empty_experiment() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("sources/empty")).unwrap();
        assert!(matches!(
            layout(dir.path()).list_kernels("empty"),
            Err(KernelSourceError::NoKernels(_))
        ));
    }

    #[test]
    fn test_inheritance_overrides_top_level_keys() {
        let dir = tempfile::tempdir().unwrap();
        write_kernel(dir.path(), "baseline", "gemm", BASE_GEMM);
        write_kernel(
            dir.path(),
            "fast",
            "gemm",
            r#"{ "inherits": "baseline/gemm", "periods": [5.0, 2.5] }"#,
        );

        let kernel = layout(dir.path()).load_kernel("fast", "gemm").unwrap();
        let points = kernel.descriptor.operating_points();
        assert_eq!(points.unit, OperatingUnit::Period);
        assert_eq!(points.values, vec![5.0, 2.5]);
        // Loops and arrays come from the parent, in declaration order
        assert_eq!(kernel.descriptor.loops()[0].unrolling, vec![2, 4]);
        let names: Vec<&str> = kernel
            .descriptor
            .arrays()
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(kernel.settings.platform, "zcu102");
        assert_eq!(kernel.config.inherits, None);
    }

    #[test]
    fn test_inheritance_replaces_whole_keys() {
        let dir = tempfile::tempdir().unwrap();
        write_kernel(dir.path(), "baseline", "gemm", BASE_GEMM);
        write_kernel(
            dir.path(),
            "onearray",
            "gemm",
            r#"{ "inherits": "baseline/gemm", "arrays": { "B": { "complete": true } } }"#,
        );

        let kernel = layout(dir.path()).load_kernel("onearray", "gemm").unwrap();
        assert_eq!(kernel.descriptor.arrays().len(), 1);
        assert!(kernel.descriptor.arrays()[0].complete);
    }

    #[test]
    fn test_inheritance_is_one_level() {
        let dir = tempfile::tempdir().unwrap();
        write_kernel(dir.path(), "a", "gemm", BASE_GEMM);
        write_kernel(dir.path(), "b", "gemm", r#"{ "inherits": "a/gemm" }"#);
        write_kernel(dir.path(), "c", "gemm", r#"{ "inherits": "b/gemm" }"#);

        assert!(matches!(
            layout(dir.path()).load_kernel("c", "gemm"),
            Err(KernelSourceError::NestedInheritance { .. })
        ));
    }

    #[test]
    fn test_inheritance_relative_to_kernel_dir() {
        let dir = tempfile::tempdir().unwrap();
        write_kernel(dir.path(), "baseline", "gemm", BASE_GEMM);
        // A single segment stays inside the child's experiment
        let variants = dir.path().join("sources/tuned/variants");
        fs::create_dir_all(&variants).unwrap();
        fs::write(variants.join("gemm.json"), r#"{ "periods": [4.0] }"#).unwrap();
        write_kernel(dir.path(), "tuned", "gemm", r#"{ "inherits": "variants" }"#);
        write_kernel(
            dir.path(),
            "slow",
            "gemm",
            r#"{ "inherits": "baseline/gemm", "periods": [20.0] }"#,
        );

        let layout = layout(dir.path());
        let tuned = layout.load_kernel("tuned", "gemm").unwrap();
        assert_eq!(tuned.descriptor.operating_points().values, vec![4.0]);
        assert!(tuned.descriptor.loops().is_empty());

        let slow = layout.load_kernel("slow", "gemm").unwrap();
        assert_eq!(slow.descriptor.operating_points().values, vec![20.0]);
        assert_eq!(slow.descriptor.arrays().len(), 2);
    }

    #[test]
    fn test_missing_parent_config() {
        let dir = tempfile::tempdir().unwrap();
        write_kernel(dir.path(), "tuned", "gemm", r#"{ "inherits": "baseline/gemm" }"#);

        assert!(matches!(
            layout(dir.path()).load_kernel("tuned", "gemm"),
            Err(KernelSourceError::Io { .. })
        ));
    }

    #[test]
    fn test_invalid_descriptor_names_kernel() {
        let dir = tempfile::tempdir().unwrap();
        write_kernel(dir.path(), "exp", "bad", r#"{ "loops": [] }"#);

        let err = layout(dir.path()).load_kernel("exp", "bad").unwrap_err();
        assert!(err.to_string().contains("bad"));
        assert!(matches!(
            err,
            KernelSourceError::Descriptor {
                source: DescriptorError::MissingOperatingPoints,
                ..
            }
        ));
    }

    #[test]
    fn test_paths() {
        let layout = Layout::new("s".into(), "w".into(), "c".into());
        assert_eq!(
            layout.kernel_config("exp", "gemm"),
            PathBuf::from("s/exp/gemm/gemm.json")
        );
        assert_eq!(
            layout.parent_config("exp", "gemm", "baseline/gemm"),
            PathBuf::from("s/exp/gemm/../../baseline/gemm/gemm.json")
        );
        assert_eq!(
            layout.parent_config("exp", "gemm", "shared"),
            PathBuf::from("s/exp/gemm/../shared/gemm.json")
        );
        assert_eq!(layout.base_dir("exp", "gemm"), PathBuf::from("w/exp/gemm/base"));
        assert_eq!(layout.csv_path("exp", "gemm"), PathBuf::from("c/exp/gemm.csv"));
    }
}
