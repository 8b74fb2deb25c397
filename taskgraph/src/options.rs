use std::path::Path;

use common::FileFormat;
use serde::{Deserialize, Serialize};

/// What a call graph does with a wanted output that is currently disabled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisabledOutputPolicy {
    /// `build` fails with `Error::OutputDisabled`.
    #[default]
    Raise,
    /// The output is left out of the plan until it is enabled again.
    Drop,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallGraphOptions {
    pub disabled_outputs: DisabledOutputPolicy,
    /// Mirror every executed call into the graph's logger.
    pub record_calls: bool,
}

impl CallGraphOptions {
    pub fn from_str(serialized: &str, format: FileFormat) -> anyhow::Result<Self> {
        Ok(common::deserialize(serialized, format)?)
    }

    pub fn from_yaml(serialized: &str) -> anyhow::Result<Self> {
        Self::from_str(serialized, FileFormat::Yaml)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let format = FileFormat::from_file_name(&path.to_string_lossy())?;
        let serialized = std::fs::read_to_string(path)?;

        Self::from_str(&serialized, format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() -> anyhow::Result<()> {
        let options = CallGraphOptions::from_yaml("record_calls: true\n")?;
        assert_eq!(options.disabled_outputs, DisabledOutputPolicy::Raise);
        assert!(options.record_calls);

        let options = CallGraphOptions::from_str("{\"disabled_outputs\": \"Drop\"}", FileFormat::Json)?;
        assert_eq!(options.disabled_outputs, DisabledOutputPolicy::Drop);
        assert!(!options.record_calls);

        Ok(())
    }

    #[test]
    fn from_file_detects_format() -> anyhow::Result<()> {
        let path = std::env::temp_dir().join(format!("call_graph_options_{}.yaml", std::process::id()));
        std::fs::write(&path, "disabled_outputs: Drop\n")?;

        let options = CallGraphOptions::from_file(&path);
        std::fs::remove_file(&path)?;
        assert_eq!(options?.disabled_outputs, DisabledOutputPolicy::Drop);

        assert!(CallGraphOptions::from_file("options.toml").is_err());

        Ok(())
    }
}
