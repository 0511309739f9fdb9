//! Pipeline configuration file.
//!
//! ```json
//! {
//!   "extensions": {
//!     "timelag_calculator": "built-in",
//!     "score_editor": ["%e/extensions/lyric_fix.py"],
//!     "timing_editor": "%v/timing.sh",
//!     "acoustic_calculator": "skip"
//!   },
//!   "timing_repair": { "min_duration": 50000 },
//!   "segmentation": { "policy": "long" }
//! }
//! ```
//!
//! Extension values are normalised once here, so the driver only ever sees
//! a [`Disposition`] per stage and an ordered editor list.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::Stage;
use crate::error::PipelineError;
use crate::segment::SegmentPolicy;
use crate::timing::TimingRepairConfig;

/// Literal selecting the built-in implementation of a stage.
pub const BUILT_IN: &str = "built-in";

/// Literal disabling a stage.
pub const SKIP: &str = "skip";

/// Raw value of one `extensions` entry.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(untagged)]
pub enum ExtensionConfig {
    #[default]
    None,
    Single(String),
    Many(Vec<String>),
}

/// How a stage is carried out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Skip,
    BuiltIn,
    /// Extension path, aliases not yet expanded.
    Process(String),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default)]
    extensions: Option<BTreeMap<String, ExtensionConfig>>,
    #[serde(default)]
    timing_repair: Option<TimingRepairConfig>,
    #[serde(default)]
    segmentation: Option<SegmentPolicy>,
    #[serde(default)]
    interpreters: BTreeMap<String, PathBuf>,
    #[serde(default)]
    keep_working_directory: bool,
    #[serde(default)]
    working_root: Option<PathBuf>,
    #[serde(default)]
    host_dir: Option<PathBuf>,
}

/// Resolved pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    calculators: BTreeMap<Stage, Disposition>,
    editors: BTreeMap<Stage, Vec<String>>,
    /// Repair applied to the timing label right after it is produced.
    pub timing_repair: Option<TimingRepairConfig>,
    /// Export the final timing label as segments.
    pub segmentation: Option<SegmentPolicy>,
    /// File extension (without dot) → interpreter binary.
    pub interpreters: BTreeMap<String, PathBuf>,
    pub keep_working_directory: bool,
    /// Parent of the per-run working directories; system temp dir if unset.
    pub working_root: Option<PathBuf>,
    /// Target of the `%u` alias.
    pub host_dir: Option<PathBuf>,
    /// Directory holding the configuration file; target of the `%v` alias.
    pub voice_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            calculators: BTreeMap::new(),
            editors: BTreeMap::new(),
            timing_repair: None,
            segmentation: None,
            interpreters: default_interpreters(),
            keep_working_directory: false,
            working_root: None,
            host_dir: None,
            voice_dir: PathBuf::from("."),
        }
    }
}

fn default_interpreters() -> BTreeMap<String, PathBuf> {
    let python = if cfg!(windows) { "python" } else { "python3" };
    BTreeMap::from([("py".to_string(), PathBuf::from(python))])
}

impl PipelineConfig {
    /// Read a configuration file; `%v` resolves to its directory.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let content = fs::read_to_string(path)?;
        let voice_dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.canonicalize()?,
            _ => std::env::current_dir()?,
        };
        log::info!("Loading pipeline configuration from {}", path.display());
        Self::from_json(&content, voice_dir)
    }

    pub fn from_json(content: &str, voice_dir: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let raw: RawConfig = serde_json::from_str(content)?;

        let mut config = PipelineConfig {
            timing_repair: raw.timing_repair,
            segmentation: raw.segmentation,
            keep_working_directory: raw.keep_working_directory,
            working_root: raw.working_root,
            host_dir: raw.host_dir,
            voice_dir: voice_dir.into(),
            ..Default::default()
        };
        config.interpreters.extend(raw.interpreters);

        if let Some(policy) = &config.segmentation {
            policy.validate()?;
        }
        if let Some(repair) = &config.timing_repair {
            if repair.min_duration < 0 {
                return Err(PipelineError::Config(format!(
                    "timing_repair.min_duration must not be negative, got {}",
                    repair.min_duration
                )));
            }
        }

        for (key, value) in raw.extensions.unwrap_or_default() {
            if let Some(stage) = Stage::ALL.into_iter().find(|s| s.calculator_key() == key) {
                config.calculators.insert(stage, calculator_disposition(&key, value)?);
            } else if let Some(stage) = Stage::ALL.into_iter().find(|s| s.editor_key() == key) {
                config.editors.insert(stage, editor_list(&key, value)?);
            } else {
                return Err(PipelineError::Config(format!("unknown extension key `{key}`")));
            }
        }
        Ok(config)
    }

    /// Disposition of `stage`; built-in unless configured otherwise.
    pub fn calculator(&self, stage: Stage) -> &Disposition {
        self.calculators.get(&stage).unwrap_or(&Disposition::BuiltIn)
    }

    pub fn set_calculator(&mut self, stage: Stage, disposition: Disposition) {
        self.calculators.insert(stage, disposition);
    }

    /// Editors run after `stage`, in order.
    pub fn editors(&self, stage: Stage) -> &[String] {
        self.editors.get(&stage).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn set_editors(&mut self, stage: Stage, editors: Vec<String>) {
        self.editors.insert(stage, editors);
    }

    /// Interpreter registered for the file extension of `script`, if any.
    pub fn interpreter_for(&self, script: &Path) -> Option<&Path> {
        let extension = script.extension()?.to_str()?.to_ascii_lowercase();
        self.interpreters.get(&extension).map(PathBuf::as_path)
    }
}

fn calculator_disposition(key: &str, value: ExtensionConfig) -> Result<Disposition, PipelineError> {
    match value {
        ExtensionConfig::None => Ok(Disposition::BuiltIn),
        ExtensionConfig::Single(path) => Ok(match path.trim() {
            "" | BUILT_IN => Disposition::BuiltIn,
            SKIP => Disposition::Skip,
            _ => Disposition::Process(path),
        }),
        ExtensionConfig::Many(_) => Err(PipelineError::Config(format!(
            "`{key}` takes a single path, `{BUILT_IN}` or `{SKIP}`, not a list"
        ))),
    }
}

fn editor_list(key: &str, value: ExtensionConfig) -> Result<Vec<String>, PipelineError> {
    let paths = match value {
        ExtensionConfig::None => Vec::new(),
        ExtensionConfig::Single(path) => vec![path],
        ExtensionConfig::Many(paths) => paths,
    };
    let mut editors = Vec::with_capacity(paths.len());
    for path in paths {
        match path.trim() {
            "" => continue,
            BUILT_IN | SKIP => {
                return Err(PipelineError::Config(format!(
                    "`{key}` is an editor list; `{}` is only valid for calculators",
                    path.trim()
                )))
            }
            _ => editors.push(path),
        }
    }
    Ok(editors)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{Disposition, PipelineConfig};
    use crate::pipeline::Stage;
    use crate::segment::SegmentPolicy;

    #[test]
    fn empty_config_is_all_built_in() {
        let config = PipelineConfig::from_json("{}", "/voice").unwrap();
        for stage in Stage::ALL {
            assert_eq!(config.calculator(stage), &Disposition::BuiltIn);
            assert!(config.editors(stage).is_empty());
        }
        assert!(config.timing_repair.is_none());
        assert!(config.segmentation.is_none());
    }

    #[test]
    fn extension_values_are_normalised() {
        let config = PipelineConfig::from_json(
            r#"{
                "extensions": {
                    "ust_converter": null,
                    "timelag_calculator": "built-in",
                    "duration_calculator": "",
                    "timing_calculator": "%v/timing.sh",
                    "acoustic_calculator": "skip",
                    "score_editor": ["%e/a.py", "", "%e/b.py"],
                    "timing_editor": "%v/edit.sh",
                    "wav_editor": null
                }
            }"#,
            "/voice",
        )
        .unwrap();

        assert_eq!(config.calculator(Stage::Score), &Disposition::BuiltIn);
        assert_eq!(config.calculator(Stage::Timelag), &Disposition::BuiltIn);
        assert_eq!(config.calculator(Stage::Duration), &Disposition::BuiltIn);
        assert_eq!(
            config.calculator(Stage::Timing),
            &Disposition::Process("%v/timing.sh".to_string())
        );
        assert_eq!(config.calculator(Stage::Acoustic), &Disposition::Skip);
        assert_eq!(config.editors(Stage::Score), ["%e/a.py", "%e/b.py"]);
        assert_eq!(config.editors(Stage::Timing), ["%v/edit.sh"]);
        assert!(config.editors(Stage::Wav).is_empty());
    }

    #[test]
    fn list_for_calculator_is_rejected() {
        let err = PipelineConfig::from_json(
            r#"{"extensions": {"timing_calculator": ["a", "b"]}}"#,
            "/voice",
        )
        .unwrap_err();
        assert!(err.to_string().contains("timing_calculator"), "{err}");
    }

    #[test]
    fn built_in_editor_is_rejected() {
        assert!(PipelineConfig::from_json(
            r#"{"extensions": {"timing_editor": "built-in"}}"#,
            "/voice"
        )
        .is_err());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(PipelineConfig::from_json(r#"{"extensions": {"pitch_editor": "x"}}"#, "/v").is_err());
        assert!(PipelineConfig::from_json(r#"{"extension": {}}"#, "/v").is_err());
    }

    #[test]
    fn numeric_extension_value_is_a_json_error() {
        assert!(PipelineConfig::from_json(r#"{"extensions": {"timing_editor": 3}}"#, "/v").is_err());
    }

    #[test]
    fn repair_segmentation_and_interpreters() {
        let config = PipelineConfig::from_json(
            r#"{
                "timing_repair": {"min_duration": 300, "monotonize_unit": 10},
                "segmentation": {"policy": "middle", "frequency": 4},
                "interpreters": {"rb": "ruby"}
            }"#,
            "/voice",
        )
        .unwrap();
        let repair = config.timing_repair.unwrap();
        assert_eq!((repair.min_duration, repair.monotonize_unit), (300, Some(10)));
        assert_eq!(config.segmentation, Some(SegmentPolicy::Middle { frequency: 4 }));
        assert_eq!(
            config.interpreter_for(Path::new("/x/fix.rb")),
            Some(Path::new("ruby"))
        );
        assert!(config.interpreter_for(Path::new("/x/fix.PY")).is_some());
        assert_eq!(config.interpreter_for(Path::new("/x/fix.sh")), None);
    }

    #[test]
    fn zero_segmentation_frequency_is_rejected() {
        assert!(PipelineConfig::from_json(
            r#"{"segmentation": {"policy": "middle", "frequency": 0}}"#,
            "/voice"
        )
        .is_err());
    }
}
