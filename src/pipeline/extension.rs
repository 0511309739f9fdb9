//! External-process extensions.
//!
//! An extension is invoked as `<path> --<key> <path> ...` with one pair per
//! available artifact, from its own directory, and is expected to edit the
//! referenced files in place and exit with status 0.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use derive_builder::Builder;

use super::config::PipelineConfig;
use super::Artifacts;
use crate::error::PipelineError;

/// Directory of the running executable.
pub const EXECUTABLE_DIR_ALIAS: &str = "%e";
/// Directory holding the voice configuration.
pub const VOICE_DIR_ALIAS: &str = "%v";
/// Directory of the host application.
pub const HOST_DIR_ALIAS: &str = "%u";

/// Targets of the path aliases accepted in extension paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Builder)]
#[builder(setter(into, strip_option), default)]
pub struct ExtensionAliases {
    executable_dir: Option<PathBuf>,
    voice_dir: Option<PathBuf>,
    host_dir: Option<PathBuf>,
}

impl ExtensionAliases {
    /// Aliases for a run driven by `config` from the current executable.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let mut builder = ExtensionAliasesBuilder::default();
        builder.voice_dir(config.voice_dir.clone());
        if let Some(dir) = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
        {
            builder.executable_dir(dir);
        }
        if let Some(dir) = &config.host_dir {
            builder.host_dir(dir.clone());
        }
        builder
            .build()
            .map_err(|e| PipelineError::Config(format!("extension aliases: {e}")))
    }

    /// Replace every alias in `raw`. An alias without a target is an error.
    pub fn expand(&self, raw: &str) -> Result<PathBuf, PipelineError> {
        let mut expanded = raw.trim().trim_matches('"').to_string();
        for (alias, target) in [
            (EXECUTABLE_DIR_ALIAS, &self.executable_dir),
            (VOICE_DIR_ALIAS, &self.voice_dir),
            (HOST_DIR_ALIAS, &self.host_dir),
        ] {
            if !expanded.contains(alias) {
                continue;
            }
            let Some(target) = target else {
                return Err(PipelineError::ExtensionInvocation {
                    command: raw.to_string(),
                    cwd: PathBuf::new(),
                    reason: format!("`{alias}` is used but its directory is not known"),
                });
            };
            expanded = expanded.replace(alias, &target.to_string_lossy());
        }

        let path = PathBuf::from(expanded);
        match &self.voice_dir {
            Some(voice_dir) if path.is_relative() => Ok(voice_dir.join(path)),
            _ => Ok(path),
        }
    }
}

/// A resolved, existing extension file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    path: PathBuf,
    interpreter: Option<PathBuf>,
}

impl Extension {
    pub fn new(path: impl Into<PathBuf>, interpreter: Option<PathBuf>) -> Self {
        Self {
            path: path.into(),
            interpreter,
        }
    }

    /// Expand aliases in `raw`, check that the file exists and pick an
    /// interpreter from its file extension.
    pub fn resolve(
        raw: &str,
        aliases: &ExtensionAliases,
        interpreters: &BTreeMap<String, PathBuf>,
    ) -> Result<Self, PipelineError> {
        let path = aliases.expand(raw)?;
        let missing = |reason: &str| PipelineError::ExtensionInvocation {
            command: path.display().to_string(),
            cwd: working_dir(&path),
            reason: reason.to_string(),
        };
        if !path.exists() {
            return Err(missing("extension file not found"));
        }
        if !path.is_file() {
            return Err(missing("extension path is not a file"));
        }

        let interpreter = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| interpreters.get(&ext.to_ascii_lowercase()))
            .cloned();
        Ok(Self::new(path, interpreter))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn working_dir(&self) -> PathBuf {
        working_dir(&self.path)
    }

    fn argv(&self, artifacts: &Artifacts) -> Vec<OsString> {
        let mut argv = Vec::new();
        if let Some(interpreter) = &self.interpreter {
            argv.push(interpreter.as_os_str().to_os_string());
        }
        argv.push(self.path.as_os_str().to_os_string());
        argv.extend(artifacts.to_args());
        argv
    }

    /// The command as a single printable string.
    pub fn command_line(&self, artifacts: &Artifacts) -> String {
        self.argv(artifacts)
            .iter()
            .map(|arg| {
                let arg = arg.to_string_lossy();
                if arg.contains(' ') {
                    format!("\"{arg}\"")
                } else {
                    arg.into_owned()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn command(&self, artifacts: &Artifacts) -> Command {
        let argv = self.argv(artifacts);
        let mut command = Command::new(&argv[0]);
        command.args(&argv[1..]).current_dir(self.working_dir());
        command
    }

    /// Run the extension and wait for it. A non-zero exit status is an error
    /// carrying the captured stderr.
    pub fn run(&self, artifacts: &Artifacts) -> Result<(), PipelineError> {
        let command_line = self.command_line(artifacts);
        let cwd = self.working_dir();
        log::info!("Running extension: {command_line}");

        let output = self
            .command(artifacts)
            .output()
            .map_err(|e| PipelineError::ExtensionInvocation {
                command: command_line.clone(),
                cwd: cwd.clone(),
                reason: format!("failed to start: {e}"),
            })?;

        log_output(&output);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            let reason = if stderr.is_empty() {
                format!("exited with {}", output.status)
            } else {
                format!("exited with {}: {stderr}", output.status)
            };
            return Err(PipelineError::ExtensionInvocation {
                command: command_line,
                cwd,
                reason,
            });
        }
        Ok(())
    }
}

fn working_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

fn log_output(output: &Output) {
    for line in String::from_utf8_lossy(&output.stdout).lines() {
        log::info!("  | {line}");
    }
    if output.status.success() {
        for line in String::from_utf8_lossy(&output.stderr).lines() {
            log::debug!("  ! {line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::{Path, PathBuf};

    use super::{Extension, ExtensionAliases, ExtensionAliasesBuilder};
    use crate::error::PipelineError;
    use crate::pipeline::{ArtifactKey, Artifacts};

    fn aliases() -> ExtensionAliases {
        ExtensionAliasesBuilder::default()
            .executable_dir("/opt/svs")
            .voice_dir("/voices/alto")
            .build()
            .unwrap()
    }

    #[test]
    fn aliases_expand_to_their_directories() {
        let aliases = aliases();
        assert_eq!(
            aliases.expand("%e/extensions/fix.py").unwrap(),
            PathBuf::from("/opt/svs/extensions/fix.py")
        );
        assert_eq!(
            aliases.expand("\"%v/timing.sh\"").unwrap(),
            PathBuf::from("/voices/alto/timing.sh")
        );
    }

    #[test]
    fn relative_paths_are_taken_from_the_voice_directory() {
        assert_eq!(
            aliases().expand("tools/edit.sh").unwrap(),
            PathBuf::from("/voices/alto/tools/edit.sh")
        );
    }

    #[test]
    fn alias_without_target_is_an_invocation_error() {
        let err = aliases().expand("%u/plugins/x.exe").unwrap_err();
        assert!(matches!(err, PipelineError::ExtensionInvocation { .. }));
        assert!(err.to_string().contains("%u"), "{err}");
    }

    #[test]
    fn missing_file_is_an_invocation_error() {
        let dir = tempfile::tempdir().unwrap();
        let aliases = ExtensionAliasesBuilder::default()
            .voice_dir(dir.path())
            .build()
            .unwrap();
        let err = Extension::resolve("%v/nope.sh", &aliases, &BTreeMap::new()).unwrap_err();
        assert!(err.to_string().contains("not found"), "{err}");

        let err = Extension::resolve("%v", &aliases, &BTreeMap::new()).unwrap_err();
        assert!(err.to_string().contains("not a file"), "{err}");
    }

    #[test]
    fn scripts_go_through_their_interpreter() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fix.py"), "").unwrap();
        let aliases = ExtensionAliasesBuilder::default()
            .voice_dir(dir.path())
            .build()
            .unwrap();
        let interpreters = BTreeMap::from([("py".to_string(), PathBuf::from("python3"))]);

        let extension = Extension::resolve("fix.py", &aliases, &interpreters).unwrap();
        let mut artifacts = Artifacts::new();
        artifacts.insert(ArtifactKey::FullScore, "/w/song_score.full");

        let command = extension.command(&artifacts);
        assert_eq!(command.get_program(), "python3");
        let args: Vec<_> = command.get_args().collect();
        assert_eq!(args[0], dir.path().join("fix.py").as_os_str());
        assert_eq!(args[1], "--full_score");
        assert_eq!(args[2], "/w/song_score.full");
        assert_eq!(command.get_current_dir(), Some(dir.path()));
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_reports_command_and_stderr() {
        let extension = Extension::new("/bin/sh", None);
        let mut artifacts = Artifacts::new();
        artifacts.insert(ArtifactKey::Wav, "/nonexistent/song.wav");

        let err = extension.run(&artifacts).unwrap_err();
        match err {
            PipelineError::ExtensionInvocation { command, cwd, reason } => {
                assert!(command.starts_with("/bin/sh --wav"), "{command}");
                assert_eq!(cwd, Path::new("/bin"));
                assert!(reason.contains("exited"), "{reason}");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
