//! External GRAL engine invocation

use crate::error::{Result, Sumo2GralError};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, info};

/// Something that runs a dispersion simulation over the inputs in a directory
///
/// Implementations:
/// - `GralEngine`: the real GRAL executable
/// - test doubles that write raw result files
pub trait Engine: Send + Sync {
    fn run(&self, base_directory: &Path) -> impl Future<Output = Result<()>> + Send;
}

/// GRAL executable or .NET assembly
#[derive(Debug, Clone)]
pub struct GralEngine {
    program: PathBuf,
}

impl GralEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        GralEngine {
            program: program.into(),
        }
    }

    /// `.dll` assemblies run through `dotnet`; anything else is executed directly
    fn command(&self) -> Result<Command> {
        let program = std::path::absolute(&self.program)
            .map_err(|e| Sumo2GralError::io(&self.program, e))?;
        let is_assembly = program
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("dll"));

        Ok(if is_assembly {
            let mut cmd = Command::new("dotnet");
            cmd.arg(program);
            cmd
        } else {
            Command::new(program)
        })
    }
}

impl Engine for GralEngine {
    async fn run(&self, base_directory: &Path) -> Result<()> {
        if !self.program.exists() {
            return Err(Sumo2GralError::Engine(format!(
                "GRAL engine not found at {}",
                self.program.display()
            )));
        }
        let mut command = self.command()?;
        command.current_dir(base_directory).kill_on_drop(true);
        debug!("Running {:?} in {}", command.as_std(), base_directory.display());

        let start = Instant::now();
        let status = command
            .status()
            .await
            .map_err(|e| Sumo2GralError::Engine(format!("failed to start {}: {}", self.program.display(), e)))?;

        if !status.success() {
            return Err(Sumo2GralError::Engine(format!(
                "{} exited with {}",
                self.program.display(),
                status
            )));
        }
        info!("✓ GRAL finished in {:.1?}", start.elapsed());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dll_runs_through_dotnet() {
        let engine = GralEngine::new("bin/GRAL.dll");
        let cmd = engine.command().unwrap();
        assert_eq!(cmd.as_std().get_program(), "dotnet");
        let args: Vec<_> = cmd.as_std().get_args().collect();
        assert_eq!(args.len(), 1);
        assert!(Path::new(args[0]).is_absolute());
        assert!(args[0].to_string_lossy().ends_with("GRAL.dll"));
    }

    #[test]
    fn test_executable_runs_directly() {
        let engine = GralEngine::new("/opt/gral/GRAL");
        let cmd = engine.command().unwrap();
        assert_eq!(cmd.as_std().get_program(), "/opt/gral/GRAL");
        assert_eq!(cmd.as_std().get_args().count(), 0);
    }

    #[tokio::test]
    async fn test_missing_engine() {
        let dir = tempfile::tempdir().unwrap();
        let engine = GralEngine::new(dir.path().join("nope.dll"));
        assert!(matches!(engine.run(dir.path()).await, Err(Sumo2GralError::Engine(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_exit_status_is_checked() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake_gral.sh");
        std::fs::write(&script, "#!/bin/sh\ntouch ran.txt\nexit 3\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let engine = GralEngine::new(&script);
        let err = engine.run(dir.path()).await.unwrap_err();
        assert!(matches!(err, Sumo2GralError::Engine(_)));
        // Ran in the base directory
        assert!(dir.path().join("ran.txt").exists());
    }
}
