//! Media tooling: external command execution and dependency checks.

pub mod command;
pub mod dependencies;
pub mod traits;

pub use command::{run_command, SystemCommandRunner};
pub use dependencies::{check_dependencies, check_ffmpeg, parse_ffmpeg_version, parse_version};
pub use traits::{CommandError, CommandOutput, CommandRunner, DependencyStatus, Version};

pub fn create_command_runner() -> Box<dyn CommandRunner> {
    Box::new(SystemCommandRunner)
}
