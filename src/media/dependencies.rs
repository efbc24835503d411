//! Media dependency probing (ffmpeg presence and version).

use regex::Regex;
use std::sync::OnceLock;

use super::traits::{CommandError, CommandRunner, DependencyStatus, Version};
use crate::config::MediaConfig;

fn version_regex() -> &'static Regex {
    static VERSION_RE: OnceLock<Regex> = OnceLock::new();
    VERSION_RE.get_or_init(|| {
        Regex::new(r"^n?(\d+)(?:\.(\d+))?(?:\.(\d+))?").expect("version regex is valid")
    })
}

/// Parse a leading `MAJOR[.MINOR[.PATCH]]`, tolerating an `n` prefix and
/// trailing build suffixes (`6.1.1-3ubuntu5`).
pub fn parse_version(raw: &str) -> Option<Version> {
    let caps = version_regex().captures(raw.trim())?;
    let part = |i: usize| -> Option<u32> {
        match caps.get(i) {
            Some(m) => m.as_str().parse().ok(),
            None => Some(0),
        }
    };
    Some(Version {
        major: part(1)?,
        minor: part(2)?,
        patch: part(3)?,
    })
}

/// Extract the version from `ffmpeg -version` output.
pub fn parse_ffmpeg_version(output: &str) -> Option<Version> {
    output
        .lines()
        .find_map(|line| line.trim().strip_prefix("ffmpeg version "))
        .and_then(parse_version)
}

/// Probe ffmpeg via `<ffmpeg_path> -version`. A missing binary is reported, not raised.
pub async fn check_ffmpeg(runner: &dyn CommandRunner, config: &MediaConfig) -> DependencyStatus {
    let program = config.resolved_ffmpeg_path();
    let minimum = parse_version(&config.min_ffmpeg_version);

    let output = match runner
        .run(&program, &["-version"], config.command_timeout())
        .await
    {
        Ok(output) => output,
        Err(CommandError::NotInstalled(_)) => {
            return DependencyStatus {
                name: "ffmpeg".into(),
                installed: false,
                version: None,
                meets_minimum: false,
                detail: Some(format!("`{program}` not found on PATH")),
            };
        }
        Err(e) => {
            // The binary was found; it hung or could not be run.
            tracing::warn!(program = %program, error = %e, "ffmpeg probe failed");
            return DependencyStatus {
                name: "ffmpeg".into(),
                installed: true,
                version: None,
                meets_minimum: false,
                detail: Some(e.to_string()),
            };
        }
    };

    if !output.success {
        return DependencyStatus {
            name: "ffmpeg".into(),
            installed: true,
            version: None,
            meets_minimum: false,
            detail: Some(format!(
                "`{program} -version` exited with status {:?}",
                output.status
            )),
        };
    }

    let version = parse_ffmpeg_version(&output.stdout);
    let (meets_minimum, detail) = match (version, minimum) {
        (None, _) => (false, Some("could not parse ffmpeg version".to_string())),
        (Some(_), None) => (true, None),
        (Some(found), Some(min)) if found >= min => (true, None),
        (Some(found), Some(min)) => (false, Some(format!("ffmpeg {found} is older than {min}"))),
    };

    DependencyStatus {
        name: "ffmpeg".into(),
        installed: true,
        version,
        meets_minimum,
        detail,
    }
}

/// Run every media dependency check.
pub async fn check_dependencies(
    runner: &dyn CommandRunner,
    config: &MediaConfig,
) -> Vec<DependencyStatus> {
    vec![check_ffmpeg(runner, config).await]
}
