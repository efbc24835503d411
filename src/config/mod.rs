pub mod schema;

pub use schema::{Config, MediaConfig, SessionOverflow, SessionsConfig};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reexported_config_default_is_constructible() {
        let config = Config::default();

        assert_eq!(config.sessions.overflow, SessionOverflow::EvictIdle);
        assert!(config.media.command_timeout_secs > 0);
        assert!(!config.media.ffmpeg_path.is_empty());
    }
}
