use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Image quality is within (0, 1]
/// - Audio frame size, bitrate and capture chunk are not 0
/// - Archive name is a non-empty `.zip` file name
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let quality = config.image.default_quality;
    if !(quality > 0.0 && quality <= 1.0) {
        return Err(ConfigError::ValidationError(format!(
            "image.default_quality must be in (0, 1], got {}",
            quality
        )));
    }

    if config.audio.frame_size == 0 {
        return Err(ConfigError::ValidationError(
            "audio.frame_size cannot be 0".to_string(),
        ));
    }
    if config.audio.default_bitrate_kbps == 0 {
        return Err(ConfigError::ValidationError(
            "audio.default_bitrate_kbps cannot be 0".to_string(),
        ));
    }
    if config.audio.capture_chunk_ms == 0 {
        return Err(ConfigError::ValidationError(
            "audio.capture_chunk_ms cannot be 0".to_string(),
        ));
    }

    let archive_name = config.packaging.archive_name.trim();
    if archive_name.is_empty() {
        return Err(ConfigError::ValidationError(
            "packaging.archive_name cannot be empty".to_string(),
        ));
    }
    if !archive_name.to_ascii_lowercase().ends_with(".zip") {
        return Err(ConfigError::ValidationError(format!(
            "packaging.archive_name must end with .zip, got {}",
            archive_name
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_quality_bounds() {
        let mut config = Config::default();
        config.image.default_quality = 0.0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError(_))
        ));

        config.image.default_quality = 1.0;
        assert!(validate_config(&config).is_ok());

        config.image.default_quality = 1.5;
        assert!(validate_config(&config).is_err());

        config.image.default_quality = f32::NAN;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_audio_zeroes_fail() {
        let mut config = Config::default();
        config.audio.frame_size = 0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.audio.default_bitrate_kbps = 0;
        assert!(validate_config(&config).is_err());

        let mut config = Config::default();
        config.audio.capture_chunk_ms = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_archive_name() {
        let mut config = Config::default();
        config.packaging.archive_name = "  ".to_string();
        assert!(validate_config(&config).is_err());

        config.packaging.archive_name = "results.tar".to_string();
        assert!(validate_config(&config).is_err());

        config.packaging.archive_name = "Results.ZIP".to_string();
        assert!(validate_config(&config).is_ok());
    }
}
