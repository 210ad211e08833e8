//! Startup configuration
//!
//! Command line values are the base; an optional JSON file can override any
//! of them:
//!
//! ```json
//! {
//!   "calibration": { "referenceSignal": -58.0, "pathLossExponent": 3.0 },
//!   "thresholds": { "veryClose": -62.0, "near": -72.0, "far": -88.0 },
//!   "smoothingWindow": 5,
//!   "fallDrop": 12.0
//! }
//! ```
//!
//! The merged result is validated once; an inconsistent threshold table
//! stops the server from starting.

use std::fs;
use std::path::Path;

use guardian_core::{Calibration, TrackerConfig, ZoneThresholds};
use serde::Deserialize;

use crate::{Cli, ServerError};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FileConfig {
    pub calibration: Option<Calibration>,
    pub thresholds: Option<ZoneThresholds>,
    pub smoothing_window: Option<usize>,
    pub fall_drop: Option<f64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<FileConfig, ServerError> {
        let text = fs::read_to_string(path).map_err(|source| ServerError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ServerError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn apply(&self, config: &mut TrackerConfig) {
        if let Some(calibration) = self.calibration {
            config.calibration = calibration;
        }
        if let Some(thresholds) = self.thresholds {
            config.thresholds = thresholds;
        }
        if let Some(window) = self.smoothing_window {
            config.smoothing_window = window;
        }
        if let Some(fall_drop) = self.fall_drop {
            config.fall_drop = fall_drop;
        }
    }
}

/// Build and validate the pipeline configuration.
pub fn tracker_config(cli: &Cli) -> Result<TrackerConfig, ServerError> {
    let mut config = TrackerConfig {
        calibration: Calibration {
            reference_signal: cli.reference_signal,
            path_loss_exponent: cli.path_loss_exponent,
        },
        thresholds: ZoneThresholds::default(),
        smoothing_window: cli.window,
        fall_drop: cli.fall_drop,
    };

    if let Some(path) = &cli.config {
        log::info!("Loading configuration from {}", path.display());
        FileConfig::load(path)?.apply(&mut config);
    }

    config.validate()?;
    log::debug!("Tracker configuration: {:?}", config);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardian_core::GuardianError;
    use std::io::Write;

    fn cli_with(file: &tempfile::NamedTempFile) -> Cli {
        let mut cli = Cli::default();
        cli.config = Some(file.path().to_path_buf());
        cli
    }

    fn write_config(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_from_cli() {
        let config = tracker_config(&Cli::default()).unwrap();
        assert_eq!(config, TrackerConfig::default());
    }

    #[test]
    fn test_file_overrides_cli() {
        let file = write_config(
            r#"{
                "calibration": { "referenceSignal": -58.0, "pathLossExponent": 3.0 },
                "smoothingWindow": 5
            }"#,
        );
        let config = tracker_config(&cli_with(&file)).unwrap();
        assert_eq!(config.calibration.reference_signal, -58.0);
        assert_eq!(config.calibration.path_loss_exponent, 3.0);
        assert_eq!(config.smoothing_window, 5);
        // Absent from the file, so the command line value stays
        assert_eq!(config.fall_drop, 15.0);
    }

    #[test]
    fn test_unordered_thresholds_rejected() {
        let file = write_config(r#"{ "thresholds": { "veryClose": -80, "near": -70, "far": -90 } }"#);
        assert!(matches!(
            tracker_config(&cli_with(&file)),
            Err(ServerError::Guardian(GuardianError::Configuration(_)))
        ));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let file = write_config(r#"{ "txPower": -60 }"#);
        assert!(matches!(
            tracker_config(&cli_with(&file)),
            Err(ServerError::ConfigParse { .. })
        ));
    }

    #[test]
    fn test_missing_file() {
        let mut cli = Cli::default();
        cli.config = Some("/nonexistent/guardian.json".into());
        assert!(matches!(
            tracker_config(&cli),
            Err(ServerError::ConfigRead { .. })
        ));
    }

    #[test]
    fn test_invalid_cli_exponent() {
        let mut cli = Cli::default();
        cli.path_loss_exponent = 0.0;
        assert!(tracker_config(&cli).is_err());
    }
}
