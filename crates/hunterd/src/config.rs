use anyhow::Context;
use hunter_core::EncoderOptions;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Daemon configuration.
///
/// Base values come from the TOML file named by `HUNTER_CONFIG` (if set);
/// `HUNTER_*` environment variables override individual fields.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Cosine similarity at or above which a query counts as a match.
    pub similarity_threshold: f32,
    /// Minimum SCRFD score for a face to be used.
    pub detection_threshold: f32,
    /// Photographs are shrunk by this integer factor before detection.
    pub downscale: u32,
    /// Pixels of context kept around each detected face.
    pub face_margin: u32,
    /// Serve on the session bus instead of the system bus.
    pub session_bus: bool,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("hunter");

        Self {
            model_dir: hunter_core::default_model_dir(),
            db_path: data_dir.join("hunter.db"),
            similarity_threshold: 0.7,
            detection_threshold: 0.5,
            downscale: 3,
            face_margin: 0,
            session_bus: false,
        }
    }
}

impl Config {
    /// Load from `HUNTER_CONFIG` (optional) and `HUNTER_*` overrides.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = match std::env::var("HUNTER_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing config file {}", path.display()))
    }

    /// Apply `HUNTER_*` overrides. Unparseable values are ignored with a warning,
    /// and a similarity threshold outside [-1, 1] (or NaN) falls back to the default.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("HUNTER_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("HUNTER_DB_PATH") {
            self.db_path = PathBuf::from(v);
        }
        override_parsed(&lookup, "HUNTER_SIMILARITY_THRESHOLD", &mut self.similarity_threshold);
        if !(-1.0..=1.0).contains(&self.similarity_threshold) {
            let default = Config::default().similarity_threshold;
            tracing::warn!(
                value = self.similarity_threshold,
                default,
                "similarity threshold outside [-1, 1], using default"
            );
            self.similarity_threshold = default;
        }
        override_parsed(&lookup, "HUNTER_DETECTION_THRESHOLD", &mut self.detection_threshold);
        override_parsed(&lookup, "HUNTER_DOWNSCALE", &mut self.downscale);
        override_parsed(&lookup, "HUNTER_FACE_MARGIN", &mut self.face_margin);
        if let Some(v) = lookup("HUNTER_SESSION_BUS") {
            self.session_bus = v != "0";
        }
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> PathBuf {
        self.model_dir.join(hunter_core::DETECTOR_MODEL_FILE)
    }

    /// Path to the FaceNet recognition model.
    pub fn recognizer_model_path(&self) -> PathBuf {
        self.model_dir.join(hunter_core::RECOGNIZER_MODEL_FILE)
    }

    pub fn encoder_options(&self) -> EncoderOptions {
        EncoderOptions {
            detection_threshold: self.detection_threshold,
            downscale: self.downscale,
            face_margin: self.face_margin,
        }
    }
}

fn override_parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    slot: &mut T,
) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.parse() {
        Ok(v) => *slot = v,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparseable config override"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!((config.similarity_threshold - 0.7).abs() < 1e-6);
        assert_eq!(config.downscale, 3);
        assert!(config.db_path.ends_with("hunter/hunter.db"));
        assert!(!config.session_bus);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            similarity_threshold = 0.8
            model_dir = "/opt/models"
            "#,
        )
        .unwrap();
        assert!((config.similarity_threshold - 0.8).abs() < 1e-6);
        assert_eq!(config.model_dir, PathBuf::from("/opt/models"));
        assert_eq!(config.downscale, 3);
        assert_eq!(config.detector_model_path(), PathBuf::from("/opt/models/det_10g.onnx"));
        assert_eq!(
            config.recognizer_model_path(),
            PathBuf::from("/opt/models/facenet_vggface2.onnx")
        );
    }

    #[test]
    fn test_out_of_range_threshold_keeps_default() {
        for raw in ["NaN", "1.5", "-2", "inf"] {
            let mut config = Config::default();
            config.apply_overrides(|key| {
                (key == "HUNTER_SIMILARITY_THRESHOLD").then(|| raw.to_string())
            });
            assert!(
                (config.similarity_threshold - 0.7).abs() < 1e-6,
                "{raw} should be rejected"
            );
        }

        let mut config = Config::default();
        config.apply_overrides(|key| (key == "HUNTER_SIMILARITY_THRESHOLD").then(|| "-0.2".into()));
        assert!((config.similarity_threshold + 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_out_of_range_file_threshold_keeps_default() {
        let mut config: Config = toml::from_str("similarity_threshold = 3.0").unwrap();
        config.apply_overrides(|_| None);
        assert!((config.similarity_threshold - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("HUNTER_SIMILARITY_THRESHOLD", "0.65"),
            ("HUNTER_DOWNSCALE", "1"),
            ("HUNTER_FACE_MARGIN", "not-a-number"),
            ("HUNTER_DB_PATH", "/var/lib/hunter/db.sqlite"),
            ("HUNTER_SESSION_BUS", "1"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert!((config.similarity_threshold - 0.65).abs() < 1e-6);
        assert_eq!(config.downscale, 1);
        assert_eq!(config.face_margin, 0);
        assert_eq!(config.db_path, PathBuf::from("/var/lib/hunter/db.sqlite"));
        assert!(config.session_bus);
        assert_eq!(config.encoder_options().downscale, 1);
    }
}
