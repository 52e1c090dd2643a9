use crate::engine::EngineHandle;
use hunter_core::{Hunter, PersonMetadata, Provenance};
use hunter_store::SqliteStore;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use zbus::interface;

pub type DaemonHunter = Hunter<EngineHandle, Arc<SqliteStore>, Arc<SqliteStore>>;

/// Typed D-Bus errors, one per core error kind.
#[derive(Debug, zbus::DBusError)]
#[zbus(prefix = "org.hunter.Hunter1.Error")]
pub enum ServiceError {
    #[zbus(error)]
    ZBus(zbus::Error),
    InvalidImage(String),
    StorageUnavailable(String),
    NotFound(String),
    ExtractorUnavailable(String),
    ExtractionFailed(String),
    CorruptSignature(String),
    VersionMismatch(String),
    InvalidArgs(String),
    Internal(String),
}

impl From<hunter_core::Error> for ServiceError {
    fn from(e: hunter_core::Error) -> Self {
        use hunter_core::Error as E;
        let msg = e.to_string();
        match e {
            E::InvalidImage(_) => ServiceError::InvalidImage(msg),
            E::StorageUnavailable(_) => ServiceError::StorageUnavailable(msg),
            E::NotFound(_) => ServiceError::NotFound(msg),
            E::ExtractorUnavailable(_) => ServiceError::ExtractorUnavailable(msg),
            E::ExtractionFailed(_) => ServiceError::ExtractionFailed(msg),
            E::CorruptSignature { .. } => ServiceError::CorruptSignature(msg),
            E::VersionMismatch { .. } => ServiceError::VersionMismatch(msg),
        }
    }
}

/// D-Bus interface for the Hunter matching daemon.
///
/// Bus name: org.hunter.Hunter1
/// Object path: /org/hunter/Hunter1
pub struct HunterService {
    hunter: Arc<DaemonHunter>,
    db_path: PathBuf,
}

impl HunterService {
    pub fn new(hunter: Arc<DaemonHunter>, db_path: PathBuf) -> Self {
        Self { hunter, db_path }
    }

    /// Run `f` against the shared service on the blocking pool.
    async fn run<T, F>(&self, f: F) -> Result<T, ServiceError>
    where
        T: Send + 'static,
        F: FnOnce(&DaemonHunter) -> Result<T, ServiceError> + Send + 'static,
    {
        let hunter = Arc::clone(&self.hunter);
        tokio::task::spawn_blocking(move || f(&hunter))
            .await
            .map_err(|e| ServiceError::Internal(format!("worker task failed: {e}")))?
    }
}

#[interface(name = "org.hunter.Hunter1")]
impl HunterService {
    /// Enroll the photograph at `image_path` under the given metadata.
    ///
    /// Returns `{"status":"enrolled","id":...}` or `{"status":"no_face_detected"}`.
    async fn enroll(&self, metadata_json: &str, image_path: &str) -> Result<String, ServiceError> {
        let metadata: PersonMetadata = serde_json::from_str(metadata_json)
            .map_err(|e| ServiceError::InvalidArgs(format!("metadata: {e}")))?;
        let image_path = image_path.to_string();
        tracing::info!(name = %metadata.name, category = %metadata.category, %image_path, "enroll requested");

        self.run(move |hunter| {
            let bytes = read_image(&image_path)?;
            to_json(&hunter.enroll(metadata, &bytes, &image_path)?)
        })
        .await
    }

    /// Match the photograph at `image_path` against every enrolled person.
    ///
    /// Coordinates are decimal strings; an empty string means unknown.
    async fn search(
        &self,
        image_path: &str,
        longitude: &str,
        latitude: &str,
    ) -> Result<String, ServiceError> {
        let provenance = Provenance {
            image_ref: image_path.to_string(),
            longitude: parse_coordinate("longitude", longitude)?,
            latitude: parse_coordinate("latitude", latitude)?,
        };
        tracing::info!(image_path, "search requested");

        self.run(move |hunter| {
            let bytes = read_image(&provenance.image_ref)?;
            to_json(&hunter.search(&bytes, provenance)?)
        })
        .await
    }

    /// Persons tagged with `category`, in enrollment order.
    async fn list_persons(&self, category: &str) -> Result<String, ServiceError> {
        let category = category.to_string();
        self.run(move |hunter| to_json(&hunter.list_persons(&category)?))
            .await
    }

    /// Every recorded match, oldest first.
    async fn list_matches(&self) -> Result<String, ServiceError> {
        self.run(|hunter| to_json(&hunter.list_matches()?)).await
    }

    async fn get_person(&self, id: &str) -> Result<String, ServiceError> {
        let id = id.to_string();
        self.run(move |hunter| to_json(&hunter.get(&id)?.summary()))
            .await
    }

    /// Remove a person. Succeeds when the id is unknown.
    async fn delete(&self, id: &str) -> Result<(), ServiceError> {
        let id = id.to_string();
        tracing::info!(%id, "delete requested");
        self.run(move |hunter| Ok(hunter.delete(&id)?)).await
    }

    /// Return daemon status information.
    async fn status(&self) -> Result<String, ServiceError> {
        to_json(&serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "signature_version": self.hunter.extractor_version(),
            "similarity_threshold": self.hunter.policy().threshold(),
            "db_path": self.db_path.display().to_string(),
        }))
    }
}

fn read_image(path: &str) -> Result<Vec<u8>, ServiceError> {
    std::fs::read(path)
        .map_err(|e| ServiceError::InvalidImage(format!("cannot read {path}: {e}")))
}

fn parse_coordinate(name: &str, raw: &str) -> Result<Option<f64>, ServiceError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(ServiceError::InvalidArgs(format!("{name}: not a number: {raw}"))),
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, ServiceError> {
    serde_json::to_string(value).map_err(|e| ServiceError::Internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_coordinate() {
        assert_eq!(parse_coordinate("longitude", "").unwrap(), None);
        assert_eq!(parse_coordinate("longitude", "  ").unwrap(), None);
        assert_eq!(parse_coordinate("latitude", "-33.9").unwrap(), Some(-33.9));
        assert!(matches!(
            parse_coordinate("latitude", "north"),
            Err(ServiceError::InvalidArgs(_))
        ));
        assert!(matches!(
            parse_coordinate("latitude", "NaN"),
            Err(ServiceError::InvalidArgs(_))
        ));
    }

    #[test]
    fn test_core_errors_keep_their_kind() {
        let e: ServiceError = hunter_core::Error::NotFound("abc".into()).into();
        assert!(matches!(e, ServiceError::NotFound(ref m) if m.contains("abc")));

        let e: ServiceError = hunter_core::Error::VersionMismatch {
            expected: "a".into(),
            found: "b".into(),
        }
        .into();
        assert!(matches!(e, ServiceError::VersionMismatch(_)));

        let e: ServiceError = hunter_core::Error::CorruptSignature {
            id: "p1".into(),
            reason: "empty".into(),
        }
        .into();
        assert!(matches!(e, ServiceError::CorruptSignature(ref m) if m.contains("p1")));
    }

    #[test]
    fn test_unreadable_image_is_invalid_image() {
        let path = std::env::temp_dir().join(format!("hunter-missing-{}.png", uuid::Uuid::new_v4()));
        let err = read_image(&path.to_string_lossy()).unwrap_err();
        assert!(matches!(err, ServiceError::InvalidImage(_)));
    }
}
