use hunter_core::{EncoderOptions, Error, FaceEncoder, Signature, SignatureExtractor};
use image::DynamicImage;
use std::path::Path;
use tokio::sync::{mpsc, oneshot};

/// Messages sent to the engine thread.
enum EngineRequest {
    Extract {
        image: DynamicImage,
        reply: oneshot::Sender<Result<Option<Signature>, Error>>,
    },
}

/// Clone-safe handle to the engine thread.
///
/// Implements [`SignatureExtractor`] by message passing. Its methods block,
/// so call them from a blocking context (`spawn_blocking`), never directly
/// from an async task.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    version: &'static str,
}

fn channel_closed() -> Error {
    Error::ExtractorUnavailable("engine thread exited".into())
}

impl SignatureExtractor for EngineHandle {
    fn extract(&self, image: &DynamicImage) -> Result<Option<Signature>, Error> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .blocking_send(EngineRequest::Extract {
                image: image.clone(),
                reply: reply_tx,
            })
            .map_err(|_| channel_closed())?;
        reply_rx.blocking_recv().map_err(|_| channel_closed())?
    }

    fn version(&self) -> &str {
        self.version
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Loads both ONNX models synchronously so that a missing or broken model
/// fails daemon startup instead of the first request.
pub fn spawn_engine(
    detector_path: &Path,
    recognizer_path: &Path,
    options: EncoderOptions,
) -> Result<EngineHandle, Error> {
    let mut encoder = FaceEncoder::load(detector_path, recognizer_path, options)?;
    let version = encoder.version();
    tracing::info!(
        detector = %detector_path.display(),
        recognizer = %recognizer_path.display(),
        version,
        downscale = options.downscale,
        "face encoder loaded"
    );

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("hunter-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Extract { image, reply } => {
                        let result = encoder.encode(&image);
                        if let Err(e) = &result {
                            tracing::warn!(error = %e, "signature extraction failed");
                        }
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(|e| Error::ExtractorUnavailable(format!("spawning engine thread: {e}")))?;

    Ok(EngineHandle { tx, version })
}
