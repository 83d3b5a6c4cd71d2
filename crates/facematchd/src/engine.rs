use facematch_core::{DetectedFace, Embedding, ExtractError, FaceExtractor};
use image::RgbImage;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Requests waiting for the engine beyond this depth block the sender.
const ENGINE_QUEUE_DEPTH: usize = 4;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from request handlers to the engine thread.
enum EngineRequest {
    EncodeSingle {
        image: RgbImage,
        reply: oneshot::Sender<Result<Embedding, ExtractError>>,
    },
    DetectAndEncode {
        image: RgbImage,
        reply: oneshot::Sender<Result<Vec<DetectedFace>, ExtractError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Embedding of the only face in `image`.
    pub async fn encode_single(&self, image: RgbImage) -> Result<Embedding, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::EncodeSingle { image, reply }).await?;
        Ok(rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }

    /// Every face in `image` with its box and embedding.
    pub async fn detect_and_encode(&self, image: RgbImage) -> Result<Vec<DetectedFace>, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::DetectAndEncode { image, reply }).await?;
        Ok(rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }

    async fn send(&self, request: EngineRequest) -> Result<(), EngineError> {
        self.tx.send(request).await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The extractor is owned by that thread for its whole life, so inference
/// requests are processed one at a time in arrival order. The thread exits
/// when every [`EngineHandle`] has been dropped.
pub fn spawn_engine(mut extractor: Box<dyn FaceExtractor>) -> std::io::Result<EngineHandle> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(ENGINE_QUEUE_DEPTH);

    std::thread::Builder::new()
        .name("facematch-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::EncodeSingle { image, reply } => {
                        let result = extractor.encode_single(&image);
                        log_outcome("encode_single", &image, result.as_ref().map(|_| 1));
                        let _ = reply.send(result);
                    }
                    EngineRequest::DetectAndEncode { image, reply } => {
                        let result = extractor.detect_and_encode(&image);
                        log_outcome("detect_and_encode", &image, result.as_ref().map(Vec::len));
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}

fn log_outcome(op: &str, image: &RgbImage, outcome: Result<usize, &ExtractError>) {
    match outcome {
        Ok(faces) => tracing::debug!(
            op,
            width = image.width(),
            height = image.height(),
            faces,
            "extraction finished"
        ),
        Err(e) if e.is_client_error() => tracing::debug!(op, error = %e, "extraction rejected image"),
        Err(e) => tracing::error!(op, error = %e, "extraction failed"),
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{faces_image, PixelFaces};
    use super::*;

    #[tokio::test]
    async fn test_encode_single_roundtrip() {
        let engine = spawn_engine(Box::new(PixelFaces)).unwrap();
        let emb = engine.encode_single(faces_image(&[[255, 0, 0]])).await.unwrap();
        assert_eq!(emb.values, vec![1.0, 0.0, 0.0]);
    }

    #[tokio::test]
    async fn test_encode_single_propagates_extract_errors() {
        let engine = spawn_engine(Box::new(PixelFaces)).unwrap();
        let err = engine.encode_single(faces_image(&[[0, 0, 0]])).await.unwrap_err();
        assert!(matches!(err, EngineError::Extract(ExtractError::NoFaceFound)));

        let err = engine
            .encode_single(faces_image(&[[9, 9, 9], [8, 8, 8]]))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Extract(ExtractError::MultipleFacesFound(2))));
    }

    #[tokio::test]
    async fn test_detect_and_encode_all_faces() {
        let engine = spawn_engine(Box::new(PixelFaces)).unwrap();
        let faces = engine
            .detect_and_encode(faces_image(&[[255, 0, 0], [0, 0, 0], [0, 255, 0], [0, 0, 255]]))
            .await
            .unwrap();
        assert_eq!(faces.len(), 3);
    }

    #[tokio::test]
    async fn test_handles_share_one_engine() {
        let engine = spawn_engine(Box::new(PixelFaces)).unwrap();
        let clones: Vec<EngineHandle> = (0..8).map(|_| engine.clone()).collect();
        let tasks = clones.into_iter().map(|h| {
            tokio::spawn(async move { h.encode_single(faces_image(&[[1, 2, 3]])).await })
        });
        for task in tasks.collect::<Vec<_>>() {
            assert!(task.await.unwrap().is_ok());
        }
    }
}
