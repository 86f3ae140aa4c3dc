//! Error types shared by the measurement pipeline and the HTTP layer.

use thiserror::Error;

/// Library error
#[derive(Error, Debug)]
pub enum Error {
    /// No frame has been produced yet, or the camera/encoder failed
    #[error("no frame available")]
    NoFrameAvailable,

    /// Unknown measurement name or a factor that is not a positive number
    #[error("invalid calibration input: {0}")]
    InvalidCalibrationInput(String),

    /// Reference calibration requested before any usable measurement exists
    #[error("no measurements available for calibration")]
    NoMeasurementsForCalibration,

    /// A snapshot countdown is already running
    #[error("a snapshot countdown is already active")]
    SnapshotBusy,

    /// The countdown was aborted before it elapsed
    #[error("snapshot cancelled")]
    SnapshotCancelled,

    /// Try-on service unreachable or returned an unusable payload
    #[error("upstream service error: {0}")]
    UpstreamService(String),

    /// Malformed input image
    #[error("image decode error: {0}")]
    ImageDecode(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// The pose model produced output in an unexpected layout
    #[error("inference error: {0}")]
    Inference(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// `OpenCV` operation failed
    #[cfg(feature = "desktop")]
    #[error("OpenCV error: {0}")]
    OpenCv(#[from] opencv::Error),

    /// ONNX Runtime inference failed
    #[cfg(feature = "desktop")]
    #[error("ONNX Runtime error: {0}")]
    Ort(#[from] ort::Error),
}

impl Error {
    /// Stable machine-readable kind, used in HTTP error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NoFrameAvailable => "NoFrameAvailable",
            Error::InvalidCalibrationInput(_) => "InvalidCalibrationInput",
            Error::NoMeasurementsForCalibration => "NoMeasurementsForCalibration",
            Error::SnapshotBusy => "SnapshotBusy",
            Error::SnapshotCancelled => "SnapshotCancelled",
            Error::UpstreamService(_) => "UpstreamServiceError",
            Error::ImageDecode(_) => "ImageDecodeError",
            Error::Config(_) => "ConfigError",
            Error::Inference(_) => "InferenceError",
            Error::Io(_) => "IoError",
            #[cfg(feature = "desktop")]
            Error::OpenCv(_) => "OpenCvError",
            #[cfg(feature = "desktop")]
            Error::Ort(_) => "InferenceError",
        }
    }
}

/// Convenience alias
pub type Result<T> = std::result::Result<T, Error>;
