//! Wire formats for the HTTP API: MJPEG stream framing and JSON bodies.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::calibration::LengthUnit;
use crate::measure::Measurement;
use crate::{Error, Result};

// --- MJPEG ---

/// Multipart boundary between stream parts
pub const MJPEG_BOUNDARY: &str = "frame";

/// Content type of the `/video_feed` response
pub const MJPEG_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Frame one JPEG image as a multipart part.
///
/// `--frame\r\nContent-Type: image/jpeg\r\n\r\n<jpeg>\r\n`
pub fn mjpeg_part(jpeg: &[u8]) -> Bytes {
    const HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
    let mut buf = BytesMut::with_capacity(HEADER.len() + jpeg.len() + 2);
    buf.put_slice(HEADER);
    buf.put_slice(jpeg);
    buf.put_slice(b"\r\n");
    buf.freeze()
}

// --- Requests ---

/// Factor value as sent by clients: `8.4` or `"8.4"`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FactorValue {
    Number(f64),
    Text(String),
}

impl FactorValue {
    pub fn as_f64(&self) -> Result<f64> {
        match self {
            FactorValue::Number(v) => Ok(*v),
            FactorValue::Text(s) => s.trim().parse().map_err(|_| {
                Error::InvalidCalibrationInput(format!("'{}' is not a number", s))
            }),
        }
    }
}

/// Body of `POST /update_conversion`
#[derive(Debug, Clone, Deserialize)]
pub struct ConversionUpdate {
    pub key: String,
    pub value: FactorValue,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ConversionAck {
    pub status: &'static str,
    pub key: Measurement,
    pub value: f64,
}

impl ConversionAck {
    pub fn ok(key: Measurement, value: f64) -> Self {
        Self { status: "ok", key, value }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotFormat {
    #[default]
    Jpeg,
    Json,
}

/// Query of `GET /snapshot`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SnapshotQuery {
    /// Countdown seconds; the configured default when omitted
    pub duration: Option<u64>,
    #[serde(default)]
    pub format: SnapshotFormat,
}

/// Query of `GET /measurements`. `GET /size` always works in centimetres.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UnitQuery {
    pub unit: Option<LengthUnit>,
}

// --- Responses ---

#[derive(Debug, Clone, Serialize)]
pub struct CalibrationResponse {
    pub updated_factors: BTreeMap<Measurement, f64>,
}

/// JSON variant of the snapshot response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotJson {
    /// Base64 (standard alphabet) JPEG
    pub image: String,
}

impl SnapshotJson {
    pub fn from_jpeg(jpeg: &[u8]) -> Self {
        Self {
            image: STANDARD.encode(jpeg),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}

/// Error body for every failed request
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl From<&Error> for ErrorBody {
    fn from(e: &Error) -> Self {
        Self {
            error: e.kind(),
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mjpeg_part_layout() {
        let part = mjpeg_part(b"\xff\xd8jpeg\xff\xd9");
        assert_eq!(
            &part[..],
            b"--frame\r\nContent-Type: image/jpeg\r\n\r\n\xff\xd8jpeg\xff\xd9\r\n"
        );
        assert!(MJPEG_CONTENT_TYPE.ends_with(MJPEG_BOUNDARY));
    }

    #[test]
    fn test_conversion_update_accepts_number_or_string() {
        let n: ConversionUpdate =
            serde_json::from_str(r#"{"key":"Shoulder Width","value":8.4}"#).unwrap();
        assert_eq!(n.value.as_f64().unwrap(), 8.4);

        let s: ConversionUpdate =
            serde_json::from_str(r#"{"key":"Shoulder Width","value":" 8.4"}"#).unwrap();
        assert_eq!(s.value.as_f64().unwrap(), 8.4);

        let bad: ConversionUpdate =
            serde_json::from_str(r#"{"key":"Shoulder Width","value":"wide"}"#).unwrap();
        assert!(matches!(bad.value.as_f64(), Err(Error::InvalidCalibrationInput(_))));
    }

    #[test]
    fn test_ack_json() {
        let ack = ConversionAck::ok(Measurement::ShoulderWidth, 8.4);
        assert_eq!(
            serde_json::to_value(&ack).unwrap(),
            serde_json::json!({"status": "ok", "key": "Shoulder Width", "value": 8.4})
        );
    }

    #[test]
    fn test_calibration_response_keys_are_names() {
        let mut updated = BTreeMap::new();
        updated.insert(Measurement::HipLength, 6.5);
        let json = serde_json::to_value(CalibrationResponse { updated_factors: updated }).unwrap();
        assert_eq!(json, serde_json::json!({"updated_factors": {"Hip Length": 6.5}}));
    }

    #[test]
    fn test_snapshot_json_is_base64() {
        assert_eq!(SnapshotJson::from_jpeg(b"abc").image, "YWJj");
    }

    #[test]
    fn test_error_body() {
        let body = ErrorBody::from(&Error::SnapshotBusy);
        assert_eq!(body.error, "SnapshotBusy");
        assert_eq!(body.message, "a snapshot countdown is already active");
    }
}
