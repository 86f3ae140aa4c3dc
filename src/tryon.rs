//! Relay to an external virtual try-on HTTP service.
//!
//! The service receives a multipart form (`person_image`, `garment_image`,
//! `garment_type`) and answers either with an image body or with JSON carrying
//! a base64 image.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use log::{debug, info};
use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::TryOnConfig;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GarmentType {
    Upper,
    Lower,
    Overall,
}

impl GarmentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Upper => "upper",
            Self::Lower => "lower",
            Self::Overall => "overall",
        }
    }
}

/// Body of `POST /tryon`
#[derive(Debug, Clone, Deserialize)]
pub struct TryOnRequest {
    pub garment_type: GarmentType,
    /// Base64 image of the person; the last camera frame when omitted
    #[serde(default)]
    pub subject_image: Option<String>,
    /// Base64 image of the garment; the configured default when omitted
    #[serde(default)]
    pub garment_image: Option<String>,
}

/// Image returned by the service
#[derive(Debug, Clone, PartialEq)]
pub struct TryOnImage {
    pub content_type: String,
    pub data: Bytes,
}

#[derive(Debug, Clone)]
pub struct TryOnClient {
    http: reqwest::Client,
    endpoint: Option<String>,
    default_garment: Option<PathBuf>,
}

impl TryOnClient {
    pub fn new(config: &TryOnConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("try-on HTTP client: {}", e)))?;
        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            default_garment: config.default_garment.clone(),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Resolve the images, send them to the service and decode the answer
    pub async fn try_on(&self, request: TryOnRequest, last_frame: Option<Bytes>) -> Result<TryOnImage> {
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or_else(|| Error::UpstreamService("try-on service is not configured".into()))?;

        let person = match &request.subject_image {
            Some(b64) => decode_image("subject_image", b64)?,
            None => last_frame.ok_or(Error::NoFrameAvailable)?,
        };
        let garment = match &request.garment_image {
            Some(b64) => decode_image("garment_image", b64)?,
            None => self.default_garment().await?,
        };

        info!(
            "[tryon] {} garment, person {} bytes, garment {} bytes",
            request.garment_type.as_str(),
            person.len(),
            garment.len()
        );

        let form = Form::new()
            .part("person_image", image_part(person, "person.jpg")?)
            .part("garment_image", image_part(garment, "garment.jpg")?)
            .text("garment_type", request.garment_type.as_str());

        let response = self
            .http
            .post(endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| Error::UpstreamService(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::UpstreamService(format!("try-on service returned {}", status)));
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::UpstreamService(e.to_string()))?;
        debug!("[tryon] response {:?}, {} bytes", content_type, body.len());

        decode_response(content_type.as_deref(), body)
    }

    async fn default_garment(&self) -> Result<Bytes> {
        let path = self.default_garment.as_ref().ok_or_else(|| {
            Error::ImageDecode("garment_image is required when no default garment is configured".into())
        })?;
        let data = tokio::fs::read(path).await?;
        Ok(Bytes::from(data))
    }
}

fn image_part(data: Bytes, file_name: &'static str) -> Result<Part> {
    Part::bytes(data.to_vec())
        .file_name(file_name)
        .mime_str("image/jpeg")
        .map_err(|e| Error::UpstreamService(e.to_string()))
}

/// Decode a base64 image, with or without a `data:image/...;base64,` prefix
pub fn decode_image(field: &str, b64: &str) -> Result<Bytes> {
    let payload = match b64.split_once(";base64,") {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => b64,
    };
    let data = STANDARD
        .decode(payload.trim())
        .map_err(|e| Error::ImageDecode(format!("{}: {}", field, e)))?;
    if data.is_empty() {
        return Err(Error::ImageDecode(format!("{}: empty image", field)));
    }
    Ok(Bytes::from(data))
}

#[derive(Deserialize)]
struct JsonImage {
    image: Option<String>,
    result: Option<String>,
}

/// Accept an `image/*` body or JSON with a base64 `image` / `result` field
pub fn decode_response(content_type: Option<&str>, body: Bytes) -> Result<TryOnImage> {
    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|m| m.trim().to_ascii_lowercase())
        .unwrap_or_default();

    if mime.starts_with("image/") {
        if body.is_empty() {
            return Err(Error::UpstreamService("empty image from try-on service".into()));
        }
        return Ok(TryOnImage {
            content_type: mime,
            data: body,
        });
    }

    if mime == "application/json" || mime.ends_with("+json") {
        let json: JsonImage = serde_json::from_slice(&body)
            .map_err(|e| Error::UpstreamService(format!("invalid JSON from try-on service: {}", e)))?;
        let b64 = json
            .image
            .or(json.result)
            .ok_or_else(|| Error::UpstreamService("no image in try-on response".into()))?;
        let data = decode_image("result", &b64)
            .map_err(|e| Error::UpstreamService(e.to_string()))?;
        return Ok(TryOnImage {
            content_type: sniff_image_type(&data).to_string(),
            data,
        });
    }

    Err(Error::UpstreamService(format!(
        "unexpected content type '{}' from try-on service",
        mime
    )))
}

fn sniff_image_type(data: &[u8]) -> &'static str {
    if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        "image/png"
    } else {
        "image/jpeg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\nrest";

    #[test]
    fn test_request_json() {
        let req: TryOnRequest = serde_json::from_str(r#"{"garment_type":"upper"}"#).unwrap();
        assert_eq!(req.garment_type, GarmentType::Upper);
        assert!(req.subject_image.is_none());
        assert!(serde_json::from_str::<TryOnRequest>(r#"{"garment_type":"hat"}"#).is_err());
    }

    #[test]
    fn test_decode_image_with_data_url() {
        assert_eq!(&decode_image("x", "YWJj").unwrap()[..], b"abc");
        assert_eq!(&decode_image("x", "data:image/jpeg;base64,YWJj").unwrap()[..], b"abc");
        assert!(matches!(decode_image("x", "***"), Err(Error::ImageDecode(_))));
        assert!(matches!(decode_image("x", ""), Err(Error::ImageDecode(_))));
    }

    #[test]
    fn test_decode_image_response() {
        let img = decode_response(Some("image/png"), Bytes::from_static(PNG)).unwrap();
        assert_eq!(img.content_type, "image/png");
        assert_eq!(&img.data[..], PNG);
    }

    #[test]
    fn test_decode_json_response() {
        let body = serde_json::json!({ "result": STANDARD.encode(PNG) }).to_string();
        let img = decode_response(Some("application/json; charset=utf-8"), Bytes::from(body)).unwrap();
        assert_eq!(img.content_type, "image/png");
        assert_eq!(&img.data[..], PNG);

        let body = serde_json::json!({ "image": "YWJj" }).to_string();
        let img = decode_response(Some("application/json"), Bytes::from(body)).unwrap();
        assert_eq!(img.content_type, "image/jpeg");
    }

    #[test]
    fn test_unusable_responses() {
        let cases = [
            (Some("text/html"), Bytes::from_static(b"<html>")),
            (None, Bytes::from_static(b"??")),
            (Some("application/json"), Bytes::from_static(b"{\"status\":\"queued\"}")),
            (Some("application/json"), Bytes::from_static(b"not json")),
            (Some("image/jpeg"), Bytes::new()),
        ];
        for (ct, body) in cases {
            assert!(matches!(decode_response(ct, body), Err(Error::UpstreamService(_))));
        }
    }

    #[tokio::test]
    async fn test_disabled_client() {
        let client = TryOnClient::new(&TryOnConfig::default()).unwrap();
        assert!(!client.is_enabled());
        let req = TryOnRequest {
            garment_type: GarmentType::Lower,
            subject_image: None,
            garment_image: None,
        };
        let err = client.try_on(req, None).await.unwrap_err();
        assert!(matches!(err, Error::UpstreamService(_)));
    }

    #[tokio::test]
    async fn test_missing_frame_and_garment() {
        let config = TryOnConfig {
            endpoint: Some("http://127.0.0.1:9/tryon".into()),
            ..TryOnConfig::default()
        };
        let client = TryOnClient::new(&config).unwrap();

        let req = TryOnRequest {
            garment_type: GarmentType::Upper,
            subject_image: None,
            garment_image: Some("YWJj".into()),
        };
        assert!(matches!(client.try_on(req, None).await, Err(Error::NoFrameAvailable)));

        let req = TryOnRequest {
            garment_type: GarmentType::Upper,
            subject_image: Some("YWJj".into()),
            garment_image: None,
        };
        assert!(matches!(client.try_on(req, None).await, Err(Error::ImageDecode(_))));
    }
}
