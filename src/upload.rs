//! Axis VAPIX transport
//! Multipart uploads of firmware, ACAP packages and overlay images
//!
//! Each upload kind has a fixed `UploadSpec`: a primary endpoint and, for
//! firmware and packages, an older endpoint shape that is tried once when the
//! primary one rejects the upload.

use log::{ debug, info, warn };
use reqwest::multipart::{ Form, Part };
use serde::{ Deserialize, Serialize };
use serde_json::{ json, Value };
use std::future::Future;
use std::sync::Arc;

use crate::device::Device;
use crate::error::{ legacy_error_code, FailureKind, Result, VapixError };
use crate::transport::{ finish, Method, Probe, ResponseBody, ResponseKind, Transport };

/// What is being uploaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadKind {
    Firmware,
    /// ACAP application package (`.eap`)
    Package,
    Overlay,
}

/// Caller options; fields that do not apply to a kind are ignored
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadOptions {
    /// Overlay: scale the image to the stream resolution (default true)
    pub scale: Option<bool>,
    /// Overlay: color treated as transparent, e.g. `ffffff`
    pub alpha: Option<String>,
    /// Firmware: seconds before the device rolls back an unconfirmed upgrade
    pub auto_rollback: Option<u32>,
}

/// How the content part's type is chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentTypeRule {
    OctetStream,
    /// `image/<extension of filename>`
    ImageFromExtension,
}

/// What a successful reply must contain for the upload to count as accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyCheck {
    Any,
    /// A JSON object with a `data` member
    JsonData,
}

/// Which primary failures send the upload to the legacy endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// Application errors and malformed replies
    OnRejectedReply,
    /// Also HTTP failures other than rejected credentials, for firmware
    /// that lacks the primary endpoint altogether
    OnHttpFailure,
}

/// One endpoint shape: where to post and how the multipart body is laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub path: &'static str,
    /// Name of the JSON metadata part, if the endpoint takes one
    pub metadata_field: Option<&'static str>,
    pub data_field: &'static str,
    pub response_kind: ResponseKind,
    pub reply_check: ReplyCheck,
}

impl Endpoint {
    /// Reject a 2xx reply that does not look like an accepted upload
    pub fn check_reply(&self, body: ResponseBody) -> Result<ResponseBody> {
        match self.reply_check {
            ReplyCheck::Any => Ok(body),
            ReplyCheck::JsonData => {
                if body.as_json().and_then(|v| v.get("data")).is_some() {
                    Ok(body)
                } else {
                    Err(
                        VapixError::parse_error(format!("{} reply has no data", self.path)).with_body(
                            body
                        )
                    )
                }
            }
        }
    }
}

/// Static upload description: primary endpoint, optional legacy fallback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadSpec {
    pub kind: UploadKind,
    pub primary: Endpoint,
    pub legacy: Option<Endpoint>,
    pub fallback: FallbackPolicy,
    pub content_type: ContentTypeRule,
}

impl UploadSpec {
    pub fn for_kind(kind: UploadKind) -> Self {
        match kind {
            UploadKind::Firmware =>
                Self {
                    kind,
                    primary: Endpoint {
                        path: "/axis-cgi/firmwaremanagement.cgi",
                        metadata_field: Some("data"),
                        data_field: "fileData",
                        response_kind: ResponseKind::Json,
                        reply_check: ReplyCheck::JsonData,
                    },
                    legacy: Some(Endpoint {
                        path: "/axis-cgi/firmwareupgrade.cgi?type=normal",
                        metadata_field: None,
                        data_field: "fileData",
                        response_kind: ResponseKind::Text,
                        reply_check: ReplyCheck::Any,
                    }),
                    fallback: FallbackPolicy::OnRejectedReply,
                    content_type: ContentTypeRule::OctetStream,
                },
            UploadKind::Package =>
                Self {
                    kind,
                    primary: Endpoint {
                        path: "/axis-cgi/packagemanager.cgi",
                        metadata_field: Some("data"),
                        data_field: "fileData",
                        response_kind: ResponseKind::Json,
                        reply_check: ReplyCheck::Any,
                    },
                    legacy: Some(Endpoint {
                        path: "/axis-cgi/applications/upload.cgi",
                        metadata_field: None,
                        data_field: "packfil",
                        response_kind: ResponseKind::Text,
                        reply_check: ReplyCheck::Any,
                    }),
                    fallback: FallbackPolicy::OnHttpFailure,
                    content_type: ContentTypeRule::OctetStream,
                },
            UploadKind::Overlay =>
                Self {
                    kind,
                    primary: Endpoint {
                        path: "/axis-cgi/uploadoverlayimage.cgi",
                        metadata_field: Some("json"),
                        data_field: "image",
                        response_kind: ResponseKind::Structured,
                        reply_check: ReplyCheck::Any,
                    },
                    legacy: None,
                    fallback: FallbackPolicy::OnRejectedReply,
                    content_type: ContentTypeRule::ImageFromExtension,
                },
        }
    }

    /// Whether a failed primary upload is retried on the legacy endpoint.
    ///
    /// Network failures and rejected credentials never are; the legacy
    /// endpoint lives on the same device with the same account.
    pub fn should_fall_back(&self, err: &VapixError) -> bool {
        if self.legacy.is_none() {
            return false;
        }
        match err.kind {
            FailureKind::ApplicationError | FailureKind::ParseError => true,
            FailureKind::HttpStatus(401) => false,
            FailureKind::HttpStatus(_) => self.fallback == FallbackPolicy::OnHttpFailure,
            _ => false,
        }
    }

    pub fn content_type(&self, filename: &str) -> Result<String> {
        match self.content_type {
            ContentTypeRule::OctetStream => Ok("application/octet-stream".to_string()),
            ContentTypeRule::ImageFromExtension => {
                let extension = filename
                    .rsplit_once('.')
                    .map(|(_, ext)| ext.trim())
                    .filter(|ext| !ext.is_empty())
                    .ok_or_else(|| {
                        VapixError::invalid_input(
                            format!("Overlay filename needs an image extension: {}", filename)
                        )
                    })?;
                Ok(format!("image/{}", extension.to_ascii_lowercase()))
            }
        }
    }

    /// JSON metadata part for endpoints that take one
    pub fn metadata(&self, context: &str, options: &UploadOptions) -> Value {
        let mut metadata = json!({
            "apiVersion": "1.0",
            "context": context,
        });
        match self.kind {
            UploadKind::Firmware => {
                metadata["method"] = json!("upgrade");
                if let Some(timeout) = options.auto_rollback {
                    metadata["params"] = json!({ "autoRollback": timeout.to_string() });
                }
            }
            UploadKind::Package => {
                metadata["method"] = json!("install");
            }
            UploadKind::Overlay => {
                metadata["method"] = json!("uploadOverlayImage");
                metadata["params"] = json!({ "scaleToResolution": options.scale.unwrap_or(true) });
                if let Some(alpha) = &options.alpha {
                    metadata["params"]["alpha"] = json!(alpha);
                }
            }
        }
        metadata
    }

    /// Drive the two-attempt strategy: primary first, legacy once if allowed.
    ///
    /// A legacy failure is final.
    pub async fn run<F, Fut>(&self, mut attempt: F) -> Result<UploadOutcome>
        where F: FnMut(Endpoint) -> Fut, Fut: Future<Output = Result<ResponseBody>>
    {
        let err = match attempt(self.primary).await.and_then(|b| self.primary.check_reply(b)) {
            Ok(body) => {
                return Ok(UploadOutcome { endpoint: self.primary, legacy: false, body });
            }
            Err(err) => err,
        };

        let Some(legacy) = self.legacy.filter(|_| self.should_fall_back(&err)) else {
            return Err(err);
        };

        warn!(
            "{:?} upload rejected by {} ({}), retrying on legacy endpoint {}",
            self.kind,
            self.primary.path,
            err,
            legacy.path
        );
        let body = attempt(legacy)
            .await
            .and_then(|b| legacy.check_reply(b))
            .map_err(|e| self.describe_legacy_failure(e))?;
        Ok(UploadOutcome { endpoint: legacy, legacy: true, body })
    }

    fn describe_legacy_failure(&self, mut err: VapixError) -> VapixError {
        if self.kind != UploadKind::Package || err.kind != FailureKind::ApplicationError {
            return err;
        }
        let code = err.body
            .as_ref()
            .and_then(|b| b.as_text())
            .and_then(legacy_error_code);
        if let Some(code) = code {
            err.message = format!("Installation failed: {}", legacy_package_reason(code));
        }
        err
    }
}

/// Reply codes of the legacy application upload endpoint
pub fn legacy_package_reason(code: u32) -> &'static str {
    match code {
        2 => "File verification failed",
        3 => "File is too large or the storage is full",
        5 | 10 => "File is not compatible with the HW or FW",
        _ => "Installation failed",
    }
}

/// Result of a successful upload
#[derive(Debug, Clone, PartialEq)]
pub struct UploadOutcome {
    /// Endpoint that accepted the upload
    pub endpoint: Endpoint,
    pub legacy: bool,
    pub body: ResponseBody,
}

impl UploadOutcome {
    /// Firmware version reported by the firmware management API
    pub fn firmware_version(&self) -> Option<&str> {
        self.body.as_json()?.get("data")?.get("firmwareVersion")?.as_str()
    }
}

impl Transport {
    /// Upload `content` as `kind`, falling back to the legacy endpoint when allowed
    pub async fn upload(
        &self,
        device: &Device,
        kind: UploadKind,
        filename: &str,
        options: &UploadOptions,
        content: Arc<Vec<u8>>
    ) -> Result<ResponseBody> {
        self.upload_with_outcome(device, kind, filename, options, content).await.map(|o| o.body)
    }

    pub async fn upload_with_outcome(
        &self,
        device: &Device,
        kind: UploadKind,
        filename: &str,
        options: &UploadOptions,
        content: Arc<Vec<u8>>
    ) -> Result<UploadOutcome> {
        device.validate()?;
        if content.is_empty() {
            return Err(VapixError::invalid_input("Invalid upload buffer"));
        }
        if filename.trim().is_empty() {
            return Err(VapixError::invalid_input("Invalid file name"));
        }

        let spec = UploadSpec::for_kind(kind);
        let content_type = spec.content_type(filename)?;
        let metadata = serde_json::to_string(&spec.metadata(&self.config().context, options))
            .map_err(|e| VapixError::invalid_input(format!("Invalid upload metadata: {}", e)))?;

        info!(
            "Uploading {} ({} bytes) as {:?} to {}",
            filename,
            content.len(),
            kind,
            device.address
        );

        let outcome = spec.run(|endpoint| {
            let content = content.clone();
            let metadata = metadata.clone();
            let content_type = content_type.clone();
            async move {
                self.upload_to(device, endpoint, filename, &metadata, &content_type, &content).await
            }
        }).await?;

        info!("Upload of {} accepted by {}", filename, outcome.endpoint.path);
        Ok(outcome)
    }

    async fn upload_to(
        &self,
        device: &Device,
        endpoint: Endpoint,
        filename: &str,
        metadata: &str,
        content_type: &str,
        content: &Arc<Vec<u8>>
    ) -> Result<ResponseBody> {
        let url = device.url(endpoint.path)?;
        debug!("POST {} (multipart, {} bytes)", url, content.len());

        // The device challenges before reading the body, so the form is only
        // attached once the Authorization header is known.
        let response = self.exchange(
            device,
            Method::Post,
            url,
            self.config().upload_timeout,
            Probe::Bare,
            |builder| {
                let form = build_form(endpoint, metadata, filename, content_type, content)?;
                Ok(builder.multipart(form))
            }
        ).await?;

        finish(response, endpoint.response_kind).await
    }
}

fn build_form(
    endpoint: Endpoint,
    metadata: &str,
    filename: &str,
    content_type: &str,
    content: &Arc<Vec<u8>>
) -> Result<Form> {
    let mut form = Form::new();

    if let Some(field) = endpoint.metadata_field {
        let json_part = Part::text(metadata.to_string())
            .file_name("blob")
            .mime_str("application/json")
            .map_err(|e| VapixError::invalid_input(format!("Invalid metadata part: {}", e)))?;
        form = form.part(field, json_part);
    }

    let file_part = Part::bytes((**content).clone())
        .file_name(filename.to_string())
        .mime_str(content_type)
        .map_err(|e| VapixError::invalid_input(format!("Invalid content type {}: {}", content_type, e)))?;

    Ok(form.part(endpoint.data_field, file_part))
}
