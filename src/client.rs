use crate::config;
use crate::payload::ScanPayload;
use crate::response::ScanResponse;
use crate::roster::day_key;
use crate::time_trace::AttendanceSpanBackend;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::multipart::{Form, Part};
use reqwest::Url;
use reqwest_tracing::TracingMiddleware;
use serde_json::{json, Value};
use std::io::ErrorKind;
use thiserror::Error;
use tracing::{debug, instrument, warn};

pub const UPLOAD_ERROR: &str = "Upload error";
pub const SCAN_UPLOAD_ERROR: &str = "Scan upload error";

static EXTENSION_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.(?P<ext>[0-9A-Za-z]+)$").unwrap());

static FILENAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"filename\s*=\s*"?(?P<name>[^";]+)"?"#).unwrap());

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid server url: {0}")]
    Url(#[from] url::ParseError),

    #[error("permission denied reading {path}; allow access to the file and try again")]
    PermissionDenied { path: Utf8PathBuf },

    #[error("cannot read {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest_middleware::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned status {status}: {message}")]
    Status { status: u16, message: String },
}

/// MIME type announced for an uploaded image, from its file extension.
pub fn image_mime_type(file_name: &str) -> String {
    EXTENSION_REGEX
        .captures(file_name)
        .and_then(|cap| cap.name("ext"))
        .map(|ext| format!("image/{}", ext.as_str()))
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

/// The file name a `Content-Disposition` header suggests, without any directory part.
pub fn attachment_file_name(header: &str) -> Option<String> {
    let name = FILENAME_REGEX.captures(header)?.name("name")?.as_str().trim();
    let name = name.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or_default();

    match name {
        "" | "." | ".." => None,
        name => Some(name.to_string()),
    }
}

/// A downloaded day export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvExport {
    pub csv: String,
    /// Name the server gave the file; it reflects the server's idea of the day.
    pub file_name: Option<String>,
}

/// Resolves `path` below the server base url, keeping any path prefix the base has.
pub fn endpoint(base: &Url, path: &str) -> Result<Url, url::ParseError> {
    let mut base = base.clone();
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(path.trim_start_matches('/'))
}

pub struct AttendanceClient {
    http: reqwest::Client,
    reqwest: reqwest_middleware::ClientWithMiddleware,
    base_url: Url,
}

impl AttendanceClient {
    pub fn new(config: &config::Server, base_url: Url) -> Result<Self, ClientError> {
        let mut builder = reqwest::ClientBuilder::new().user_agent(config.user_agent.as_str());
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;

        Ok(AttendanceClient {
            reqwest: reqwest_middleware::ClientBuilder::new(http.clone())
                .with(TracingMiddleware::<AttendanceSpanBackend>::new())
                .build(),
            http,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Uploads a photo of a code for the server to decode and mark.
    ///
    /// Only failing to read the file is an error; a failed upload is reported
    /// in the returned response.
    #[instrument(skip(self))]
    pub async fn scan_image(&self, path: &Utf8Path) -> Result<ScanResponse, ClientError> {
        let bytes = tokio::fs::read(path).await.map_err(|source| match source.kind() {
            ErrorKind::PermissionDenied => ClientError::PermissionDenied {
                path: path.to_owned(),
            },
            _ => ClientError::Io {
                path: path.to_owned(),
                source,
            },
        })?;

        let file_name = path.file_name().unwrap_or("image").to_string();
        let mime = image_mime_type(&file_name);
        debug!("Uploading {} ({} bytes, {})", file_name, bytes.len(), mime);

        let part = Part::bytes(bytes).file_name(file_name).mime_str(&mime)?;
        let request = self
            .http
            .post(endpoint(&self.base_url, "scan")?)
            .multipart(Form::new().part("image", part))
            .build()?;

        match self.reqwest.execute(request).await {
            Ok(res) => Ok(read_scan_response(res).await),
            Err(e) => {
                warn!("Image upload failed: {}", e);
                Ok(ScanResponse::transport_failure(UPLOAD_ERROR, e))
            }
        }
    }

    /// Submits a payload decoded on this side.
    #[instrument(skip(self, payload), fields(payload.kind = payload.kind()))]
    pub async fn mark_attendance(&self, payload: &ScanPayload) -> Result<ScanResponse, ClientError> {
        let url = endpoint(&self.base_url, "mark_attendance")?;

        match self.reqwest.post(url).json(payload).send().await {
            Ok(res) => Ok(read_scan_response(res).await),
            Err(e) => {
                warn!("Marking attendance failed: {}", e);
                Ok(ScanResponse::transport_failure(SCAN_UPLOAD_ERROR, e))
            }
        }
    }

    /// The server's whole attendance map, day key to entries.
    #[instrument(skip(self))]
    pub async fn check_attendance(&self) -> Result<Value, ClientError> {
        let res = self
            .reqwest
            .get(endpoint(&self.base_url, "check_attendance")?)
            .send()
            .await?;

        Ok(res.error_for_status()?.json().await?)
    }

    /// CSV for `date`, or for the server's today when `None`.
    #[instrument(skip(self))]
    pub async fn export_csv(&self, date: Option<NaiveDate>) -> Result<CsvExport, ClientError> {
        let mut url = endpoint(&self.base_url, "export_csv")?;
        if let Some(date) = date {
            url.query_pairs_mut().append_pair("date", &day_key(date));
        }

        let res = self.reqwest.get(url).send().await?;
        let status = res.status();
        if !status.is_success() {
            let message = res
                .text()
                .await
                .ok()
                .filter(|text| !text.trim().is_empty())
                .unwrap_or_else(|| format!("Status {}", status.as_u16()));
            return Err(ClientError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let file_name = res
            .headers()
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(attachment_file_name);

        Ok(CsvExport {
            csv: res.text().await?,
            file_name,
        })
    }
}

async fn read_scan_response(res: reqwest::Response) -> ScanResponse {
    let status = res.status().as_u16();
    let body = match res.bytes().await {
        Ok(bytes) => serde_json::from_slice::<Value>(&bytes).ok(),
        Err(e) => {
            warn!("Failed to read response body: {}", e);
            None
        }
    };

    let body = body.unwrap_or_else(|| json!({ "message": format!("Server returned status {}", status) }));
    ScanResponse::from_exchange(status, Some(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_type_follows_extension() {
        assert_eq!(image_mime_type("IMG_0042.jpg"), "image/jpg");
        assert_eq!(image_mime_type("photo.PNG"), "image/PNG");
        assert_eq!(image_mime_type("capture"), "application/octet-stream");
        assert_eq!(image_mime_type("archive.tar.gz"), "image/gz");
    }

    #[test]
    fn attachment_name_is_taken_from_disposition() {
        assert_eq!(
            attachment_file_name(r#"attachment; filename="attendance_2024-03-09.csv""#).as_deref(),
            Some("attendance_2024-03-09.csv")
        );
        assert_eq!(
            attachment_file_name("attachment; filename=report.csv; size=10").as_deref(),
            Some("report.csv")
        );
    }

    #[test]
    fn attachment_name_drops_directories() {
        assert_eq!(
            attachment_file_name(r#"attachment; filename="../../etc/passwd""#).as_deref(),
            Some("passwd")
        );
        assert_eq!(attachment_file_name(r#"attachment; filename="..""#), None);
        assert_eq!(attachment_file_name("attachment"), None);
    }

    #[test]
    fn endpoint_appends_to_bare_host() {
        let base = Url::parse("http://10.0.2.2:5000").unwrap();
        assert_eq!(
            endpoint(&base, "scan").unwrap().as_str(),
            "http://10.0.2.2:5000/scan"
        );
    }

    #[test]
    fn endpoint_keeps_path_prefix() {
        let base = Url::parse("https://school.example/attendance").unwrap();
        assert_eq!(
            endpoint(&base, "/check_attendance").unwrap().as_str(),
            "https://school.example/attendance/check_attendance"
        );
    }

    #[test]
    fn client_builds_with_default_config() {
        let config = config::Server::default();
        let client = AttendanceClient::new(&config, config.default_base_url.clone()).unwrap();
        assert_eq!(client.base_url().as_str(), "http://127.0.0.1:5000/");
    }
}
