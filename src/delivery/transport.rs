use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::header::{CONTENT_LENGTH, CONTENT_TYPE};
use hyper::{Method, Request, Uri};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use std::sync::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::multipart;
use crate::config::EndpointConfig;
use crate::error::TransportError;

/// A multipart submission: one file part plus text fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadForm {
    pub file_field: String,
    pub filename: String,
    pub content_type: String,
    pub payload: Bytes,
    pub fields: Vec<(String, String)>,
}

/// Status and raw body returned by the endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Upload transport trait
///
/// `submit` is the confirmed primary path. `send_beacon` only initiates a
/// request and must not wait for it; it is the strategy used while the host
/// is tearing down.
#[async_trait::async_trait]
pub trait UploadTransport: Send + Sync {
    async fn submit(&self, form: UploadForm) -> Result<TransportResponse, TransportError>;

    /// Start a fire-and-forget send; `true` once the request is on its way
    fn send_beacon(&self, form: UploadForm) -> bool;

    /// Give sends started by `send_beacon` up to `grace` to finish
    ///
    /// Returns how many were still running when the grace period ran out.
    async fn flush_beacons(&self, _grace: Duration) -> usize {
        0
    }

    fn name(&self) -> &str;
}

type HttpsClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// HTTP(S) transport for the collection endpoint
pub struct HttpTransport {
    endpoint: Uri,
    timeout: Duration,
    client: HttpsClient,
    beacons: Mutex<Vec<JoinHandle<()>>>,
}

impl HttpTransport {
    pub fn new(config: &EndpointConfig) -> Result<Self, TransportError> {
        let endpoint: Uri = config
            .url
            .parse()
            .map_err(|e| TransportError::InvalidEndpoint(format!("{}: {}", config.url, e)))?;

        if endpoint.host().is_none() {
            return Err(TransportError::InvalidEndpoint(format!(
                "{}: missing host",
                config.url
            )));
        }

        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .build();

        let client = Client::builder(TokioExecutor::new()).build(https);

        info!("Upload transport ready for {}", endpoint);

        Ok(Self {
            endpoint,
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
            client,
            beacons: Mutex::new(Vec::new()),
        })
    }

    fn build_request(&self, form: &UploadForm) -> Result<Request<Full<Bytes>>, TransportError> {
        let (content_type, body) = multipart::encode(form, &multipart::new_boundary());

        Request::builder()
            .method(Method::POST)
            .uri(self.endpoint.clone())
            .header(CONTENT_TYPE, content_type)
            .header(CONTENT_LENGTH, body.len())
            .body(Full::new(body))
            .map_err(|e| TransportError::Request(e.to_string()))
    }
}

#[async_trait::async_trait]
impl UploadTransport for HttpTransport {
    async fn submit(&self, form: UploadForm) -> Result<TransportResponse, TransportError> {
        let request = self.build_request(&form)?;
        let client = self.client.clone();

        let exchange = async move {
            let response = client
                .request(request)
                .await
                .map_err(|e| TransportError::Request(e.to_string()))?;

            let status = response.status().as_u16();
            let body = match response.into_body().collect().await {
                Ok(collected) => collected.to_bytes(),
                Err(e) => {
                    debug!("Failed to read response body: {}", e);
                    Bytes::new()
                }
            };

            Ok(TransportResponse { status, body })
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| TransportError::Timeout(self.timeout.as_secs()))?
    }

    fn send_beacon(&self, form: UploadForm) -> bool {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No runtime available for teardown send");
            return false;
        };

        let request = match self.build_request(&form) {
            Ok(request) => request,
            Err(e) => {
                warn!("Failed to build teardown request: {}", e);
                return false;
            }
        };

        let client = self.client.clone();
        let filename = form.filename;
        let task = runtime.spawn(async move {
            match client.request(request).await {
                Ok(response) => debug!("Teardown send of {} answered {}", filename, response.status()),
                Err(e) => debug!("Teardown send of {} failed: {}", filename, e),
            }
        });

        self.beacons
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(task);

        true
    }

    async fn flush_beacons(&self, grace: Duration) -> usize {
        let tasks: Vec<_> = self
            .beacons
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .drain(..)
            .collect();

        if tasks.is_empty() {
            return 0;
        }

        let deadline = Instant::now() + grace;
        let total = tasks.len();
        let mut unfinished = 0;
        for task in tasks {
            if tokio::time::timeout_at(deadline, task).await.is_err() {
                unfinished += 1;
            }
        }

        if unfinished > 0 {
            warn!(
                "{}/{} teardown send(s) still running after {:?}",
                unfinished, total, grace
            );
        } else {
            info!("{} teardown send(s) completed", total);
        }

        unfinished
    }

    fn name(&self) -> &str {
        "http"
    }
}
