use crate::domain::errors::TransportError;
use crate::domain::ports::{PushMethod, PushRequest, Transport, TransportResponse};
use crate::infrastructure::core::http_client_factory::HttpClientFactory;
use crate::infrastructure::push::exposition;
use async_trait::async_trait;
use reqwest::{Client, Method, header};
use std::time::Duration;

/// `Transport` backed by a shared `reqwest` client
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            client: HttpClientFactory::create_client(connect_timeout),
        }
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

fn method_of(method: PushMethod) -> Method {
    match method {
        PushMethod::Put => Method::PUT,
        PushMethod::Post => Method::POST,
        PushMethod::Delete => Method::DELETE,
    }
}

fn map_error(e: reqwest::Error, timeout: Duration) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(timeout)
    } else if e.is_connect() || e.is_request() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Protocol(e.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &PushRequest) -> Result<TransportResponse, TransportError> {
        let mut builder = self
            .client
            .request(method_of(request.method), &request.url)
            .timeout(request.timeout);
        if request.method != PushMethod::Delete {
            builder = builder
                .header(header::CONTENT_TYPE, exposition::content_type())
                .body(request.body.clone());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| map_error(e, request.timeout))?;
        let status = response.status().as_u16();
        // The body only matters for error reporting; a broken body on a 2xx
        // is still a delivered push.
        let body = response.text().await.unwrap_or_default();

        Ok(TransportResponse { status, body })
    }
}
