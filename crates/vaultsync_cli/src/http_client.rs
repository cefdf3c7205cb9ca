//! Blocking HTTP transport backed by reqwest.

use vaultsync_engine::{HttpClient, HttpFault, HttpRequest, HttpResponse, Method};

/// An [`HttpClient`] using a shared reqwest blocking client.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::blocking::Client,
}

impl ReqwestClient {
    /// Builds the client.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("vaultsync/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

fn fault(e: reqwest::Error) -> HttpFault {
    if e.is_timeout() {
        HttpFault::Timeout(e.to_string())
    } else if e.is_connect() || e.is_request() {
        HttpFault::Connection(e.to_string())
    } else {
        HttpFault::Other(e.to_string())
    }
}

impl HttpClient for ReqwestClient {
    fn execute(&self, request: HttpRequest) -> Result<HttpResponse, HttpFault> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        }
        .timeout(request.timeout);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        tracing::trace!(url = %request.url, "sending request");
        let response = builder.send().map_err(fault)?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        Ok(HttpResponse::new(status, headers, Box::new(response)))
    }
}
