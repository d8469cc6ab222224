//! HTTP Client
//!
//! Async HTTP/1.1 client on smol. Plain `http` only; each exchange opens its
//! own connection and closes it when the response has been read.

use std::rc::Rc;
use std::time::Duration;

use smol::io::{AsyncWriteExt, BufReader};
use smol::net::TcpStream;
use smol::Timer;
use url::Url;

use crate::http1::{read_response, Http1Request};
use crate::transport::{ResponseFuture, Transport};
use crate::{Method, NetError, Request, Response};

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// User agent string
    pub user_agent: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Whole-exchange timeout
    pub request_timeout: Duration,
    /// Max redirects to follow (0 = disable)
    pub max_redirects: u32,
    /// Default headers
    pub default_headers: Vec<(String, String)>,
    /// Largest response body accepted, in bytes
    pub max_body_size: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("hx/", env!("CARGO_PKG_VERSION")).into(),
            connect_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(60),
            max_redirects: 10,
            default_headers: Vec::new(),
            max_body_size: 16 * 1024 * 1024,
        }
    }
}

/// HTTP client builder
pub struct HttpClientBuilder {
    config: ClientConfig,
}

impl HttpClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    pub fn user_agent(mut self, ua: &str) -> Self {
        self.config.user_agent = ua.to_string();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn max_redirects(mut self, max: u32) -> Self {
        self.config.max_redirects = max;
        self
    }

    pub fn max_body_size(mut self, bytes: usize) -> Self {
        self.config.max_body_size = bytes;
        self
    }

    pub fn default_header(mut self, name: &str, value: &str) -> Self {
        self.config.default_headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn build(self) -> HttpClient {
        HttpClient::with_config(self.config)
    }
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// HTTP client
#[derive(Debug, Clone)]
pub struct HttpClient {
    config: Rc<ClientConfig>,
}

impl HttpClient {
    /// Create a new HTTP client with default settings
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a client builder
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    /// Create with custom config
    pub fn with_config(config: ClientConfig) -> Self {
        Self {
            config: Rc::new(config),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Perform a request, following redirects
    pub async fn execute(&self, request: Request) -> Result<Response, NetError> {
        let timeout = self.config.request_timeout;
        smol::future::or(self.follow_redirects(request), async move {
            Timer::after(timeout).await;
            Err(NetError::Network(format!("request timed out after {:?}", timeout)))
        })
        .await
    }

    async fn follow_redirects(&self, mut request: Request) -> Result<Response, NetError> {
        let mut redirects = 0;
        loop {
            let url = Url::parse(&request.url).map_err(|e| NetError::InvalidUrl(e.to_string()))?;
            let response = self.exchange(&url, &request).await?;

            let location = match response.header("location") {
                Some(loc) if (300..400).contains(&response.status) => loc,
                _ => return Ok(response),
            };
            if redirects >= self.config.max_redirects {
                tracing::warn!("Redirect limit reached at {}", url);
                return Ok(response);
            }
            redirects += 1;

            let next = url.join(location).map_err(|e| NetError::InvalidUrl(e.to_string()))?;
            tracing::debug!("Redirect {} -> {}", response.status, next);

            // 307/308 preserve method and body
            if response.status != 307 && response.status != 308 {
                request.method = Method::Get;
                request.body = None;
            }
            request.url = next.to_string();
        }
    }

    async fn exchange(&self, url: &Url, request: &Request) -> Result<Response, NetError> {
        if url.scheme() != "http" {
            return Err(NetError::UnsupportedScheme(url.scheme().to_string()));
        }
        let host = url
            .host_str()
            .ok_or_else(|| NetError::InvalidUrl(format!("{} has no host", url)))?;
        let port = url.port_or_known_default().unwrap_or(80);

        let mut target = url.path().to_string();
        if let Some(query) = url.query() {
            target.push('?');
            target.push_str(query);
        }

        let host_header = match url.port() {
            Some(p) => format!("{}:{}", host, p),
            None => host.to_string(),
        };
        let mut req = Http1Request::new(request.method.as_str(), &target)
            .header("Host", &host_header)
            .header("User-Agent", &self.config.user_agent);
        for (name, value) in &self.config.default_headers {
            req = req.header(name, value);
        }
        for (name, value) in &request.headers {
            req = req.header(name, value);
        }
        req = req.header("Connection", "close");
        if let Some(body) = &request.body {
            req = req.body(body.clone());
        }

        tracing::debug!("HTTP {:?} {}", request.method, url);

        let connect_timeout = self.config.connect_timeout;
        let mut stream = smol::future::or(
            async { TcpStream::connect((host, port)).await.map_err(NetError::from) },
            async move {
                Timer::after(connect_timeout).await;
                Err(NetError::ConnectTimeout)
            },
        )
        .await?;

        stream.write_all(&req.serialize()).await?;
        stream.flush().await?;

        let mut reader = BufReader::new(stream);
        let resp = read_response(&mut reader, self.config.max_body_size)
            .await
            .map_err(|e| NetError::Protocol(e.to_string()))?;

        tracing::debug!("HTTP {} {} ({} bytes)", resp.status, url, resp.body.len());

        Ok(Response {
            status: resp.status,
            headers: resp.headers,
            body: resp.body,
        })
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HttpClient {
    fn send(&self, request: Request) -> ResponseFuture {
        let client = self.clone();
        Box::pin(async move { client.execute(request).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let client = HttpClient::builder()
            .user_agent("hx-test/1")
            .max_redirects(2)
            .max_body_size(4096)
            .default_header("Accept", "text/html")
            .build();

        assert_eq!(client.config().user_agent, "hx-test/1");
        assert_eq!(client.config().max_redirects, 2);
        assert_eq!(client.config().max_body_size, 4096);
        assert_eq!(client.config().default_headers.len(), 1);
    }

    #[test]
    fn test_https_unsupported() {
        let client = HttpClient::new();
        let err = smol::block_on(client.execute(Request::get("https://example.com/"))).unwrap_err();
        assert!(matches!(err, NetError::UnsupportedScheme(s) if s == "https"));
    }

    #[test]
    fn test_invalid_url() {
        let client = HttpClient::new();
        let err = smol::block_on(client.execute(Request::get("not a url"))).unwrap_err();
        assert!(matches!(err, NetError::InvalidUrl(_)));
    }
}
