use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::{multipart, Client};
use reqwest::header::{self, HeaderMap, HeaderValue};

use crate::utils::config::NETWORK_TIMEOUT;

/// Plain blocking client used for image submission and tag-page fetches.
/// Every request carries the global timeout; failures are never retried
/// here, the orchestration layer records them per item.
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build http client")?;
        Ok(Self { client })
    }

    pub fn fetch(&self, url: &str) -> Result<String> {
        let resp = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("Request failed: {}", url))?;
        resp.text()
            .with_context(|| format!("Failed to read response body: {}", url))
    }

    /// Submit an image file to a search engine frontend and return the
    /// result page HTML. The engines take a multipart form with a "file"
    /// field plus an optional "forcegray" toggle.
    pub fn submit_file_for_search(
        &self,
        engine_url: &str,
        path: &Path,
        force_gray: bool,
    ) -> Result<String> {
        let mut form = multipart::Form::new()
            .file("file", path)
            .with_context(|| format!("Failed to attach file: {:?}", path))?;
        if force_gray {
            form = form.text("forcegray", "on");
        }
        let resp = self
            .client
            .post(engine_url)
            .multipart(form)
            .send()
            .with_context(|| format!("Search submission failed: {}", engine_url))?;
        resp.text()
            .with_context(|| format!("Failed to read result page: {}", engine_url))
    }
}

const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:109.0) Gecko/20100101 Firefox/115.0";

/// Client profile for pages behind an anti-bot challenge: browser-like
/// headers and a cookie store so the challenge cookie survives across
/// requests. Only the parsers that need it reach for this.
pub struct BypassClient {
    client: Client,
}

impl BypassClient {
    pub fn new() -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("en-US,en;q=0.5"),
        );
        let client = Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .default_headers(headers)
            .cookie_store(true)
            .timeout(NETWORK_TIMEOUT)
            .build()
            .context("Failed to build bypass client")?;
        Ok(Self { client })
    }

    pub fn fetch(&self, url: &str) -> Result<String> {
        let resp = self
            .client
            .get(url)
            .send()
            .with_context(|| format!("Bypass request failed: {}", url))?;
        resp.text()
            .with_context(|| format!("Failed to read bypass response body: {}", url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread::JoinHandle;

    // one-shot loopback server that records the raw request bytes
    fn capture_one_request(listener: TcpListener) -> JoinHandle<String> {
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream
                .set_read_timeout(Some(Duration::from_millis(500)))
                .unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                match stream.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    Err(_) => break,
                }
            }
            stream
                .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
                .unwrap();
            String::from_utf8_lossy(&buf).into_owned()
        })
    }

    fn submit(force_gray: bool) -> String {
        let dir = tempfile::tempdir().unwrap();
        let img = dir.path().join("a.jpg");
        std::fs::write(&img, b"not really a jpeg").unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let handle = capture_one_request(listener);
        let client = HttpClient::new(Duration::from_secs(5)).unwrap();
        client.submit_file_for_search(&url, &img, force_gray).unwrap();
        handle.join().unwrap()
    }

    #[test]
    fn test_submission_carries_file_and_forcegray_fields() {
        let request = submit(true);
        assert!(request.contains(r#"name="file""#));
        assert!(request.contains(r#"name="forcegray""#));
        assert!(request.contains("\r\n\r\non\r\n"));
    }

    #[test]
    fn test_submission_omits_forcegray_by_default() {
        let request = submit(false);
        assert!(request.contains(r#"name="file""#));
        assert!(!request.contains("forcegray"));
    }
}
