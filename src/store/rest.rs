use crate::store::{CrowdStore, StoreError};
use serde_json::Value;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

const DEFAULT_PORT: u16 = 80;

/// REST client for an RTDB-style status store: values live at
/// `{path}.json?auth={token}`, `PUT` overwrites, `POST` appends.
pub struct RestStore {
    host: String,
    auth: String,
    timeout: Duration,
}

impl RestStore {
    pub fn new(host: String, auth: String, timeout: Duration) -> Self {
        Self {
            host,
            auth,
            timeout,
        }
    }

    fn request(&self, method: &str, path: &str, body: &str) -> Result<(), StoreError> {
        let (host, port) = split_host_port(&self.host)?;
        let addr = (host, port)
            .to_socket_addrs()
            .map_err(|err| StoreError::Dns(err.to_string()))?
            .next()
            .ok_or_else(|| StoreError::Dns("no addresses resolved".to_string()))?;

        let mut stream =
            TcpStream::connect_timeout(&addr, self.timeout).map_err(StoreError::Connect)?;
        stream
            .set_read_timeout(Some(self.timeout))
            .map_err(StoreError::Io)?;
        stream
            .set_write_timeout(Some(self.timeout))
            .map_err(StoreError::Io)?;

        let target = request_target(path, &self.auth);
        let request = format!(
            "{} {} HTTP/1.1\r\nHost: {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            method,
            target,
            host,
            body.len(),
            body
        );

        stream
            .write_all(request.as_bytes())
            .map_err(StoreError::Io)?;

        let mut response = String::new();
        stream
            .read_to_string(&mut response)
            .map_err(StoreError::Io)?;

        let (headers, body) = response
            .split_once("\r\n\r\n")
            .ok_or_else(|| StoreError::Http(0, "invalid http response".to_string()))?;

        let status_line = headers
            .lines()
            .next()
            .ok_or_else(|| StoreError::Http(0, "missing status line".to_string()))?;
        let status_code = status_line
            .split_whitespace()
            .nth(1)
            .ok_or_else(|| StoreError::Http(0, "missing status code".to_string()))?
            .parse::<u16>()
            .map_err(|_| StoreError::Http(0, "invalid status code".to_string()))?;

        if status_code >= 400 {
            return Err(StoreError::Http(status_code, body.trim().to_string()));
        }

        Ok(())
    }
}

impl CrowdStore for RestStore {
    fn set(&mut self, path: &str, value: &Value) -> Result<(), StoreError> {
        self.request("PUT", path, &value.to_string())
    }

    fn push(&mut self, path: &str, value: &Value) -> Result<(), StoreError> {
        self.request("POST", path, &value.to_string())
    }
}

fn split_host_port(host: &str) -> Result<(&str, u16), StoreError> {
    let mut parts = host.splitn(2, ':');
    let name = parts
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| StoreError::InvalidHost("missing host".to_string()))?;
    let port = match parts.next() {
        Some(port) if !port.is_empty() => port
            .parse::<u16>()
            .map_err(|_| StoreError::InvalidHost(format!("invalid port: {port}")))?,
        Some(_) => return Err(StoreError::InvalidHost("empty port".to_string())),
        None => DEFAULT_PORT,
    };
    Ok((name, port))
}

fn request_target(path: &str, auth: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.starts_with('/') {
        format!("{trimmed}.json?auth={auth}")
    } else {
        format!("/{trimmed}.json?auth={auth}")
    }
}
