//! Tunnels for reaching the node websocket through a forward proxy.
//!
//! `http://` proxies use an HTTP `CONNECT` request with optional Basic
//! credentials. `socks5://` resolves the target locally and sends its address,
//! `socks5h://` lets the proxy resolve the name. Either SOCKS5 form offers
//! username/password authentication when the URL carries credentials.

use std::net::IpAddr;

use base64::{Engine as _, engine::general_purpose};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;
use url::Url;

use crate::feed::FeedError;

/// Upper bound on the proxy's CONNECT response head.
const MAX_CONNECT_RESPONSE: usize = 8 * 1024;

const SOCKS_DEFAULT_PORT: u16 = 1080;

const SOCKS_NO_AUTH: u8 = 0x00;
const SOCKS_USER_PASS: u8 = 0x02;
const SOCKS_NO_ACCEPTABLE: u8 = 0xff;

/// Username and password taken from a proxy URL, percent-decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Credentials in `proxy`, if it has a username.
    pub fn from_url(proxy: &Url) -> Option<Self> {
        if proxy.username().is_empty() {
            return None;
        }
        Some(Self {
            username: decode(proxy.username()),
            password: decode(proxy.password().unwrap_or_default()),
        })
    }

    fn basic(&self) -> String {
        let pair = format!("{}:{}", self.username, self.password);
        format!("Basic {}", general_purpose::STANDARD.encode(pair))
    }
}

/// Percent-decode a URL userinfo part. `+` and `&` are literal there.
fn decode(part: &str) -> String {
    let escaped = part.replace('+', "%2B").replace('&', "%26");
    url::form_urlencoded::parse(format!("v={escaped}").as_bytes())
        .next()
        .map(|(_, v)| v.into_owned())
        .unwrap_or_default()
}

/// How the SOCKS5 request names the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocksTarget {
    /// Resolved locally (`socks5://`).
    Ip(IpAddr),
    /// Resolved by the proxy (`socks5h://`).
    Domain(String),
}

/// Open a TCP stream to `host:port` tunnelled through `proxy`.
pub async fn open_tunnel(proxy: &Url, host: &str, port: u16) -> Result<TcpStream, FeedError> {
    let proxy_host = proxy
        .host_str()
        .ok_or_else(|| FeedError::Proxy(format!("proxy URL {proxy} has no host")))?;
    let credentials = Credentials::from_url(proxy);

    match proxy.scheme() {
        "http" => {
            let proxy_port = proxy.port_or_known_default().unwrap_or(80);
            let stream = TcpStream::connect((proxy_host, proxy_port)).await?;
            http_connect(stream, host, port, credentials.as_ref()).await
        }
        "socks5" => {
            let target = resolve(host, port).await?;
            let proxy_port = proxy.port().unwrap_or(SOCKS_DEFAULT_PORT);
            let stream = TcpStream::connect((proxy_host, proxy_port)).await?;
            socks5_connect(stream, &target, port, credentials.as_ref()).await
        }
        "socks5h" => {
            let target = SocksTarget::Domain(host.to_string());
            let proxy_port = proxy.port().unwrap_or(SOCKS_DEFAULT_PORT);
            let stream = TcpStream::connect((proxy_host, proxy_port)).await?;
            socks5_connect(stream, &target, port, credentials.as_ref()).await
        }
        other => Err(FeedError::Proxy(format!(
            "unsupported proxy scheme {other:?} for websocket tunnel"
        ))),
    }
}

/// Resolve `host` on this machine for a `socks5://` request.
pub async fn resolve(host: &str, port: u16) -> Result<SocksTarget, FeedError> {
    let trimmed = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = trimmed.parse::<IpAddr>() {
        return Ok(SocksTarget::Ip(ip));
    }
    tokio::net::lookup_host((host, port))
        .await?
        .next()
        .map(|addr| SocksTarget::Ip(addr.ip()))
        .ok_or_else(|| FeedError::Proxy(format!("{host} did not resolve to any address")))
}

/// Issue `CONNECT host:port` on an open proxy connection.
pub async fn http_connect(
    mut stream: TcpStream,
    host: &str,
    port: u16,
    credentials: Option<&Credentials>,
) -> Result<TcpStream, FeedError> {
    let target = format!("{host}:{port}");
    let mut request = format!("CONNECT {target} HTTP/1.1\r\nHost: {target}\r\n");
    if let Some(credentials) = credentials {
        request.push_str(&format!("Proxy-Authorization: {}\r\n", credentials.basic()));
    }
    request.push_str("\r\n");
    stream.write_all(request.as_bytes()).await?;

    // Read byte-wise so nothing past the response head is consumed.
    let mut head = Vec::with_capacity(128);
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if stream.read(&mut byte).await? == 0 {
            return Err(FeedError::Proxy(
                "proxy closed the connection during CONNECT".into(),
            ));
        }
        head.push(byte[0]);
        if head.len() > MAX_CONNECT_RESPONSE {
            return Err(FeedError::Proxy("oversized CONNECT response".into()));
        }
    }

    let head = String::from_utf8_lossy(&head);
    let status_line = head.lines().next().unwrap_or_default();
    match status_line.split_whitespace().nth(1) {
        Some(code) if code.starts_with('2') => {
            debug!(%target, "HTTP CONNECT tunnel established");
            Ok(stream)
        }
        _ => Err(FeedError::Proxy(format!(
            "CONNECT {target} rejected: {status_line}"
        ))),
    }
}

/// Run a SOCKS5 `CONNECT` on an open proxy connection.
pub async fn socks5_connect(
    mut stream: TcpStream,
    target: &SocksTarget,
    port: u16,
    credentials: Option<&Credentials>,
) -> Result<TcpStream, FeedError> {
    let greeting: &[u8] = match credentials {
        Some(_) => &[0x05, 0x02, SOCKS_NO_AUTH, SOCKS_USER_PASS],
        None => &[0x05, 0x01, SOCKS_NO_AUTH],
    };
    stream.write_all(greeting).await?;
    let mut choice = [0u8; 2];
    stream.read_exact(&mut choice).await?;
    if choice[0] != 0x05 {
        return Err(FeedError::Proxy(format!(
            "not a SOCKS5 proxy: version {:#04x}",
            choice[0]
        )));
    }
    match (choice[1], credentials) {
        (SOCKS_NO_AUTH, _) => {}
        (SOCKS_USER_PASS, Some(credentials)) => {
            socks5_authenticate(&mut stream, credentials).await?;
        }
        (SOCKS_NO_ACCEPTABLE, _) => {
            return Err(FeedError::Proxy(
                "SOCKS5 proxy accepted none of the offered auth methods".into(),
            ));
        }
        (other, _) => {
            return Err(FeedError::Proxy(format!(
                "SOCKS5 proxy chose unoffered auth method {other:#04x}"
            )));
        }
    }

    let mut request = vec![0x05, 0x01, 0x00];
    match target {
        SocksTarget::Ip(IpAddr::V4(ip)) => {
            request.push(0x01);
            request.extend_from_slice(&ip.octets());
        }
        SocksTarget::Ip(IpAddr::V6(ip)) => {
            request.push(0x04);
            request.extend_from_slice(&ip.octets());
        }
        SocksTarget::Domain(host) => {
            let len = u8::try_from(host.len())
                .map_err(|_| FeedError::Proxy(format!("host name too long for SOCKS5: {host}")))?;
            request.extend_from_slice(&[0x03, len]);
            request.extend_from_slice(host.as_bytes());
        }
    }
    request.extend_from_slice(&port.to_be_bytes());
    stream.write_all(&request).await?;

    let mut reply = [0u8; 4];
    stream.read_exact(&mut reply).await?;
    if reply[1] != 0x00 {
        return Err(FeedError::Proxy(format!(
            "SOCKS5 connect to {target:?}:{port} failed with code {:#04x}",
            reply[1]
        )));
    }

    // Discard the bound address.
    let addr_len = match reply[3] {
        0x01 => 4,
        0x04 => 16,
        0x03 => {
            let mut len = [0u8; 1];
            stream.read_exact(&mut len).await?;
            usize::from(len[0])
        }
        other => {
            return Err(FeedError::Proxy(format!(
                "SOCKS5 reply has unknown address type {other:#04x}"
            )));
        }
    };
    let mut bound = vec![0u8; addr_len + 2];
    stream.read_exact(&mut bound).await?;

    debug!(?target, port, "SOCKS5 tunnel established");
    Ok(stream)
}

/// Username/password sub-negotiation (RFC 1929).
async fn socks5_authenticate(
    stream: &mut TcpStream,
    credentials: &Credentials,
) -> Result<(), FeedError> {
    let user = credentials.username.as_bytes();
    let pass = credentials.password.as_bytes();
    let user_len = u8::try_from(user.len())
        .map_err(|_| FeedError::Proxy("SOCKS5 username longer than 255 bytes".into()))?;
    let pass_len = u8::try_from(pass.len())
        .map_err(|_| FeedError::Proxy("SOCKS5 password longer than 255 bytes".into()))?;

    let mut request = Vec::with_capacity(3 + user.len() + pass.len());
    request.extend_from_slice(&[0x01, user_len]);
    request.extend_from_slice(user);
    request.push(pass_len);
    request.extend_from_slice(pass);
    stream.write_all(&request).await?;

    let mut status = [0u8; 2];
    stream.read_exact(&mut status).await?;
    if status[1] != 0x00 {
        return Err(FeedError::Proxy(format!(
            "SOCKS5 proxy rejected credentials for {:?}",
            credentials.username
        )));
    }
    Ok(())
}
