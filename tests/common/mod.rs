#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

use chain_log_notifier::signatures::TRANSFER_SIGNATURE;

pub const SUBSCRIPTION_ID: &str =
    "0x9cef478923ff08bf67fde6c64013158d9cef478923ff08bf67fde6c64013158d";

/// How the fake node answers `eth_subscribe`.
#[derive(Clone, Default)]
pub struct NodeScript {
    /// Log objects pushed right after a successful subscribe.
    pub logs: Vec<Value>,
    /// Close the socket after pushing `logs`.
    pub close_after: bool,
    /// Answer `eth_subscribe` with a JSON-RPC error.
    pub reject_subscribe: bool,
}

/// Requests seen by the fake node, in arrival order.
pub type Requests = Arc<Mutex<Vec<Value>>>;

/// Transfer log from `address(from)` to `address(to)` in transaction `tx_hash(tx)`.
pub fn transfer_log(from: u8, to: u8, tx: u8) -> Value {
    json!({
        "address": "0x1c7d4b196cb0c7b01d743fbc6116a902379c7238",
        "topics": [TRANSFER_SIGNATURE, word(from), word(to)],
        "data": "0x",
        "blockNumber": "0x1",
        "transactionHash": tx_hash(tx),
        "logIndex": "0x0",
        "removed": false
    })
}

/// 20-byte address made of one repeated byte.
pub fn address(byte: u8) -> String {
    format!("0x{}", format!("{byte:02x}").repeat(20))
}

/// `address(byte)` left-padded to a 32-byte topic word.
pub fn word(byte: u8) -> String {
    format!("0x{}{}", "0".repeat(24), format!("{byte:02x}").repeat(20))
}

pub fn tx_hash(byte: u8) -> String {
    format!("0x{}", format!("{byte:02x}").repeat(32))
}

/// Start a websocket JSON-RPC node on localhost. Returns its `ws://` URL.
pub async fn spawn_node(script: NodeScript) -> (String, Requests) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    let requests: Requests = Arc::default();

    let seen = requests.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(serve_node(stream, script.clone(), seen.clone()));
        }
    });
    (url, requests)
}

async fn serve_node(stream: TcpStream, script: NodeScript, seen: Requests) {
    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };

    while let Some(Ok(msg)) = ws.next().await {
        let Message::Text(text) = msg else { continue };
        let req: Value = serde_json::from_str(text.as_str()).unwrap();
        seen.lock().unwrap().push(req.clone());
        let id = req["id"].clone();

        let reply = match req["method"].as_str() {
            Some("eth_chainId") => json!({ "jsonrpc": "2.0", "id": id, "result": "0xaa36a7" }),
            Some("eth_subscribe") if script.reject_subscribe => json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": { "code": -32000, "message": "subscriptions not supported" }
            }),
            Some("eth_subscribe") => json!({ "jsonrpc": "2.0", "id": id, "result": SUBSCRIPTION_ID }),
            _ => json!({ "jsonrpc": "2.0", "id": id, "result": null }),
        };
        if ws.send(Message::Text(reply.to_string().into())).await.is_err() {
            return;
        }

        if req["method"] == "eth_subscribe" && !script.reject_subscribe {
            for log in &script.logs {
                let note = json!({
                    "jsonrpc": "2.0",
                    "method": "eth_subscription",
                    "params": { "subscription": SUBSCRIPTION_ID, "result": log }
                });
                if ws.send(Message::Text(note.to_string().into())).await.is_err() {
                    return;
                }
            }
            if script.close_after {
                let _ = ws.close(None).await;
                return;
            }
        }
    }
}

/// Start an HTTP server that answers every request with `status`.
/// Each request target (path and query) is sent on the returned channel.
pub async fn spawn_http(status: u16) -> (String, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let Some(head) = read_head(&mut stream).await else {
                    return;
                };
                let target = head
                    .lines()
                    .next()
                    .and_then(|l| l.split_whitespace().nth(1))
                    .unwrap_or_default()
                    .to_string();
                let _ = tx.send(target);

                let body = if status == 200 {
                    r#"{"ok":true}"#
                } else {
                    r#"{"ok":false}"#
                };
                let resp = format!(
                    "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(resp.as_bytes()).await;
            });
        }
    });
    (base, rx)
}

/// Start an HTTP CONNECT proxy. Returns its `http://` URL and the request heads seen.
pub async fn spawn_connect_proxy() -> (String, mpsc::UnboundedReceiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut client, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let Some(head) = read_head(&mut client).await else {
                    return;
                };
                let target = head
                    .lines()
                    .next()
                    .and_then(|l| l.split_whitespace().nth(1))
                    .unwrap_or_default()
                    .to_string();
                let _ = tx.send(head.clone());

                let Ok(mut upstream) = TcpStream::connect(&target).await else {
                    let _ = client.write_all(b"HTTP/1.1 502 Bad Gateway\r\n\r\n").await;
                    return;
                };
                let _ = client
                    .write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")
                    .await;
                let _ = tokio::io::copy_bidirectional(&mut client, &mut upstream).await;
            });
        }
    });
    (url, rx)
}

/// One SOCKS5 CONNECT as seen by the fake proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocksRequest {
    /// Methods offered in the greeting.
    pub methods: Vec<u8>,
    /// Username and password, when the client authenticated.
    pub credentials: Option<(String, String)>,
    /// Address type of the CONNECT request.
    pub atyp: u8,
    /// Target as `host:port`.
    pub target: String,
}

/// Start a SOCKS5 proxy. With `credentials` set it requires username/password
/// auth, otherwise it picks no-auth. Returns its `host:port` and the requests seen.
pub async fn spawn_socks5_proxy(
    credentials: Option<(&str, &str)>,
) -> (String, mpsc::UnboundedReceiver<SocksRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let (tx, rx) = mpsc::unbounded_channel();
    let required = credentials.map(|(u, p)| (u.to_string(), p.to_string()));

    tokio::spawn(async move {
        while let Ok((mut client, _)) = listener.accept().await {
            let tx = tx.clone();
            let required = required.clone();
            tokio::spawn(async move {
                let Some(request) = socks5_handshake(&mut client, required).await else {
                    return;
                };
                let upstream = TcpStream::connect(request.target.as_str()).await;
                let _ = tx.send(request);
                let Ok(mut upstream) = upstream else {
                    let _ = client.write_all(&[0x05, 0x05, 0x00, 0x01, 0, 0, 0, 0, 0, 0]).await;
                    return;
                };
                let _ = client
                    .write_all(&[0x05, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0])
                    .await;
                let _ = tokio::io::copy_bidirectional(&mut client, &mut upstream).await;
            });
        }
    });
    (addr, rx)
}

async fn socks5_handshake(
    client: &mut TcpStream,
    required: Option<(String, String)>,
) -> Option<SocksRequest> {
    let mut head = [0u8; 2];
    client.read_exact(&mut head).await.ok()?;
    let mut methods = vec![0u8; usize::from(head[1])];
    client.read_exact(&mut methods).await.ok()?;

    let mut credentials = None;
    if let Some((user, pass)) = required {
        if !methods.contains(&0x02) {
            client.write_all(&[0x05, 0xff]).await.ok()?;
            return None;
        }
        client.write_all(&[0x05, 0x02]).await.ok()?;
        let got_user = read_short(client, 1).await?;
        let got_pass = read_short(client, 0).await?;
        let ok = got_user == user && got_pass == pass;
        client.write_all(&[0x01, u8::from(!ok)]).await.ok()?;
        if !ok {
            return None;
        }
        credentials = Some((got_user, got_pass));
    } else {
        client.write_all(&[0x05, 0x00]).await.ok()?;
    }

    let mut request = [0u8; 4];
    client.read_exact(&mut request).await.ok()?;
    let host = match request[3] {
        0x01 => {
            let mut ip = [0u8; 4];
            client.read_exact(&mut ip).await.ok()?;
            std::net::Ipv4Addr::from(ip).to_string()
        }
        0x04 => {
            let mut ip = [0u8; 16];
            client.read_exact(&mut ip).await.ok()?;
            format!("[{}]", std::net::Ipv6Addr::from(ip))
        }
        _ => read_short(client, 0).await?,
    };
    let mut port = [0u8; 2];
    client.read_exact(&mut port).await.ok()?;

    Some(SocksRequest {
        methods,
        credentials,
        atyp: request[3],
        target: format!("{host}:{}", u16::from_be_bytes(port)),
    })
}

/// Skip `skip` bytes, then read a length-prefixed string.
async fn read_short(client: &mut TcpStream, skip: usize) -> Option<String> {
    let mut prefix = vec![0u8; skip + 1];
    client.read_exact(&mut prefix).await.ok()?;
    let mut value = vec![0u8; usize::from(prefix[skip])];
    client.read_exact(&mut value).await.ok()?;
    String::from_utf8(value).ok()
}

async fn read_head(stream: &mut TcpStream) -> Option<String> {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if stream.read(&mut byte).await.ok()? == 0 {
            return None;
        }
        head.push(byte[0]);
    }
    Some(String::from_utf8_lossy(&head).into_owned())
}

/// Value of `text` in a request target's query string.
pub fn query_text(target: &str) -> Option<String> {
    let url = url::Url::parse(&format!("http://localhost{target}")).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == "text")
        .map(|(_, v)| v.into_owned())
}
