use crate::base::context::IoResultExt;
use crate::base::neterror::NetError;
use crate::socket::client::SocketType;
use crate::socket::proxy::{ProxySettings, ProxyType};
use crate::socket::transport::ConnectTarget;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpSocket, TcpStream};

/// Longest proxy CONNECT response head we are willing to buffer.
const MAX_TUNNEL_HEAD: usize = 16 * 1024;

/// Manages the connection process: DNS -> TCP -> proxy handshake -> TLS.
/// Roughly equivalent to net::ConnectJob.
pub struct ConnectJob;

impl ConnectJob {
    pub async fn connect(target: &ConnectTarget) -> Result<SocketType, NetError> {
        let (host, port) = match &target.proxy {
            // If proxy, we connect to PROXY host/port first
            Some(p) => (p.host.as_str(), p.port),
            None => (target.host.as_str(), target.port),
        };

        // 1. DNS Resolution
        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
            .await
            .dns_context(host)?
            .collect();
        if addrs.is_empty() {
            return Err(NetError::NameNotResolvedFor {
                domain: host.to_string(),
                reason: "no addresses".into(),
            });
        }

        // 2. TCP Connect (to proxy or destination)
        let mut stream = None;
        let mut last_err = None;
        for addr in addrs {
            match Self::connect_tcp(addr, target).await {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(e) => {
                    tracing::debug!(%addr, error = %e, "connect attempt failed");
                    last_err = Some(e);
                }
            }
        }
        let mut stream = match stream {
            Some(s) => s,
            None => {
                let err = last_err.unwrap_or_else(|| {
                    std::io::Error::new(std::io::ErrorKind::Other, "no usable address")
                });
                return Err(NetError::connection_failed_to(host, port, err));
            }
        };
        tracing::debug!(host, port, "tcp connected");

        // 2b. Proxy handshake. Plain http through an HTTP proxy needs none:
        // the request itself carries the absolute URI.
        if let Some(p) = &target.proxy {
            match p.proxy_type {
                ProxyType::Http if target.tls => Self::establish_tunnel(&mut stream, p, target).await?,
                ProxyType::Http => {}
                ProxyType::Socks5 => Self::socks5_handshake(&mut stream, p, target).await?,
            }
        }

        // 3. SSL Handshake (if https) - always happens *after* any tunnel is established
        if target.tls {
            let connector = target.tls_options.connector()?;
            let config = target.tls_options.configure(&connector, &target.host)?;
            let tls_stream = tokio_boring::connect(config, &target.host, stream)
                .await
                .map_err(|e| NetError::SslHandshakeFailed {
                    host: target.host.clone(),
                    reason: e.to_string(),
                })?;
            tracing::debug!(host = %target.host, "tls established");
            Ok(SocketType::Ssl(tls_stream))
        } else {
            Ok(SocketType::Tcp(stream))
        }
    }

    async fn connect_tcp(addr: SocketAddr, target: &ConnectTarget) -> std::io::Result<TcpStream> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        if let Some(ip) = target.local_ip {
            socket.bind(SocketAddr::new(ip, 0))?;
        }
        socket.connect(addr).await
    }

    /// HTTP CONNECT tunnel through an HTTP proxy.
    async fn establish_tunnel(
        stream: &mut TcpStream,
        proxy: &ProxySettings,
        target: &ConnectTarget,
    ) -> Result<(), NetError> {
        let authority = target.authority();
        let mut connect_req = format!("CONNECT {} HTTP/1.1\r\nHost: {}\r\n", authority, authority);
        if let Some(auth) = proxy.get_auth_header() {
            connect_req.push_str(&format!("Proxy-Authorization: {}\r\n", auth));
        }
        connect_req.push_str("\r\n");

        stream
            .write_all(connect_req.as_bytes())
            .await
            .write_context()?;

        // Read the response head byte by byte so nothing past it is consumed.
        let mut head = Vec::with_capacity(256);
        while !head.ends_with(b"\r\n\r\n") {
            if head.len() > MAX_TUNNEL_HEAD {
                return Err(NetError::TunnelConnectionFailed);
            }
            let byte = stream.read_u8().await.read_context()?;
            head.push(byte);
        }

        let text = String::from_utf8_lossy(&head);
        let status_line = text.lines().next().unwrap_or("");
        let ok = status_line
            .split_whitespace()
            .nth(1)
            .is_some_and(|code| code.starts_with('2'));
        if !ok {
            tracing::warn!(status = status_line, proxy = %proxy.authority(), "proxy tunnel refused");
            return Err(NetError::TunnelConnectionFailed);
        }
        tracing::debug!(%authority, "proxy tunnel established");
        Ok(())
    }

    /// SOCKS5 handshake (RFC 1928) with optional username/password (RFC 1929).
    async fn socks5_handshake(
        stream: &mut TcpStream,
        proxy: &ProxySettings,
        target: &ConnectTarget,
    ) -> Result<(), NetError> {
        let creds = proxy.get_socks5_auth();
        let greeting: &[u8] = if creds.is_some() {
            &[0x05, 0x02, 0x00, 0x02]
        } else {
            &[0x05, 0x01, 0x00]
        };
        stream.write_all(greeting).await.write_context()?;

        let mut reply = [0u8; 2];
        stream.read_exact(&mut reply).await.read_context()?;
        if reply[0] != 0x05 {
            return Err(NetError::SocksConnectionFailed(format!(
                "unexpected SOCKS version {}",
                reply[0]
            )));
        }

        match (reply[1], creds) {
            (0x00, _) => {}
            (0x02, Some((user, pass))) => {
                if user.len() > 255 || pass.len() > 255 {
                    return Err(NetError::SocksConnectionFailed(
                        "credentials longer than 255 bytes".into(),
                    ));
                }
                let mut auth = Vec::with_capacity(3 + user.len() + pass.len());
                auth.push(0x01);
                auth.push(user.len() as u8);
                auth.extend_from_slice(user.as_bytes());
                auth.push(pass.len() as u8);
                auth.extend_from_slice(pass.as_bytes());
                stream.write_all(&auth).await.write_context()?;

                let mut status = [0u8; 2];
                stream.read_exact(&mut status).await.read_context()?;
                if status[1] != 0x00 {
                    return Err(NetError::SocksConnectionFailed(
                        "authentication rejected".into(),
                    ));
                }
            }
            (method, _) => {
                return Err(NetError::SocksConnectionFailed(format!(
                    "no acceptable authentication method (0x{:02x})",
                    method
                )));
            }
        }

        if target.host.len() > 255 {
            return Err(NetError::SocksConnectionFailed("host name too long".into()));
        }
        let mut request = vec![0x05, 0x01, 0x00, 0x03, target.host.len() as u8];
        request.extend_from_slice(target.host.as_bytes());
        request.extend_from_slice(&target.port.to_be_bytes());
        stream.write_all(&request).await.write_context()?;

        let mut head = [0u8; 4];
        stream.read_exact(&mut head).await.read_context()?;
        if head[1] != 0x00 {
            return Err(NetError::SocksConnectionFailed(socks5_reply_message(head[1])));
        }
        let addr_len = match head[3] {
            0x01 => 4,
            0x04 => 16,
            0x03 => stream.read_u8().await.read_context()? as usize,
            other => {
                return Err(NetError::SocksConnectionFailed(format!(
                    "unknown address type {}",
                    other
                )))
            }
        };
        // Bound address and port; unused.
        let mut bound = vec![0u8; addr_len + 2];
        stream.read_exact(&mut bound).await.read_context()?;

        tracing::debug!(host = %target.host, port = target.port, "socks5 tunnel established");
        Ok(())
    }
}

fn socks5_reply_message(code: u8) -> String {
    match code {
        0x01 => "general SOCKS server failure".into(),
        0x02 => "connection not allowed by ruleset".into(),
        0x03 => "network unreachable".into(),
        0x04 => "host unreachable".into(),
        0x05 => "connection refused".into(),
        0x06 => "TTL expired".into(),
        0x07 => "command not supported".into(),
        0x08 => "address type not supported".into(),
        other => format!("unknown SOCKS error 0x{:02x}", other),
    }
}
