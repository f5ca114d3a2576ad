//! Local SOCKS inbound.
//!
//! Accepts SOCKS5 and SOCKS4/4a CONNECT requests on a local port and hands
//! each negotiated connection, together with its destination metadata, to the
//! bridge through a bounded queue.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};

use crate::error::{Error, Result};
use crate::metadata::{AddrType, Metadata};

/// SOCKS5 protocol version byte.
pub const SOCKS5_VERSION: u8 = 0x05;
/// SOCKS4 protocol version byte.
pub const SOCKS4_VERSION: u8 = 0x04;

const METHOD_NONE: u8 = 0x00;
const METHOD_INVALID: u8 = 0xff;

const CMD_CONNECT: u8 = 0x01;

const REPLY_SUCCEEDED: u8 = 0x00;
const REPLY_COMMAND_NOT_SUPPORTED: u8 = 0x07;
const REPLY_ADDR_TYPE_NOT_SUPPORTED: u8 = 0x08;

const SOCKS4_GRANTED: u8 = 0x5a;
const SOCKS4_REJECTED: u8 = 0x5b;

/// Longest user id or domain accepted in a SOCKS4 request.
const MAX_SOCKS4_FIELD: usize = 255;

/// Time a client has to finish the SOCKS negotiation.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Pause after a failed accept (e.g. EMFILE) before trying again.
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// A negotiated inbound connection waiting to be relayed.
#[derive(Debug)]
pub struct ConnContext {
    /// Requested destination
    pub metadata: Metadata,
    /// Client connection, positioned after the SOCKS reply
    pub stream: TcpStream,
    /// Client address
    pub peer: SocketAddr,
}

/// Bind a listening socket on `addr` and register it with `runtime`.
///
/// Binding is synchronous so callers can report bind errors without awaiting.
pub fn bind(addr: &str, runtime: &Handle) -> std::io::Result<TcpListener> {
    let listener = std::net::TcpListener::bind(addr)?;
    listener.set_nonblocking(true)?;

    let _guard = runtime.enter();
    TcpListener::from_std(listener)
}

/// Accept connections until `shutdown` fires or the queue is closed.
///
/// A queue slot is reserved before each accept, so a full queue stalls the
/// listener instead of piling up handshakes.
pub async fn serve(
    listener: TcpListener,
    queue: mpsc::Sender<ConnContext>,
    mut shutdown: watch::Receiver<bool>,
) {
    let local_addr = listener.local_addr().ok();

    loop {
        let permit = tokio::select! {
            _ = shutdown.changed() => break,
            permit = queue.clone().reserve_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let (mut stream, peer) = tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!("Accept error: {}", e);
                    drop(permit);
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    continue;
                }
            },
        };

        tracing::debug!("SOCKS connection from {}", peer);

        tokio::spawn(async move {
            match tokio::time::timeout(HANDSHAKE_TIMEOUT, handshake(&mut stream)).await {
                Ok(Ok(metadata)) => {
                    tracing::debug!("{} requested {}", peer, metadata);
                    permit.send(ConnContext {
                        metadata,
                        stream,
                        peer,
                    });
                }
                Ok(Err(e)) => {
                    tracing::debug!("SOCKS handshake with {} failed: {}", peer, e);
                }
                Err(_) => {
                    tracing::debug!("SOCKS handshake with {} timed out", peer);
                }
            }
        });
    }

    if let Some(addr) = local_addr {
        tracing::info!("SOCKS inbound on {} stopped", addr);
    }
}

/// Negotiate a SOCKS CONNECT request and return its destination.
///
/// On success the client has already been sent a success reply.
pub async fn handshake<S>(stream: &mut S) -> Result<Metadata>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match stream.read_u8().await? {
        SOCKS5_VERSION => handshake_socks5(stream).await,
        SOCKS4_VERSION => handshake_socks4(stream).await,
        v => Err(Error::InvalidMessage(format!(
            "unsupported SOCKS version: 0x{:02x}",
            v
        ))),
    }
}

async fn handshake_socks5<S>(stream: &mut S) -> Result<Metadata>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    // === Greeting ===
    let n_methods = stream.read_u8().await? as usize;
    let mut methods = vec![0u8; n_methods];
    stream.read_exact(&mut methods).await?;

    if !methods.contains(&METHOD_NONE) {
        stream.write_all(&[SOCKS5_VERSION, METHOD_INVALID]).await?;
        return Err(Error::InvalidMessage("no acceptable auth method".into()));
    }
    stream.write_all(&[SOCKS5_VERSION, METHOD_NONE]).await?;

    // === Request ===
    let mut req = [0u8; 4];
    stream.read_exact(&mut req).await?;
    if req[0] != SOCKS5_VERSION {
        return Err(Error::InvalidMessage(format!(
            "bad request version: 0x{:02x}",
            req[0]
        )));
    }
    let cmd = req[1];
    let atyp = req[3];

    let metadata = match read_socks5_addr(stream, atyp).await? {
        Some(metadata) => metadata,
        None => {
            write_socks5_reply(stream, REPLY_ADDR_TYPE_NOT_SUPPORTED).await?;
            return Err(Error::InvalidMessage(format!(
                "unsupported address type: 0x{:02x}",
                atyp
            )));
        }
    };

    if cmd != CMD_CONNECT {
        write_socks5_reply(stream, REPLY_COMMAND_NOT_SUPPORTED).await?;
        return Err(Error::InvalidMessage(format!(
            "unsupported command: 0x{:02x}",
            cmd
        )));
    }

    write_socks5_reply(stream, REPLY_SUCCEEDED).await?;
    Ok(metadata)
}

/// Read a SOCKS5 address and port. Returns `None` for unknown address types.
async fn read_socks5_addr<S>(stream: &mut S, atyp: u8) -> Result<Option<Metadata>>
where
    S: AsyncRead + Unpin,
{
    let metadata = match atyp {
        t if t == AddrType::Ipv4 as u8 => {
            let mut ip = [0u8; 4];
            stream.read_exact(&mut ip).await?;
            let port = stream.read_u16().await?;
            Metadata::ip(Ipv4Addr::from(ip).into(), port.to_string())
        }
        t if t == AddrType::DomainName as u8 => {
            let len = stream.read_u8().await? as usize;
            let mut domain = vec![0u8; len];
            stream.read_exact(&mut domain).await?;
            let port = stream.read_u16().await?;
            let domain = String::from_utf8(domain)
                .map_err(|_| Error::InvalidMessage("domain is not valid UTF-8".into()))?;
            Metadata::domain(domain, port.to_string())
        }
        t if t == AddrType::Ipv6 as u8 => {
            let mut ip = [0u8; 16];
            stream.read_exact(&mut ip).await?;
            let port = stream.read_u16().await?;
            Metadata::ip(Ipv6Addr::from(ip).into(), port.to_string())
        }
        _ => return Ok(None),
    };
    Ok(Some(metadata))
}

async fn write_socks5_reply<S>(stream: &mut S, reply: u8) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream
        .write_all(&[SOCKS5_VERSION, reply, 0x00, 0x01, 0, 0, 0, 0, 0, 0])
        .await?;
    Ok(())
}

async fn handshake_socks4<S>(stream: &mut S) -> Result<Metadata>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let cmd = stream.read_u8().await?;
    let port = stream.read_u16().await?;
    let mut ip = [0u8; 4];
    stream.read_exact(&mut ip).await?;

    // User id is ignored
    read_cstring(stream).await?;

    // SOCKS4a: 0.0.0.x with x != 0 means a domain follows
    let metadata = if ip[..3] == [0, 0, 0] && ip[3] != 0 {
        let domain = read_cstring(stream).await?;
        let domain = String::from_utf8(domain)
            .map_err(|_| Error::InvalidMessage("domain is not valid UTF-8".into()))?;
        Metadata::domain(domain, port.to_string())
    } else {
        Metadata::ip(Ipv4Addr::from(ip).into(), port.to_string())
    };

    if cmd != CMD_CONNECT {
        write_socks4_reply(stream, SOCKS4_REJECTED).await?;
        return Err(Error::InvalidMessage(format!(
            "unsupported SOCKS4 command: 0x{:02x}",
            cmd
        )));
    }

    write_socks4_reply(stream, SOCKS4_GRANTED).await?;
    Ok(metadata)
}

async fn write_socks4_reply<S>(stream: &mut S, reply: u8) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(&[0x00, reply, 0, 0, 0, 0, 0, 0]).await?;
    Ok(())
}

async fn read_cstring<S>(stream: &mut S) -> Result<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    loop {
        let b = stream.read_u8().await?;
        if b == 0 {
            return Ok(buf);
        }
        if buf.len() == MAX_SOCKS4_FIELD {
            return Err(Error::InvalidMessage("SOCKS4 field too long".into()));
        }
        buf.push(b);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;
    use tokio::io::duplex;

    async fn negotiate(request: &[u8], reply_len: usize) -> (Result<Metadata>, Vec<u8>) {
        let (mut client, mut server) = duplex(1024);
        let server_task = tokio::spawn(async move { handshake(&mut server).await });

        client.write_all(request).await.unwrap();
        let mut reply = vec![0u8; reply_len];
        client.read_exact(&mut reply).await.unwrap();

        (server_task.await.unwrap(), reply)
    }

    #[tokio::test]
    async fn test_socks5_domain() {
        let mut req = vec![0x05, 0x01, 0x00, 0x05, 0x01, 0x00, 0x03, 11];
        req.extend_from_slice(b"example.com");
        req.extend_from_slice(&443u16.to_be_bytes());

        let (result, reply) = negotiate(&req, 12).await;
        let metadata = result.unwrap();
        assert_eq!(&reply[..2], &[0x05, 0x00]);
        assert_eq!(reply[3], REPLY_SUCCEEDED);
        assert_eq!(metadata.addr_type, AddrType::DomainName);
        assert_eq!(metadata.host, "example.com");
        assert_eq!(metadata.dst_port, "443");
    }

    #[tokio::test]
    async fn test_socks5_ipv4() {
        let req = [
            0x05, 0x02, 0x02, 0x00, // greeting offering user/pass and none
            0x05, 0x01, 0x00, 0x01, 93, 184, 216, 34, 0x00, 0x50,
        ];
        let (result, _) = negotiate(&req, 12).await;
        let metadata = result.unwrap();
        assert_eq!(metadata.addr_type, AddrType::Ipv4);
        assert_eq!(metadata.dst_ip, Some("93.184.216.34".parse().unwrap()));
        assert_eq!(metadata.dst_port, "80");
    }

    #[tokio::test]
    async fn test_socks5_ipv6() {
        let mut req = vec![0x05, 0x01, 0x00, 0x05, 0x01, 0x00, 0x04];
        req.extend_from_slice(&Ipv6Addr::LOCALHOST.octets());
        req.extend_from_slice(&8080u16.to_be_bytes());

        let (result, _) = negotiate(&req, 12).await;
        let metadata = result.unwrap();
        assert_eq!(metadata.addr_type, AddrType::Ipv6);
        assert_eq!(metadata.dst_ip, Some(IpAddr::V6(Ipv6Addr::LOCALHOST)));
        assert_eq!(metadata.dst_port, "8080");
    }

    #[tokio::test]
    async fn test_socks5_udp_associate_rejected() {
        let req = [
            0x05, 0x01, 0x00, 0x05, 0x03, 0x00, 0x01, 0, 0, 0, 0, 0, 0,
        ];
        let (result, reply) = negotiate(&req, 12).await;
        assert!(matches!(result, Err(Error::InvalidMessage(_))));
        assert_eq!(reply[3], REPLY_COMMAND_NOT_SUPPORTED);
    }

    #[tokio::test]
    async fn test_socks5_bad_address_type() {
        let req = [0x05, 0x01, 0x00, 0x05, 0x01, 0x00, 0x09];
        let (result, reply) = negotiate(&req, 12).await;
        assert!(result.is_err());
        assert_eq!(reply[3], REPLY_ADDR_TYPE_NOT_SUPPORTED);
    }

    #[tokio::test]
    async fn test_socks5_requires_no_auth() {
        let req = [0x05, 0x01, 0x02];
        let (result, reply) = negotiate(&req, 2).await;
        assert!(result.is_err());
        assert_eq!(reply, vec![0x05, METHOD_INVALID]);
    }

    #[tokio::test]
    async fn test_socks4_ip() {
        let req = [0x04, 0x01, 0x00, 0x16, 10, 0, 0, 1, b'u', 0x00];
        let (result, reply) = negotiate(&req, 8).await;
        let metadata = result.unwrap();
        assert_eq!(reply[1], SOCKS4_GRANTED);
        assert_eq!(metadata.addr_type, AddrType::Ipv4);
        assert_eq!(metadata.dst_port, "22");
    }

    #[tokio::test]
    async fn test_socks4a_domain() {
        let mut req = vec![0x04, 0x01, 0x01, 0xbb, 0, 0, 0, 1, 0x00];
        req.extend_from_slice(b"example.org\0");
        let (result, _) = negotiate(&req, 8).await;
        let metadata = result.unwrap();
        assert_eq!(metadata.addr_type, AddrType::DomainName);
        assert_eq!(metadata.host, "example.org");
        assert_eq!(metadata.dst_port, "443");
    }

    #[tokio::test]
    async fn test_socks4_bind_rejected() {
        let req = [0x04, 0x02, 0x00, 0x50, 1, 2, 3, 4, 0x00];
        let (result, reply) = negotiate(&req, 8).await;
        assert!(result.is_err());
        assert_eq!(reply[1], SOCKS4_REJECTED);
    }

    #[tokio::test]
    async fn test_unknown_version() {
        let (mut client, mut server) = duplex(64);
        client.write_all(&[0x47, 0x45, 0x54]).await.unwrap();
        let err = handshake(&mut server).await.unwrap_err();
        assert!(err.to_string().contains("unsupported SOCKS version"));
    }

    #[test]
    fn test_accept_backoff_is_short() {
        assert!(ACCEPT_ERROR_BACKOFF > Duration::ZERO);
        assert!(ACCEPT_ERROR_BACKOFF < Duration::from_secs(1));
    }
}
