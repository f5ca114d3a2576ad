//! Bidirectional relay between an accepted client and its remote.

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};

/// Which direction of a relay finished first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finished {
    /// Client → remote copy ended (client closed or errored)
    Local,
    /// Remote → client copy ended (remote closed or errored)
    Remote,
}

/// Outcome of a finished relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelaySummary {
    /// Bytes copied client → remote, when that direction completed
    pub uploaded: Option<u64>,
    /// Bytes copied remote → client, when that direction completed
    pub downloaded: Option<u64>,
    /// Direction that ended the relay
    pub finished: Finished,
}

/// Copy bytes both ways until either direction reaches EOF or fails.
///
/// The other direction is dropped as soon as one finishes, then both write
/// sides are shut down. Half-closed connections are not kept open.
pub async fn relay<L, R>(local: L, remote: R) -> RelaySummary
where
    L: AsyncRead + AsyncWrite + Unpin,
    R: AsyncRead + AsyncWrite + Unpin,
{
    let (mut local_reader, mut local_writer) = tokio::io::split(local);
    let (mut remote_reader, mut remote_writer) = tokio::io::split(remote);

    let summary = {
        let upload = tokio::io::copy(&mut local_reader, &mut remote_writer);
        let download = tokio::io::copy(&mut remote_reader, &mut local_writer);

        tokio::select! {
            n = upload => RelaySummary {
                uploaded: n.ok(),
                downloaded: None,
                finished: Finished::Local,
            },
            n = download => RelaySummary {
                uploaded: None,
                downloaded: n.ok(),
                finished: Finished::Remote,
            },
        }
    };

    let _ = remote_writer.shutdown().await;
    let _ = local_writer.shutdown().await;

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt};

    #[tokio::test]
    async fn test_relay_both_directions() {
        let (mut client, local) = duplex(1024);
        let (remote, mut server) = duplex(1024);
        let handle = tokio::spawn(relay(local, remote));

        client.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        server.write_all(b"world").await.unwrap();
        client.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"world");

        drop(client);
        let summary = handle.await.unwrap();
        assert_eq!(summary.finished, Finished::Local);
        assert_eq!(summary.uploaded, Some(5));

        // Remote side sees the relay close
        let mut rest = Vec::new();
        server.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn test_remote_close_ends_relay() {
        let (mut client, local) = duplex(1024);
        let (remote, mut server) = duplex(1024);
        let handle = tokio::spawn(relay(local, remote));

        server.write_all(b"bye").await.unwrap();
        drop(server);

        let summary = handle.await.unwrap();
        assert_eq!(summary.finished, Finished::Remote);
        assert_eq!(summary.downloaded, Some(3));

        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"bye");
    }
}
