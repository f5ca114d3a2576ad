//! Local SOCKS to outbound adapter bridge.
//!
//! A [`Bridge`] owns a SOCKS inbound on `listen_host:socks_port` and an
//! outbound [`ProxyAdapter`]. Every connection negotiated by the inbound is
//! dialed through the adapter and relayed in its own task.
//!
//! ```text
//!  client ──SOCKS──> inbound ──queue──> dispatcher ──spawn──> relay task
//!                                                              │
//!                                          adapter.dial() <────┘
//! ```
//!
//! Instances are single use: `Idle → Running → Closed`.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::adapter::{
    BoxedStream, ProxyAdapter, ShadowsocksOption, ShadowsocksROption, SnellOption,
};
use crate::config::BridgeConfig;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::metadata::{addr_to_metadata, Network};
use crate::proxy::relay::relay;
use crate::proxy::socks5::{self, ConnContext};

enum State {
    Idle,
    Running(Running),
    Closed,
}

struct Running {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    inbound: JoinHandle<()>,
}

/// Relays a local SOCKS endpoint through one outbound adapter.
pub struct Bridge {
    ctx: Context,
    config: BridgeConfig,
    out: Arc<dyn ProxyAdapter>,
    state: Mutex<State>,
    active: Arc<AtomicUsize>,
}

impl Bridge {
    /// Create an idle bridge over an already constructed adapter.
    pub fn new(ctx: Context, config: BridgeConfig, out: Arc<dyn ProxyAdapter>) -> Self {
        Self {
            ctx,
            config,
            out,
            state: Mutex::new(State::Idle),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Create a bridge over a Shadowsocks outbound.
    ///
    /// Invalid options are rejected before the provider is called.
    pub fn shadowsocks(ctx: Context, config: BridgeConfig, opts: ShadowsocksOption) -> Result<Self> {
        opts.validate()?;
        let out = ctx.provider().shadowsocks(opts).map_err(Error::Adapter)?;
        Ok(Self::new(ctx, config, out))
    }

    /// Create a bridge over a ShadowsocksR outbound. UDP relaying is always
    /// enabled.
    pub fn shadowsocksr(
        ctx: Context,
        config: BridgeConfig,
        mut opts: ShadowsocksROption,
    ) -> Result<Self> {
        opts.validate()?;
        opts.udp = true;
        let out = ctx.provider().shadowsocksr(opts).map_err(Error::Adapter)?;
        Ok(Self::new(ctx, config, out))
    }

    /// Create a bridge over a Snell outbound.
    pub fn snell(ctx: Context, config: BridgeConfig, opts: SnellOption) -> Result<Self> {
        opts.validate()?;
        let out = ctx.provider().snell(opts).map_err(Error::Adapter)?;
        Ok(Self::new(ctx, config, out))
    }

    /// The outbound adapter.
    pub fn adapter(&self) -> &Arc<dyn ProxyAdapter> {
        &self.out
    }

    /// The bridge configuration.
    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Bind the SOCKS inbound and start relaying.
    ///
    /// Returns as soon as the listener is bound. A failed bind leaves the
    /// bridge idle so the call can be retried.
    pub fn start(&self) -> Result<()> {
        let mut state = self.state.lock();
        match *state {
            State::Idle => {}
            State::Running(_) => return Err(Error::AlreadyStarted),
            State::Closed => return Err(Error::Closed),
        }

        self.config.validate().map_err(Error::Config)?;

        let addr = self.config.listen_addr();
        let runtime = self.ctx.runtime();
        let listener = socks5::bind(&addr, runtime).map_err(|source| Error::Bind {
            addr: addr.clone(),
            source,
        })?;
        let local_addr = listener.local_addr()?;

        let (queue_tx, queue_rx) = mpsc::channel(self.config.accept_queue);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let inbound = runtime.spawn(socks5::serve(listener, queue_tx, shutdown_rx.clone()));
        runtime.spawn(dispatch(
            queue_rx,
            shutdown_rx,
            Arc::clone(&self.out),
            Arc::clone(&self.active),
        ));

        tracing::info!(
            "SOCKS inbound listening on {}, outbound {} ({})",
            local_addr,
            self.out.name(),
            self.out.kind()
        );

        *state = State::Running(Running {
            local_addr,
            shutdown: shutdown_tx,
            inbound,
        });
        Ok(())
    }

    /// Stop accepting connections.
    ///
    /// Waits for the listener socket to be released. Relays already in
    /// progress keep running until one of their ends closes.
    pub async fn close(&self) -> Result<()> {
        let running = {
            let mut state = self.state.lock();
            match std::mem::replace(&mut *state, State::Closed) {
                State::Running(running) => running,
                State::Idle => {
                    *state = State::Idle;
                    return Err(Error::NotStarted);
                }
                State::Closed => return Err(Error::Closed),
            }
        };

        let _ = running.shutdown.send(true);
        running
            .inbound
            .await
            .map_err(|e| Error::Network(io::Error::new(io::ErrorKind::Other, e)))?;

        tracing::info!("Bridge on {} closed", running.local_addr);
        Ok(())
    }

    /// Dial a single connection through the outbound, bypassing the listener.
    ///
    /// `network` is a Go-style name such as `tcp` or `udp6`.
    pub async fn dial_context(&self, network: &str, address: &str) -> Result<BoxedStream> {
        let metadata = addr_to_metadata(address)?;
        let metadata = metadata.with_network(Network::from_name(network)?);

        Ok(self.out.dial(&metadata).await?)
    }

    /// Address the inbound is bound to, while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &*self.state.lock() {
            State::Running(running) => Some(running.local_addr),
            _ => None,
        }
    }

    /// Whether the bridge is accepting connections.
    pub fn is_running(&self) -> bool {
        matches!(*self.state.lock(), State::Running(_))
    }

    /// Relay tasks currently dialing or copying.
    pub fn active_relays(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        if let State::Running(running) = self.state.get_mut() {
            let _ = running.shutdown.send(true);
        }
    }
}

/// Hand queued connections to relay tasks until shutdown, then drain.
async fn dispatch(
    mut queue: mpsc::Receiver<ConnContext>,
    mut shutdown: watch::Receiver<bool>,
    out: Arc<dyn ProxyAdapter>,
    active: Arc<AtomicUsize>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            conn = queue.recv() => match conn {
                Some(conn) => spawn_relay(conn, &out, &active),
                None => return,
            },
        }
    }

    // Connections already negotiated are still relayed
    queue.close();
    while let Some(conn) = queue.recv().await {
        spawn_relay(conn, &out, &active);
    }
}

fn spawn_relay(conn: ConnContext, out: &Arc<dyn ProxyAdapter>, active: &Arc<AtomicUsize>) {
    let out = Arc::clone(out);
    let guard = ActiveRelay::new(active);

    tokio::spawn(async move {
        let _guard = guard;
        let ConnContext {
            metadata,
            stream,
            peer,
        } = conn;

        let remote = match out.dial(&metadata).await {
            Ok(remote) => remote,
            Err(e) => {
                tracing::warn!("Dial error: {} -> {} via {}: {}", peer, metadata, out.name(), e);
                return;
            }
        };

        let summary = relay(stream, remote).await;
        tracing::debug!(
            "Relay {} -> {} finished ({:?} side first, up {:?}, down {:?})",
            peer,
            metadata,
            summary.finished,
            summary.uploaded,
            summary.downloaded
        );
    });
}

/// Counts a relay task as active for as long as it is alive.
struct ActiveRelay(Arc<AtomicUsize>);

impl ActiveRelay {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for ActiveRelay {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
