//! Accept-all worker - binds a queue and accepts every packet.
//!
//! This demo shows:
//! - Loading a [`Config`] from a JSON file
//! - Issuing verdicts from inside the hook
//! - Cancelling the receive loop on Ctrl-C
//!
//! # Running
//!
//! ```sh
//! sudo iptables -A OUTPUT -p icmp -j NFQUEUE --queue-num 0
//! sudo RUST_LOG=debug ./target/debug/examples/accept_all queue.json
//! ```
//!
//! `queue.json` is optional, e.g. `{"queue": 0, "copy_mode": "meta"}`.

#[cfg(target_os = "linux")]
use nfqueue::{Config, Nfqueue, NetlinkConn, Packet, Verdict};
#[cfg(target_os = "linux")]
use std::sync::Arc;

#[cfg(target_os = "linux")]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_json(&std::fs::read_to_string(path)?)?,
        None => Config::default(),
    };

    let conn = NetlinkConn::dial(nfqueue::protocol::NETLINK_NETFILTER)?;
    let mut queue = Nfqueue::from_config(&config, Arc::new(conn))?;
    let verdicts = queue.verdicts();

    let mut registration = queue
        .start(move |packet: Packet| {
            let verdicts = verdicts.clone();
            async move {
                let Some(id) = packet.id() else {
                    return 0;
                };
                tracing::info!("packet {} ({} bytes)", id, packet.payload().len());
                match verdicts.set_verdict(id, Verdict::Accept).await {
                    Ok(_) => 0,
                    Err(e) => {
                        tracing::error!("verdict for packet {} failed: {}", id, e);
                        1
                    }
                }
            }
        })
        .await?;

    tokio::signal::ctrl_c().await?;
    registration.cancel();
    let exit = registration.wait().await?;
    tracing::info!("stopped: {:?}", exit);

    queue.close()?;
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn main() {
    eprintln!("accept_all needs Linux netfilter");
}
