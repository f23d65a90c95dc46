use std::net::SocketAddr;
use std::time::Duration;

use log::{debug, info};
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};

use crate::error::DiscoveryError;

/// mDNS service type both peers agree on.
pub const SERVICE_TYPE: &str = "_lantunnel._tcp.local.";

const INSTANCE_NAME: &str = "lantunnel";

/// How long the receiver browses before giving up.
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Advertise this sender on the local network.
///
/// Registration stays active until the returned daemon is shut down, so
/// the caller owns the lifetime of the advertisement. Failures propagate
/// back here rather than killing the process from a background thread.
pub fn advertise(port: u16) -> Result<ServiceDaemon, DiscoveryError> {
    let daemon = ServiceDaemon::new()?;
    let host_name = format!("{}.local.", INSTANCE_NAME);
    let properties = [("peer", "lantunnel")];
    let service = ServiceInfo::new(
        SERVICE_TYPE,
        INSTANCE_NAME,
        &host_name,
        "",
        port,
        &properties[..],
    )?
    .enable_addr_auto();

    daemon.register(service)?;
    info!("advertising {} on port {}", SERVICE_TYPE, port);
    Ok(daemon)
}

/// Browse for an advertised sender and return its socket address.
///
/// Bounded by `timeout` overall; resolved services that only report
/// loopback addresses are skipped, since another process on this host is
/// almost always our own sender.
pub async fn discover(timeout: Duration) -> Result<SocketAddr, DiscoveryError> {
    let daemon = ServiceDaemon::new()?;
    let browser = daemon.browse(SERVICE_TYPE)?;
    let deadline = tokio::time::Instant::now() + timeout;

    debug!("browsing for {}", SERVICE_TYPE);
    loop {
        let event = match tokio::time::timeout_at(deadline, browser.recv_async()).await {
            Err(_) => break,
            Ok(Err(_)) => break,
            Ok(Ok(event)) => event,
        };

        if let ServiceEvent::ServiceResolved(service) = event {
            let port = service.get_port();
            match service.get_addresses().iter().find(|ip| !ip.is_loopback()) {
                Some(addr) => {
                    let peer = SocketAddr::new(*addr, port);
                    info!("resolved peer {} at {}", service.get_fullname(), peer);
                    let _ = daemon.shutdown();
                    return Ok(peer);
                }
                None => {
                    debug!(
                        "skipping loopback-only service {}",
                        service.get_fullname()
                    );
                }
            }
        }
    }

    let _ = daemon.shutdown();
    Err(DiscoveryError::NoPeerFound(timeout))
}
