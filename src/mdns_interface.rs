use std::time::Duration;

use anyhow::Context;
use log::{debug, info, warn};
use mdns_sd::{IfKind, ServiceDaemon, ServiceInfo};

use crate::settings::{IpVersion, ListenOptions};

const UNREGISTER_TIMEOUT: Duration = Duration::from_secs(1);

/// Keeps the OSC service announced over mDNS until dropped.
pub struct ServiceAdvertisement {
    daemon: ServiceDaemon,
    fullname: String,
}

impl ServiceAdvertisement {
    pub fn register(options: &ListenOptions) -> anyhow::Result<Self> {
        let info = service_info(options)?;
        let fullname = info.get_fullname().to_owned();

        let daemon = ServiceDaemon::new().context("failed to start mDNS daemon")?;
        match options.svc_ipver {
            IpVersion::V4 => daemon
                .disable_interface(IfKind::IPv6)
                .context("failed to restrict mDNS to IPv4")?,
            IpVersion::V6 => daemon
                .disable_interface(IfKind::IPv4)
                .context("failed to restrict mDNS to IPv6")?,
            IpVersion::All => {}
        }
        daemon
            .register(info)
            .with_context(|| format!("failed to register service '{}'", fullname))?;

        info!(
            "Advertising '{}' on port {} via mDNS",
            fullname, options.svc_port
        );
        Ok(ServiceAdvertisement { daemon, fullname })
    }
}

impl Drop for ServiceAdvertisement {
    fn drop(&mut self) {
        debug!("Unregistering mDNS service '{}'...", self.fullname);
        match self.daemon.unregister(&self.fullname) {
            Ok(status) => {
                if status.recv_timeout(UNREGISTER_TIMEOUT).is_err() {
                    warn!("No confirmation that '{}' was unregistered", self.fullname);
                }
            }
            Err(e) => warn!("Failed to unregister '{}': {}", self.fullname, e),
        }
        if let Err(e) = self.daemon.shutdown() {
            warn!("Failed to stop mDNS daemon: {}", e);
        }
    }
}

/// Builds the announcement record, addressed on every non-loopback interface.
fn service_info(options: &ListenOptions) -> anyhow::Result<ServiceInfo> {
    let host_name = if options.svc_addr.ends_with('.') {
        options.svc_addr.clone()
    } else {
        format!("{}.", options.svc_addr)
    };
    let info = ServiceInfo::new(
        &options.svc_type,
        &options.svc_name,
        &host_name,
        "",
        options.svc_port,
        options.svc_props.clone(),
    )
    .with_context(|| {
        format!(
            "invalid service '{}' of type '{}'",
            options.svc_name, options.svc_type
        )
    })?;
    Ok(info.enable_addr_auto())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn listen_options() -> ListenOptions {
        ListenOptions {
            svc_name: "qu-osc".into(),
            svc_type: "_osc._udp.local.".into(),
            svc_port: 9000,
            svc_addr: "qu-osc.local".into(),
            svc_props: HashMap::from([("console".to_owned(), "Qu-16".to_owned())]),
            svc_ipver: IpVersion::V4,
        }
    }

    #[test]
    fn record_carries_name_port_and_properties() {
        let info = service_info(&listen_options()).unwrap();
        assert_eq!(info.get_fullname(), "qu-osc._osc._udp.local.");
        assert_eq!(info.get_hostname(), "qu-osc.local.");
        assert_eq!(info.get_port(), 9000);
        assert_eq!(info.get_property_val_str("console"), Some("Qu-16"));
    }

    #[test]
    fn service_type_must_be_a_local_domain() {
        let mut options = listen_options();
        options.svc_type = "_osc._udp".into();
        assert!(service_info(&options).is_err());
    }
}
