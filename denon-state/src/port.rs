//! Control port resolution
//!
//! Receivers only serve their web API on one of two ports. The configured
//! value is checked once at startup; "auto" is settled by probing.

use std::fmt;

use status_client::{Endpoint, ReceiverTransport};

use crate::config::ReceiverEntry;
use crate::error::{ConfigError, ConfigResult};

/// Ports the device family listens on
pub const SUPPORTED_PORTS: [u16; 2] = [80, 8080];

/// Probe order for "auto"; newer firmware answers on 8080
pub const AUTO_PROBE_ORDER: [u16; 2] = [8080, 80];

/// Port used when probing finds nothing
pub const AUTO_FALLBACK_PORT: u16 = 8080;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortSpec {
    Auto,
    Fixed(u16),
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortSpec::Auto => f.write_str("auto"),
            PortSpec::Fixed(port) => write!(f, "{}", port),
        }
    }
}

pub struct PortResolver;

impl PortResolver {
    /// Resolve the port shared by all entries of one receiver
    pub fn resolve(ip: &str, entries: &[ReceiverEntry]) -> ConfigResult<PortSpec> {
        let declared = entries
            .iter()
            .map(ReceiverEntry::declared_port)
            .collect::<ConfigResult<Vec<_>>>()?;

        Self::resolve_declared(ip, declared)
    }

    /// Fold over declared ports; `None` stands for an entry without one.
    ///
    /// The first declared port wins and every later one must match it. A
    /// fixed port outside [`SUPPORTED_PORTS`] is rejected.
    pub fn resolve_declared(
        ip: &str,
        declared: impl IntoIterator<Item = Option<u16>>,
    ) -> ConfigResult<PortSpec> {
        let mut resolved: Option<u16> = None;

        for port in declared.into_iter().flatten() {
            match resolved {
                None => resolved = Some(port),
                Some(first) if first != port => {
                    return Err(ConfigError::PortConflict {
                        ip: ip.to_string(),
                        first,
                        second: port,
                    });
                }
                Some(_) => {}
            }
        }

        match resolved {
            None => Ok(PortSpec::Auto),
            Some(port) if SUPPORTED_PORTS.contains(&port) => Ok(PortSpec::Fixed(port)),
            Some(port) => Err(ConfigError::UnsupportedPort {
                ip: ip.to_string(),
                port,
            }),
        }
    }
}

/// Settle an automatic port by asking the receiver.
///
/// The first port whose status query is not refused wins. When nothing
/// answers the fallback port is used and the caller keeps polling it.
pub async fn probe_auto_port(transport: &dyn ReceiverTransport, ip: &str) -> u16 {
    for port in AUTO_PROBE_ORDER {
        let endpoint = Endpoint::new(ip, port);
        match transport.fetch_status(&endpoint).await {
            Ok(_) => {
                tracing::info!("Receiver {} answers on port {}", ip, port);
                return port;
            }
            Err(e) if e.is_forbidden() => {
                tracing::debug!("Receiver {} refuses port {}", ip, port);
            }
            Err(e) => {
                tracing::debug!("Receiver {} did not answer on port {}: {}", ip, port, e);
            }
        }
    }

    tracing::warn!(
        "Could not determine the control port of {}; using {}",
        ip,
        AUTO_FALLBACK_PORT
    );
    AUTO_FALLBACK_PORT
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const IP: &str = "192.168.1.20";

    #[rstest]
    #[case(vec![Some(80), None, Some(80)], PortSpec::Fixed(80))]
    #[case(vec![None, Some(8080)], PortSpec::Fixed(8080))]
    #[case(vec![None, None], PortSpec::Auto)]
    #[case(vec![], PortSpec::Auto)]
    fn test_resolves(#[case] declared: Vec<Option<u16>>, #[case] expected: PortSpec) {
        assert_eq!(PortResolver::resolve_declared(IP, declared).unwrap(), expected);
    }

    #[test]
    fn test_conflict() {
        let result = PortResolver::resolve_declared(IP, vec![Some(80), Some(8080)]);

        match result {
            Err(ConfigError::PortConflict { ip, first, second }) => {
                assert_eq!(ip, IP);
                assert_eq!((first, second), (80, 8080));
            }
            other => panic!("Expected PortConflict, got {:?}", other),
        }
    }

    #[test]
    fn test_unsupported_port() {
        let result = PortResolver::resolve_declared(IP, vec![Some(443)]);
        assert!(matches!(
            result,
            Err(ConfigError::UnsupportedPort { port: 443, .. })
        ));
    }

    #[test]
    fn test_resolve_from_entries() {
        let entries: Vec<ReceiverEntry> = serde_json::from_str(
            r#"[
                {"kind": "switch", "name": "A", "ip": "192.168.1.20", "port": 80},
                {"kind": "volume", "name": "B", "ip": "192.168.1.20", "port": "auto"},
                {"kind": "television", "name": "C", "ip": "192.168.1.20", "port": "80"}
            ]"#,
        )
        .unwrap();

        assert_eq!(PortResolver::resolve(IP, &entries).unwrap(), PortSpec::Fixed(80));
    }

    #[test]
    fn test_invalid_entry_port_is_reported() {
        let entries: Vec<ReceiverEntry> = serde_json::from_str(
            r#"[{"kind": "switch", "name": "A", "ip": "192.168.1.20", "port": "eighty"}]"#,
        )
        .unwrap();

        assert!(matches!(
            PortResolver::resolve(IP, &entries),
            Err(ConfigError::InvalidPort(_))
        ));
    }

    /// Answers on the listed ports, refuses everything else
    struct PortsOnly(Vec<u16>);

    #[async_trait::async_trait]
    impl ReceiverTransport for PortsOnly {
        async fn fetch_status(
            &self,
            endpoint: &Endpoint,
        ) -> status_client::Result<status_client::StatusReport> {
            if self.0.contains(&endpoint.port) {
                Ok(status_client::StatusReport::default())
            } else {
                Err(status_client::ClientError::Forbidden(endpoint.to_string()))
            }
        }

        async fn send_command(
            &self,
            _: &Endpoint,
            _: &status_client::Command,
        ) -> status_client::Result<()> {
            Ok(())
        }
    }

    #[rstest]
    #[case(vec![80, 8080], 8080)]
    #[case(vec![80], 80)]
    #[case(vec![], AUTO_FALLBACK_PORT)]
    fn test_probe_auto_port(#[case] open: Vec<u16>, #[case] expected: u16) {
        let transport = PortsOnly(open);
        let port = tokio_test::block_on(probe_auto_port(&transport, IP));
        assert_eq!(port, expected);
    }
}
