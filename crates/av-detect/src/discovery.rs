//! Start-up discovery
//!
//! Walks the candidate ports in order and claims the first one that answers
//! each matrix's probe. A port that answers as the HDMI matrix is never
//! probed for the component matrix. A preset path is probed too, and start-up
//! fails if its device does not answer.

use std::future::Future;

use av_protocol::{create_protocol, Protocol};
use tracing::{info, warn};

use crate::error::DetectError;
use crate::probe::{probe_port_with_config, ProbeConfig};
use crate::scanner::PortScanner;

/// What discovery should look for
#[derive(Debug, Clone)]
pub struct DiscoveryRequest {
    /// Protocol spoken by the component matrix
    pub component: Protocol,
    /// Known HDMI path; only this path is probed for the HDMI matrix
    pub hdmi_path: Option<String>,
    /// Known component path; only this path is probed for the component matrix
    pub component_path: Option<String>,
    /// HDMI baud rate, if not the protocol default
    pub hdmi_baud_rate: Option<u32>,
    /// Component baud rate, if not the protocol default
    pub component_baud_rate: Option<u32>,
}

impl DiscoveryRequest {
    /// Discover both matrices from scratch
    pub fn new(component: Protocol) -> Self {
        Self {
            component,
            hdmi_path: None,
            component_path: None,
            hdmi_baud_rate: None,
            component_baud_rate: None,
        }
    }

    /// Probe settings for `protocol`, carrying its baud override
    pub fn probe_config(&self, protocol: Protocol) -> ProbeConfig {
        let baud_rate = if protocol == Protocol::Hdmi {
            self.hdmi_baud_rate
        } else {
            self.component_baud_rate
        };
        ProbeConfig::default().with_baud_rate(baud_rate)
    }
}

/// Serial paths assigned to each matrix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortAssignment {
    pub hdmi: String,
    pub component: String,
}

/// Assign `ports` to the two matrices using `probe`
///
/// `probe(path, protocol)` must open, probe and close the port. Preset paths
/// are confirmed first; a preset that does not answer is an error. The rest
/// of `ports` is tried in order and the walk stops once both matrices are
/// found.
pub async fn assign_ports<F, Fut>(
    ports: &[String],
    request: &DiscoveryRequest,
    mut probe: F,
) -> Result<PortAssignment, DetectError>
where
    F: FnMut(String, Protocol) -> Fut,
    Fut: Future<Output = bool>,
{
    let mut hdmi = request.hdmi_path.clone();
    let mut component = request.component_path.clone();

    if let Some(path) = &hdmi {
        info!("Checking configured HDMI matrix port {}...", path);
        if !probe(path.clone(), Protocol::Hdmi).await {
            warn!("HDMI matrix did not answer on configured port {}", path);
            return Err(DetectError::DeviceNotFound("HDMI"));
        }
    }
    if let Some(path) = &component {
        info!("Checking configured component matrix port {}...", path);
        if !probe(path.clone(), request.component).await {
            warn!("Component matrix did not answer on configured port {}", path);
            return Err(DetectError::DeviceNotFound("component"));
        }
    }

    for port in ports {
        if hdmi.is_some() && component.is_some() {
            break;
        }
        if hdmi.as_ref() == Some(port) || component.as_ref() == Some(port) {
            continue;
        }

        if hdmi.is_none() {
            info!("Checking if {} is connected to the HDMI matrix...", port);
            if probe(port.clone(), Protocol::Hdmi).await {
                info!("{} is the HDMI matrix", port);
                hdmi = Some(port.clone());
                continue;
            }
        }

        if component.is_none() {
            info!("Checking if {} is connected to the component matrix...", port);
            if probe(port.clone(), request.component).await {
                info!("{} is the component matrix", port);
                component = Some(port.clone());
            }
        }
    }

    Ok(PortAssignment {
        hdmi: hdmi.ok_or(DetectError::DeviceNotFound("HDMI"))?,
        component: component.ok_or(DetectError::DeviceNotFound("component"))?,
    })
}

/// Enumerate the system's serial ports and assign them by probing
pub async fn discover_ports(request: &DiscoveryRequest) -> Result<PortAssignment, DetectError> {
    let ports: Vec<String> = if request.hdmi_path.is_some() && request.component_path.is_some() {
        Vec::new()
    } else {
        PortScanner::new()
            .enumerate_ports()?
            .into_iter()
            .map(|p| p.port)
            .collect()
    };

    assign_ports(&ports, request, |path, protocol| {
        let config = request.probe_config(protocol);
        async move {
            let protocol = create_protocol(protocol);
            probe_port_with_config(&path, protocol.as_ref(), &config).await
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn ports(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    /// Fake probe answering from a fixed table and recording every call
    fn fake_probe<'a>(
        table: &'a [(&'a str, Protocol)],
        calls: &'a RefCell<Vec<(String, Protocol)>>,
    ) -> impl FnMut(String, Protocol) -> std::future::Ready<bool> + 'a {
        move |path, protocol| {
            calls.borrow_mut().push((path.clone(), protocol));
            let hit = table.iter().any(|(p, proto)| *p == path && *proto == protocol);
            std::future::ready(hit)
        }
    }

    #[tokio::test]
    async fn test_assigns_both_and_stops_early() {
        let table = [("/dev/b", Protocol::Extron), ("/dev/c", Protocol::Hdmi)];
        let calls = RefCell::new(Vec::new());
        let request = DiscoveryRequest::new(Protocol::Extron);

        let assignment = assign_ports(
            &ports(&["/dev/a", "/dev/b", "/dev/c", "/dev/d"]),
            &request,
            fake_probe(&table, &calls),
        )
        .await
        .unwrap();

        assert_eq!(assignment.hdmi, "/dev/c");
        assert_eq!(assignment.component, "/dev/b");
        // /dev/d is never touched
        assert!(calls.borrow().iter().all(|(p, _)| p != "/dev/d"));
    }

    #[tokio::test]
    async fn test_hdmi_port_not_probed_for_component() {
        let table = [("/dev/a", Protocol::Hdmi), ("/dev/b", Protocol::Sb)];
        let calls = RefCell::new(Vec::new());
        let request = DiscoveryRequest::new(Protocol::Sb);

        assign_ports(&ports(&["/dev/a", "/dev/b"]), &request, fake_probe(&table, &calls))
            .await
            .unwrap();

        assert_eq!(
            *calls.borrow(),
            vec![
                ("/dev/a".to_string(), Protocol::Hdmi),
                ("/dev/b".to_string(), Protocol::Sb),
            ]
        );
    }

    #[tokio::test]
    async fn test_first_match_wins() {
        let table = [
            ("/dev/a", Protocol::Hdmi),
            ("/dev/b", Protocol::Hdmi),
            ("/dev/c", Protocol::Extron),
        ];
        let calls = RefCell::new(Vec::new());
        let request = DiscoveryRequest::new(Protocol::Extron);

        let assignment = assign_ports(
            &ports(&["/dev/a", "/dev/b", "/dev/c"]),
            &request,
            fake_probe(&table, &calls),
        )
        .await
        .unwrap();

        assert_eq!(assignment.hdmi, "/dev/a");
        assert_eq!(assignment.component, "/dev/c");
    }

    #[tokio::test]
    async fn test_missing_hdmi_is_an_error() {
        let table = [("/dev/a", Protocol::Extron)];
        let calls = RefCell::new(Vec::new());
        let request = DiscoveryRequest::new(Protocol::Extron);

        let err = assign_ports(&ports(&["/dev/a"]), &request, fake_probe(&table, &calls))
            .await
            .unwrap_err();
        assert!(matches!(err, DetectError::DeviceNotFound("HDMI")));
    }

    #[tokio::test]
    async fn test_missing_component_is_an_error() {
        let table = [("/dev/a", Protocol::Hdmi)];
        let calls = RefCell::new(Vec::new());
        let request = DiscoveryRequest::new(Protocol::Extron);

        let err = assign_ports(&ports(&["/dev/a", "/dev/b"]), &request, fake_probe(&table, &calls))
            .await
            .unwrap_err();
        assert!(matches!(err, DetectError::DeviceNotFound("component")));
    }

    #[tokio::test]
    async fn test_preset_path_is_confirmed() {
        let table = [("/dev/a", Protocol::Hdmi), ("/dev/b", Protocol::Extron)];
        let calls = RefCell::new(Vec::new());
        let request = DiscoveryRequest {
            hdmi_path: Some("/dev/a".to_string()),
            ..DiscoveryRequest::new(Protocol::Extron)
        };

        let assignment =
            assign_ports(&ports(&["/dev/a", "/dev/b"]), &request, fake_probe(&table, &calls))
                .await
                .unwrap();

        assert_eq!(assignment.hdmi, "/dev/a");
        assert_eq!(assignment.component, "/dev/b");
        assert_eq!(
            *calls.borrow(),
            vec![
                ("/dev/a".to_string(), Protocol::Hdmi),
                ("/dev/b".to_string(), Protocol::Extron),
            ]
        );
    }

    #[tokio::test]
    async fn test_silent_preset_path_is_an_error() {
        // Nothing answers on the configured HDMI port
        let table = [("/dev/b", Protocol::Hdmi), ("/dev/c", Protocol::Extron)];
        let calls = RefCell::new(Vec::new());
        let request = DiscoveryRequest {
            hdmi_path: Some("/dev/a".to_string()),
            ..DiscoveryRequest::new(Protocol::Extron)
        };

        let err = assign_ports(
            &ports(&["/dev/a", "/dev/b", "/dev/c"]),
            &request,
            fake_probe(&table, &calls),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, DetectError::DeviceNotFound("HDMI")));
        // No fallback to other ports
        assert_eq!(*calls.borrow(), vec![("/dev/a".to_string(), Protocol::Hdmi)]);
    }

    #[tokio::test]
    async fn test_both_presets_are_probed() {
        let table = [("/dev/x", Protocol::Hdmi)];
        let calls = RefCell::new(Vec::new());
        let request = DiscoveryRequest {
            hdmi_path: Some("/dev/x".to_string()),
            component_path: Some("/dev/y".to_string()),
            ..DiscoveryRequest::new(Protocol::Sb)
        };

        let err = assign_ports(&[], &request, fake_probe(&table, &calls))
            .await
            .unwrap_err();

        assert!(matches!(err, DetectError::DeviceNotFound("component")));
        assert_eq!(
            *calls.borrow(),
            vec![
                ("/dev/x".to_string(), Protocol::Hdmi),
                ("/dev/y".to_string(), Protocol::Sb),
            ]
        );
    }

    #[test]
    fn test_probe_config_carries_baud_override() {
        let request = DiscoveryRequest {
            hdmi_baud_rate: Some(115_200),
            ..DiscoveryRequest::new(Protocol::Sb)
        };

        assert_eq!(request.probe_config(Protocol::Hdmi).baud_rate, Some(115_200));
        assert_eq!(request.probe_config(Protocol::Sb).baud_rate, None);
    }
}
