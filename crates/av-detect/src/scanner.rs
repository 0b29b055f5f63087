//! Serial port scanner
//!
//! This module provides serial port enumeration.

use serialport::{available_ports, SerialPortType};
use tracing::info;

use crate::error::DetectError;

/// Information about a serial port
#[derive(Debug, Clone)]
pub struct SerialPortInfo {
    /// Port name (e.g., /dev/ttyUSB0, COM3)
    pub port: String,
    /// USB product string, used only for logging
    pub product: Option<String>,
}

impl SerialPortInfo {
    fn from_serialport(name: String, port_type: &SerialPortType) -> Self {
        let product = match port_type {
            SerialPortType::UsbPort(usb) => usb.product.clone(),
            _ => None,
        };
        Self {
            port: name,
            product,
        }
    }
}

/// Serial port scanner configuration
#[derive(Debug, Clone, Default)]
pub struct ScannerConfig {
    /// Skip ports whose name contains any of these patterns
    pub skip_patterns: Vec<String>,
}

/// Serial port scanner
pub struct PortScanner {
    config: ScannerConfig,
}

impl PortScanner {
    /// Create a new scanner that skips Bluetooth and debug ports
    pub fn new() -> Self {
        Self {
            config: ScannerConfig {
                skip_patterns: vec!["Bluetooth".to_string(), "debug".to_string()],
            },
        }
    }

    /// Create a scanner with custom configuration
    pub fn with_config(config: ScannerConfig) -> Self {
        Self { config }
    }

    /// Enumerate candidate serial ports in the order the OS reports them
    pub fn enumerate_ports(&self) -> Result<Vec<SerialPortInfo>, DetectError> {
        info!("Enumerating serial ports...");
        let ports = available_ports().map_err(|e| DetectError::EnumerationFailed(e.to_string()))?;

        let result: Vec<_> = ports
            .into_iter()
            .map(|p| SerialPortInfo::from_serialport(p.port_name, &p.port_type))
            .filter(|p| !self.should_skip_port(&p.port))
            .collect();

        if result.is_empty() {
            info!("No serial ports found");
        } else {
            info!("Found {} serial port(s)", result.len());
            for port in &result {
                info!("  {} - {}", port.port, port.product.as_deref().unwrap_or("Unknown"));
            }
        }

        Ok(result)
    }

    fn should_skip_port(&self, port: &str) -> bool {
        self.config
            .skip_patterns
            .iter()
            .any(|pattern| port.contains(pattern.as_str()))
    }
}

impl Default for PortScanner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serialport::UsbPortInfo;

    #[test]
    fn test_serial_port_info_from_usb() {
        let usb_info = SerialPortType::UsbPort(UsbPortInfo {
            vid: 0x067b,
            pid: 0x2303,
            serial_number: None,
            manufacturer: Some("Prolific".to_string()),
            product: Some("USB-Serial Controller".to_string()),
        });

        let info = SerialPortInfo::from_serialport("/dev/ttyUSB1".to_string(), &usb_info);

        assert_eq!(info.port, "/dev/ttyUSB1");
        assert_eq!(info.product.as_deref(), Some("USB-Serial Controller"));
    }

    #[test]
    fn test_skip_patterns() {
        let scanner = PortScanner::new();
        assert!(scanner.should_skip_port("/dev/cu.Bluetooth-Incoming-Port"));
        assert!(scanner.should_skip_port("/dev/cu.debug-console"));
        assert!(!scanner.should_skip_port("/dev/ttyUSB0"));

        let scanner = PortScanner::with_config(ScannerConfig::default());
        assert!(!scanner.should_skip_port("/dev/cu.Bluetooth-Incoming-Port"));
    }
}
