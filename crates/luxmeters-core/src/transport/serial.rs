//! Serial port handling
//!
//! Port discovery and the [`SerialTransport`] built on the `serialport` crate.

use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use std::collections::HashMap;
#[cfg(target_os = "linux")]
use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::time::Duration;

use tracing::debug;

use super::{Transport, TransportConfig};
use crate::error::TransportError;

/// Information about an available serial port
#[derive(Debug, Clone)]
pub struct PortInfo {
    /// Port name (e.g., "/dev/ttyUSB0" or "COM3")
    pub name: String,

    /// USB vendor ID (if USB device)
    pub vid: Option<u16>,

    /// USB product ID (if USB device)
    pub pid: Option<u16>,

    /// Manufacturer name (if available)
    pub manufacturer: Option<String>,

    /// Product name (if available)
    pub product: Option<String>,

    /// Serial number (if available)
    pub serial_number: Option<String>,
}

impl PortInfo {
    /// A port known only by name
    pub fn bare(name: String) -> Self {
        Self {
            name,
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial_number: None,
        }
    }

    /// Case-insensitive match against the USB manufacturer string
    pub fn manufactured_by(&self, manufacturer: &str) -> bool {
        let needle = manufacturer.to_lowercase();
        self.manufacturer
            .as_deref()
            .is_some_and(|m| m.to_lowercase().contains(&needle))
    }
}

impl From<SerialPortInfo> for PortInfo {
    fn from(info: SerialPortInfo) -> Self {
        match info.port_type {
            SerialPortType::UsbPort(usb_info) => Self {
                name: info.port_name,
                vid: Some(usb_info.vid),
                pid: Some(usb_info.pid),
                manufacturer: usb_info.manufacturer,
                product: usb_info.product,
                serial_number: usb_info.serial_number,
            },
            _ => Self::bare(info.port_name),
        }
    }
}

/// USB CDC devices, then USB-serial bridges, each by device number; anything else last
fn port_sort_key(name: &str) -> (u8, usize, String) {
    let device = name.rsplit('/').next().unwrap_or(name);
    let rank = [("ttyACM", 0u8), ("ttyUSB", 1u8)]
        .into_iter()
        .find_map(|(prefix, rank)| {
            device
                .strip_prefix(prefix)
                .map(|n| (rank, n.parse().unwrap_or(usize::MAX)))
        });
    match rank {
        Some((rank, number)) => (rank, number, device.to_string()),
        None => (2, 0, device.to_string()),
    }
}

#[cfg(any(target_os = "linux", test))]
fn is_usb_tty(device: &str) -> bool {
    device.starts_with("ttyACM") || device.starts_with("ttyUSB")
}

/// Every serial port on the system, USB devices first in device-number order.
///
/// On Linux `/dev` is also scanned, since enumeration can miss freshly
/// plugged USB adapters.
pub fn list_ports() -> Vec<PortInfo> {
    #[cfg_attr(not(target_os = "linux"), allow(unused_mut))]
    let mut found: HashMap<String, PortInfo> = serialport::available_ports()
        .unwrap_or_default()
        .into_iter()
        .map(|info| {
            let port = PortInfo::from(info);
            (port.name.clone(), port)
        })
        .collect();

    #[cfg(target_os = "linux")]
    if let Ok(entries) = fs::read_dir("/dev") {
        let devices = entries
            .flatten()
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|device| is_usb_tty(device));
        for device in devices {
            let path = format!("/dev/{}", device);
            found
                .entry(path.clone())
                .or_insert_with(|| PortInfo::bare(path));
        }
    }

    let mut ports: Vec<PortInfo> = found.into_values().collect();
    ports.sort_by_key(|p| port_sort_key(&p.name));
    ports
}

/// Ports whose USB manufacturer string contains `manufacturer`
pub fn find_ports_by_manufacturer(manufacturer: &str) -> Vec<PortInfo> {
    filter_by_manufacturer(list_ports(), manufacturer)
}

fn filter_by_manufacturer(ports: Vec<PortInfo>, manufacturer: &str) -> Vec<PortInfo> {
    ports
        .into_iter()
        .filter(|p| p.manufactured_by(manufacturer))
        .collect()
}

/// Blocking serial transport over a `serialport` handle
pub struct SerialTransport {
    port: Option<Box<dyn SerialPort>>,
    name: String,
}

impl SerialTransport {
    /// Open and configure a port
    pub fn open(config: &TransportConfig) -> Result<Self, TransportError> {
        debug!(
            port = %config.port,
            baud = config.baud_rate,
            parity = ?config.parity,
            byte_size = ?config.byte_size,
            "opening serial port"
        );

        let port = serialport::new(&config.port, config.baud_rate)
            .parity(config.parity.into())
            .data_bits(config.byte_size.into())
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(config.timeout)
            .open()
            .map_err(|e| TransportError::Open {
                port: config.port.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            port: Some(port),
            name: config.port.clone(),
        })
    }

    /// Name of the underlying port
    pub fn name(&self) -> &str {
        &self.name
    }

    fn port(&mut self) -> Result<&mut Box<dyn SerialPort>, TransportError> {
        self.port.as_mut().ok_or(TransportError::Closed)
    }
}

impl Transport for SerialTransport {
    fn write(&mut self, bytes: &[u8], settle: Duration) -> Result<(), TransportError> {
        let port = self.port()?;
        port.write_all(bytes)?;
        port.flush()?;
        if !settle.is_zero() {
            std::thread::sleep(settle);
        }
        Ok(())
    }

    fn read_line(&mut self) -> Result<Vec<u8>, TransportError> {
        let port = self.port()?;
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match port.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => {
                    line.push(byte[0]);
                    if byte[0] == b'\n' {
                        break;
                    }
                }
                Err(e) if e.kind() == ErrorKind::TimedOut => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(line)
    }

    fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, TransportError> {
        let port = self.port()?;
        let mut buffer = vec![0u8; n];
        let mut filled = 0;
        while filled < n {
            match port.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(read) => filled += read,
                Err(e) if e.kind() == ErrorKind::TimedOut => break,
                Err(e) => return Err(e.into()),
            }
        }
        buffer.truncate(filled);
        Ok(buffer)
    }

    fn reset_buffers(&mut self) -> Result<(), TransportError> {
        self.port()?.clear(serialport::ClearBuffer::All)?;
        Ok(())
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        self.port()?.set_timeout(timeout)?;
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            debug!(port = %self.name, "serial port closed");
        }
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        if self.port.is_some() {
            debug!(port = %self.name, "closing serial port on drop");
            self.close();
        }
    }
}
