//! SSDP M-SEARCH client
//!
//! Internal; sends one search on the UPnP multicast group and collects the
//! unicast answers until the socket read times out.

use std::net::UdpSocket;
use std::time::Duration;

use crate::error::{DiscoveryError, Result};

const MULTICAST_ADDR: &str = "239.255.255.250:1900";

/// Device type advertised by HEOS-era (AIOS) Denon and Marantz receivers
pub(crate) const AIOS_DEVICE_TARGET: &str = "urn:schemas-denon-com:device:AiosDevice:1";

/// Headers of one SSDP answer that matter for discovery
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SsdpResponse {
    pub location: String,
    pub urn: String,
    pub usn: String,
    pub server: Option<String>,
}

pub(crate) struct SsdpClient {
    socket: UdpSocket,
}

impl SsdpClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").map_err(|e| {
            DiscoveryError::NetworkError(format!("Failed to bind UDP socket: {}", e))
        })?;

        socket.set_read_timeout(Some(timeout)).map_err(|e| {
            DiscoveryError::NetworkError(format!("Failed to set read timeout: {}", e))
        })?;

        socket.set_multicast_loop_v4(true).map_err(|e| {
            DiscoveryError::NetworkError(format!("Failed to set multicast loop: {}", e))
        })?;

        Ok(Self { socket })
    }

    /// Send an M-SEARCH and return an iterator over the answers
    pub fn search(&self, search_target: &str) -> Result<SsdpResponseIterator<'_>> {
        let request = search_request(search_target);

        self.socket
            .send_to(request.as_bytes(), MULTICAST_ADDR)
            .map_err(|e| {
                DiscoveryError::NetworkError(format!("Failed to send M-SEARCH: {}", e))
            })?;

        Ok(SsdpResponseIterator {
            socket: &self.socket,
            buffer: [0; 2048],
            finished: false,
        })
    }
}

pub(crate) struct SsdpResponseIterator<'a> {
    socket: &'a UdpSocket,
    buffer: [u8; 2048],
    finished: bool,
}

impl Iterator for SsdpResponseIterator<'_> {
    type Item = Result<SsdpResponse>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.finished {
            match self.socket.recv_from(&mut self.buffer) {
                Ok((size, _)) => {
                    // Skip anything that is not valid UTF-8 or lacks the required headers
                    let parsed = std::str::from_utf8(&self.buffer[..size])
                        .ok()
                        .and_then(parse_ssdp_response);
                    if let Some(response) = parsed {
                        return Some(Ok(response));
                    }
                }
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    self.finished = true;
                }
                Err(e) => {
                    self.finished = true;
                    let error = DiscoveryError::NetworkError(format!("Socket error: {}", e));
                    return Some(Err(error));
                }
            }
        }
        None
    }
}

fn search_request(search_target: &str) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: {}\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: 2\r\n\
         ST: {}\r\n\
         USER-AGENT: denon-avr-bridge/0.3 UPnP/1.0\r\n\
         \r\n",
        MULTICAST_ADDR, search_target
    )
}

fn parse_ssdp_response(response: &str) -> Option<SsdpResponse> {
    let mut location = None;
    let mut urn = None;
    let mut usn = None;
    let mut server = None;

    for line in response.lines() {
        let line = line.trim();

        if let Some(value) = extract_header_value(line, "LOCATION:") {
            location = Some(value);
        } else if let Some(value) = extract_header_value(line, "ST:") {
            urn = Some(value);
        } else if let Some(value) = extract_header_value(line, "USN:") {
            usn = Some(value);
        } else if let Some(value) = extract_header_value(line, "SERVER:") {
            server = Some(value);
        }
    }

    Some(SsdpResponse {
        location: location?,
        urn: urn?,
        usn: usn?,
        server,
    })
}

/// Extract header value from a line like "HEADER: value"
fn extract_header_value(line: &str, header: &str) -> Option<String> {
    let prefix = line.get(..header.len())?;
    if line.len() > header.len() && prefix.eq_ignore_ascii_case(header) {
        Some(line[header.len()..].trim().to_string())
    } else {
        None
    }
}
