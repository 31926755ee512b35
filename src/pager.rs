//! Alert dispatch to the paging service
//!
//! Delivers an MRN to the pager over plain HTTP/1.0: open a fresh TCP
//! connection, POST the identifier, read one response. Connection-level
//! failures are retried a bounded number of times with a fixed delay; a
//! response with a non-200 status is a completed attempt and is not retried.
//! Exhausting the retry budget is an explicit outcome, never a crash.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

/// Result of one dispatch call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Pager accepted the alert (HTTP 200)
    Delivered,
    /// Pager answered with a non-success status; not retried
    NonSuccess(u16),
    /// Pager never answered within the retry budget
    Unreachable {
        /// Attempts made before giving up
        attempts: u32,
    },
}

/// HTTP/1.0 client for the paging service
pub struct PagerClient {
    address: String,
    max_attempts: u32,
    retry_delay: Duration,
}

impl PagerClient {
    pub fn new(address: impl Into<String>, max_attempts: u32, retry_delay: Duration) -> Self {
        Self {
            address: address.into(),
            max_attempts,
            retry_delay,
        }
    }

    /// Deliver one MRN to the pager.
    pub fn dispatch(&self, mrn: &str) -> DispatchOutcome {
        let request = format!(
            "POST /page HTTP/1.0\r\n\
             Content-type: text/plain\r\n\
             Content-Length: {}\r\n\
             \r\n\
             {}",
            mrn.len(),
            mrn
        );

        let mut attempts = 0u32;
        while attempts < self.max_attempts {
            match self.try_once(&request) {
                Ok(status) if status == 200 => {
                    log::info!("Paged {} successfully", mrn);
                    return DispatchOutcome::Delivered;
                }
                Ok(status) => {
                    log::warn!("Pager answered {} for {}", status, mrn);
                    return DispatchOutcome::NonSuccess(status);
                }
                Err(e) => {
                    attempts += 1;
                    log::warn!(
                        "Pager attempt {}/{} failed for {}: {}",
                        attempts,
                        self.max_attempts,
                        mrn,
                        e
                    );
                    if attempts < self.max_attempts {
                        std::thread::sleep(self.retry_delay);
                    }
                }
            }
        }

        log::error!(
            "Pager unreachable for {} after {} attempts",
            mrn,
            attempts
        );
        DispatchOutcome::Unreachable { attempts }
    }

    /// One connect + send + receive cycle, returning the HTTP status.
    fn try_once(&self, request: &str) -> std::io::Result<u16> {
        let mut stream = TcpStream::connect(&self.address)?;
        stream.set_read_timeout(Some(Duration::from_secs(10)))?;
        stream.write_all(request.as_bytes())?;

        let mut response = [0u8; 1024];
        let n = stream.read(&mut response)?;
        if n == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "pager closed connection without responding",
            ));
        }

        // Status line: "HTTP/1.0 200 OK"
        let text = String::from_utf8_lossy(&response[..n]);
        let status = text
            .split(' ')
            .nth(1)
            .and_then(|s| s.trim().parse::<u16>().ok());
        match status {
            Some(code) => Ok(code),
            None => Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("malformed pager status line: {:?}", text.lines().next()),
            )),
        }
    }
}
