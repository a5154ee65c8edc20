//! Serial transport for telemetry radios and USB autopilots.
//!
//! `serialport` is blocking, so the reader runs on the blocking pool with a
//! short read timeout and polls a stop flag between reads.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use serialport::{SerialPort, SerialPortType};
use tokio::sync::mpsc;

use super::{Inbound, Opened, SerialDevice, TaskGuard, Transport, INBOUND_QUEUE, READ_BUF};
use crate::error::TransportError;

const READ_TIMEOUT: Duration = Duration::from_millis(100);

pub struct SerialTransport {
    path: String,
    baud: u32,
    writer: Arc<Mutex<Box<dyn SerialPort>>>,
    stop: Arc<AtomicBool>,
    _reader: TaskGuard,
}

impl SerialTransport {
    pub fn open(path: &str, baud: u32) -> Result<Opened, TransportError> {
        let serial_err = |e: serialport::Error| TransportError::Serial {
            path: path.to_string(),
            reason: e.to_string(),
        };

        let mut builder = serialport::new(path, baud).timeout(READ_TIMEOUT);
        #[cfg(unix)]
        {
            builder = builder
                .data_bits(serialport::DataBits::Eight)
                .stop_bits(serialport::StopBits::One)
                .parity(serialport::Parity::None);
        }
        let port = builder.open().map_err(serial_err)?;
        let reader = port.try_clone().map_err(serial_err)?;

        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel(INBOUND_QUEUE);
        let handle = {
            let stop = stop.clone();
            tokio::task::spawn_blocking(move || read_loop(reader, tx, stop))
        };

        tracing::info!(path, baud, "serial transport opened");
        let transport = SerialTransport {
            path: path.to_string(),
            baud,
            writer: Arc::new(Mutex::new(port)),
            stop,
            _reader: TaskGuard::new(handle),
        };
        Ok(Opened {
            transport: Arc::new(transport),
            inbound: rx,
        })
    }
}

pub(super) fn list_devices() -> Vec<SerialDevice> {
    let ports = match serialport::available_ports() {
        Ok(ports) => ports,
        Err(e) => {
            tracing::warn!(error = %e, "serial port enumeration failed");
            return Vec::new();
        }
    };
    ports
        .into_iter()
        .map(|port| {
            let (manufacturer, product) = match port.port_type {
                SerialPortType::UsbPort(usb) => (usb.manufacturer, usb.product),
                _ => (None, None),
            };
            SerialDevice {
                path: port.port_name,
                manufacturer,
                product,
            }
        })
        .collect()
}

fn read_loop(mut port: Box<dyn SerialPort>, tx: mpsc::Sender<Inbound>, stop: Arc<AtomicBool>) {
    let mut buf = vec![0u8; READ_BUF];
    while !stop.load(Ordering::Acquire) && !tx.is_closed() {
        match port.read(&mut buf) {
            Ok(0) => continue,
            Ok(n) => {
                let event = Inbound::Data {
                    bytes: Bytes::copy_from_slice(&buf[..n]),
                    from: None,
                };
                if tx.blocking_send(event).is_err() {
                    return;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
            Err(e) => {
                tracing::warn!(error = %e, "serial read failed");
                let _ = tx.blocking_send(Inbound::Closed {
                    error: Some(e.to_string()),
                });
                return;
            }
        }
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn send(&self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.stop.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }
        let writer = self.writer.clone();
        let data = bytes.to_vec();
        tokio::task::spawn_blocking(move || writer.lock().write_all(&data))
            .await
            .map_err(|_| TransportError::Closed)??;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("serial:{}:{}", self.path, self.baud)
    }

    fn close(&self) {
        self.stop.store(true, Ordering::Release);
    }
}
