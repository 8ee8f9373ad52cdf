//! Modbus-RTU serial link using `tokio-modbus`'s blocking client.
//!
//! Framing, CRC and serial timing are handled by `tokio-modbus` on top of a
//! `tokio-serial` port. This module only opens the port with the settings
//! from [`LinkConfig`] and maps protocol results into [`TransportError`].
//!
//! # Example
//!
//! ```ignore
//! use bldc_supervisor::config::LinkConfig;
//! use bldc_supervisor::hal::ModbusRtuLink;
//! use bldc_supervisor::transport::RegisterTransport;
//!
//! let link_config = LinkConfig::default().with_port("/dev/ttyUSB0");
//! let link = ModbusRtuLink::open(&link_config)?;
//! let transport = RegisterTransport::new(link, link_config.unit_id, link_config.lock_timeout());
//! let rpm = transport.read_one(0x0015)?;
//! ```

use tokio_modbus::client::sync::{rtu, Context, Reader, Writer};
use tokio_modbus::prelude::SlaveContext;
use tokio_modbus::Slave;

use crate::config::{LinkConfig, Parity};
use crate::error::TransportError;
use crate::traits::RegisterLink;

/// Open Modbus-RTU connection to one serial port.
pub struct ModbusRtuLink {
    ctx: Context,
    port: String,
    current_unit: Option<u8>,
}

impl ModbusRtuLink {
    /// Open the serial port described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Io`] (or [`TransportError::Disconnected`])
    /// if the port cannot be opened.
    pub fn open(config: &LinkConfig) -> Result<Self, TransportError> {
        let builder = tokio_serial::new(config.port.as_str(), config.baud_rate)
            .data_bits(data_bits(config.data_bits))
            .parity(parity(config.parity))
            .stop_bits(stop_bits(config.stop_bits))
            .timeout(config.timeout());

        let ctx = rtu::connect_slave_with_timeout(
            &builder,
            Slave(config.unit_id),
            Some(config.timeout()),
        )?;

        tracing::info!(
            port = %config.port,
            baud = config.baud_rate,
            unit = config.unit_id,
            timeout_ms = config.timeout_ms,
            "modbus-rtu link open"
        );

        Ok(Self {
            ctx,
            port: config.port.clone(),
            current_unit: Some(config.unit_id),
        })
    }

    /// Serial device path.
    pub fn port(&self) -> &str {
        &self.port
    }

    fn select_unit(&mut self, unit: u8) {
        if self.current_unit != Some(unit) {
            self.ctx.set_slave(Slave(unit));
            self.current_unit = Some(unit);
        }
    }
}

impl RegisterLink for ModbusRtuLink {
    type Error = TransportError;

    fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
        unit: u8,
    ) -> Result<Vec<u16>, TransportError> {
        self.select_unit(unit);
        flatten(self.ctx.read_holding_registers(address, count))
    }

    fn write_register(&mut self, address: u16, value: u16, unit: u8) -> Result<(), TransportError> {
        self.select_unit(unit);
        flatten(self.ctx.write_single_register(address, value))
    }
}

fn flatten<T>(result: tokio_modbus::Result<T>) -> Result<T, TransportError> {
    match result {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(exception)) => Err(TransportError::Exception(exception.to_string())),
        Err(tokio_modbus::Error::Transport(io)) => Err(TransportError::from(io)),
        Err(other) => Err(TransportError::MalformedResponse(other.to_string())),
    }
}

fn data_bits(bits: u8) -> tokio_serial::DataBits {
    match bits {
        5 => tokio_serial::DataBits::Five,
        6 => tokio_serial::DataBits::Six,
        7 => tokio_serial::DataBits::Seven,
        _ => tokio_serial::DataBits::Eight,
    }
}

fn parity(parity: Parity) -> tokio_serial::Parity {
    match parity {
        Parity::None => tokio_serial::Parity::None,
        Parity::Even => tokio_serial::Parity::Even,
        Parity::Odd => tokio_serial::Parity::Odd,
    }
}

fn stop_bits(bits: u8) -> tokio_serial::StopBits {
    if bits == 2 {
        tokio_serial::StopBits::Two
    } else {
        tokio_serial::StopBits::One
    }
}
