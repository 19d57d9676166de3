//! Modbus TCP access to the inverter
//!
//! [`ModbusClient`] wraps a single `tokio-modbus` context with per-operation
//! timeouts. [`ModbusConnectionManager`] owns a client and transparently
//! reconnects when the transport fails. Both sit behind [`RegisterBus`], the
//! seam the inverter adapter reads and writes through.

use crate::config::InverterConfig;
use crate::error::{HeliosError, Result};
use crate::logging::{StructuredLogger, get_logger};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_modbus::client::tcp;
use tokio_modbus::prelude::*;

/// Holding-register access used by the inverter adapter
#[async_trait::async_trait]
pub trait RegisterBus: Send {
    /// Optional connection status. Default: unknown (None).
    fn connection_status(&self) -> Option<bool> {
        None
    }

    async fn read_holding_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>>;

    /// Write `values` starting at `address`; a single value uses function 0x06
    async fn write_registers(&mut self, address: u16, values: &[u16]) -> Result<()>;
}

/// Modbus TCP client for one inverter unit
pub struct ModbusClient {
    client: Option<tokio_modbus::client::Context>,
    config: InverterConfig,
    connection_timeout: Duration,
    operation_timeout: Duration,
    logger: StructuredLogger,
}

impl ModbusClient {
    pub fn new(config: &InverterConfig) -> Self {
        Self {
            client: None,
            config: config.clone(),
            connection_timeout: Duration::from_millis(config.connect_timeout_ms),
            operation_timeout: Duration::from_millis(config.operation_timeout_ms),
            logger: get_logger("modbus"),
        }
    }

    /// Connect to the configured unit
    pub async fn connect(&mut self) -> Result<()> {
        let address = format!("{}:{}", self.config.ip, self.config.port);
        self.logger
            .info(&format!("Connecting to inverter at {}", address));

        let socket_addr = tokio::net::lookup_host(address.as_str())
            .await?
            .next()
            .ok_or_else(|| HeliosError::modbus(format!("No address found for {}", address)))?;

        let slave = Slave(self.config.unit_id);
        match timeout(self.connection_timeout, tcp::connect_slave(socket_addr, slave)).await {
            Ok(Ok(ctx)) => {
                self.client = Some(ctx);
                self.logger.info("Connected to inverter");
                Ok(())
            }
            Ok(Err(e)) => {
                let msg = format!("Failed to connect to {}: {}", address, e);
                self.logger.error(&msg);
                Err(HeliosError::io(msg))
            }
            Err(_) => {
                let msg = format!("Connection to {} timed out", address);
                self.logger.error(&msg);
                Err(HeliosError::timeout(msg))
            }
        }
    }

    pub fn disconnect(&mut self) {
        if self.client.take().is_some() {
            self.logger.info("Disconnected from inverter");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    pub async fn read_holding_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>> {
        let op_timeout = self.operation_timeout;
        self.logger
            .trace(&format!("Reading {} registers from {}", count, address));

        let client = self.get_client()?;
        let response = timeout(op_timeout, client.read_holding_registers(address, count)).await;
        let regs = self.map_response(response, "read holding registers")?;
        if regs.len() != usize::from(count) {
            return Err(HeliosError::modbus(format!(
                "Expected {} registers from {}, got {}",
                count,
                address,
                regs.len()
            )));
        }
        Ok(regs)
    }

    pub async fn write_single_register(&mut self, address: u16, value: u16) -> Result<()> {
        let op_timeout = self.operation_timeout;
        self.logger
            .debug(&format!("Writing {} to register {}", value, address));

        let client = self.get_client()?;
        let response = timeout(op_timeout, client.write_single_register(address, value)).await;
        self.map_response(response, "write single register")
    }

    pub async fn write_multiple_registers(&mut self, address: u16, values: &[u16]) -> Result<()> {
        let op_timeout = self.operation_timeout;
        self.logger.debug(&format!(
            "Writing {:?} to registers starting at {}",
            values, address
        ));

        let client = self.get_client()?;
        let response = timeout(op_timeout, client.write_multiple_registers(address, values)).await;
        self.map_response(response, "write multiple registers")
    }

    /// Flatten timeout, transport and device-exception layers into one error.
    /// Transport failures surface as I/O errors so the manager reconnects;
    /// device exceptions stay Modbus errors and are not retried.
    fn map_response<T, E: std::fmt::Display>(
        &self,
        response: std::result::Result<
            std::result::Result<std::result::Result<T, ExceptionCode>, E>,
            tokio::time::error::Elapsed,
        >,
        what: &str,
    ) -> Result<T> {
        match response {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(exception))) => {
                let msg = format!("Failed to {}: device exception {}", what, exception);
                self.logger.warn(&msg);
                Err(HeliosError::modbus(msg))
            }
            Ok(Err(e)) => {
                let msg = format!("Failed to {}: {}", what, e);
                self.logger.error(&msg);
                Err(HeliosError::io(msg))
            }
            Err(_) => {
                let msg = format!("Timed out trying to {}", what);
                self.logger.error(&msg);
                Err(HeliosError::timeout(msg))
            }
        }
    }

    fn get_client(&mut self) -> Result<&mut tokio_modbus::client::Context> {
        self.client
            .as_mut()
            .ok_or_else(|| HeliosError::io("Not connected to inverter"))
    }
}

type ClientFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Connection manager with automatic reconnection
pub struct ModbusConnectionManager {
    client: ModbusClient,
    max_retry_attempts: u32,
    retry_delay: Duration,
    logger: StructuredLogger,
}

impl ModbusConnectionManager {
    pub fn new(config: &InverterConfig) -> Self {
        Self {
            client: ModbusClient::new(config),
            max_retry_attempts: config.max_retries.max(1),
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            logger: get_logger("modbus_manager"),
        }
    }

    /// Run `operation`, reconnecting and retrying on connection errors
    pub async fn execute_with_reconnect<T, F>(&mut self, mut operation: F) -> Result<T>
    where
        F: for<'c> FnMut(&'c mut ModbusClient) -> ClientFuture<'c, T> + Send,
        T: Send,
    {
        let mut attempts = 0;

        loop {
            if !self.client.is_connected() {
                if let Err(e) = self.client.connect().await {
                    attempts += 1;
                    if attempts >= self.max_retry_attempts {
                        return Err(e);
                    }
                    self.logger
                        .warn(&format!("Connection attempt {} failed: {}", attempts, e));
                    sleep(self.retry_delay).await;
                    continue;
                }
            }

            match operation(&mut self.client).await {
                Ok(result) => return Ok(result),
                Err(e) if is_connection_error(&e) => {
                    self.logger
                        .warn(&format!("Operation failed due to connection error: {}", e));
                    self.client.disconnect();
                    attempts += 1;
                    if attempts >= self.max_retry_attempts {
                        return Err(e);
                    }
                    sleep(self.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait::async_trait]
impl RegisterBus for ModbusConnectionManager {
    fn connection_status(&self) -> Option<bool> {
        Some(self.client.is_connected())
    }

    async fn read_holding_registers(&mut self, address: u16, count: u16) -> Result<Vec<u16>> {
        self.execute_with_reconnect(move |c| Box::pin(c.read_holding_registers(address, count)))
            .await
    }

    async fn write_registers(&mut self, address: u16, values: &[u16]) -> Result<()> {
        match values {
            [] => Ok(()),
            [single] => {
                let value = *single;
                self.execute_with_reconnect(move |c| Box::pin(c.write_single_register(address, value)))
                    .await
            }
            _ => {
                let values = values.to_vec();
                self.execute_with_reconnect(move |c| {
                    let values = values.clone();
                    Box::pin(async move { c.write_multiple_registers(address, &values).await })
                })
                .await
            }
        }
    }
}

/// Errors that warrant dropping the connection and trying again
pub fn is_connection_error(error: &HeliosError) -> bool {
    matches!(error, HeliosError::Io { .. } | HeliosError::Timeout { .. })
}

/// Reinterpret a raw register as two's complement
pub const fn to_signed(raw: u16) -> i16 {
    raw as i16
}

/// Split a 32-bit value into two registers, high word first
pub const fn split_u32(value: u32) -> [u16; 2] {
    [(value >> 16) as u16, (value & 0xFFFF) as u16]
}
