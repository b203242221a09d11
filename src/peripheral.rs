// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The trusted peripheral (C6): ComID allocation, discovery cache, and the
//! single serialized Exchange path over the external `StorageDevice`.

use std::time::Instant;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::cfg::config::{Config, PollConfig};
use crate::discovery::{self, TPerDesc};
use crate::error::{Error, Result};
use crate::packet::{self, ParsedComPacket};
use crate::setup::{self, ComIdState, StackResetStatus};
use crate::transport::{StorageDevice, SECURITY_PROTOCOL_DISCOVERY};

const MAX_COM_PACKET_SIZE: usize = 65536;

/// Owns `{device handle, allocated ComID + extension, cached TPerDesc}`, and
/// serializes all Exchange traffic (only one method may be in flight per
/// session under the negotiated profile).
pub struct TrustedPeripheral<D: StorageDevice> {
    device: D,
    com_id: u16,
    com_id_ext: u16,
    tper_desc: TPerDesc,
    poll: PollConfig,
    exchange_lock: Mutex<()>,
}

impl<D: StorageDevice> TrustedPeripheral<D> {
    /// Runs Discovery and allocates the base ComID of the first matching SSC
    /// (or `Config::preferred_ssc`, if set and present among the discovered
    /// SSCs).
    pub async fn new(device: D, config: &Config) -> Result<Self> {
        let mut buf = vec![0u8; MAX_COM_PACKET_SIZE];
        let len = device
            .security_receive(SECURITY_PROTOCOL_DISCOVERY, [0, 1], &mut buf)
            .await?;
        let tper_desc = discovery::parse_tper_desc(&buf[..len])?;
        let ssc = tper_desc
            .choose_ssc(config.preferred_ssc())
            .ok_or_else(|| Error::device("Level-0 Discovery reported no recognized SSC"))?;
        let com_id = ssc.base_com_id;

        Ok(TrustedPeripheral {
            device,
            com_id,
            com_id_ext: 0,
            tper_desc,
            poll: config.poll,
            exchange_lock: Mutex::new(()),
        })
    }

    pub fn com_id(&self) -> u16 {
        self.com_id
    }

    pub fn com_id_ext(&self) -> u16 {
        self.com_id_ext
    }

    pub fn tper_desc(&self) -> &TPerDesc {
        &self.tper_desc
    }

    pub async fn verify_com_id(&self) -> Result<ComIdState> {
        let request = setup::build_verify_com_id_valid_request(self.com_id, self.com_id_ext);
        let mut buf = vec![0u8; 46];
        self.setup_exchange(&request, &mut buf).await?;
        Ok(setup::parse_verify_com_id_valid_response(&buf)?.com_id_state)
    }

    /// Submits a stack reset request. On `SUCCESS` the peripheral discards
    /// all ComID state and the host must re-run session setup.
    pub async fn stack_reset(&self) -> Result<StackResetStatus> {
        let request = setup::build_stack_reset_request(self.com_id, self.com_id_ext);
        let mut buf = vec![0u8; 16];
        self.setup_exchange(&request, &mut buf).await?;
        Ok(setup::parse_stack_reset_response(&buf)?.status)
    }

    async fn setup_exchange(&self, request: &[u8], response_buf: &mut [u8]) -> Result<()> {
        let _guard = self.exchange_lock.lock().await;
        self.device
            .security_send(setup::SECURITY_PROTOCOL_SETUP, [self.com_id as u8, (self.com_id >> 8) as u8], request)
            .await?;
        let len = self
            .device
            .security_receive(setup::SECURITY_PROTOCOL_SETUP, [self.com_id as u8, (self.com_id >> 8) as u8], response_buf)
            .await?;
        if len < response_buf.len() {
            return Err(Error::protocol("setup-channel response shorter than expected"));
        }
        Ok(())
    }

    /// The single raw send/receive primitive: frames a ComPacket, `IF-SEND`s
    /// it on protocol `0x01`, and polls `IF-RECV` until a non-empty
    /// ComPacket returns.
    pub async fn exchange(&self, hsn: u32, tsn: u32, data: &[u8], cancel: &CancellationToken) -> Result<Vec<u8>> {
        let _guard = self.exchange_lock.lock().await;
        let frame = packet::build_com_packet(self.com_id, self.com_id_ext, hsn, tsn, data);
        self.device
            .security_send(0x01, [self.com_id as u8, (self.com_id >> 8) as u8], &frame)
            .await?;

        let parsed = self.poll_for_response(cancel).await?;
        Ok(parsed.data)
    }

    async fn poll_for_response(&self, cancel: &CancellationToken) -> Result<ParsedComPacket> {
        let deadline = Instant::now() + self.poll.max_total;
        let mut buf_len = MAX_COM_PACKET_SIZE.min(4096);

        loop {
            if cancel.is_cancelled() {
                return Err(Error::device("Exchange cancelled while polling IF-RECV"));
            }
            if Instant::now() >= deadline {
                return Err(Error::device("IF-RECV poll budget exhausted"));
            }

            let mut buf = vec![0u8; buf_len];
            let len = tokio::select! {
                _ = cancel.cancelled() => return Err(Error::device("Exchange cancelled while polling IF-RECV")),
                result = self.device.security_receive(0x01, [self.com_id as u8, (self.com_id >> 8) as u8], &mut buf) => result?,
            };
            let parsed = packet::parse_com_packet(&buf[..len])?;

            if !parsed.data.is_empty() {
                trace!(com_id = self.com_id, bytes = parsed.data.len(), "Exchange: received response");
                return Ok(parsed);
            }

            if parsed.outstanding_data == 0 {
                return Err(Error::protocol("IF-RECV returned an empty ComPacket with no outstanding data"));
            }

            buf_len = buf_len.max(parsed.outstanding_data as usize).min(MAX_COM_PACKET_SIZE);
            debug!(com_id = self.com_id, outstanding = parsed.outstanding_data, "Exchange: polling again");
            tokio::time::sleep(self.poll.interval).await;
        }
    }

    /// Aborts all local state without touching the peripheral; the caller
    /// must treat the session as gone and re-run discovery/session setup.
    pub fn reset(&mut self) {
        warn!(com_id = self.com_id, "resetting local TrustedPeripheral state without a stack reset");
    }
}
