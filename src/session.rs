// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The session + method layer (C8): the `Idle -> Starting -> Active ->
//! Ending -> Idle` state machine and typed method dispatch over an active
//! session. The states mirror the corpus's `Transition<S, R>` state-machine
//! shape, simplified to explicit async methods since the TCG session
//! lifecycle has no multi-round handshake requiring repeated polymorphic
//! steps the way an iSCSI login negotiation does.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::data::{decode_token_stream, detokenize, encode_token, surround_with_list, tokenize, unsurround_with_list, Value};
use crate::error::{Error, Result};
use crate::method::{is_peripheral_close_session, method_call_to_value, method_result_from_value, MethodCall};
use crate::peripheral::TrustedPeripheral;
use crate::session_manager::{self, SessionIds};
use crate::transport::StorageDevice;
use crate::uid::Uid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Active,
    Ending,
}

/// An opened conversation between the host and one SP, identified by
/// `{HSN, TSN}`. Owns nothing beyond its own state; the `TrustedPeripheral`
/// it calls through is shared and serializes the wire traffic itself.
pub struct Session<D: StorageDevice> {
    peripheral: Arc<TrustedPeripheral<D>>,
    state: SessionState,
    ids: Option<SessionIds>,
    cancel: CancellationToken,
}

impl<D: StorageDevice> Session<D> {
    pub fn new(peripheral: Arc<TrustedPeripheral<D>>) -> Self {
        Session { peripheral, state: SessionState::Idle, ids: None, cancel: CancellationToken::new() }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Idle -> Starting -> Active. Sends `StartSession`, receives
    /// `SyncSession`, captures the TSN. Starting -> Idle on any failure.
    pub async fn login(
        &mut self,
        hsn: u32,
        sp: Uid,
        write: bool,
        host_challenge: Option<&[u8]>,
        host_signing_authority: Option<Uid>,
    ) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(Error::Logic("login() called on a session that is not Idle".to_string()));
        }
        self.state = SessionState::Starting;

        match session_manager::start_session(&self.peripheral, hsn, sp, write, host_challenge, host_signing_authority, &self.cancel)
            .await
        {
            Ok(ids) => {
                info!(hsn = ids.hsn, tsn = ids.tsn, sp = %sp, "session started");
                self.ids = Some(ids);
                self.state = SessionState::Active;
                Ok(())
            },
            Err(err) => {
                self.state = SessionState::Idle;
                Err(err)
            },
        }
    }

    /// Active -> Ending -> Idle. Emits END_OF_SESSION and settles to Idle
    /// regardless of whether the peripheral acknowledges in time; ending a
    /// session that is already Idle is a no-op.
    pub async fn end(&mut self) -> Result<()> {
        let Some(ids) = self.ids else {
            self.state = SessionState::Idle;
            return Ok(());
        };
        self.state = SessionState::Ending;
        let result = session_manager::end_session(&self.peripheral, ids, &self.cancel).await;
        self.state = SessionState::Idle;
        self.ids = None;
        result
    }

    fn active_ids(&self) -> Result<SessionIds> {
        match (self.state, self.ids) {
            (SessionState::Active, Some(ids)) => Ok(ids),
            _ => Err(Error::Logic("method call attempted without an Active session".to_string())),
        }
    }

    /// Invokes `method_id` on `invoking_id` with `args`, returning the
    /// result values on SUCCESS. On receipt of a peripheral-initiated CALL
    /// whose methodId is `CloseSession`, the session transitions to Idle
    /// and an `Invocation { status: Fail }` error surfaces.
    pub async fn call(&mut self, invoking_id: Uid, method_id: Uid, args: Vec<Value>) -> Result<Vec<Value>> {
        let ids = self.active_ids()?;
        let call = MethodCall::new(invoking_id, method_id, args);
        let request_value = method_call_to_value(&call);
        let request_tokens = unsurround_with_list(tokenize(&request_value));
        let mut flat = Vec::new();
        for token in &request_tokens {
            flat.extend(encode_token(token));
        }

        let response_bytes = self.peripheral.exchange(ids.hsn, ids.tsn, &flat, &self.cancel).await?;
        let response_tokens = decode_token_stream(&response_bytes)?;
        let (response_value, rest) = detokenize(&surround_with_list(response_tokens))?;
        if !rest.is_empty() {
            return Err(Error::protocol("trailing bytes after MethodResult"));
        }

        let was_peripheral_close = is_peripheral_close_session(&response_value);
        let result = method_result_from_value(&response_value)?;
        let outcome = result.into_result("method call");

        if was_peripheral_close {
            warn!(hsn = ids.hsn, tsn = ids.tsn, "peripheral closed the session unilaterally");
            self.state = SessionState::Idle;
            self.ids = None;
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_idle() {
        // Constructed indirectly via the public API in integration tests;
        // here we only check the enum's equality semantics hold.
        assert_eq!(SessionState::Idle, SessionState::Idle);
        assert_ne!(SessionState::Idle, SessionState::Active);
    }
}
