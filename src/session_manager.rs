// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The session manager (C7): `Properties`, `StartSession`, `EndSession`,
//! and the fixed negotiated host properties profile (§6).

use tokio_util::sync::CancellationToken;

use crate::data::{decode_token_stream, tokenize, unsurround_with_list, Value};
use crate::error::{Error, Result};
use crate::method::{method_call_to_value, method_result_from_value, MethodCall};
use crate::peripheral::TrustedPeripheral;
use crate::transport::StorageDevice;
use crate::uid::Uid;
use crate::uids::{method as method_uid, SESSION_MANAGER};

/// The host-side negotiated properties profile. This driver always
/// negotiates exactly this profile; relaxed profiles (pipelining,
/// AckNAK, Asynchronous) are out of scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostProperties {
    pub max_packets: u32,
    pub max_subpackets: u32,
    pub max_methods: u32,
    pub max_com_packet_size: u32,
    pub max_ind_token_size: u32,
    pub max_agg_token_size: u32,
    pub continued_tokens: u32,
    pub sequence_numbers: u32,
    pub ack_nak: u32,
    pub asynchronous: u32,
}

impl Default for HostProperties {
    fn default() -> Self {
        HostProperties {
            max_packets: 1,
            max_subpackets: 1,
            max_methods: 1,
            max_com_packet_size: 65536,
            max_ind_token_size: 65536,
            max_agg_token_size: 65536,
            continued_tokens: 0,
            sequence_numbers: 0,
            ack_nak: 0,
            asynchronous: 0,
        }
    }
}

impl HostProperties {
    fn to_named_args(self) -> Vec<Value> {
        let entries: [(u64, u32); 10] = [
            (0, self.max_packets),
            (1, self.max_subpackets),
            (2, self.max_methods),
            (3, self.max_com_packet_size),
            (4, self.max_ind_token_size),
            (5, self.max_agg_token_size),
            (6, self.continued_tokens),
            (7, self.sequence_numbers),
            (8, self.ack_nak),
            (9, self.asynchronous),
        ];
        entries
            .into_iter()
            .map(|(key, value)| Value::named(Value::from_u64(key), Value::from_u64(value as u64)))
            .collect()
    }
}

/// Opened session numbers: `{HSN, TSN}`, assigned host-side and
/// peripheral-side respectively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionIds {
    pub hsn: u32,
    pub tsn: u32,
}

async fn call_session_manager<D: StorageDevice>(
    peripheral: &TrustedPeripheral<D>,
    method_id: Uid,
    args: Vec<Value>,
    cancel: &CancellationToken,
) -> Result<Vec<Value>> {
    let call = MethodCall::new(SESSION_MANAGER, method_id, args);
    let request_value = method_call_to_value(&call);
    let request_tokens = unsurround_with_list(tokenize(&request_value));
    let mut flat = Vec::new();
    for token in request_tokens {
        flat.extend(crate::data::encode_token(&token));
    }

    // HSN=0/TSN=0 frame the session-manager-level exchange itself.
    let response_bytes = peripheral.exchange(0, 0, &flat, cancel).await?;
    let response_tokens = decode_token_stream(&response_bytes)?;
    let (response_value, rest) = crate::data::detokenize(&crate::data::surround_with_list(response_tokens))?;
    if !rest.is_empty() {
        return Err(Error::protocol("trailing bytes after SessionManager response"));
    }
    method_result_from_value(&response_value)?.into_result("SessionManager")
}

/// Invokes `Properties` on the SessionManager invoking ID, returning the
/// TPer's host properties echo (not separately typed: callers read it back
/// out of the raw values since the TPer is free to omit fields it doesn't
/// support).
pub async fn properties<D: StorageDevice>(
    peripheral: &TrustedPeripheral<D>,
    host_properties: HostProperties,
    cancel: &CancellationToken,
) -> Result<Vec<Value>> {
    let args = vec![Value::named(Value::from_u64(0), Value::List(host_properties.to_named_args()))];
    call_session_manager(peripheral, method_uid::PROPERTIES, args, cancel).await
}

/// `StartSession(hsn, sp, write, ...)`; the peripheral replies with
/// `SyncSession(hsn, tsn, ...)`.
pub async fn start_session<D: StorageDevice>(
    peripheral: &TrustedPeripheral<D>,
    hsn: u32,
    sp: Uid,
    write: bool,
    host_challenge: Option<&[u8]>,
    host_signing_authority: Option<Uid>,
    cancel: &CancellationToken,
) -> Result<SessionIds> {
    let mut args = vec![Value::from_u64(hsn as u64), Value::bytes(sp.to_be_bytes().to_vec()), Value::from_u64(write as u64)];
    if let Some(challenge) = host_challenge {
        args.push(Value::named(Value::from_u64(0), Value::bytes(challenge.to_vec())));
    }
    if let Some(authority) = host_signing_authority {
        args.push(Value::named(Value::from_u64(3), Value::bytes(authority.to_be_bytes().to_vec())));
    }

    let values = call_session_manager(peripheral, method_uid::START_SESSION, args, cancel).await?;
    let returned_hsn = values
        .first()
        .ok_or_else(|| Error::protocol("SyncSession missing HSN"))?
        .as_u64()? as u32;
    let tsn = values
        .get(1)
        .ok_or_else(|| Error::protocol("SyncSession missing TSN"))?
        .as_u64()? as u32;
    if returned_hsn != hsn {
        return Err(Error::protocol("SyncSession echoed an unexpected HSN"));
    }
    Ok(SessionIds { hsn, tsn })
}

/// Emits a bare `END_OF_SESSION` token inside a packet carrying the given
/// session numbers.
pub async fn end_session<D: StorageDevice>(
    peripheral: &TrustedPeripheral<D>,
    ids: SessionIds,
    cancel: &CancellationToken,
) -> Result<()> {
    let token = crate::data::encode_token(&crate::data::Token::Command(crate::data::Command::EndOfSession));
    let _ = peripheral.exchange(ids.hsn, ids.tsn, &token, cancel).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_properties_default_matches_fixed_profile() {
        let props = HostProperties::default();
        assert_eq!(props.max_packets, 1);
        assert_eq!(props.max_subpackets, 1);
        assert_eq!(props.max_methods, 1);
        assert_eq!(props.ack_nak, 0);
        assert_eq!(props.asynchronous, 0);
    }

    #[test]
    fn host_properties_serialize_to_ten_named_entries() {
        let args = HostProperties::default().to_named_args();
        assert_eq!(args.len(), 10);
    }
}
