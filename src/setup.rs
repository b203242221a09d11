// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The setup channel (C4): out-of-band ComID verification and stack reset,
//! security protocol `0x02`. Field layouts grounded on the original
//! implementation's `SetupPackets.hpp`.

use zerocopy::{BigEndian, FromBytes, Immutable, IntoBytes, KnownLayout, U16, U32};

use crate::error::{Error, Result};

pub const SECURITY_PROTOCOL_SETUP: u8 = 0x02;

const VERIFY_COM_ID_VALID_REQUEST_CODE: u32 = 0x0000_0001;
const STACK_RESET_REQUEST_CODE: u32 = 0x0000_0002;

#[repr(C)]
#[derive(Debug, FromBytes, IntoBytes, KnownLayout, Immutable)]
struct RequestHeader {
    com_id: U16<BigEndian>,
    com_id_ext: U16<BigEndian>,
    request_code: U32<BigEndian>,
}

/// State returned by `VerifyComIdValid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComIdState {
    Invalid,
    Inactive,
    Issued,
    Associated,
}

impl ComIdState {
    fn from_code(code: u32) -> Result<Self> {
        Ok(match code {
            0x00 => ComIdState::Invalid,
            0x01 => ComIdState::Inactive,
            0x02 => ComIdState::Issued,
            0x03 => ComIdState::Associated,
            other => return Err(Error::protocol(format!("unknown ComIdState code {other}"))),
        })
    }
}

/// Outcome of a `StackReset` request. `SUCCESS` encodes as `0` on the wire,
/// `FAILURE` as `1` — the inverse of the usual C convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackResetStatus {
    Success,
    Failure,
}

impl StackResetStatus {
    fn from_code(code: u32) -> Result<Self> {
        Ok(match code {
            0 => StackResetStatus::Success,
            1 => StackResetStatus::Failure,
            other => return Err(Error::protocol(format!("unknown StackResetStatus code {other}"))),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyComIdValidResponse {
    pub com_id: u16,
    pub com_id_ext: u16,
    pub com_id_state: ComIdState,
    pub time_of_alloc: [u8; 10],
    pub time_of_expiry: [u8; 10],
    pub time_current: [u8; 10],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackResetResponse {
    pub com_id: u16,
    pub com_id_ext: u16,
    pub status: StackResetStatus,
}

/// Builds the 8-byte `VerifyComIdValid` request payload.
pub fn build_verify_com_id_valid_request(com_id: u16, com_id_ext: u16) -> Vec<u8> {
    RequestHeader { com_id: com_id.into(), com_id_ext: com_id_ext.into(), request_code: VERIFY_COM_ID_VALID_REQUEST_CODE.into() }
        .as_bytes()
        .to_vec()
}

/// Builds the 8-byte `StackReset` request payload.
pub fn build_stack_reset_request(com_id: u16, com_id_ext: u16) -> Vec<u8> {
    RequestHeader { com_id: com_id.into(), com_id_ext: com_id_ext.into(), request_code: STACK_RESET_REQUEST_CODE.into() }
        .as_bytes()
        .to_vec()
}

/// Parses a 46-byte `VerifyComIdValid` response.
pub fn parse_verify_com_id_valid_response(bytes: &[u8]) -> Result<VerifyComIdValidResponse> {
    if bytes.len() < 46 {
        return Err(Error::protocol(format!("VerifyComIdValid response too short: {} bytes", bytes.len())));
    }
    let com_id = u16::from_be_bytes([bytes[0], bytes[1]]);
    let com_id_ext = u16::from_be_bytes([bytes[2], bytes[3]]);
    let request_code = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if request_code != VERIFY_COM_ID_VALID_REQUEST_CODE {
        return Err(Error::protocol(format!("unexpected request code {request_code:#x} in VerifyComIdValid response")));
    }
    // bytes[8..10] reserved, bytes[10..12] availableDataLength: not surfaced.
    let com_id_state = ComIdState::from_code(u32::from_be_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]))?;
    let mut time_of_alloc = [0u8; 10];
    time_of_alloc.copy_from_slice(&bytes[16..26]);
    let mut time_of_expiry = [0u8; 10];
    time_of_expiry.copy_from_slice(&bytes[26..36]);
    let mut time_current = [0u8; 10];
    time_current.copy_from_slice(&bytes[36..46]);

    Ok(VerifyComIdValidResponse { com_id, com_id_ext, com_id_state, time_of_alloc, time_of_expiry, time_current })
}

/// Parses a 16-byte `StackReset` response.
pub fn parse_stack_reset_response(bytes: &[u8]) -> Result<StackResetResponse> {
    if bytes.len() < 16 {
        return Err(Error::protocol(format!("StackReset response too short: {} bytes", bytes.len())));
    }
    let com_id = u16::from_be_bytes([bytes[0], bytes[1]]);
    let com_id_ext = u16::from_be_bytes([bytes[2], bytes[3]]);
    let request_code = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    if request_code != STACK_RESET_REQUEST_CODE {
        return Err(Error::protocol(format!("unexpected request code {request_code:#x} in StackReset response")));
    }
    let status = StackResetStatus::from_code(u32::from_be_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]))?;
    Ok(StackResetResponse { com_id, com_id_ext, status })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(s: &str) -> Vec<u8> {
        hex::decode(s.replace(' ', "")).expect("valid test hex")
    }

    #[test]
    fn verify_com_id_valid_scenario_returns_associated() {
        let mut bytes = hex("DE AD BE EF 00 00 00 01 00 00 00 22 00 00 00 03");
        bytes.extend(std::iter::repeat_n(0u8, 30));
        let response = parse_verify_com_id_valid_response(&bytes).unwrap();
        assert_eq!(response.com_id, 0xDEAD);
        assert_eq!(response.com_id_ext, 0xBEEF);
        assert_eq!(response.com_id_state, ComIdState::Associated);
    }

    #[test]
    fn stack_reset_scenario_returns_failure() {
        let mut bytes = hex("DE AD BE EF");
        bytes.extend(hex("00 00 00 02 00 00 00 04 00 00 00 01"));
        let response = parse_stack_reset_response(&bytes).unwrap();
        assert_eq!(response.status, StackResetStatus::Failure);
    }

    #[test]
    fn requests_round_trip_request_code() {
        let req = build_verify_com_id_valid_request(0x0481, 0);
        assert_eq!(req.len(), 8);
        assert_eq!(&req[4..8], &VERIFY_COM_ID_VALID_REQUEST_CODE.to_be_bytes());
    }
}
