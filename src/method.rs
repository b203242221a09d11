// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The method invocation layer (C8 wire shape): `MethodCall`/`MethodResult`
//! marshalling atop `Value`, and the method status code table. Grounded on
//! the original implementation's `Method.cpp` (`MethodCallToValue` /
//! `MethodCallFromValue` / `MethodResultFromValue` / `MethodResultToValue` /
//! `MethodStatusToException`).

use std::fmt;

use crate::data::{Command, Value};
use crate::error::{Error, Result};
use crate::uid::Uid;
use crate::uids::method as method_uid;

/// The status byte a `MethodResult`'s trailing `[status, 0, 0]` triplet
/// carries. Named variants match the Core Specification's exhaustive table;
/// codes with no behavioral distinction in this driver collapse to
/// `Obsolete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodStatus {
    Success,
    NotAuthorized,
    Obsolete,
    SpBusy,
    SpFailed,
    SpDisabled,
    SpFrozen,
    NoSessionsAvailable,
    UniquenessConflict,
    InsufficientSpace,
    InsufficientRows,
    InvalidParameter,
    TPerMalfunction,
    TransactionFailure,
    ResponseOverflow,
    AuthorityLockedOut,
    Fail,
}

impl MethodStatus {
    pub fn to_code(self) -> u8 {
        match self {
            MethodStatus::Success => 0x00,
            MethodStatus::NotAuthorized => 0x01,
            MethodStatus::Obsolete => 0x02,
            MethodStatus::SpBusy => 0x03,
            MethodStatus::SpFailed => 0x04,
            MethodStatus::SpDisabled => 0x05,
            MethodStatus::SpFrozen => 0x06,
            MethodStatus::NoSessionsAvailable => 0x07,
            MethodStatus::UniquenessConflict => 0x08,
            MethodStatus::InsufficientSpace => 0x09,
            MethodStatus::InsufficientRows => 0x0A,
            MethodStatus::InvalidParameter => 0x0C,
            MethodStatus::TPerMalfunction => 0x11,
            MethodStatus::TransactionFailure => 0x12,
            MethodStatus::ResponseOverflow => 0x13,
            MethodStatus::AuthorityLockedOut => 0x14,
            MethodStatus::Fail => 0x3F,
        }
    }

    pub fn from_code(code: u8) -> Self {
        match code {
            0x00 => MethodStatus::Success,
            0x01 => MethodStatus::NotAuthorized,
            0x03 => MethodStatus::SpBusy,
            0x04 => MethodStatus::SpFailed,
            0x05 => MethodStatus::SpDisabled,
            0x06 => MethodStatus::SpFrozen,
            0x07 => MethodStatus::NoSessionsAvailable,
            0x08 => MethodStatus::UniquenessConflict,
            0x09 => MethodStatus::InsufficientSpace,
            0x0A => MethodStatus::InsufficientRows,
            0x0C => MethodStatus::InvalidParameter,
            0x11 => MethodStatus::TPerMalfunction,
            0x12 => MethodStatus::TransactionFailure,
            0x13 => MethodStatus::ResponseOverflow,
            0x14 => MethodStatus::AuthorityLockedOut,
            0x3F => MethodStatus::Fail,
            _ => MethodStatus::Obsolete,
        }
    }

    pub fn is_success(self) -> bool {
        matches!(self, MethodStatus::Success)
    }
}

impl fmt::Display for MethodStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MethodStatus::Success => "success",
            MethodStatus::NotAuthorized => "not authorized",
            MethodStatus::Obsolete => "obsolete status code",
            MethodStatus::SpBusy => "SP busy",
            MethodStatus::SpFailed => "SP failed",
            MethodStatus::SpDisabled => "SP disabled",
            MethodStatus::SpFrozen => "SP frozen",
            MethodStatus::NoSessionsAvailable => "no sessions available",
            MethodStatus::UniquenessConflict => "uniqueness conflict",
            MethodStatus::InsufficientSpace => "insufficient space",
            MethodStatus::InsufficientRows => "insufficient rows",
            MethodStatus::InvalidParameter => "invalid parameter",
            MethodStatus::TPerMalfunction => "TPer malfunction",
            MethodStatus::TransactionFailure => "transaction failure",
            MethodStatus::ResponseOverflow => "response overflow",
            MethodStatus::AuthorityLockedOut => "authority locked out",
            MethodStatus::Fail => "fail",
        };
        f.write_str(s)
    }
}

/// Converts a non-success status into the crate's typed `Error`, named after
/// the method that produced it.
pub fn status_to_error(method: &'static str, status: MethodStatus) -> Error {
    Error::Invocation { method, status }
}

/// `{invokingId, methodId, args, status}`, as issued by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCall {
    pub invoking_id: Uid,
    pub method_id: Uid,
    pub args: Vec<Value>,
    pub status: MethodStatus,
}

impl MethodCall {
    pub fn new(invoking_id: Uid, method_id: Uid, args: Vec<Value>) -> Self {
        MethodCall { invoking_id, method_id, args, status: MethodStatus::Success }
    }
}

/// `{values, status}`, as returned by the peripheral.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodResult {
    pub values: Vec<Value>,
    pub status: MethodStatus,
}

impl MethodResult {
    pub fn into_result(self, method: &'static str) -> Result<Vec<Value>> {
        if self.status.is_success() {
            Ok(self.values)
        } else {
            Err(status_to_error(method, self.status))
        }
    }
}

fn status_triplet(status: MethodStatus) -> Value {
    Value::List(vec![Value::from_u64(status.to_code() as u64), Value::from_u64(0), Value::from_u64(0)])
}

fn status_from_triplet(value: &Value) -> Result<MethodStatus> {
    let items = value.as_list()?;
    let code = items
        .first()
        .ok_or_else(|| Error::format("status triplet missing status code"))?
        .as_u64()?;
    Ok(MethodStatus::from_code(code as u8))
}

/// Serializes a `MethodCall` to the List shape
/// `[CALL, bytes(invokingId), bytes(methodId), [args...], END_OF_DATA, [status, 0, 0]]`.
pub fn method_call_to_value(call: &MethodCall) -> Value {
    Value::List(vec![
        Value::Command(Command::Call),
        Value::bytes(call.invoking_id.to_be_bytes().to_vec()),
        Value::bytes(call.method_id.to_be_bytes().to_vec()),
        Value::List(call.args.clone()),
        Value::Command(Command::EndOfData),
        status_triplet(call.status),
    ])
}

/// The inverse of `method_call_to_value`.
pub fn method_call_from_value(value: &Value) -> Result<MethodCall> {
    let items = value.as_list()?;
    if items.len() != 6 {
        return Err(Error::format("MethodCall list must have exactly 6 elements"));
    }
    if items[0] != Value::Command(Command::Call) {
        return Err(Error::format("MethodCall must begin with CALL"));
    }
    if items[4] != Value::Command(Command::EndOfData) {
        return Err(Error::format("MethodCall must end args with END_OF_DATA"));
    }
    let invoking_id = Uid::from_be_slice(items[1].as_bytes()?)?;
    let method_id = Uid::from_be_slice(items[2].as_bytes()?)?;
    let args = items[3].as_list()?.to_vec();
    let status = status_from_triplet(&items[5])?;
    Ok(MethodCall { invoking_id, method_id, args, status })
}

/// Serializes a `MethodResult` to `[[values...], END_OF_DATA, [status, 0, 0]]`.
pub fn method_result_to_value(result: &MethodResult) -> Value {
    Value::List(vec![
        Value::List(result.values.clone()),
        Value::Command(Command::EndOfData),
        status_triplet(result.status),
    ])
}

/// True when `value` is a CALL-shaped `MethodCall` List whose methodId is
/// `CloseSession` — the shape a peripheral-initiated session close takes on
/// the wire, as opposed to an ordinary `MethodResult`.
pub fn is_peripheral_close_session(value: &Value) -> bool {
    match value.as_list() {
        Ok(items) if items.first() == Some(&Value::Command(Command::Call)) => method_call_from_value(value)
            .map(|call| call.method_id == method_uid::CLOSE_SESSION)
            .unwrap_or(false),
        _ => false,
    }
}

/// The inverse of `method_result_to_value`.
///
/// A peripheral-initiated `CloseSession` arrives shaped like a `MethodCall`
/// (its methodId is `CloseSession`'s UID) rather than a `MethodResult`; per
/// the original implementation this collapses to an empty, failed result so
/// callers uniformly see "the session ended".
pub fn method_result_from_value(value: &Value) -> Result<MethodResult> {
    let items = value.as_list()?;
    if items.first() == Some(&Value::Command(Command::Call)) {
        if let Ok(call) = method_call_from_value(value) {
            if call.method_id == method_uid::CLOSE_SESSION {
                return Ok(MethodResult { values: Vec::new(), status: MethodStatus::Fail });
            }
        }
        return Err(Error::format("unexpected CALL-shaped MethodResult"));
    }
    if items.len() != 3 {
        return Err(Error::format("MethodResult list must have exactly 3 elements"));
    }
    if items[1] != Value::Command(Command::EndOfData) {
        return Err(Error::format("MethodResult must end values with END_OF_DATA"));
    }
    let values = items[0].as_list()?.to_vec();
    let status = status_from_triplet(&items[2])?;
    Ok(MethodResult { values, status })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_call_round_trips() {
        let call = MethodCall {
            invoking_id: Uid::new(0xFF),
            method_id: Uid::new(0xDEADBEEF),
            args: vec![Value::from_u64(1), Value::from_u64(2), Value::from_u64(3)],
            status: MethodStatus::Fail,
        };
        let value = method_call_to_value(&call);
        let decoded = method_call_from_value(&value).unwrap();
        assert_eq!(decoded, call);
    }

    #[test]
    fn method_result_round_trips() {
        let result = MethodResult { values: vec![Value::from_u64(7)], status: MethodStatus::Success };
        let value = method_result_to_value(&result);
        let decoded = method_result_from_value(&value).unwrap();
        assert_eq!(decoded, result);
    }

    #[test]
    fn close_session_call_becomes_failed_empty_result() {
        let call = MethodCall::new(Uid::NULL, method_uid::CLOSE_SESSION, vec![]);
        let value = method_call_to_value(&call);
        let decoded = method_result_from_value(&value).unwrap();
        assert_eq!(decoded.status, MethodStatus::Fail);
        assert!(decoded.values.is_empty());
    }

    #[test]
    fn status_code_round_trips_for_named_variants() {
        for status in [
            MethodStatus::Success,
            MethodStatus::NotAuthorized,
            MethodStatus::SpBusy,
            MethodStatus::SpFailed,
            MethodStatus::SpDisabled,
            MethodStatus::SpFrozen,
            MethodStatus::NoSessionsAvailable,
            MethodStatus::UniquenessConflict,
            MethodStatus::InsufficientSpace,
            MethodStatus::InsufficientRows,
            MethodStatus::InvalidParameter,
            MethodStatus::TPerMalfunction,
            MethodStatus::TransactionFailure,
            MethodStatus::ResponseOverflow,
            MethodStatus::AuthorityLockedOut,
            MethodStatus::Fail,
        ] {
            assert_eq!(MethodStatus::from_code(status.to_code()), status);
        }
    }
}
