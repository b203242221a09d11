// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! An in-memory TPer simulator: a `StorageDevice` that answers Level-0
//! Discovery, the setup channel, and the main RPC stream against a small
//! seeded object model, entirely in-process. Grounded in the shape of the
//! original implementation's MockSession/MockDevice (an in-process peer
//! that understands the same wire protocol), reimplemented against this
//! crate's own codec rather than translated from it.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use crate::data::{decode_token_stream, detokenize, encode_token, surround_with_list, tokenize, unsurround_with_list, Command, Value};
use crate::discovery::DISCOVERY_HEADER_LEN;
use crate::error::{Error, Result};
use crate::method::{method_call_from_value, method_result_to_value, MethodCall, MethodResult, MethodStatus};
use crate::packet;
use crate::setup;
use crate::transport::{StorageDevice, SECURITY_PROTOCOL_DISCOVERY};
use crate::uid::Uid;
use crate::uids::{authority, c_pin, method as method_uid, sp, table, SESSION_MANAGER};

const MOCK_COM_ID: u16 = 0x0481;

#[derive(Debug, Clone, Copy)]
struct SessionEntry {
    #[allow(dead_code)]
    sp: Uid,
    #[allow(dead_code)]
    write: bool,
}

struct Inner {
    objects: BTreeMap<Uid, BTreeMap<u32, Value>>,
    tables: BTreeMap<Uid, Vec<Uid>>,
    credentials: BTreeMap<Uid, Vec<u8>>,
    sessions: BTreeMap<(u32, u32), SessionEntry>,
    next_tsn: u32,
    main_channel: VecDeque<Vec<u8>>,
    setup_channel: VecDeque<Vec<u8>>,
    fail_next_stack_reset: bool,
}

impl Inner {
    fn seeded() -> Self {
        let mut objects = BTreeMap::new();
        let mut tables: BTreeMap<Uid, Vec<Uid>> = BTreeMap::new();

        let mut msid = BTreeMap::new();
        msid.insert(0, Value::bytes(c_pin::MSID.to_be_bytes().to_vec()));
        msid.insert(3, Value::bytes(b"1234".to_vec()));
        objects.insert(c_pin::MSID, msid);

        let mut sid_row = BTreeMap::new();
        sid_row.insert(0, Value::bytes(c_pin::SID.to_be_bytes().to_vec()));
        sid_row.insert(3, Value::bytes(b"sedpassword9".to_vec()));
        objects.insert(c_pin::SID, sid_row);

        tables.insert(table::C_PIN, vec![c_pin::MSID, c_pin::SID, c_pin::ADMIN1]);
        tables.insert(table::SP, vec![sp::ADMIN, sp::LOCKING]);

        let mut credentials = BTreeMap::new();
        credentials.insert(authority::SID, b"sedpassword9".to_vec());

        Inner {
            objects,
            tables,
            credentials,
            sessions: BTreeMap::new(),
            next_tsn: 1,
            main_channel: VecDeque::new(),
            setup_channel: VecDeque::new(),
            fail_next_stack_reset: false,
        }
    }

    fn handle_main_send(&mut self, hsn: u32, tsn: u32, data: &[u8]) -> Result<()> {
        if data == [Command::EndOfSession.to_byte()] {
            self.sessions.remove(&(hsn, tsn));
            self.main_channel.push_back(respond(hsn, tsn, data.to_vec()));
            return Ok(());
        }

        let value = decode_value(data)?;
        let call = method_call_from_value(&value)?;
        let result = self.dispatch(hsn, call);
        let payload = encode_value(&method_result_to_value(&result));
        self.main_channel.push_back(respond(hsn, tsn, payload));
        Ok(())
    }

    fn dispatch(&mut self, hsn: u32, call: MethodCall) -> MethodResult {
        if call.invoking_id == SESSION_MANAGER {
            return self.dispatch_session_manager(hsn, call);
        }
        match call.method_id {
            m if m == method_uid::NEXT => self.dispatch_next(call),
            m if m == method_uid::GET => self.dispatch_get(call),
            m if m == method_uid::SET => self.dispatch_set(call),
            m if m == method_uid::GEN_KEY => self.dispatch_gen_key(call),
            m if m == method_uid::AUTHENTICATE => self.dispatch_authenticate(call),
            m if m == method_uid::REVERT => self.dispatch_revert(call),
            m if m == method_uid::ACTIVATE => self.dispatch_activate(call),
            _ => MethodResult { values: vec![], status: MethodStatus::InvalidParameter },
        }
    }

    fn dispatch_session_manager(&mut self, hsn: u32, call: MethodCall) -> MethodResult {
        if call.method_id == method_uid::PROPERTIES {
            return MethodResult { values: vec![], status: MethodStatus::Success };
        }
        if call.method_id == method_uid::START_SESSION {
            let sp_uid = call
                .args
                .get(1)
                .and_then(|v| v.as_bytes().ok())
                .and_then(|b| Uid::from_be_slice(b).ok())
                .unwrap_or(Uid::NULL);
            let write = call.args.get(2).and_then(|v| v.as_u64().ok()).unwrap_or(0) != 0;
            let tsn = self.next_tsn;
            self.next_tsn += 1;
            self.sessions.insert((hsn, tsn), SessionEntry { sp: sp_uid, write });
            return MethodResult { values: vec![Value::from_u64(hsn as u64), Value::from_u64(tsn as u64)], status: MethodStatus::Success };
        }
        MethodResult { values: vec![], status: MethodStatus::InvalidParameter }
    }

    fn dispatch_next(&mut self, call: MethodCall) -> MethodResult {
        let rows = self.tables.get(&call.invoking_id).cloned().unwrap_or_default();
        let last = call
            .args
            .first()
            .and_then(|v| v.as_named().ok())
            .and_then(|(_, value)| value.as_bytes().ok())
            .and_then(|bytes| Uid::from_be_slice(bytes).ok());

        let next = match last {
            None => rows.first().copied(),
            Some(last_uid) => rows.iter().position(|row| *row == last_uid).and_then(|i| rows.get(i + 1).copied()),
        };
        let result = match next {
            Some(uid) => vec![Value::bytes(uid.to_be_bytes().to_vec())],
            None => vec![],
        };
        MethodResult { values: vec![Value::List(result)], status: MethodStatus::Success }
    }

    fn dispatch_get(&mut self, call: MethodCall) -> MethodResult {
        let Some(columns) = self.objects.get(&call.invoking_id) else {
            return MethodResult { values: vec![], status: MethodStatus::InvalidParameter };
        };
        let (start, end) = cell_block_range(call.args.first());
        let rows: Vec<Value> = columns
            .iter()
            .filter(|(column, _)| start.map_or(true, |s| **column >= s) && end.map_or(true, |e| **column <= e))
            .map(|(column, value)| Value::named(Value::from_u64(*column as u64), value.clone()))
            .collect();
        MethodResult { values: vec![Value::List(rows)], status: MethodStatus::Success }
    }

    fn dispatch_set(&mut self, call: MethodCall) -> MethodResult {
        let Some(named) = call.args.first().and_then(|v| v.as_named().ok()) else {
            return MethodResult { values: vec![], status: MethodStatus::InvalidParameter };
        };
        let Ok(entries) = named.1.as_list() else {
            return MethodResult { values: vec![], status: MethodStatus::InvalidParameter };
        };

        for entry in entries {
            let Ok((name, value)) = entry.as_named() else { continue };
            let Ok(column) = name.as_u64() else { continue };
            if column == 0 {
                return MethodResult { values: vec![], status: MethodStatus::NotAuthorized };
            }
            self.objects.entry(call.invoking_id).or_default().insert(column as u32, value.clone());
        }
        MethodResult { values: vec![], status: MethodStatus::Success }
    }

    fn dispatch_gen_key(&mut self, call: MethodCall) -> MethodResult {
        self.objects.entry(call.invoking_id).or_default().insert(1, Value::bytes(b"generated-key".to_vec()));
        MethodResult { values: vec![], status: MethodStatus::Success }
    }

    fn dispatch_authenticate(&mut self, call: MethodCall) -> MethodResult {
        let challenge = call.args.iter().find_map(|v| v.as_named().ok()).and_then(|(_, value)| value.as_bytes().ok());
        let ok = match (self.credentials.get(&call.invoking_id), challenge) {
            (Some(expected), Some(got)) => expected.as_slice() == got,
            (None, _) => true,
            _ => false,
        };
        MethodResult { values: vec![Value::from_u64(ok as u64)], status: MethodStatus::Success }
    }

    fn dispatch_revert(&mut self, _call: MethodCall) -> MethodResult {
        MethodResult { values: vec![], status: MethodStatus::Success }
    }

    fn dispatch_activate(&mut self, _call: MethodCall) -> MethodResult {
        MethodResult { values: vec![], status: MethodStatus::Success }
    }
}

fn cell_block_range(arg: Option<&Value>) -> (Option<u32>, Option<u32>) {
    let Some(Value::List(entries)) = arg else { return (None, None) };
    let mut start = None;
    let mut end = None;
    for entry in entries {
        if let Ok((name, value)) = entry.as_named() {
            if let (Ok(key), Ok(v)) = (name.as_u64(), value.as_u64()) {
                match key {
                    2 => start = Some(v as u32),
                    3 => end = Some(v as u32),
                    _ => {},
                }
            }
        }
    }
    (start, end)
}

fn respond(hsn: u32, tsn: u32, payload: Vec<u8>) -> Vec<u8> {
    packet::build_com_packet(MOCK_COM_ID, 0, hsn, tsn, &payload)
}

fn encode_value(value: &Value) -> Vec<u8> {
    let tokens = unsurround_with_list(tokenize(value));
    let mut out = Vec::new();
    for token in &tokens {
        out.extend(encode_token(token));
    }
    out
}

fn decode_value(data: &[u8]) -> Result<Value> {
    let tokens = decode_token_stream(data)?;
    let (value, rest) = detokenize(&surround_with_list(tokens))?;
    if !rest.is_empty() {
        return Err(Error::protocol("trailing bytes in mock main-channel frame"));
    }
    Ok(value)
}

fn feature(code: u16, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![(code >> 8) as u8, code as u8, 0x10, payload.len() as u8];
    out.extend_from_slice(payload);
    out
}

fn build_discovery_response() -> Vec<u8> {
    let mut body = vec![0u8; DISCOVERY_HEADER_LEN];
    body.extend(feature(0x0001, &[0x01]));
    body.extend(feature(0x0002, &[0x03]));
    let opal_payload = [(MOCK_COM_ID >> 8) as u8, MOCK_COM_ID as u8, 0x00, 0x01];
    body.extend(feature(0x0203, &opal_payload));
    body
}

fn build_verify_response(com_id: u16, com_id_ext: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(46);
    out.extend_from_slice(&com_id.to_be_bytes());
    out.extend_from_slice(&com_id_ext.to_be_bytes());
    out.extend_from_slice(&1u32.to_be_bytes());
    out.extend_from_slice(&[0, 0]);
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&3u32.to_be_bytes()); // ComIdState::Associated
    out.extend(std::iter::repeat_n(0u8, 30));
    out
}

fn build_stack_reset_response(com_id: u16, com_id_ext: u16, fail: bool) -> Vec<u8> {
    let mut out = Vec::with_capacity(16);
    out.extend_from_slice(&com_id.to_be_bytes());
    out.extend_from_slice(&com_id_ext.to_be_bytes());
    out.extend_from_slice(&2u32.to_be_bytes());
    out.extend_from_slice(&[0, 0]);
    out.extend_from_slice(&0u16.to_be_bytes());
    out.extend_from_slice(&(fail as u32).to_be_bytes());
    out
}

/// An in-memory TPer, seeded with an Admin SP (`C_PIN::MSID = "1234"`,
/// `C_PIN::SID` authenticated by the `authority::SID` password) and a
/// Locking SP. All state lives behind a single mutex; every request is
/// answered synchronously inside `security_send`, so `security_receive`
/// never actually has to poll.
pub struct MockDevice(Mutex<Inner>);

impl MockDevice {
    pub fn new() -> Self {
        MockDevice(Mutex::new(Inner::seeded()))
    }

    /// Makes the next `StackReset` report `FAILURE` instead of `SUCCESS`.
    pub fn fail_next_stack_reset(&self) {
        self.0.lock().expect("mock device mutex poisoned").fail_next_stack_reset = true;
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageDevice for MockDevice {
    async fn security_send(&self, protocol: u8, protocol_specific: [u8; 2], data: &[u8]) -> Result<()> {
        let mut inner = self.0.lock().expect("mock device mutex poisoned");
        match protocol {
            setup::SECURITY_PROTOCOL_SETUP => {
                if data.len() < 8 {
                    return Err(Error::protocol("setup-channel request shorter than its 8-byte header"));
                }
                let com_id = u16::from_be_bytes([data[0], data[1]]);
                let com_id_ext = u16::from_be_bytes([data[2], data[3]]);
                let request_code = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
                let response = if request_code == 0x0000_0001 {
                    build_verify_response(com_id, com_id_ext)
                } else {
                    let fail = inner.fail_next_stack_reset;
                    inner.fail_next_stack_reset = false;
                    build_stack_reset_response(com_id, com_id_ext, fail)
                };
                inner.setup_channel.push_back(response);
                Ok(())
            },
            0x01 if u16::from_be_bytes([protocol_specific[1], protocol_specific[0]]) != 0x0001 => {
                let parsed = packet::parse_com_packet(data)?;
                inner.handle_main_send(parsed.hsn, parsed.tsn, &parsed.data)
            },
            _ => Ok(()),
        }
    }

    async fn security_receive(&self, protocol: u8, protocol_specific: [u8; 2], buf: &mut [u8]) -> Result<usize> {
        let com_id = u16::from_be_bytes([protocol_specific[1], protocol_specific[0]]);
        let mut inner = self.0.lock().expect("mock device mutex poisoned");
        let bytes = match protocol {
            SECURITY_PROTOCOL_DISCOVERY if com_id == 0x0001 => build_discovery_response(),
            setup::SECURITY_PROTOCOL_SETUP => inner.setup_channel.pop_front().unwrap_or_default(),
            0x01 => inner.main_channel.pop_front().unwrap_or_else(|| packet::build_com_packet(MOCK_COM_ID, 0, 0, 0, &[])),
            _ => Vec::new(),
        };
        let len = bytes.len().min(buf.len());
        buf[..len].copy_from_slice(&bytes[..len]);
        Ok(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discovery_response_advertises_opal_v2_at_the_mock_com_id() {
        let body = build_discovery_response();
        let desc = crate::discovery::parse_tper_desc(&body).unwrap();
        assert_eq!(desc.sscs[0].base_com_id, MOCK_COM_ID);
    }

    #[test]
    fn verify_response_round_trips_through_setup_parser() {
        let bytes = build_verify_response(MOCK_COM_ID, 0);
        let parsed = setup::parse_verify_com_id_valid_response(&bytes).unwrap();
        assert_eq!(parsed.com_id, MOCK_COM_ID);
    }
}
