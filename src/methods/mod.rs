// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Typed Core/Opal method wrappers (C8): `Next`, `Get`, `Set`, `GenKey`,
//! `Authenticate`, `Revert`, `Activate`. Each builds a `MethodCall` via the
//! session's `call()` dispatch and interprets the returned values.

use std::collections::BTreeMap;

use crate::data::Value;
use crate::error::{Error, Result};
use crate::session::Session;
use crate::transport::StorageDevice;
use crate::uid::Uid;
use crate::uids::method;

/// `Next(table, lastRowUid?) -> Option<UID>`. The peripheral's result is a
/// list of row UIDs (empty once the cursor is exhausted); this wrapper
/// takes the first entry and returns `None` when the list is empty.
pub async fn next<D: StorageDevice>(session: &mut Session<D>, table: Uid, last_row_uid: Option<Uid>) -> Result<Option<Uid>> {
    let mut args = Vec::new();
    if let Some(last) = last_row_uid {
        args.push(Value::named(Value::from_u64(0), Value::bytes(last.to_be_bytes().to_vec())));
    }
    let values = session.call(table, method::NEXT, args).await?;
    let rows = values.first().ok_or_else(|| Error::format("Next returned no values"))?.as_list()?;
    let Some(first) = rows.first() else { return Ok(None) };
    let uid = Uid::from_be_slice(first.as_bytes()?)?;
    Ok(if uid.is_null() { None } else { Some(uid) })
}

/// Returned by the range form of `Get`: present columns indexed by column
/// number. Columns absent from the response are simply not keys here.
pub type ColumnValues = BTreeMap<u32, Value>;

fn cell_block(start_column: Option<u32>, end_column: Option<u32>) -> Value {
    let mut entries = Vec::new();
    if let Some(start) = start_column {
        entries.push(Value::named(Value::from_u64(2), Value::from_u64(start as u64)));
    }
    if let Some(end) = end_column {
        entries.push(Value::named(Value::from_u64(3), Value::from_u64(end as u64)));
    }
    Value::List(entries)
}

/// `Get(object, startCol?, endCol?) -> map<column, Value>`. Columns absent
/// from the peripheral's response are simply not present in the returned
/// map.
pub async fn get<D: StorageDevice>(
    session: &mut Session<D>,
    object: Uid,
    start_col: Option<u32>,
    end_col: Option<u32>,
) -> Result<ColumnValues> {
    let args = vec![cell_block(start_col, end_col)];
    let values = session.call(object, method::GET, args).await?;
    let rows = values.first().ok_or_else(|| Error::format("Get returned no values"))?.as_list()?;

    let mut columns = ColumnValues::new();
    for row in rows {
        let (name, value) = row.as_named()?;
        let column = name.as_u64()? as u32;
        columns.insert(column, value.clone());
    }
    Ok(columns)
}

/// Single-column convenience form of `Get`.
pub async fn get_column<D: StorageDevice>(session: &mut Session<D>, object: Uid, column: u32) -> Result<Value> {
    let mut columns = get(session, object, Some(column), Some(column)).await?;
    columns
        .remove(&column)
        .ok_or_else(|| Error::format(format!("column {column} not present in Get response")))
}

/// `Set(object, column, value)`. Setting column 0 (the row's own UID)
/// fails with `NOT_AUTHORIZED` at the peripheral.
pub async fn set_column<D: StorageDevice>(session: &mut Session<D>, object: Uid, column: u32, value: Value) -> Result<()> {
    let values = Value::List(vec![Value::named(Value::from_u64(column as u64), value)]);
    let args = vec![Value::named(Value::from_u64(1), values)];
    session.call(object, method::SET, args).await?;
    Ok(())
}

/// `GenKey(object, publicExponent?, pinLength?)`, regenerating the
/// media-encryption key or credential backing `object`. `pin_length` is the
/// `PinLength` optional (named key 1); `publicExponent` (named key 0) is
/// never sent since this driver only targets symmetric SED credentials.
pub async fn gen_key<D: StorageDevice>(session: &mut Session<D>, object: Uid, pin_length: Option<u32>) -> Result<()> {
    let mut args = Vec::new();
    if let Some(length) = pin_length {
        args.push(Value::named(Value::from_u64(1), Value::from_u64(length as u64)));
    }
    session.call(object, method::GEN_KEY, args).await?;
    Ok(())
}

/// `Authenticate(authorityUid, challenge?) -> bool`. Returns `false` for a
/// soft password mismatch; protocol-level failures raise.
pub async fn authenticate<D: StorageDevice>(
    session: &mut Session<D>,
    authority_uid: Uid,
    challenge: Option<&[u8]>,
) -> Result<bool> {
    let mut args = vec![Value::bytes(authority_uid.to_be_bytes().to_vec())];
    if let Some(challenge) = challenge {
        args.push(Value::named(Value::from_u64(0), Value::bytes(challenge.to_vec())));
    }
    let values = session.call(authority_uid, method::AUTHENTICATE, args).await?;
    match values.first() {
        Some(v) => Ok(v.as_u64()? != 0),
        None => Ok(false),
    }
}

/// Opal SSC `Revert(sp)` — reverts the named SP to factory defaults.
pub async fn revert<D: StorageDevice>(session: &mut Session<D>, sp: Uid) -> Result<()> {
    session.call(sp, method::REVERT, vec![]).await?;
    Ok(())
}

/// Opal SSC `Activate(sp)` — activates the named SP (typically the
/// Locking SP).
pub async fn activate<D: StorageDevice>(session: &mut Session<D>, sp: Uid) -> Result<()> {
    session.call(sp, method::ACTIVATE, vec![]).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_block_omits_unset_optionals() {
        assert_eq!(cell_block(None, None), Value::List(vec![]));
        match cell_block(Some(0), Some(3)) {
            Value::List(entries) => assert_eq!(entries.len(), 2),
            other => panic!("expected list, got {other:?}"),
        }
    }
}
