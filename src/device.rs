// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! `EncryptedDevice` (C10): the single-session convenience façade over
//! `TrustedPeripheral` + `Session`. Construction runs
//! `TrustedPeripheral::new -> VerifyComId -> SessionManager::Properties`.

use std::sync::Arc;

use tracing::warn;

use crate::cfg::config::Config;
use crate::data::Value;
use crate::error::{Error, Result};
use crate::methods;
use crate::peripheral::TrustedPeripheral;
use crate::session::Session;
use crate::session_manager::{self, HostProperties};
use crate::setup::{ComIdState, StackResetStatus};
use crate::transport::StorageDevice;
use crate::uid::Uid;
use crate::uids::table;

/// A lazily-pulled, finite, non-restartable sequence of row UIDs, bound to
/// the session it was produced from.
pub struct RowStream<'d, D: StorageDevice> {
    device: &'d mut EncryptedDevice<D>,
    table: Uid,
    last: Option<Uid>,
    single_row: Option<Uid>,
    exhausted: bool,
}

impl<'d, D: StorageDevice> RowStream<'d, D> {
    /// Pulls the next row UID, or `None` once the cursor is exhausted.
    pub async fn next(&mut self) -> Result<Option<Uid>> {
        if self.exhausted {
            return Ok(None);
        }
        if let Some(row) = self.single_row.take() {
            self.exhausted = true;
            return Ok(Some(row));
        }
        let session = self.device.active_session_mut()?;
        match methods::next(session, self.table, self.last).await? {
            Some(uid) => {
                self.last = Some(uid);
                Ok(Some(uid))
            },
            None => {
                self.exhausted = true;
                Ok(None)
            },
        }
    }
}

/// A lazily-pulled sequence of `(column, Value)` pairs over one object,
/// ordered by the table's `ColumnDesc` layout.
pub struct ColumnStream<'d, D: StorageDevice> {
    device: &'d mut EncryptedDevice<D>,
    object: Uid,
    cursor: Option<std::collections::btree_map::IntoIter<u32, Value>>,
}

impl<'d, D: StorageDevice> ColumnStream<'d, D> {
    pub async fn next(&mut self) -> Result<Option<(u32, Value)>> {
        if self.cursor.is_none() {
            let session = self.device.active_session_mut()?;
            let columns = methods::get(session, self.object, None, None).await?;
            self.cursor = Some(columns.into_iter());
        }
        Ok(self.cursor.as_mut().and_then(|c| c.next()))
    }
}

/// The single-session convenience façade. Owns the shared `TrustedPeripheral`
/// handle and, once logged in, the `Session` built over it.
pub struct EncryptedDevice<D: StorageDevice> {
    peripheral: Arc<TrustedPeripheral<D>>,
    session: Option<Session<D>>,
    next_hsn: u32,
}

impl<D: StorageDevice> EncryptedDevice<D> {
    /// Runs Discovery (inside `TrustedPeripheral::new`), `VerifyComId`, and
    /// `SessionManager::Properties` with this driver's fixed profile.
    pub async fn new(device: D, config: &Config) -> Result<Self> {
        let peripheral = TrustedPeripheral::new(device, config).await?;
        let cancel = tokio_util::sync::CancellationToken::new();

        let state = peripheral.verify_com_id().await?;
        if !matches!(state, ComIdState::Issued | ComIdState::Associated) {
            return Err(Error::device(format!("ComID is not usable after allocation: {state:?}")));
        }

        session_manager::properties(&peripheral, HostProperties::default(), &cancel).await?;

        Ok(EncryptedDevice { peripheral: Arc::new(peripheral), session: None, next_hsn: 1 })
    }

    fn active_session_mut(&mut self) -> Result<&mut Session<D>> {
        self.session
            .as_mut()
            .ok_or_else(|| Error::Logic("operation requires an active session; call Login() first".to_string()))
    }

    /// Starts a session against `sp_uid`, ending any prior session first.
    pub async fn login(&mut self, sp_uid: Uid, write: bool) -> Result<()> {
        if self.session.is_some() {
            self.end().await?;
        }
        let mut session = Session::new(Arc::clone(&self.peripheral));
        let hsn = self.next_hsn;
        self.next_hsn = self.next_hsn.wrapping_add(1);
        session.login(hsn, sp_uid, write, None, None).await?;
        self.session = Some(session);
        Ok(())
    }

    /// `Authenticate(authorityUid, password?) -> bool` against the active
    /// session.
    pub async fn authenticate(&mut self, authority_uid: Uid, password: Option<&[u8]>) -> Result<bool> {
        let session = self.active_session_mut()?;
        let ok = methods::authenticate(session, authority_uid, password).await?;
        if !ok {
            return Err(Error::Password { method: "Authenticate" });
        }
        Ok(ok)
    }

    /// A lazy sequence of row UIDs in `table_uid`: yields `singleRow` once if
    /// the table descriptor names one, otherwise walks `Next` to exhaustion.
    pub fn get_table_rows(&mut self, table_uid: Uid) -> RowStream<'_, D> {
        let single_row = crate::module_collection::modules().find_table(table_uid).and_then(|desc| desc.single_row);
        RowStream { device: self, table: table_uid, last: None, single_row, exhausted: false }
    }

    /// A lazy sequence of `(column, Value)` over `object_uid`, in the table's
    /// `ColumnDesc` order (as returned by the peripheral's `Get`).
    pub fn get_object_columns(&mut self, object_uid: Uid) -> ColumnStream<'_, D> {
        ColumnStream { device: self, object: object_uid, cursor: None }
    }

    pub async fn get_object_column(&mut self, object_uid: Uid, column: u32) -> Result<Value> {
        let session = self.active_session_mut()?;
        methods::get_column(session, object_uid, column).await
    }

    pub async fn set_object_column(&mut self, object_uid: Uid, column: u32, value: Value) -> Result<()> {
        let session = self.active_session_mut()?;
        methods::set_column(session, object_uid, column, value).await
    }

    /// `GenKey(lockingRange)` — regenerates the media-encryption key backing
    /// a locking range object.
    pub async fn gen_mek(&mut self, locking_range: Uid) -> Result<()> {
        let session = self.active_session_mut()?;
        methods::gen_key(session, locking_range, None).await
    }

    /// `GenKey(credObj, publicExponent=absent, pinLength=length)` over a
    /// credential object.
    pub async fn gen_pin(&mut self, cred_obj: Uid, length: Option<u32>) -> Result<()> {
        let session = self.active_session_mut()?;
        methods::gen_key(session, cred_obj, length).await
    }

    /// `Revert(sp)` — reverts the SP to factory defaults. Reverting destroys
    /// the session's context on the peripheral, so the session is ended
    /// immediately afterward.
    pub async fn revert(&mut self, sp: Uid) -> Result<()> {
        let session = self.active_session_mut()?;
        methods::revert(session, sp).await?;
        self.end().await
    }

    pub async fn activate(&mut self, sp: Uid) -> Result<()> {
        let session = self.active_session_mut()?;
        methods::activate(session, sp).await
    }

    /// Ends the active session, if any. A no-op if no session is open.
    pub async fn end(&mut self) -> Result<()> {
        if let Some(mut session) = self.session.take() {
            session.end().await?;
        }
        Ok(())
    }

    pub async fn stack_reset(&self) -> Result<StackResetStatus> {
        self.peripheral.stack_reset().await
    }

    /// Aborts all local session/peripheral state without touching the
    /// peripheral; the caller must rediscover and reopen.
    pub fn reset(&mut self) {
        self.session = None;
    }

    /// Ends any active session and releases the device handle. Prefer this
    /// over relying on `Drop` since it can report the `EndSession` failure;
    /// `Drop` can only log one.
    pub async fn shutdown(mut self) -> Result<()> {
        self.end().await
    }
}

impl<D: StorageDevice> Drop for EncryptedDevice<D> {
    fn drop(&mut self) {
        if let Some(session) = &self.session {
            if session.state() == crate::session::SessionState::Active {
                warn!("EncryptedDevice dropped with an Active session; call shutdown() for a clean close");
            }
        }
    }
}

/// Resolves `table_uid` to its row-UID stream: convenience re-export of the
/// Core Specification's `Table` table UID, used by callers enumerating
/// tables themselves.
pub const TABLE_OF_TABLES: Uid = table::TABLE;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_of_tables_is_the_well_known_table_uid() {
        assert_eq!(TABLE_OF_TABLES, table::TABLE);
    }
}
