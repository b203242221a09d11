// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The external block-device transport contract (§6). A concrete
//! `StorageDevice` wraps whatever platform-specific `SECURITY SEND`/`SECURITY
//! RECEIVE` ioctl the host offers (NVMe, SCSI, ATA); that plumbing is
//! deliberately out of this crate's scope.

use crate::error::Result;

/// Security protocols this driver issues requests against.
pub const SECURITY_PROTOCOL_DISCOVERY: u8 = 0x01;

/// A device capable of the TCG `IF-SEND`/`IF-RECV` security protocol
/// primitives. Implementations are expected to be cheap to clone/share (a
/// file descriptor, a handle) since `TrustedPeripheral` holds one for its
/// whole lifetime.
pub trait StorageDevice: Send + Sync {
    /// `IF-SEND`: `SECURITY SEND` with the given protocol and
    /// protocol-specific field (typically a ComID).
    fn security_send(
        &self,
        protocol: u8,
        protocol_specific: [u8; 2],
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// `IF-RECV`: `SECURITY RECEIVE`, filling up to `buf.len()` bytes and
    /// returning the number of bytes actually written.
    fn security_receive(
        &self,
        protocol: u8,
        protocol_specific: [u8; 2],
        buf: &mut [u8],
    ) -> impl std::future::Future<Output = Result<usize>> + Send;
}
