// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Level-0 Discovery (C5): parses the security-protocol `0x01`,
//! protocol-specific `0x0001` response into typed feature descriptors.

use bitflags::bitflags;

use crate::error::{Error, Result};

pub const DISCOVERY_HEADER_LEN: usize = 48;

bitflags! {
    /// Capability bits of the TPer (`0x0001`) feature descriptor's first
    /// payload byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TPerFlags: u8 {
        const SYNC               = 0x01;
        const ASYNC              = 0x02;
        const ACK_NAK            = 0x04;
        const BUFFER_MGMT        = 0x08;
        const STREAMING          = 0x10;
        const COM_ID_MANAGEMENT  = 0x40;
    }
}

bitflags! {
    /// State bits of the Locking (`0x0002`) feature descriptor's first
    /// payload byte.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LockingFlags: u8 {
        const LOCKING_SUPPORTED = 0x01;
        const LOCKING_ENABLED   = 0x02;
        const LOCKED            = 0x04;
        const MEDIA_ENCRYPTION  = 0x08;
        const MBR_ENABLED       = 0x10;
        const MBR_DONE          = 0x20;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TPerDescriptor {
    pub flags: TPerFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockingDescriptor {
    pub flags: LockingFlags,
}

/// The subset of SSC feature descriptors this driver recognizes. Each of
/// these is advertised alongside a `{baseComID, numComIDs}` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SscKind {
    Enterprise,
    OpalV1,
    OpalV2,
    Opalite,
    PyriteV1,
    PyriteV2,
    Ruby,
    KeyPerIo,
}

impl SscKind {
    fn from_feature_code(code: u16) -> Option<Self> {
        Some(match code {
            0x0100 => SscKind::Enterprise,
            0x0200 => SscKind::OpalV1,
            0x0203 => SscKind::OpalV2,
            0x0301 => SscKind::Opalite,
            0x0302 => SscKind::PyriteV1,
            0x0303 => SscKind::PyriteV2,
            0x0304 => SscKind::Ruby,
            0x0305 => SscKind::KeyPerIo,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SscDescriptor {
    pub kind: SscKind,
    pub base_com_id: u16,
    pub num_com_ids: u16,
}

/// An unrecognized feature descriptor, kept verbatim rather than dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFeatureDescriptor {
    pub feature_code: u16,
    pub version: u8,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TPerDesc {
    pub tper: Option<TPerDescriptor>,
    pub locking: Option<LockingDescriptor>,
    pub sscs: Vec<SscDescriptor>,
    pub unknown: Vec<RawFeatureDescriptor>,
}

impl TPerDesc {
    /// The first SSC descriptor matching `preferred`, if present; otherwise
    /// the first SSC descriptor discovered at all.
    pub fn choose_ssc(&self, preferred: Option<SscKind>) -> Option<&SscDescriptor> {
        if let Some(want) = preferred {
            if let Some(found) = self.sscs.iter().find(|d| d.kind == want) {
                return Some(found);
            }
        }
        self.sscs.first()
    }
}

/// Parses a Level-0 Discovery response body (48-byte header followed by a
/// sequence of `{featureCode(2), version(1), length(1), payload(length)}`
/// descriptors).
pub fn parse_tper_desc(bytes: &[u8]) -> Result<TPerDesc> {
    if bytes.len() < DISCOVERY_HEADER_LEN {
        return Err(Error::protocol("Level-0 Discovery response shorter than its 48-byte header"));
    }
    let mut desc = TPerDesc::default();
    let mut cursor = &bytes[DISCOVERY_HEADER_LEN..];

    while !cursor.is_empty() {
        if cursor.len() < 4 {
            return Err(Error::protocol("truncated feature descriptor header"));
        }
        let feature_code = u16::from_be_bytes([cursor[0], cursor[1]]);
        let version = cursor[2] >> 4;
        let length = cursor[3] as usize;
        if cursor.len() < 4 + length {
            return Err(Error::protocol("feature descriptor payload shorter than declared length"));
        }
        let payload = &cursor[4..4 + length];

        match feature_code {
            0x0001 => {
                let flags = TPerFlags::from_bits_truncate(payload.first().copied().unwrap_or(0));
                desc.tper = Some(TPerDescriptor { flags });
            },
            0x0002 => {
                let flags = LockingFlags::from_bits_truncate(payload.first().copied().unwrap_or(0));
                desc.locking = Some(LockingDescriptor { flags });
            },
            code => {
                if let Some(kind) = SscKind::from_feature_code(code) {
                    if payload.len() < 4 {
                        return Err(Error::protocol("SSC descriptor missing {baseComID, numComIDs}"));
                    }
                    let base_com_id = u16::from_be_bytes([payload[0], payload[1]]);
                    let num_com_ids = u16::from_be_bytes([payload[2], payload[3]]);
                    desc.sscs.push(SscDescriptor { kind, base_com_id, num_com_ids });
                } else {
                    desc.unknown.push(RawFeatureDescriptor { feature_code, version, payload: payload.to_vec() });
                }
            },
        }

        cursor = &cursor[4 + length..];
    }

    Ok(desc)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(code: u16, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![(code >> 8) as u8, code as u8, 0x10, payload.len() as u8];
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn parses_tper_locking_and_opal_v2_descriptors() {
        let mut body = vec![0u8; DISCOVERY_HEADER_LEN];
        body.extend(feature(0x0001, &[0x01]));
        body.extend(feature(0x0002, &[0x03]));
        body.extend(feature(0x0203, &[0x04, 0x81, 0x00, 0x01]));

        let desc = parse_tper_desc(&body).unwrap();
        assert_eq!(desc.tper.unwrap().flags, TPerFlags::SYNC);
        assert_eq!(desc.locking.unwrap().flags, LockingFlags::LOCKING_SUPPORTED | LockingFlags::LOCKING_ENABLED);
        assert_eq!(desc.sscs.len(), 1);
        assert_eq!(desc.sscs[0].kind, SscKind::OpalV2);
        assert_eq!(desc.sscs[0].base_com_id, 0x0481);
        assert_eq!(desc.sscs[0].num_com_ids, 1);
    }

    #[test]
    fn unknown_feature_code_is_kept_not_dropped() {
        let mut body = vec![0u8; DISCOVERY_HEADER_LEN];
        body.extend(feature(0xBEEF, &[0xAA, 0xBB]));
        let desc = parse_tper_desc(&body).unwrap();
        assert_eq!(desc.unknown.len(), 1);
        assert_eq!(desc.unknown[0].feature_code, 0xBEEF);
        assert_eq!(desc.unknown[0].payload, vec![0xAA, 0xBB]);
    }

    #[test]
    fn choose_ssc_prefers_requested_kind_when_present() {
        let desc = TPerDesc {
            sscs: vec![
                SscDescriptor { kind: SscKind::OpalV2, base_com_id: 1, num_com_ids: 1 },
                SscDescriptor { kind: SscKind::PyriteV2, base_com_id: 2, num_com_ids: 1 },
            ],
            ..Default::default()
        };
        assert_eq!(desc.choose_ssc(Some(SscKind::PyriteV2)).unwrap().base_com_id, 2);
        assert_eq!(desc.choose_ssc(Some(SscKind::Ruby)).unwrap().base_com_id, 1);
        assert_eq!(desc.choose_ssc(None).unwrap().base_com_id, 1);
    }

    #[test]
    fn rejects_truncated_header() {
        assert!(parse_tper_desc(&[0u8; 10]).is_err());
    }
}
