// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use sedlib::discovery::{parse_tper_desc, SscKind, DISCOVERY_HEADER_LEN};

fn feature(code: u16, payload: &[u8]) -> Vec<u8> {
    let mut out = vec![(code >> 8) as u8, code as u8, 0x10, payload.len() as u8];
    out.extend_from_slice(payload);
    out
}

#[test]
fn discovery_response_with_tper_locking_and_pyrite_v2_parses() {
    let mut body = vec![0u8; DISCOVERY_HEADER_LEN];
    body.extend(feature(0x0001, &[0x01]));
    body.extend(feature(0x0002, &[0x01]));
    body.extend(feature(0x0303, &[0x04, 0x82, 0x00, 0x01]));

    let desc = parse_tper_desc(&body).expect("valid Level-0 Discovery fixture");
    assert!(desc.tper.is_some());
    assert!(desc.locking.is_some());
    assert_eq!(desc.choose_ssc(None).unwrap().kind, SscKind::PyriteV2);
    assert_eq!(desc.choose_ssc(None).unwrap().base_com_id, 0x0482);
}
