// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use sedlib::uid::{parse_uid, Uid};

#[test]
fn parses_and_renders_canonical_hex_form() {
    let uid = parse_uid("0000'000B'0000'8402").expect("valid canonical UID string");
    assert_eq!(uid, Uid::new(0x0000_000B_0000_8402));
    assert_eq!(uid.to_string(), "0000'000B'0000'8402");
}

#[test]
fn parses_without_apostrophes_too() {
    let uid = parse_uid("0000000B00008402").expect("valid UID string without separators");
    assert_eq!(uid, Uid::new(0x0000_000B_0000_8402));
}

#[test]
fn c_pin_row_uid_names_the_c_pin_table() {
    let row = Uid::new(0x0000_000B_0000_8402);
    assert_eq!(row.containing_table(), Uid::new(0x0000_000B_0000_0000));
}
