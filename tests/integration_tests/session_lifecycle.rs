// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use sedlib::uids::{c_pin, sp, table};

use crate::integration_tests::common::connected_device;

#[tokio::test]
async fn start_session_then_get_msid_returns_seeded_value() {
    let mut device = connected_device().await.expect("device construction");
    device.login(sp::ADMIN, false).await.expect("login to Admin SP");

    let value = device.get_object_column(c_pin::MSID, 3).await.expect("Get(C_PIN::MSID, column=3)");
    assert_eq!(value.as_bytes().expect("MSID PIN is bytes"), b"1234");

    device.end().await.expect("clean session close");
}

#[tokio::test]
async fn get_table_rows_walks_c_pin_to_exhaustion() {
    let mut device = connected_device().await.expect("device construction");
    device.login(sp::ADMIN, false).await.expect("login to Admin SP");

    let mut rows = device.get_table_rows(table::C_PIN);
    let mut seen = Vec::new();
    while let Some(uid) = rows.next().await.expect("Next() over C_PIN") {
        seen.push(uid);
    }
    assert_eq!(seen, vec![c_pin::MSID, c_pin::SID, c_pin::ADMIN1]);
}

#[tokio::test]
async fn set_then_get_round_trips_a_column() {
    let mut device = connected_device().await.expect("device construction");
    device.login(sp::ADMIN, true).await.expect("login to Admin SP for a write session");

    device
        .set_object_column(c_pin::ADMIN1, 3, sedlib::data::Value::bytes(b"new-pin".to_vec()))
        .await
        .expect("Set(C_PIN::Admin1, column=3)");
    let value = device.get_object_column(c_pin::ADMIN1, 3).await.expect("Get(C_PIN::Admin1, column=3)");
    assert_eq!(value.as_bytes().unwrap(), b"new-pin");
}

#[tokio::test]
async fn setting_column_zero_is_not_authorized() {
    let mut device = connected_device().await.expect("device construction");
    device.login(sp::ADMIN, true).await.expect("login to Admin SP");

    let err = device
        .set_object_column(c_pin::MSID, 0, sedlib::data::Value::bytes(vec![0xAA; 8]))
        .await
        .expect_err("setting a row's own UID column must fail");
    assert!(err.to_string().contains("not authorized"));
}
