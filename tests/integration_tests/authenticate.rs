// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use sedlib::error::Error;
use sedlib::uids::{authority, sp};

use crate::integration_tests::common::connected_device;

#[tokio::test]
async fn authenticate_with_correct_password_succeeds() {
    let mut device = connected_device().await.expect("device construction");
    device.login(sp::ADMIN, false).await.expect("login to Admin SP");

    let ok = device
        .authenticate(authority::SID, Some(b"sedpassword9"))
        .await
        .expect("Authenticate(SID, correct password)");
    assert!(ok);
}

#[tokio::test]
async fn authenticate_with_wrong_password_raises_password_error() {
    let mut device = connected_device().await.expect("device construction");
    device.login(sp::ADMIN, false).await.expect("login to Admin SP");

    let err = device.authenticate(authority::SID, Some(&[0x00])).await.expect_err("wrong password must fail");
    assert!(matches!(err, Error::Password { method: "Authenticate" }));
}
