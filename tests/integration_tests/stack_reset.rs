// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use sedlib::cfg::config::Config;
use sedlib::device::EncryptedDevice;
use sedlib::mock::MockDevice;
use sedlib::setup::StackResetStatus;

#[tokio::test]
async fn construction_associates_the_com_id() {
    // EncryptedDevice::new runs VerifyComId internally; constructing
    // successfully is itself the assertion that the ComID came back
    // ISSUED or ASSOCIATED rather than INVALID.
    let device = EncryptedDevice::new(MockDevice::new(), &Config::default()).await.expect("device construction");
    drop(device);
}

#[tokio::test]
async fn stack_reset_reports_success_by_default() {
    let device = EncryptedDevice::new(MockDevice::new(), &Config::default()).await.expect("device construction");
    assert_eq!(device.stack_reset().await.expect("StackReset"), StackResetStatus::Success);
}

#[tokio::test]
async fn stack_reset_reports_failure_when_the_peripheral_refuses() {
    let mock = MockDevice::new();
    mock.fail_next_stack_reset();
    let device = EncryptedDevice::new(mock, &Config::default()).await.expect("device construction");
    assert_eq!(device.stack_reset().await.expect("StackReset"), StackResetStatus::Failure);
}
