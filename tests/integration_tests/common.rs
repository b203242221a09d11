// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use sedlib::cfg::config::Config;
use sedlib::device::EncryptedDevice;
use sedlib::error::Result;
use sedlib::mock::MockDevice;

/// Constructs an `EncryptedDevice` over a freshly seeded `MockDevice`,
/// running Discovery / VerifyComId / Properties the way a real host would.
pub async fn connected_device() -> Result<EncryptedDevice<MockDevice>> {
    EncryptedDevice::new(MockDevice::new(), &Config::default()).await
}
