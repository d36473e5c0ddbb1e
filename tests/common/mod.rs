//! Shared fixtures for the integration suites: a mock device and the
//! `Runner` test model.

#![allow(dead_code)]

pub mod mock_device;
pub mod runner;

use std::time::Duration;

use netconf_exec::session::{FramingMode, Session, SessionOptions};

use mock_device::MockDevice;

pub fn test_options() -> SessionOptions {
    SessionOptions {
        reply_timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_secs(5),
        framing: FramingMode::Auto,
    }
}

/// A connected session to a fresh mock device.
pub async fn open_session() -> (Session, MockDevice) {
    let device = MockDevice::new();
    let session = Session::establish(device.transport(), test_options())
        .await
        .expect("hello exchange with mock device");
    (session, device)
}
