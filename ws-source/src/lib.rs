// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! WebSocket market-data source: connection, authentication, batched
//! subscriptions, and wire-frame parsing for the options feed.

use std::sync::Once;

pub mod frame;
pub mod worker;

static TLS_PROVIDER_ONCE: Once = Once::new();

pub(crate) fn ensure_tls_provider() {
    TLS_PROVIDER_ONCE.call_once(|| {
        if let Err(err) = rustls::crypto::ring::default_provider().install_default() {
            panic!("failed to install rustls crypto provider: {:?}", err);
        }
    });
}
