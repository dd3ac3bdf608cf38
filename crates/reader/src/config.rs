//! Configuration for the reader service

use std::time::Duration;

use mykad_transport_pcsc::{ConnectStrategy, PcscConfig};

use crate::layout::CardLayout;

/// Configuration for a [`ReaderService`](crate::ReaderService) and the card
/// sessions it runs
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// How the physical reader is selected
    pub strategy: ConnectStrategy,

    /// PC/SC connection options
    pub pcsc: PcscConfig,

    /// Card layout driving retrieval and decoding
    pub layout: CardLayout,

    /// Bounded wait for one command/response exchange
    pub exchange_timeout: Duration,

    /// Bounded wall-clock for one whole session (card present to terminal)
    pub session_timeout: Duration,

    /// Retries per block, applied on timeout only
    pub block_retries: u32,

    /// Interval between presence polls
    pub poll_interval: Duration,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            strategy: ConnectStrategy::FirstAvailable,
            pcsc: PcscConfig::default(),
            layout: CardLayout::jpn_1_0(),
            exchange_timeout: Duration::from_secs(2),
            session_timeout: Duration::from_secs(30),
            block_retries: 2,
            poll_interval: Duration::from_millis(500),
        }
    }
}

impl ReaderConfig {
    /// Create a new default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the reader selection strategy
    pub fn with_strategy(mut self, strategy: ConnectStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set the card layout
    pub fn with_layout(mut self, layout: CardLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Set the per-exchange timeout
    pub const fn with_exchange_timeout(mut self, timeout: Duration) -> Self {
        self.exchange_timeout = timeout;
        self
    }

    /// Set the per-session timeout
    pub const fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    /// Set the per-block retry bound
    pub const fn with_block_retries(mut self, retries: u32) -> Self {
        self.block_retries = retries;
        self
    }

    /// Set the presence poll interval
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}
