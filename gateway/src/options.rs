use ledger_protocol::DeliveryMode;

/// How a peer connection registers for block events.
///
/// A gateway fixes this once at connect time and hands the same value to
/// every peer connection it creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PeerConnectionOptions {
    delivery: DeliveryMode,
}

impl PeerConnectionOptions {
    pub fn new(delivery: DeliveryMode) -> Self {
        Self { delivery }
    }

    pub fn filtered_blocks() -> Self {
        Self::new(DeliveryMode::Filtered)
    }

    pub fn full_blocks() -> Self {
        Self::new(DeliveryMode::Full)
    }

    pub fn delivery_mode(&self) -> DeliveryMode {
        self.delivery
    }

    pub fn registers_filtered_blocks(&self) -> bool {
        self.delivery.is_filtered()
    }
}
