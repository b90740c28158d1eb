use serde::{Deserialize, Serialize};

/// Read-only snapshot of bridge health
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeStatus {
    /// Events waiting to be flushed
    pub queue_size: usize,
    /// A flush is in flight
    pub processing: bool,
    pub upstream_connected: bool,
    pub downstream_connected: bool,
}

impl BridgeStatus {
    /// Both sides of the bridge are up
    pub fn is_healthy(&self) -> bool {
        self.upstream_connected && self.downstream_connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_healthy_requires_both_sides() {
        let mut status = BridgeStatus::default();
        assert!(!status.is_healthy());

        status.upstream_connected = true;
        assert!(!status.is_healthy());

        status.downstream_connected = true;
        assert!(status.is_healthy());
    }

    #[test]
    fn test_serializes_field_names() {
        let status = BridgeStatus {
            queue_size: 3,
            processing: true,
            upstream_connected: true,
            downstream_connected: false,
        };
        let json = serde_json::to_value(status).unwrap();
        assert_eq!(json["queue_size"], 3);
        assert_eq!(json["processing"], true);
        assert_eq!(json["downstream_connected"], false);
    }
}
