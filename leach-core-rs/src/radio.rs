//! Radio collaborator interface
//!
//! Sends are fire-and-forget: no acknowledgements, no retries. Received
//! frames are handed to [`crate::Node::handle_frame`] together with the
//! link-layer source address and the measured RSSI.
//!
//! # Implementing a Radio
//!
//! ```ignore
//! struct Nrf52Radio { /* driver handle */ }
//!
//! impl Radio for Nrf52Radio {
//!     fn send(&mut self, dest: NodeAddress, payload: &[u8]) -> Result<()> {
//!         // unicast via the MAC layer
//!     }
//!
//!     fn broadcast(&mut self, payload: &[u8]) -> Result<()> {
//!         // link-local broadcast
//!     }
//! }
//! ```

use crate::types::*;

// ============================================================================
// Radio Trait
// ============================================================================

/// Outbound half of the radio driver
pub trait Radio {
    /// Unicast `payload` to a neighbour
    fn send(&mut self, dest: NodeAddress, payload: &[u8]) -> Result<()>;

    /// Broadcast `payload` to every neighbour in range
    fn broadcast(&mut self, payload: &[u8]) -> Result<()>;
}

impl<R: Radio + ?Sized> Radio for &mut R {
    fn send(&mut self, dest: NodeAddress, payload: &[u8]) -> Result<()> {
        (**self).send(dest, payload)
    }

    fn broadcast(&mut self, payload: &[u8]) -> Result<()> {
        (**self).broadcast(payload)
    }
}

/// A frame as delivered by the radio driver
#[derive(Debug, Clone, Copy)]
pub struct InboundFrame<'a> {
    /// Payload, type tag first
    pub payload: &'a [u8],
    /// Link-layer sender (the neighbour that transmitted)
    pub src: NodeAddress,
    /// Link-layer destination, `None` for broadcast
    pub dest: Option<NodeAddress>,
    /// Received signal strength (dBm)
    pub rssi: Metric,
}

impl<'a> InboundFrame<'a> {
    /// Unicast frame
    pub fn unicast(payload: &'a [u8], src: NodeAddress, dest: NodeAddress, rssi: Metric) -> Self {
        Self {
            payload,
            src,
            dest: Some(dest),
            rssi,
        }
    }

    /// Broadcast frame
    pub fn broadcast(payload: &'a [u8], src: NodeAddress, rssi: Metric) -> Self {
        Self {
            payload,
            src,
            dest: None,
            rssi,
        }
    }
}

// ============================================================================
// Recording Radio
// ============================================================================

/// A frame handed to a [`RecordingRadio`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    /// Unicast target, `None` for broadcast
    pub dest: Option<NodeAddress>,
    /// Encoded frame
    pub payload: Vec<u8>,
}

/// Radio that only records what it was asked to send
///
/// Used by the simulator and by tests to move frames between nodes.
#[derive(Debug, Default)]
pub struct RecordingRadio {
    sent: Vec<Outbound>,
    fail: bool,
}

impl RecordingRadio {
    /// Create an empty radio
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following send fail with [`Error::Radio`]
    pub fn set_failing(&mut self, fail: bool) {
        self.fail = fail;
    }

    /// Frames recorded so far
    pub fn sent(&self) -> &[Outbound] {
        &self.sent
    }

    /// Take and clear the recorded frames
    pub fn take(&mut self) -> Vec<Outbound> {
        core::mem::take(&mut self.sent)
    }
}

impl Radio for RecordingRadio {
    fn send(&mut self, dest: NodeAddress, payload: &[u8]) -> Result<()> {
        if self.fail {
            return Err(Error::Radio);
        }
        self.sent.push(Outbound {
            dest: Some(dest),
            payload: payload.to_vec(),
        });
        Ok(())
    }

    fn broadcast(&mut self, payload: &[u8]) -> Result<()> {
        if self.fail {
            return Err(Error::Radio);
        }
        self.sent.push(Outbound {
            dest: None,
            payload: payload.to_vec(),
        });
        Ok(())
    }
}
