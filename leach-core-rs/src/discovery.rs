//! Discovery Protocol State Machine
//!
//! `IDLE -> FLOODING -> STABLE`, forced back to `FLOODING` by a liveness
//! timeout or a join announcement.
//!
//! The master side counts HELLO rounds and decides when the topology has
//! settled. The member side decides whether a HELLO is fresh (flood it on,
//! answer it) or a duplicate of the current round.

use tracing::debug;

use crate::types::*;

/// What the master should do on a HELLO timer tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelloTick {
    /// Broadcast a HELLO with this sequence
    Send(Sequence),
    /// Enough quiet rounds: the network is now STABLE
    Stabilised,
    /// Not flooding, nothing to send
    Skip,
}

/// Member-side classification of a received HELLO
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelloVerdict {
    /// Newer than anything seen this round
    Fresh,
    /// First HELLO of a new discovery round
    RoundRestart,
    /// Duplicate from a neighbour already in the table
    StaleKnown,
    /// Duplicate, but the sender is a new neighbour
    StaleUnknown,
}

impl HelloVerdict {
    /// True if the HELLO should be recorded, flooded and answered
    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh | Self::RoundRestart)
    }
}

/// Discovery bookkeeping for one node
#[derive(Debug, Clone, Default)]
pub struct Discovery {
    state: DiscoveryState,

    // master side
    next_sequence: Sequence,
    rounds: u32,
    quiet_rounds: u8,
    discovered_this_round: bool,
    election_pending: bool,
    epoch: u8,

    // member side
    last_sequence: Option<Sequence>,
}

impl Discovery {
    /// Idle state machine
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state
    pub fn state(&self) -> DiscoveryState {
        self.state
    }

    // ------------------------------------------------------------------------
    // Master side
    // ------------------------------------------------------------------------

    /// Start a new discovery round
    pub fn restart(&mut self) {
        self.state = DiscoveryState::Flooding;
        self.next_sequence = ROUND_START_SEQUENCE;
        self.rounds = 0;
        self.quiet_rounds = 0;
        self.discovered_this_round = false;
        self.election_pending = false;
    }

    /// A node got a fresh index during the current round
    pub fn note_discovery(&mut self) {
        self.discovered_this_round = true;
    }

    /// Advance one HELLO period
    ///
    /// A round counts as quiet when no node was discovered since the
    /// previous tick. After `stable_after` quiet rounds the machine moves
    /// to STABLE and an election becomes due.
    pub fn on_hello_tick(&mut self, stable_after: u8) -> HelloTick {
        if self.state != DiscoveryState::Flooding {
            return HelloTick::Skip;
        }
        if self.rounds > 0 {
            if self.discovered_this_round {
                self.quiet_rounds = 0;
            } else {
                self.quiet_rounds = self.quiet_rounds.saturating_add(1);
            }
        }
        self.discovered_this_round = false;

        if self.quiet_rounds >= stable_after {
            self.state = DiscoveryState::Stable;
            self.election_pending = true;
            debug!(rounds = self.rounds, "discovery settled");
            return HelloTick::Stabilised;
        }

        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        self.rounds += 1;
        HelloTick::Send(sequence)
    }

    /// HELLO rounds sent since the last restart
    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    /// Consume the pending-election flag
    pub fn take_election(&mut self) -> bool {
        core::mem::take(&mut self.election_pending)
    }

    /// Put the election back on the queue
    pub fn defer_election(&mut self) {
        self.election_pending = true;
    }

    /// Epoch for the next advertisement cycle
    pub fn next_epoch(&mut self) -> u8 {
        self.epoch = self.epoch.wrapping_add(1);
        self.epoch
    }

    // ------------------------------------------------------------------------
    // Member side
    // ------------------------------------------------------------------------

    /// Classify a received HELLO and record its sequence if fresh
    ///
    /// A lower sequence starts a new round when it is the round-start value
    /// or when this node had already settled; otherwise it is a duplicate.
    pub fn accept_hello(&mut self, sequence: Sequence, sender_known: bool) -> HelloVerdict {
        let verdict = match self.last_sequence {
            None => HelloVerdict::Fresh,
            Some(last) if sequence > last => HelloVerdict::Fresh,
            Some(last)
                if sequence < last
                    && (sequence == ROUND_START_SEQUENCE
                        || self.state == DiscoveryState::Stable) =>
            {
                HelloVerdict::RoundRestart
            }
            Some(_) if sender_known => HelloVerdict::StaleKnown,
            Some(_) => HelloVerdict::StaleUnknown,
        };
        if verdict.is_fresh() {
            self.last_sequence = Some(sequence);
            self.state = DiscoveryState::Flooding;
        }
        verdict
    }

    /// Last HELLO sequence accepted
    pub fn last_sequence(&self) -> Option<Sequence> {
        self.last_sequence
    }

    /// This member received its own advertisement
    pub fn settle(&mut self) {
        self.state = DiscoveryState::Stable;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_master_counts_quiet_rounds() {
        let mut d = Discovery::new();
        assert_eq!(d.on_hello_tick(2), HelloTick::Skip);

        d.restart();
        assert_eq!(d.state(), DiscoveryState::Flooding);
        assert_eq!(d.on_hello_tick(2), HelloTick::Send(1));
        d.note_discovery();
        assert_eq!(d.on_hello_tick(2), HelloTick::Send(2));
        // first quiet round
        assert_eq!(d.on_hello_tick(2), HelloTick::Send(3));
        // second quiet round
        assert_eq!(d.on_hello_tick(2), HelloTick::Stabilised);
        assert_eq!(d.state(), DiscoveryState::Stable);
        assert_eq!(d.on_hello_tick(2), HelloTick::Skip);

        assert!(d.take_election());
        assert!(!d.take_election());
        d.defer_election();
        assert!(d.take_election());
    }

    #[test]
    fn test_discovery_resets_quiet_count() {
        let mut d = Discovery::new();
        d.restart();
        d.on_hello_tick(2);
        d.on_hello_tick(2);
        d.note_discovery();
        assert_eq!(d.on_hello_tick(2), HelloTick::Send(3));
        assert_eq!(d.on_hello_tick(2), HelloTick::Send(4));
        assert_eq!(d.on_hello_tick(2), HelloTick::Stabilised);
    }

    #[test]
    fn test_restart_resets_sequence() {
        let mut d = Discovery::new();
        d.restart();
        d.on_hello_tick(5);
        d.on_hello_tick(5);
        d.restart();
        assert_eq!(d.rounds(), 0);
        assert_eq!(d.on_hello_tick(5), HelloTick::Send(ROUND_START_SEQUENCE));
    }

    #[test]
    fn test_epoch_advances() {
        let mut d = Discovery::new();
        assert_eq!(d.next_epoch(), 1);
        assert_eq!(d.next_epoch(), 2);
    }

    #[test]
    fn test_member_freshness() {
        let mut d = Discovery::new();
        assert_eq!(d.accept_hello(1, false), HelloVerdict::Fresh);
        assert_eq!(d.state(), DiscoveryState::Flooding);
        assert_eq!(d.accept_hello(1, true), HelloVerdict::StaleKnown);
        assert_eq!(d.accept_hello(1, false), HelloVerdict::StaleUnknown);
        assert_eq!(d.accept_hello(3, true), HelloVerdict::Fresh);
        assert_eq!(d.accept_hello(2, true), HelloVerdict::StaleKnown);
        assert_eq!(d.last_sequence(), Some(3));
    }

    #[test]
    fn test_member_round_restart() {
        let mut d = Discovery::new();
        d.accept_hello(1, false);
        d.accept_hello(2, true);
        assert_eq!(d.accept_hello(1, true), HelloVerdict::RoundRestart);
        assert_eq!(d.last_sequence(), Some(1));
    }

    #[test]
    fn test_settled_member_accepts_lower_sequence() {
        let mut d = Discovery::new();
        d.accept_hello(6, false);
        d.settle();
        assert_eq!(d.state(), DiscoveryState::Stable);
        // first HELLO of the new round was lost
        assert_eq!(d.accept_hello(2, true), HelloVerdict::RoundRestart);
        assert_eq!(d.state(), DiscoveryState::Flooding);
        assert_eq!(d.accept_hello(1, true), HelloVerdict::RoundRestart);
    }
}
