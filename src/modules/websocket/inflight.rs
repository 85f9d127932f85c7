use std::collections::HashMap;

use uuid::Uuid;

/// Joins whose history fetch has not come back yet.
///
/// Each join gets a ticket. A fetch may only install its timeline and
/// subscription if its ticket is still the current one for that
/// conversation; a leave or a newer join invalidates it.
#[derive(Debug, Default)]
pub struct PendingJoins {
    next: u64,
    pending: HashMap<Uuid, u64>,
}

impl PendingJoins {
    pub fn begin(&mut self, conversation_id: Uuid) -> u64 {
        self.next += 1;
        self.pending.insert(conversation_id, self.next);
        self.next
    }

    /// Drops the pending join, if any. Returns true when one was pending.
    pub fn cancel(&mut self, conversation_id: &Uuid) -> bool {
        self.pending.remove(conversation_id).is_some()
    }

    /// Completes a join. False means the join was left or superseded and
    /// its result must be discarded.
    pub fn finish(&mut self, conversation_id: &Uuid, ticket: u64) -> bool {
        match self.pending.get(conversation_id) {
            Some(current) if *current == ticket => {
                self.pending.remove(conversation_id);
                true
            }
            _ => false,
        }
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

/// Keeps at most one conversation list fetch in flight.
///
/// Requests made while a fetch runs are folded into a single follow-up.
#[derive(Debug, Default)]
pub struct RefreshGate {
    running: bool,
    queued: bool,
}

impl RefreshGate {
    /// True when the caller should start a fetch now.
    pub fn try_start(&mut self) -> bool {
        if self.running {
            self.queued = true;
            return false;
        }
        self.running = true;
        true
    }

    /// Marks the running fetch done. True when another one was requested meanwhile.
    pub fn finish(&mut self) -> bool {
        self.running = false;
        std::mem::take(&mut self.queued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_completes_when_still_pending() {
        let mut joins = PendingJoins::default();
        let id = Uuid::now_v7();

        let ticket = joins.begin(id);
        assert!(joins.finish(&id, ticket));
        assert!(!joins.cancel(&id));
    }

    #[test]
    fn test_leave_before_history_arrives_discards_the_join() {
        let mut joins = PendingJoins::default();
        let id = Uuid::now_v7();

        let ticket = joins.begin(id);
        assert!(joins.cancel(&id));
        assert!(!joins.finish(&id, ticket));
        assert!(!joins.cancel(&id));
    }

    #[test]
    fn test_rejoin_supersedes_the_earlier_fetch() {
        let mut joins = PendingJoins::default();
        let id = Uuid::now_v7();

        let first = joins.begin(id);
        joins.cancel(&id);
        let second = joins.begin(id);

        assert!(!joins.finish(&id, first));
        assert!(joins.finish(&id, second));
    }

    #[test]
    fn test_joins_are_tracked_per_conversation() {
        let mut joins = PendingJoins::default();
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());

        let ticket_a = joins.begin(a);
        let ticket_b = joins.begin(b);
        joins.cancel(&a);

        assert!(!joins.finish(&a, ticket_a));
        assert!(joins.finish(&b, ticket_b));

        let ticket = joins.begin(a);
        joins.clear();
        assert!(!joins.finish(&a, ticket));
    }

    #[test]
    fn test_refresh_requests_coalesce_while_running() {
        let mut gate = RefreshGate::default();

        assert!(gate.try_start());
        assert!(!gate.try_start());
        assert!(!gate.try_start());

        // one follow-up for however many requests came in
        assert!(gate.finish());
        assert!(gate.try_start());
        assert!(!gate.finish());
        assert!(gate.try_start());
    }
}
