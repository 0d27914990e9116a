//! Ticket manager (spec §4.9, §9): a map keyed by `ticket_id` with a TTL
//! eviction sweep. Tickets transition `pending -> running -> (done |
//! error)`; no cross-ticket sharing of mutable state.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use uuid::Uuid;

use actstream_templates::{Ticket, TicketStatus};

struct TicketEntry {
    ticket: Ticket,
    result: Option<Value>,
    error: Option<String>,
}

/// Holds in-flight and recently-completed tickets for the process lifetime
/// (spec §3: "Tickets are in-memory and tied to the process lifetime").
pub struct TicketManager {
    tickets: DashMap<Uuid, TicketEntry>,
    ttl_ms: u64,
}

impl TicketManager {
    #[must_use]
    pub fn new(ttl_ms: u64) -> Self {
        Self { tickets: DashMap::new(), ttl_ms }
    }

    /// Creates a new ticket in `pending` state (spec §4.9 `submit_query`).
    pub fn create(&self, template_name: String, params: HashMap<String, Value>, byte_cap: Option<u64>, query_tag: String) -> Ticket {
        let ticket = Ticket {
            ticket_id: Uuid::new_v4(),
            template_name,
            params,
            byte_cap,
            query_tag,
            status: TicketStatus::Pending,
            created_at: Utc::now(),
        };
        self.tickets.insert(ticket.ticket_id, TicketEntry { ticket: ticket.clone(), result: None, error: None });
        ticket
    }

    pub fn mark_running(&self, ticket_id: Uuid) {
        if let Some(mut entry) = self.tickets.get_mut(&ticket_id) {
            entry.ticket.status = TicketStatus::Running;
        }
    }

    pub fn mark_done(&self, ticket_id: Uuid, result: Value) {
        if let Some(mut entry) = self.tickets.get_mut(&ticket_id) {
            entry.ticket.status = TicketStatus::Done;
            entry.result = Some(result);
        }
    }

    pub fn mark_error(&self, ticket_id: Uuid, message: String) {
        if let Some(mut entry) = self.tickets.get_mut(&ticket_id) {
            entry.ticket.status = TicketStatus::Error;
            entry.error = Some(message);
        }
    }

    #[must_use]
    pub fn get(&self, ticket_id: Uuid) -> Option<(Ticket, Option<Value>, Option<String>)> {
        self.tickets.get(&ticket_id).map(|e| (e.ticket.clone(), e.result.clone(), e.error.clone()))
    }

    /// Removes tickets older than `ttl_ms`, regardless of status — a
    /// ticket that never transitioned out of `pending` is still bounded by
    /// the same TTL (spec §9: "TTL eviction sweep").
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let ttl = chrono::Duration::milliseconds(self.ttl_ms as i64);
        let expired: Vec<Uuid> = self
            .tickets
            .iter()
            .filter(|entry| now.signed_duration_since(entry.ticket.created_at) >= ttl)
            .map(|entry| entry.ticket.ticket_id)
            .collect();
        let count = expired.len();
        for ticket_id in expired {
            self.tickets.remove(&ticket_id);
        }
        count
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }
}

/// Spawns the periodic eviction sweep, matching the breaker registry's own
/// cleanup-pass cadence (spec §4.9: "Ticket manager eviction sweep runs on
/// a `tokio::time::interval`").
pub fn spawn_eviction_sweep(manager: std::sync::Arc<TicketManager>, interval_ms: u64) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_millis(interval_ms));
        loop {
            ticker.tick().await;
            let evicted = manager.evict_expired(Utc::now());
            if evicted > 0 {
                tracing::debug!(evicted, "ticket eviction sweep removed expired tickets");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_get_round_trips_pending_status() {
        let manager = TicketManager::new(5 * 60 * 1_000);
        let ticket = manager.create("GET_RECENT_ACTIVITIES".to_string(), HashMap::new(), None, "tag_abc".to_string());
        let (fetched, result, error) = manager.get(ticket.ticket_id).unwrap();
        assert_eq!(fetched.status, TicketStatus::Pending);
        assert!(result.is_none());
        assert!(error.is_none());
    }

    #[test]
    fn full_lifecycle_transitions_to_done() {
        let manager = TicketManager::new(5 * 60 * 1_000);
        let ticket = manager.create("GET_CONTEXT".to_string(), HashMap::new(), None, "tag_1".to_string());
        manager.mark_running(ticket.ticket_id);
        manager.mark_done(ticket.ticket_id, serde_json::json!({"rows": 3}));
        let (fetched, result, _) = manager.get(ticket.ticket_id).unwrap();
        assert_eq!(fetched.status, TicketStatus::Done);
        assert_eq!(result, Some(serde_json::json!({"rows": 3})));
    }

    #[test]
    fn expired_tickets_are_evicted_regardless_of_status() {
        let manager = TicketManager::new(0);
        let ticket = manager.create("GET_CONTEXT".to_string(), HashMap::new(), None, "tag_2".to_string());
        let evicted = manager.evict_expired(Utc::now() + chrono::Duration::milliseconds(1));
        assert_eq!(evicted, 1);
        assert!(manager.get(ticket.ticket_id).is_none());
    }
}
