//! Event queue types consumed by the brain's dispatch loop.

use serde::Serialize;
use std::collections::VecDeque;

/// One decision cycle's outcome, published for the stream overlay (§4.10).
/// Never read back by the brain itself.
#[derive(Debug, Clone, Serialize)]
pub struct TelemetryEvent {
    pub agent: String,
    pub thought: String,
    pub action: String,
}

/// The four decision-handler kinds. Lower-numbered default priorities are
/// more urgent; the brain still honours a per-event `priority` override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Strategic,
    Reactive,
    Critic,
    Chat,
}

impl EventKind {
    pub fn default_priority(&self) -> u8 {
        match self {
            EventKind::Reactive => 1,
            EventKind::Critic => 2,
            EventKind::Chat => 4,
            EventKind::Strategic => 5,
        }
    }
}

/// The payload carried by an event; handlers downcast on this to build their
/// prompt.
#[derive(Debug, Clone)]
pub enum Payload {
    None,
    Hostiles(Vec<String>),
    TookDamage,
    LowHealth(f32),
    LowFood(f32),
    Chat { author: String, text: String, paid: bool },
    CriticFollowUp { last_action: String, result: String },
}

#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventKind,
    pub priority: u8,
    pub payload: Payload,
    pub timestamp: std::time::Instant,
}

impl Event {
    pub fn new(kind: EventKind, payload: Payload) -> Self {
        Self {
            priority: kind.default_priority(),
            kind,
            payload,
            timestamp: std::time::Instant::now(),
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }
}

/// A small priority queue with per-kind dedup: at most one pending event of
/// each kind; a newly pushed event of the same kind replaces the pending one
/// only if its priority is strictly higher (smaller number).
#[derive(Default)]
pub struct EventQueue {
    items: VecDeque<Event>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self { items: VecDeque::new() }
    }

    pub fn push(&mut self, event: Event) {
        if let Some(existing) = self.items.iter_mut().find(|e| e.kind == event.kind) {
            if event.priority < existing.priority {
                *existing = event;
            }
            return;
        }
        self.items.push_back(event);
    }

    /// Pops the lowest-priority-number event, FIFO among ties.
    pub fn pop(&mut self) -> Option<Event> {
        let idx = self
            .items
            .iter()
            .enumerate()
            .min_by_key(|(i, e)| (e.priority, *i))
            .map(|(i, _)| i)?;
        self.items.remove(idx)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn push_front(&mut self, event: Event) {
        self.items.push_front(event);
    }
}

#[derive(Debug, Clone, Default)]
pub struct Decision {
    pub thought: String,
    pub action: String,
    pub params: serde_json::Map<String, serde_json::Value>,
    pub goal: Option<String>,
    pub goal_steps: Option<u32>,
}

impl Decision {
    pub fn idle(thought: &str) -> Self {
        Self {
            thought: thought.to_string(),
            action: "idle".to_string(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_replaces_only_on_strictly_higher_priority() {
        let mut q = EventQueue::new();
        q.push(Event::new(EventKind::Strategic, Payload::None).with_priority(5));
        q.push(Event::new(EventKind::Strategic, Payload::None).with_priority(5));
        assert_eq!(q.items.len(), 1);
        q.push(Event::new(EventKind::Strategic, Payload::None).with_priority(6));
        assert_eq!(q.pop().unwrap().priority, 5);
    }

    #[test]
    fn pop_returns_lowest_priority_first() {
        let mut q = EventQueue::new();
        q.push(Event::new(EventKind::Chat, Payload::None));
        q.push(Event::new(EventKind::Reactive, Payload::None));
        let first = q.pop().unwrap();
        assert_eq!(first.kind, EventKind::Reactive);
    }
}
