//! Client-side reconciliation of optimistic, confirmed and live-pushed
//! message state.
//!
//! A [`Synchronizer`] holds one [`ConversationView`] per counterpart. Sends
//! are applied optimistically the moment they are submitted and later either
//! substituted in place by the store-confirmed record, or rolled back on
//! failure or timeout. Live pushes are deduplicated against the real message
//! id once known, otherwise against in-flight optimistic entries by content
//! within a narrow time window. Confirmed entries are always ordered by
//! `(created_at, id)` — never by push arrival order.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::message::Message;

/// Sends with no durable success or failure within this bound are rolled
/// back; the subsystem never leaves an indefinite pending state.
const DEFAULT_SEND_TIMEOUT_SECS: i64 = 15;

/// Window within which a pushed message may match an in-flight optimistic
/// entry with the same content.
const DEDUP_WINDOW_SECS: i64 = 10;

pub type LocalId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewState {
    #[default]
    Idle,
    /// History fetch in flight.
    Loading,
    /// History loaded; the view accepts submissions.
    Ready,
}

/// A provisional message shown before server confirmation exists. Matched to
/// its confirmed counterpart by `local_id`; superseded, not merged.
#[derive(Debug, Clone)]
pub struct OptimisticMessage {
    pub local_id: LocalId,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub text: String,
    pub submitted_at: DateTime<Utc>,
    deadline: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum Entry {
    Confirmed(Message),
    Optimistic(OptimisticMessage),
}

impl Entry {
    pub fn text(&self) -> &str {
        match self {
            Entry::Confirmed(m) => &m.text,
            Entry::Optimistic(o) => &o.text,
        }
    }

    pub fn is_optimistic(&self) -> bool {
        matches!(self, Entry::Optimistic(_))
    }

    fn has_id(&self, id: i64) -> bool {
        matches!(self, Entry::Confirmed(m) if m.id == id)
    }

    fn has_local_id(&self, local_id: LocalId) -> bool {
        matches!(self, Entry::Optimistic(o) if o.local_id == local_id)
    }
}

/// The ordered message list for one counterpart, combining fetched history,
/// optimistic sends and live pushes. Every message appears at most once.
#[derive(Debug, Default)]
pub struct ConversationView {
    state: ViewState,
    entries: Vec<Entry>,
    error: Option<String>,
}

impl ConversationView {
    pub fn state(&self) -> ViewState {
        self.state
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn contains_id(&self, id: i64) -> bool {
        self.entries.iter().any(|e| e.has_id(id))
    }

    /// Insert a confirmed message positioned by `(created_at, id)` among the
    /// confirmed prefix; optimistic entries stay at the tail.
    fn insert_confirmed(&mut self, message: Message) {
        let key = message.sort_key();
        let pos = self
            .entries
            .iter()
            .position(|e| match e {
                Entry::Confirmed(m) => m.sort_key() > key,
                Entry::Optimistic(_) => true,
            })
            .unwrap_or(self.entries.len());
        self.entries.insert(pos, Entry::Confirmed(message));
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("no active conversation")]
    NoActiveConversation,
    #[error("conversation is not ready")]
    NotReady,
    #[error("message text must not be empty")]
    EmptyText,
}

/// Per-client state machine reconciling local, optimistic, persisted and
/// pushed views into one ordered, deduplicated list per conversation.
pub struct Synchronizer {
    me: Uuid,
    active: Option<Uuid>,
    views: HashMap<Uuid, ConversationView>,
    next_local_id: LocalId,
    send_timeout: Duration,
}

impl Synchronizer {
    pub fn new(me: Uuid) -> Self {
        Self {
            me,
            active: None,
            views: HashMap::new(),
            next_local_id: 1,
            send_timeout: Duration::seconds(DEFAULT_SEND_TIMEOUT_SECS),
        }
    }

    pub fn with_send_timeout(me: Uuid, send_timeout: Duration) -> Self {
        Self {
            send_timeout,
            ..Self::new(me)
        }
    }

    pub fn active_conversation(&self) -> Option<Uuid> {
        self.active
    }

    pub fn view(&self, counterpart: Uuid) -> Option<&ConversationView> {
        self.views.get(&counterpart)
    }

    /// Select a counterpart: the view moves to `Loading` and the caller
    /// issues the REST history fetch. Reselecting refetches; that is the
    /// recovery path after a connection loss.
    pub fn select_conversation(&mut self, counterpart: Uuid) {
        self.active = Some(counterpart);
        let view = self.views.entry(counterpart).or_default();
        view.state = ViewState::Loading;
        view.error = None;
    }

    /// History fetch succeeded. Confirmed entries are replaced wholesale by
    /// the fetched history (the REST path is authoritative); in-flight
    /// optimistic sends stay at the tail.
    pub fn history_loaded(&mut self, counterpart: Uuid, mut history: Vec<Message>) {
        let view = self.views.entry(counterpart).or_default();

        history.sort_by_key(Message::sort_key);
        history.dedup_by_key(|m| m.id);

        let optimistic: Vec<Entry> = view
            .entries
            .drain(..)
            .filter(Entry::is_optimistic)
            .collect();
        view.entries = history.into_iter().map(Entry::Confirmed).collect();
        view.entries.extend(optimistic);
        view.state = ViewState::Ready;
        view.error = None;
    }

    /// History fetch failed: no silent stale data, the view is emptied and
    /// the failure surfaced.
    pub fn history_failed(&mut self, counterpart: Uuid, reason: impl Into<String>) {
        let view = self.views.entry(counterpart).or_default();
        view.entries.clear();
        view.state = ViewState::Idle;
        view.error = Some(reason.into());
    }

    /// Submit a send for the active conversation. The optimistic entry is
    /// appended at the current tail; the caller then issues the durable send
    /// request (over the live connection when open, REST otherwise) and
    /// reconciles via [`Synchronizer::send_confirmed`] or
    /// [`Synchronizer::send_failed`].
    pub fn submit_send(&mut self, text: &str, now: DateTime<Utc>) -> Result<LocalId, SubmitError> {
        let counterpart = self.active.ok_or(SubmitError::NoActiveConversation)?;
        let view = self
            .views
            .get_mut(&counterpart)
            .ok_or(SubmitError::NoActiveConversation)?;
        if view.state != ViewState::Ready {
            return Err(SubmitError::NotReady);
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(SubmitError::EmptyText);
        }

        let local_id = self.next_local_id;
        self.next_local_id += 1;
        view.entries.push(Entry::Optimistic(OptimisticMessage {
            local_id,
            sender_id: self.me,
            receiver_id: counterpart,
            text: text.to_string(),
            submitted_at: now,
            deadline: now + self.send_timeout,
        }));
        Ok(local_id)
    }

    /// Durable send success: the optimistic entry is substituted in place by
    /// the confirmed record. Never an insertion, so no duplicate can appear.
    pub fn send_confirmed(&mut self, local_id: LocalId, message: Message) {
        let counterpart = message.counterpart(self.me);
        let view = self.views.entry(counterpart).or_default();

        if let Some(pos) = view.entries.iter().position(|e| e.has_local_id(local_id)) {
            if view.contains_id(message.id) {
                // a push already landed the confirmed record; the optimistic
                // entry just goes away
                view.entries.remove(pos);
            } else {
                view.entries[pos] = Entry::Confirmed(message);
            }
        } else if !view.contains_id(message.id) {
            // the optimistic entry was already rolled back (timeout) or the
            // view was reset; keep the durable record
            view.insert_confirmed(message);
        }
    }

    /// Durable send failure: the optimistic entry is removed entirely and the
    /// failure surfaced — never left displayed as sent. Returns whether an
    /// entry was rolled back.
    pub fn send_failed(&mut self, local_id: LocalId, reason: impl Into<String>) -> bool {
        for view in self.views.values_mut() {
            if let Some(pos) = view.entries.iter().position(|e| e.has_local_id(local_id)) {
                view.entries.remove(pos);
                view.error = Some(reason.into());
                return true;
            }
        }
        false
    }

    /// A live-pushed message. Routed to its conversation's view whether or
    /// not that conversation is active — entries for inactive conversations
    /// are retained for later display. Skipped when already represented: by
    /// real id, or by an in-flight optimistic entry with matching content.
    pub fn push_received(&mut self, message: Message) {
        let counterpart = message.counterpart(self.me);
        let view = self.views.entry(counterpart).or_default();

        if view.contains_id(message.id) {
            return;
        }
        if message.sender_id == self.me {
            let window = Duration::seconds(DEDUP_WINDOW_SECS);
            let matches_in_flight = view.entries.iter().any(|e| match e {
                Entry::Optimistic(o) => {
                    o.receiver_id == message.receiver_id
                        && o.text == message.text
                        && (message.created_at - o.submitted_at).abs() <= window
                }
                Entry::Confirmed(_) => false,
            });
            if matches_in_flight {
                // the durable-send confirmation will substitute the real
                // record in place
                return;
            }
        }
        view.insert_confirmed(message);
    }

    /// Roll back sends whose durable response never arrived within the
    /// client-side timeout. Returns the rolled-back local ids.
    pub fn expire_pending(&mut self, now: DateTime<Utc>) -> Vec<LocalId> {
        let mut expired = Vec::new();
        for view in self.views.values_mut() {
            let before = expired.len();
            view.entries.retain(|e| match e {
                Entry::Optimistic(o) if o.deadline <= now => {
                    expired.push(o.local_id);
                    false
                }
                _ => true,
            });
            if expired.len() > before {
                view.error = Some("send timed out".to_string());
            }
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    fn msg(id: i64, sender: Uuid, receiver: Uuid, text: &str, secs: i64) -> Message {
        Message {
            id,
            sender_id: sender,
            receiver_id: receiver,
            text: text.to_string(),
            created_at: at(secs),
        }
    }

    fn ready(me: Uuid, counterpart: Uuid) -> Synchronizer {
        let mut sync = Synchronizer::new(me);
        sync.select_conversation(counterpart);
        sync.history_loaded(counterpart, vec![]);
        sync
    }

    fn texts(sync: &Synchronizer, counterpart: Uuid) -> Vec<String> {
        sync.view(counterpart)
            .map(|v| v.entries().iter().map(|e| e.text().to_string()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn select_then_load_reaches_ready_with_sorted_history() {
        let (me, them) = (Uuid::new_v4(), Uuid::new_v4());
        let mut sync = Synchronizer::new(me);

        sync.select_conversation(them);
        assert_eq!(sync.view(them).unwrap().state(), ViewState::Loading);

        // out-of-order fetch result, including a tie on created_at
        sync.history_loaded(
            them,
            vec![
                msg(3, them, me, "third", 5),
                msg(1, me, them, "first", 1),
                msg(2, them, me, "second", 5),
            ],
        );
        let view = sync.view(them).unwrap();
        assert_eq!(view.state(), ViewState::Ready);
        assert_eq!(texts(&sync, them), vec!["first", "second", "third"]);
    }

    #[test]
    fn history_failure_leaves_no_stale_data() {
        let (me, them) = (Uuid::new_v4(), Uuid::new_v4());
        let mut sync = ready(me, them);
        sync.push_received(msg(9, them, me, "old", 0));

        sync.select_conversation(them);
        sync.history_failed(them, "network unreachable");

        let view = sync.view(them).unwrap();
        assert_eq!(view.state(), ViewState::Idle);
        assert!(view.entries().is_empty());
        assert_eq!(view.error(), Some("network unreachable"));
    }

    #[test]
    fn submit_requires_ready_view() {
        let (me, them) = (Uuid::new_v4(), Uuid::new_v4());
        let mut sync = Synchronizer::new(me);

        assert_eq!(
            sync.submit_send("hi", at(0)).unwrap_err(),
            SubmitError::NoActiveConversation
        );

        sync.select_conversation(them);
        assert_eq!(sync.submit_send("hi", at(0)).unwrap_err(), SubmitError::NotReady);

        sync.history_loaded(them, vec![]);
        assert_eq!(sync.submit_send("  ", at(0)).unwrap_err(), SubmitError::EmptyText);
        assert!(sync.submit_send("hi", at(0)).is_ok());
    }

    #[test]
    fn confirmation_substitutes_in_place() {
        let (me, them) = (Uuid::new_v4(), Uuid::new_v4());
        let mut sync = ready(me, them);
        sync.history_loaded(them, vec![msg(1, them, me, "earlier", 0)]);

        let local_id = sync.submit_send("hi", at(1)).unwrap();
        assert_eq!(texts(&sync, them), vec!["earlier", "hi"]);

        sync.send_confirmed(local_id, msg(2, me, them, "hi", 2));
        let view = sync.view(them).unwrap();
        assert_eq!(texts(&sync, them), vec!["earlier", "hi"]);
        assert!(view.entries().iter().all(|e| !e.is_optimistic()));
    }

    #[test]
    fn optimistic_and_confirmed_never_both_survive() {
        let (me, them) = (Uuid::new_v4(), Uuid::new_v4());
        let mut sync = ready(me, them);

        let local_id = sync.submit_send("hi", at(0)).unwrap();

        // the sender's own push races ahead of the durable confirmation
        let confirmed = msg(7, me, them, "hi", 1);
        sync.push_received(confirmed.clone());
        assert_eq!(texts(&sync, them), vec!["hi"]);

        sync.send_confirmed(local_id, confirmed);
        assert_eq!(texts(&sync, them), vec!["hi"]);
        assert!(sync
            .view(them)
            .unwrap()
            .entries()
            .iter()
            .all(|e| !e.is_optimistic()));
    }

    #[test]
    fn duplicate_push_by_id_is_ignored() {
        let (me, them) = (Uuid::new_v4(), Uuid::new_v4());
        let mut sync = ready(me, them);

        let message = msg(5, them, me, "hello", 1);
        sync.push_received(message.clone());
        sync.push_received(message);
        assert_eq!(texts(&sync, them), vec!["hello"]);
    }

    #[test]
    fn identical_texts_in_flight_each_keep_one_entry() {
        let (me, them) = (Uuid::new_v4(), Uuid::new_v4());
        let mut sync = ready(me, them);

        let first = sync.submit_send("hi", at(0)).unwrap();
        let second = sync.submit_send("hi", at(1)).unwrap();

        sync.push_received(msg(1, me, them, "hi", 1));
        sync.push_received(msg(2, me, them, "hi", 2));
        assert_eq!(texts(&sync, them).len(), 2);

        sync.send_confirmed(first, msg(1, me, them, "hi", 1));
        sync.send_confirmed(second, msg(2, me, them, "hi", 2));
        assert_eq!(texts(&sync, them), vec!["hi", "hi"]);
        assert!(sync
            .view(them)
            .unwrap()
            .entries()
            .iter()
            .all(|e| !e.is_optimistic()));
    }

    #[test]
    fn pushes_sort_by_created_at_not_arrival_order() {
        let (me, them) = (Uuid::new_v4(), Uuid::new_v4());
        let mut sync = ready(me, them);

        sync.push_received(msg(4, them, me, "later", 10));
        sync.push_received(msg(3, them, me, "earlier", 5));

        assert_eq!(texts(&sync, them), vec!["earlier", "later"]);
    }

    #[test]
    fn failure_rolls_back_and_surfaces_error() {
        let (me, them) = (Uuid::new_v4(), Uuid::new_v4());
        let mut sync = ready(me, them);

        let local_id = sync.submit_send("hi", at(0)).unwrap();
        assert!(sync.send_failed(local_id, "store unavailable"));

        let view = sync.view(them).unwrap();
        assert!(view.entries().is_empty());
        assert_eq!(view.error(), Some("store unavailable"));

        // rolling back twice is a no-op
        assert!(!sync.send_failed(local_id, "store unavailable"));
    }

    #[test]
    fn pending_sends_expire_after_timeout() {
        let (me, them) = (Uuid::new_v4(), Uuid::new_v4());
        let mut sync = Synchronizer::with_send_timeout(me, Duration::seconds(5));
        sync.select_conversation(them);
        sync.history_loaded(them, vec![]);

        let local_id = sync.submit_send("hi", at(0)).unwrap();
        assert!(sync.expire_pending(at(3)).is_empty());

        let expired = sync.expire_pending(at(5));
        assert_eq!(expired, vec![local_id]);
        assert!(sync.view(them).unwrap().entries().is_empty());

        // a confirmation arriving after rollback still lands the durable record
        sync.send_confirmed(local_id, msg(1, me, them, "hi", 6));
        assert_eq!(texts(&sync, them), vec!["hi"]);
    }

    #[test]
    fn pushes_for_inactive_conversations_are_retained() {
        let (me, active, other) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let mut sync = ready(me, active);

        sync.push_received(msg(1, other, me, "psst", 0));

        assert_eq!(sync.active_conversation(), Some(active));
        assert_eq!(texts(&sync, other), vec!["psst"]);
        assert!(texts(&sync, active).is_empty());
    }

    #[test]
    fn refetch_replaces_confirmed_but_keeps_in_flight_sends() {
        let (me, them) = (Uuid::new_v4(), Uuid::new_v4());
        let mut sync = ready(me, them);

        sync.push_received(msg(1, them, me, "stale", 0));
        let local_id = sync.submit_send("pending", at(1)).unwrap();

        sync.select_conversation(them);
        sync.history_loaded(
            them,
            vec![msg(1, them, me, "stale", 0), msg(2, them, me, "newer", 1)],
        );

        assert_eq!(texts(&sync, them), vec!["stale", "newer", "pending"]);
        sync.send_confirmed(local_id, msg(3, me, them, "pending", 2));
        assert_eq!(texts(&sync, them), vec!["stale", "newer", "pending"]);
    }

    #[test]
    fn counterpart_push_does_not_match_own_optimistic_entry() {
        let (me, them) = (Uuid::new_v4(), Uuid::new_v4());
        let mut sync = ready(me, them);

        sync.submit_send("hi", at(0)).unwrap();
        // the counterpart coincidentally sends the same text
        sync.push_received(msg(1, them, me, "hi", 0));

        assert_eq!(texts(&sync, them).len(), 2);
    }
}
