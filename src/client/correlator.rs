//! Matching server replies to outstanding requests.
//!
//! Every dispatched message is offered to each in-flight request until its
//! matcher resolves it. Requests of a family the protocol cannot tell apart
//! (WHO, CHATHISTORY) are serialized: only one per family is in flight and
//! the rest wait in a FIFO queue.

use std::collections::{HashMap, VecDeque};

use tokio::sync::oneshot;
use tracing::trace;

use crate::error::ClientError;
use crate::message::Message;
use crate::state::{Context, Inbound};

/// Request families whose replies cannot be attributed to one of several
/// concurrent requests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Family {
    Who,
    ChatHistory,
}

/// A type-erased waiting roundtrip.
pub(crate) trait Pending: Send {
    /// Offer a message; returns `true` once the request is resolved.
    fn feed(&mut self, inbound: &Inbound, ctx: &Context<'_>) -> bool;

    /// Reject the request.
    fn fail(self: Box<Self>, err: ClientError);

    /// The caller stopped waiting.
    fn is_closed(&self) -> bool;
}

/// Matcher plus the channel its result travels back on.
pub(crate) struct Waiter<T, F> {
    done: F,
    tx: Option<oneshot::Sender<Result<T, ClientError>>>,
}

impl<T, F> Waiter<T, F> {
    pub(crate) fn new(done: F, tx: oneshot::Sender<Result<T, ClientError>>) -> Self {
        Self { done, tx: Some(tx) }
    }
}

impl<T, F> Pending for Waiter<T, F>
where
    T: Send,
    F: FnMut(&Inbound, &Context<'_>) -> Result<Option<T>, ClientError> + Send,
{
    fn feed(&mut self, inbound: &Inbound, ctx: &Context<'_>) -> bool {
        let result = match (self.done)(inbound, ctx) {
            Ok(None) => return false,
            Ok(Some(value)) => Ok(value),
            Err(e) => Err(e),
        };
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(result);
        }
        true
    }

    fn fail(mut self: Box<Self>, err: ClientError) {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Err(err));
        }
    }

    fn is_closed(&self) -> bool {
        match &self.tx {
            Some(tx) => tx.is_closed(),
            None => true,
        }
    }
}

struct Entry {
    label: Option<String>,
    command: String,
    family: Option<Family>,
    pending: Box<dyn Pending>,
}

struct Queued {
    msg: Message,
    pending: Box<dyn Pending>,
}

/// Outstanding roundtrips of one connection.
#[derive(Default)]
pub(crate) struct Correlator {
    next_label: u64,
    in_flight: Vec<Entry>,
    queued: HashMap<Family, VecDeque<Queued>>,
}

impl Correlator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Number of requests waiting for a reply, queued ones excluded.
    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Register a request. Returns the message to send now, or `None` when
    /// it was queued behind another request of its family.
    pub(crate) fn submit(
        &mut self,
        msg: Message,
        family: Option<Family>,
        pending: Box<dyn Pending>,
        labeled: bool,
    ) -> Option<Message> {
        if let Some(family) = family {
            if self.in_flight.iter().any(|e| e.family == Some(family)) {
                trace!(?family, command = %msg.command, "queueing request");
                self.queued
                    .entry(family)
                    .or_default()
                    .push_back(Queued { msg, pending });
                return None;
            }
        }
        Some(self.start(msg, family, pending, labeled))
    }

    fn start(
        &mut self,
        mut msg: Message,
        family: Option<Family>,
        pending: Box<dyn Pending>,
        labeled: bool,
    ) -> Message {
        let label = labeled.then(|| {
            self.next_label += 1;
            self.next_label.to_string()
        });
        if let Some(label) = &label {
            msg.tags.insert("label".to_owned(), label.clone());
        }
        self.in_flight.push(Entry {
            label,
            command: msg.command.clone(),
            family,
            pending,
        });
        msg
    }

    /// Offer a dispatched message to every in-flight request.
    ///
    /// Returns queued requests that became sendable because the request
    /// ahead of them finished.
    pub(crate) fn feed(
        &mut self,
        inbound: &Inbound,
        ctx: &Context<'_>,
        labeled: bool,
    ) -> Vec<Message> {
        let label = inbound.label();
        let mut finished = Vec::new();
        let mut kept = Vec::with_capacity(self.in_flight.len());

        for mut entry in std::mem::take(&mut self.in_flight) {
            if entry.pending.is_closed() {
                finished.extend(entry.family);
                continue;
            }
            if let (Some(got), Some(want)) = (label, entry.label.as_deref()) {
                if got != want {
                    kept.push(entry);
                    continue;
                }
            }
            if let Some(err) = command_error(&inbound.message, &entry.command) {
                finished.extend(entry.family);
                entry.pending.fail(err);
                continue;
            }
            if entry.pending.feed(inbound, ctx) {
                finished.extend(entry.family);
                continue;
            }
            kept.push(entry);
        }
        self.in_flight = kept;

        finished
            .into_iter()
            .filter_map(|family| self.promote(family, labeled))
            .collect()
    }

    fn promote(&mut self, family: Family, labeled: bool) -> Option<Message> {
        let queue = self.queued.get_mut(&family)?;
        while let Some(next) = queue.pop_front() {
            if next.pending.is_closed() {
                continue;
            }
            return Some(self.start(next.msg, Some(family), next.pending, labeled));
        }
        None
    }

    /// Reject every in-flight and queued request.
    pub(crate) fn fail_all(&mut self, err: &ClientError) {
        let queued = self.queued.drain().flat_map(|(_, q)| q).map(|q| q.pending);
        let in_flight = self.in_flight.drain(..).map(|e| e.pending);
        for pending in in_flight.chain(queued).collect::<Vec<_>>() {
            pending.fail(err.clone());
        }
    }
}

/// Recognise a generic error reply to `command`.
fn command_error(msg: &Message, command: &str) -> Option<ClientError> {
    let about = if msg.command == "FAIL" {
        msg.param(0)
    } else if msg.response().is_some_and(|r| r.is_command_error()) {
        msg.param(1)
    } else {
        None
    };
    about
        .filter(|c| c.eq_ignore_ascii_case(command))
        .map(|_| ClientError::irc(msg.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use crate::state::Session;

    fn inbound(line: &str) -> Inbound {
        Inbound::new(line.parse().unwrap())
    }

    fn waiter<T: Send + 'static>(
        done: impl FnMut(&Inbound, &Context<'_>) -> Result<Option<T>, ClientError> + Send + 'static,
    ) -> (Box<dyn Pending>, oneshot::Receiver<Result<T, ClientError>>) {
        let (tx, rx) = oneshot::channel();
        (Box::new(Waiter::new(done, tx)), rx)
    }

    fn on_command(cmd: &'static str) -> impl FnMut(&Inbound, &Context<'_>) -> Result<Option<Message>, ClientError> + Send {
        move |inbound, _| Ok((inbound.message.command == cmd).then(|| inbound.message.clone()))
    }

    #[test]
    fn test_resolves_on_match() {
        let session = Session::new(&ClientConfig::new("irc://h", "me"));
        let mut correlator = Correlator::new();
        let (pending, mut rx) = waiter(on_command("PONG"));
        let sent = correlator.submit(Message::new("PING", ["x"]), None, pending, false);
        assert_eq!(sent.unwrap().tags.len(), 0);

        correlator.feed(&inbound("NOTICE me :hi"), &session.context(), false);
        assert!(rx.try_recv().is_err());
        correlator.feed(&inbound(":srv PONG srv x"), &session.context(), false);
        assert_eq!(rx.try_recv().unwrap().unwrap().command, "PONG");
        assert_eq!(correlator.in_flight(), 0);
    }

    #[test]
    fn test_labels_filter_replies() {
        let session = Session::new(&ClientConfig::new("irc://h", "me"));
        let mut correlator = Correlator::new();
        let (pending, mut rx) = waiter(on_command("PONG"));
        let sent = correlator
            .submit(Message::new("PING", ["x"]), None, pending, true)
            .unwrap();
        assert_eq!(sent.label(), Some("1"));

        correlator.feed(&inbound("@label=9 :srv PONG srv x"), &session.context(), true);
        assert!(rx.try_recv().is_err());
        correlator.feed(&inbound(":srv PONG srv x"), &session.context(), true);
        assert!(rx.try_recv().unwrap().is_ok());
    }

    #[test]
    fn test_generic_errors_reject() {
        let session = Session::new(&ClientConfig::new("irc://h", "me"));
        let mut correlator = Correlator::new();

        let (pending, mut fail_rx) = waiter(on_command("NEVER"));
        correlator.submit(Message::new("CHATHISTORY", ["LATEST"]), None, pending, false);
        let (pending, mut numeric_rx) = waiter(on_command("NEVER"));
        correlator.submit(Message::new("SETNAME", ["x"]), None, pending, false);

        correlator.feed(
            &inbound(":srv FAIL CHATHISTORY INVALID_TARGET LATEST :Messages could not be retrieved"),
            &session.context(),
            false,
        );
        let err = fail_rx.try_recv().unwrap().unwrap_err();
        assert_eq!(err.irc_message().unwrap().command, "FAIL");
        assert!(numeric_rx.try_recv().is_err());

        correlator.feed(
            &inbound(":srv 421 me SETNAME :Unknown command"),
            &session.context(),
            false,
        );
        assert_eq!(
            numeric_rx.try_recv().unwrap().unwrap_err().to_string(),
            "Unknown command"
        );
    }

    #[test]
    fn test_family_queue_is_fifo() {
        let session = Session::new(&ClientConfig::new("irc://h", "me"));
        let mut correlator = Correlator::new();

        let (first, mut first_rx) = waiter(on_command("315"));
        let (second, _second_rx) = waiter(on_command("315"));
        assert!(correlator
            .submit(Message::new("WHO", ["#a"]), Some(Family::Who), first, false)
            .is_some());
        assert!(correlator
            .submit(Message::new("WHO", ["#b"]), Some(Family::Who), second, false)
            .is_none());

        let next = correlator.feed(&inbound(":srv 352 me #a u h s n H :0 r"), &session.context(), false);
        assert!(next.is_empty());
        let next = correlator.feed(&inbound(":srv 315 me #a :End of WHO"), &session.context(), false);
        assert!(first_rx.try_recv().unwrap().is_ok());
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].params, vec!["#b"]);
        assert_eq!(correlator.in_flight(), 1);
    }

    #[test]
    fn test_dropped_waiters_are_skipped() {
        let session = Session::new(&ClientConfig::new("irc://h", "me"));
        let mut correlator = Correlator::new();
        let (first, first_rx) = waiter(on_command("315"));
        let (second, second_rx) = waiter(on_command("315"));
        let (third, _third_rx) = waiter(on_command("315"));
        correlator.submit(Message::new("WHO", ["#a"]), Some(Family::Who), first, false);
        correlator.submit(Message::new("WHO", ["#b"]), Some(Family::Who), second, false);
        correlator.submit(Message::new("WHO", ["#c"]), Some(Family::Who), third, false);
        drop(first_rx);
        drop(second_rx);

        let next = correlator.feed(&inbound("NOTICE me :x"), &session.context(), false);
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].params, vec!["#c"]);
    }

    #[test]
    fn test_fail_all() {
        let mut correlator = Correlator::new();
        let (first, mut first_rx) = waiter(on_command("315"));
        let (second, mut second_rx) = waiter(on_command("315"));
        correlator.submit(Message::new("WHO", ["#a"]), Some(Family::Who), first, false);
        correlator.submit(Message::new("WHO", ["#b"]), Some(Family::Who), second, false);

        correlator.fail_all(&ClientError::ConnectionClosed);
        assert!(matches!(
            first_rx.try_recv().unwrap(),
            Err(ClientError::ConnectionClosed)
        ));
        assert!(matches!(
            second_rx.try_recv().unwrap(),
            Err(ClientError::ConnectionClosed)
        ));
        assert_eq!(correlator.in_flight(), 0);
    }
}
