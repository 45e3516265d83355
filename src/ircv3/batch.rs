//! IRCv3 batches.
//!
//! A batch opens with `BATCH +ref type params...` and closes with
//! `BATCH -ref`. Messages inside carry a `batch=ref` tag, and batches may
//! nest through the same tag on the opening line.
//!
//! # Reference
//! - <https://ircv3.net/specs/extensions/batch>

use std::collections::HashMap;
use std::sync::Arc;

use crate::message::Message;

/// One open (or just closed) batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Batch {
    /// Reference name, unique among open batches.
    pub name: String,
    /// Batch type, e.g. `chathistory`.
    pub kind: String,
    /// Type-specific parameters.
    pub params: Vec<String>,
    /// Tags of the opening `BATCH` line.
    pub tags: HashMap<String, String>,
    /// Enclosing batch, if nested.
    pub parent: Option<Arc<Batch>>,
}

impl Batch {
    /// Iterate over this batch and its enclosing batches, innermost first.
    pub fn ancestry(&self) -> impl Iterator<Item = &Batch> {
        std::iter::successors(Some(self), |b| b.parent.as_deref())
    }

    /// Whether this batch is, or is nested inside, the batch `name`.
    pub fn is_within(&self, name: &str) -> bool {
        self.ancestry().any(|b| b.name == name)
    }

    /// The outermost batch of this chain.
    pub fn root(&self) -> &Batch {
        self.ancestry().last().unwrap_or(self)
    }

    /// The labeled-response label found along the ancestry.
    pub fn label(&self) -> Option<&str> {
        self.ancestry().find_map(|b| b.tags.get("label").map(String::as_str))
    }
}

/// Open batches of one connection.
#[derive(Clone, Debug, Default)]
pub struct BatchTracker {
    open: HashMap<String, Arc<Batch>>,
}

impl BatchTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an open batch by reference.
    pub fn get(&self, name: &str) -> Option<&Arc<Batch>> {
        self.open.get(name)
    }

    /// The batch a message belongs to, through its `batch` tag.
    pub fn batch_of(&self, msg: &Message) -> Option<Arc<Batch>> {
        msg.batch_ref().and_then(|r| self.open.get(r)).cloned()
    }

    /// Record the batch opened by `BATCH +ref`.
    ///
    /// Returns `None` for anything that is not a well-formed opening line.
    pub fn open(&mut self, msg: &Message) -> Option<Arc<Batch>> {
        let name = msg.param(0)?.strip_prefix('+')?;
        let kind = msg.param(1)?;
        let batch = Arc::new(Batch {
            name: name.to_owned(),
            kind: kind.to_owned(),
            params: msg.params[2..].to_vec(),
            tags: msg.tags.clone(),
            parent: self.batch_of(msg),
        });
        self.open.insert(batch.name.clone(), batch.clone());
        Some(batch)
    }

    /// The batch a `BATCH -ref` line closes, left open until [`Self::remove`].
    ///
    /// Deletion is a separate step so that listeners can still resolve the
    /// closing message's batch.
    pub fn closing(&self, msg: &Message) -> Option<Arc<Batch>> {
        let name = msg.param(0)?.strip_prefix('-')?;
        self.open.get(name).cloned()
    }

    /// Forget a batch.
    pub fn remove(&mut self, name: &str) -> Option<Arc<Batch>> {
        self.open.remove(name)
    }

    /// Number of open batches.
    pub fn len(&self) -> usize {
        self.open.len()
    }

    /// Whether no batch is open.
    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }

    /// Drop every open batch.
    pub fn clear(&mut self) {
        self.open.clear();
    }
}
