//! Plan Interrupts
//!
//! Cancel and skip requests reach a running plan through a side channel.
//! The execution loop polls it before each step; entries that are not an
//! interrupt are put back for whoever consumes the queue next.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::utils::text::is_one_of;

/// Utterances that cancel the running plan
pub const CANCEL_VOCABULARY: &[&str] = &[
    "cancel",
    "cancel that",
    "cancel it",
    "stop",
    "stop it",
    "abort",
    "never mind",
    "nevermind",
    "forget it",
];

/// Utterances that skip the next step
pub const SKIP_VOCABULARY: &[&str] = &["skip", "skip it", "skip that", "skip this step", "next"];

/// Utterances that pause a running plan at the next step boundary
pub const PAUSE_VOCABULARY: &[&str] = &["pause", "hold on", "wait", "hang on"];

/// Utterances that resume a paused plan
pub const RESUME_VOCABULARY: &[&str] = &["resume", "continue", "go on", "carry on", "keep going"];

/// What a poll found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptSignal {
    Cancel,
    Skip,
    None,
}

impl InterruptSignal {
    /// Classify one utterance against the interrupt vocabularies
    pub fn classify(text: &str) -> Self {
        if is_one_of(text, CANCEL_VOCABULARY) {
            InterruptSignal::Cancel
        } else if is_one_of(text, SKIP_VOCABULARY) {
            InterruptSignal::Skip
        } else {
            InterruptSignal::None
        }
    }
}

/// Source the execution loop polls between steps
pub trait InterruptSource: Send + Sync {
    fn poll_interrupt(&self) -> InterruptSignal;
}

/// Thread-safe FIFO of utterances that arrived while a plan was running
#[derive(Debug, Default)]
pub struct InterruptQueue {
    pending: Mutex<VecDeque<String>>,
}

impl InterruptQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, VecDeque<String>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, text: impl Into<String>) {
        self.entries().push_back(text.into());
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Remove and return everything still queued
    pub fn take_all(&self) -> Vec<String> {
        self.entries().drain(..).collect()
    }
}

impl InterruptSource for InterruptQueue {
    /// Drain the queue, consuming interrupt entries and re-queuing the rest
    /// in their original order. Cancel wins over skip.
    fn poll_interrupt(&self) -> InterruptSignal {
        let mut queue = self.entries();
        let mut signal = InterruptSignal::None;
        let mut kept = VecDeque::with_capacity(queue.len());

        for entry in queue.drain(..) {
            match InterruptSignal::classify(&entry) {
                InterruptSignal::Cancel => signal = InterruptSignal::Cancel,
                InterruptSignal::Skip if signal == InterruptSignal::None => {
                    signal = InterruptSignal::Skip
                }
                InterruptSignal::Skip => {}
                InterruptSignal::None => kept.push_back(entry),
            }
        }

        *queue = kept;
        signal
    }
}
