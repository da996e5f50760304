//! Pending-action queue with agent priority.

use std::collections::VecDeque;

use crate::types::{Action, ActionSource};

/// Reserved actions waiting to be performed.
///
/// Agent actions always come out before streamer actions; within a source
/// the order of reservation is kept.
#[derive(Debug, Default)]
pub struct ActionQueue {
    agent: VecDeque<Action>,
    streamer: VecDeque<Action>,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: Action) {
        match action.source() {
            ActionSource::Agent => self.agent.push_back(action),
            ActionSource::Streamer => self.streamer.push_back(action),
        }
    }

    pub fn pop(&mut self) -> Option<Action> {
        self.agent
            .pop_front()
            .or_else(|| self.streamer.pop_front())
    }

    pub fn len(&self) -> usize {
        self.agent.len() + self.streamer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agent.is_empty() && self.streamer.is_empty()
    }

    pub fn len_of(&self, source: ActionSource) -> usize {
        match source {
            ActionSource::Agent => self.agent.len(),
            ActionSource::Streamer => self.streamer.len(),
        }
    }
}
