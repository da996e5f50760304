//! Value types shared by the scheduler, the timeline synthesizer and the
//! display sink.

use serde::ser::SerializeTuple;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::GptuberError;

// ---------------------------------------------------------------------------
// ActionSource
// ---------------------------------------------------------------------------

/// Who produced an [`Action`]. Agent actions always dequeue first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionSource {
    Streamer,
    Agent,
}

impl ActionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionSource::Streamer => "streamer",
            ActionSource::Agent => "agent",
        }
    }
}

impl fmt::Display for ActionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionSource {
    type Err = GptuberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "streamer" => Ok(ActionSource::Streamer),
            "agent" => Ok(ActionSource::Agent),
            other => Err(GptuberError::InvalidSource(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// One unit of schedulable speech. Fields are private so an action cannot be
/// altered once it has been reserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(default = "Uuid::new_v4")]
    id: Uuid,
    text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    query_to_external_agent: Option<String>,
    source: ActionSource,
}

impl Action {
    pub fn new(
        text: impl Into<String>,
        query_to_external_agent: Option<String>,
        source: ActionSource,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            query_to_external_agent,
            source,
        }
    }

    /// An utterance by the streamer, optionally asking the smart agent something.
    pub fn streamer(text: impl Into<String>, query: Option<String>) -> Self {
        Self::new(text, query, ActionSource::Streamer)
    }

    /// A log line relayed from the smart agent.
    pub fn agent(text: impl Into<String>) -> Self {
        Self::new(text, None, ActionSource::Agent)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn query_to_external_agent(&self) -> Option<&str> {
        self.query_to_external_agent.as_deref()
    }

    pub fn source(&self) -> ActionSource {
        self.source
    }

    /// Re-tag an action produced by content generation as a streamer action.
    pub fn into_streamer(self) -> Self {
        Self {
            source: ActionSource::Streamer,
            ..self
        }
    }
}

// ---------------------------------------------------------------------------
// ChatMessage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub author: String,
    pub text: String,
}

impl ChatMessage {
    pub fn new(author: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            text: text.into(),
        }
    }

    /// Messages with nothing to say are dropped before they reach a report.
    pub fn is_well_formed(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

// ---------------------------------------------------------------------------
// SpeechMode
// ---------------------------------------------------------------------------

/// Voice selection handed to the speech collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpeechMode {
    NeuralJp,
    ClassicJp,
    ClassicEn,
}

impl SpeechMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpeechMode::NeuralJp => "neural-jp",
            SpeechMode::ClassicJp => "classic-jp",
            SpeechMode::ClassicEn => "classic-en",
        }
    }

    /// Mode used to voice an action from `source`.
    pub fn for_source(source: ActionSource, neural: bool) -> Self {
        match source {
            ActionSource::Streamer if neural => SpeechMode::NeuralJp,
            ActionSource::Streamer => SpeechMode::ClassicJp,
            ActionSource::Agent => SpeechMode::ClassicEn,
        }
    }
}

// ---------------------------------------------------------------------------
// TimelineEvent
// ---------------------------------------------------------------------------

/// One caption change. Serialized as `[offset, caption, expression]` to match
/// what the front end consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEvent {
    pub offset_seconds: f64,
    pub caption: String,
    pub expression: Option<String>,
}

impl TimelineEvent {
    /// The trailing event that clears the caption.
    pub fn is_clear(&self) -> bool {
        self.caption.is_empty() && self.expression.is_none()
    }
}

impl Serialize for TimelineEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tup = serializer.serialize_tuple(3)?;
        tup.serialize_element(&self.offset_seconds)?;
        tup.serialize_element(&self.caption)?;
        tup.serialize_element(&self.expression)?;
        tup.end()
    }
}

// ---------------------------------------------------------------------------
// DisplayMessage
// ---------------------------------------------------------------------------

/// Messages pushed to the display front end.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DisplayMessage {
    Subtitle { timeline: Vec<TimelineEvent> },
}

impl DisplayMessage {
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
