// stepviz - Step-by-step Program State Tracer
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Debug events and event requests.
//!
//! A debug backend raises [`Event`]s only for enabled [`EventRequest`]s and
//! delivers them in ordered batches ([`EventSet`]). Requests carry optional
//! thread and class filters; the trace engine relies on class filters to keep
//! events confined to the traced program's own types.

use serde::{Deserialize, Serialize};

use crate::types::{Location, ObjectId, ThreadId, ThreadInfo};

/// A single execution event raised by the target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum Event {
    /// The target finished starting up
    VmStart,
    /// The target is terminating
    VmDeath,
    /// A thread started
    ThreadStart {
        /// The new thread
        thread: ThreadInfo,
    },
    /// A thread finished
    ThreadDeath {
        /// The finished thread
        thread: ThreadInfo,
    },
    /// A method was entered
    MethodEntry {
        /// Executing thread
        thread: ThreadInfo,
        /// Location of the entered method
        location: Location,
    },
    /// A method is about to return
    MethodExit {
        /// Executing thread
        thread: ThreadInfo,
        /// Location of the returning method
        location: Location,
    },
    /// A single step completed
    Step {
        /// Executing thread
        thread: ThreadInfo,
        /// Location after the step
        location: Location,
    },
    /// An exception was thrown
    Exception {
        /// Throwing thread
        thread: ThreadInfo,
        /// Throw location
        location: Location,
        /// The thrown object
        exception: ObjectId,
        /// Runtime type name of the thrown object
        exception_type: String,
        /// Where the exception will be caught, `None` if uncaught
        catch_location: Option<Location>,
    },
}

impl Event {
    /// The thread this event belongs to, if any
    pub fn thread(&self) -> Option<&ThreadInfo> {
        match self {
            Self::VmStart | Self::VmDeath => None,
            Self::ThreadStart { thread }
            | Self::ThreadDeath { thread }
            | Self::MethodEntry { thread, .. }
            | Self::MethodExit { thread, .. }
            | Self::Step { thread, .. }
            | Self::Exception { thread, .. } => Some(thread),
        }
    }

    /// The code location of this event, if it has one
    pub fn location(&self) -> Option<&Location> {
        match self {
            Self::MethodEntry { location, .. }
            | Self::MethodExit { location, .. }
            | Self::Step { location, .. }
            | Self::Exception { location, .. } => Some(location),
            _ => None,
        }
    }

    /// Whether this event is tied to a code location
    pub fn is_locatable(&self) -> bool {
        self.location().is_some()
    }

    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::VmStart => "vm-start",
            Self::VmDeath => "vm-death",
            Self::ThreadStart { .. } => "thread-start",
            Self::ThreadDeath { .. } => "thread-death",
            Self::MethodEntry { .. } => "method-entry",
            Self::MethodExit { .. } => "method-exit",
            Self::Step { .. } => "step",
            Self::Exception { .. } => "exception",
        }
    }
}

/// An ordered batch of events delivered together
#[derive(Debug, Clone, Default, PartialEq, derive_more::Deref, derive_more::DerefMut)]
pub struct EventSet(pub Vec<Event>);

impl IntoIterator for EventSet {
    type Item = Event;
    type IntoIter = std::vec::IntoIter<Event>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl FromIterator<Event> for EventSet {
    fn from_iter<T: IntoIterator<Item = Event>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Which threads are suspended when a requested event fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SuspendPolicy {
    /// Nothing is suspended
    None,
    /// Only the thread raising the event is suspended
    EventThread,
    /// Every thread is suspended
    All,
}

/// Granularity of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepSize {
    /// Smallest step the runtime supports
    Min,
    /// One source line
    Line,
}

/// Call-depth behavior of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepDepth {
    /// Step into called methods
    Into,
    /// Step over called methods
    Over,
    /// Step out of the current method
    Out,
}

/// What an [`EventRequest`] subscribes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RequestKind {
    /// Target termination
    VmDeath,
    /// Thread starts
    ThreadStart,
    /// Thread ends
    ThreadDeath,
    /// Method entries
    MethodEntry,
    /// Method exits
    MethodExit,
    /// Single steps
    Step {
        /// Step granularity
        size: StepSize,
        /// Step depth
        depth: StepDepth,
    },
    /// Thrown exceptions
    Exception {
        /// Report exceptions that will be caught
        caught: bool,
        /// Report exceptions that will not be caught
        uncaught: bool,
    },
}

/// A subscription to a family of events
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventRequest {
    /// Subscribed event family
    pub kind: RequestKind,
    /// Suspension applied when the event fires
    pub suspend: SuspendPolicy,
    /// Only report events of this thread
    pub thread: Option<ThreadId>,
    /// Only report events located in this type (`*` suffix matches a prefix)
    pub class_filter: Option<String>,
}

impl EventRequest {
    /// A request with no filters that suspends the event thread
    pub fn new(kind: RequestKind) -> Self {
        Self { kind, suspend: SuspendPolicy::EventThread, thread: None, class_filter: None }
    }

    /// Set the suspend policy
    pub fn with_suspend(mut self, suspend: SuspendPolicy) -> Self {
        self.suspend = suspend;
        self
    }

    /// Restrict the request to one thread
    pub fn with_thread(mut self, thread: ThreadId) -> Self {
        self.thread = Some(thread);
        self
    }

    /// Restrict the request to one type
    pub fn with_class_filter(mut self, class: impl Into<String>) -> Self {
        self.class_filter = Some(class.into());
        self
    }

    /// Whether `event` satisfies this request
    pub fn matches(&self, event: &Event) -> bool {
        let kind_matches = match (&self.kind, event) {
            (RequestKind::VmDeath, Event::VmDeath) => true,
            (RequestKind::ThreadStart, Event::ThreadStart { .. }) => true,
            (RequestKind::ThreadDeath, Event::ThreadDeath { .. }) => true,
            (RequestKind::MethodEntry, Event::MethodEntry { .. }) => true,
            (RequestKind::MethodExit, Event::MethodExit { .. }) => true,
            (RequestKind::Step { .. }, Event::Step { .. }) => true,
            (
                RequestKind::Exception { caught, uncaught },
                Event::Exception { catch_location, .. },
            ) => {
                if catch_location.is_some() {
                    *caught
                } else {
                    *uncaught
                }
            }
            _ => false,
        };
        if !kind_matches {
            return false;
        }

        if let Some(thread) = self.thread {
            if event.thread().map(|t| t.id) != Some(thread) {
                return false;
            }
        }

        match (&self.class_filter, event.location()) {
            (None, _) => true,
            (Some(filter), Some(location)) => class_filter_matches(filter, &location.type_name),
            (Some(_), None) => false,
        }
    }
}

/// Match a type name against a class filter pattern
fn class_filter_matches(filter: &str, type_name: &str) -> bool {
    match filter.strip_suffix('*') {
        Some(prefix) => type_name.starts_with(prefix),
        None => filter == type_name,
    }
}
