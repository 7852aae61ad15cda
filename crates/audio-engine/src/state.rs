use std::fmt;

/// Element and pipeline states, ordered from idle to running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum State {
    Null,
    Ready,
    Paused,
    Playing,
}

impl State {
    pub fn name(self) -> &'static str {
        match self {
            State::Null => "NULL",
            State::Ready => "READY",
            State::Paused => "PAUSED",
            State::Playing => "PLAYING",
        }
    }

    fn up(self) -> Option<State> {
        match self {
            State::Null => Some(State::Ready),
            State::Ready => Some(State::Paused),
            State::Paused => Some(State::Playing),
            State::Playing => None,
        }
    }

    fn down(self) -> Option<State> {
        match self {
            State::Null => None,
            State::Ready => Some(State::Null),
            State::Paused => Some(State::Ready),
            State::Playing => Some(State::Paused),
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single-step transition between adjacent states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChange {
    pub current: State,
    pub next: State,
}

impl StateChange {
    pub const NULL_TO_READY: StateChange = StateChange::new(State::Null, State::Ready);
    pub const READY_TO_PAUSED: StateChange = StateChange::new(State::Ready, State::Paused);
    pub const PAUSED_TO_PLAYING: StateChange = StateChange::new(State::Paused, State::Playing);
    pub const PLAYING_TO_PAUSED: StateChange = StateChange::new(State::Playing, State::Paused);
    pub const PAUSED_TO_READY: StateChange = StateChange::new(State::Paused, State::Ready);
    pub const READY_TO_NULL: StateChange = StateChange::new(State::Ready, State::Null);

    pub const fn new(current: State, next: State) -> Self {
        Self { current, next }
    }

    pub fn is_upward(&self) -> bool {
        self.next > self.current
    }

    /// Adjacent steps that walk `from` to `to`; empty when they are equal.
    pub fn steps(from: State, to: State) -> Vec<StateChange> {
        let mut out = Vec::new();
        let mut cur = from;
        while cur != to {
            let next = if to > cur { cur.up() } else { cur.down() };
            let Some(next) = next else { break };
            out.push(StateChange::new(cur, next));
            cur = next;
        }
        out
    }
}
