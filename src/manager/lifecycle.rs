//! Finite state machine for the manager lifecycle.
//!
//! Every step of the bootstrap protocol is gated on the previous one:
//!
//! ```text
//! Unconstructed -> Constructed -> SchemeReady -> ControllersReady -> Running -> Stopped
//! ```
//!
//! Any failing step moves the manager to `Failed`, which is terminal. There is
//! no retry transition: the platform restarts the process instead.

use std::fmt;

/// Lifecycle phase of the reconciliation manager
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ManagerPhase {
    #[default]
    Unconstructed,
    Constructed,
    SchemeReady,
    ControllersReady,
    Running,
    Stopped,
    Failed,
}

impl ManagerPhase {
    /// Whether no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, ManagerPhase::Stopped | ManagerPhase::Failed)
    }
}

impl fmt::Display for ManagerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagerPhase::Unconstructed => write!(f, "Unconstructed"),
            ManagerPhase::Constructed => write!(f, "Constructed"),
            ManagerPhase::SchemeReady => write!(f, "SchemeReady"),
            ManagerPhase::ControllersReady => write!(f, "ControllersReady"),
            ManagerPhase::Running => write!(f, "Running"),
            ManagerPhase::Stopped => write!(f, "Stopped"),
            ManagerPhase::Failed => write!(f, "Failed"),
        }
    }
}

/// Events that move the manager between phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManagerEvent {
    /// Configuration validated and manager built
    Construct,
    /// Types registered into the scheme
    RegisterScheme,
    /// Controllers registered into the manager
    RegisterControllers,
    /// Run loop started
    Start,
    /// Termination signal handled
    Stop,
    /// Any step failed
    Fail,
}

impl fmt::Display for ManagerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManagerEvent::Construct => write!(f, "Construct"),
            ManagerEvent::RegisterScheme => write!(f, "RegisterScheme"),
            ManagerEvent::RegisterControllers => write!(f, "RegisterControllers"),
            ManagerEvent::Start => write!(f, "Start"),
            ManagerEvent::Stop => write!(f, "Stop"),
            ManagerEvent::Fail => write!(f, "Fail"),
        }
    }
}

/// A state transition definition
#[derive(Debug)]
pub struct Transition {
    pub from: ManagerPhase,
    pub to: ManagerPhase,
    pub event: ManagerEvent,
    pub description: &'static str,
}

impl Transition {
    const fn new(
        from: ManagerPhase,
        to: ManagerPhase,
        event: ManagerEvent,
        description: &'static str,
    ) -> Self {
        Self {
            from,
            to,
            event,
            description,
        }
    }
}

/// Result of attempting a state transition
#[derive(Debug, PartialEq, Eq)]
pub enum TransitionResult {
    Success {
        from: ManagerPhase,
        to: ManagerPhase,
        description: &'static str,
    },
    InvalidTransition {
        current: ManagerPhase,
        event: ManagerEvent,
    },
}

/// Transition table for the manager lifecycle
pub struct LifecycleStateMachine {
    transitions: Vec<Transition>,
}

impl Default for LifecycleStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleStateMachine {
    pub fn new() -> Self {
        use ManagerEvent as E;
        use ManagerPhase as P;

        Self {
            transitions: vec![
                Transition::new(P::Unconstructed, P::Constructed, E::Construct, "Manager built"),
                Transition::new(
                    P::Constructed,
                    P::SchemeReady,
                    E::RegisterScheme,
                    "Types registered into the scheme",
                ),
                Transition::new(
                    P::SchemeReady,
                    P::ControllersReady,
                    E::RegisterControllers,
                    "Controllers registered",
                ),
                Transition::new(P::ControllersReady, P::Running, E::Start, "Run loop started"),
                Transition::new(P::Running, P::Stopped, E::Stop, "Stopped on termination signal"),
                // === Failures ===
                Transition::new(P::Unconstructed, P::Failed, E::Fail, "Construction failed"),
                Transition::new(P::Constructed, P::Failed, E::Fail, "Scheme registration failed"),
                Transition::new(P::SchemeReady, P::Failed, E::Fail, "Controller registration failed"),
                Transition::new(P::ControllersReady, P::Failed, E::Fail, "Run loop failed to start"),
                Transition::new(P::Running, P::Failed, E::Fail, "Run loop exited abnormally"),
            ],
        }
    }

    /// Attempt a transition from `current` on `event`
    pub fn transition(&self, current: ManagerPhase, event: ManagerEvent) -> TransitionResult {
        match self
            .transitions
            .iter()
            .find(|t| t.from == current && t.event == event)
        {
            Some(t) => TransitionResult::Success {
                from: t.from,
                to: t.to,
                description: t.description,
            },
            None => TransitionResult::InvalidTransition { current, event },
        }
    }

    /// Check if a transition is valid
    pub fn can_transition(&self, from: ManagerPhase, event: ManagerEvent) -> bool {
        self.transitions
            .iter()
            .any(|t| t.from == from && t.event == event)
    }

    /// Get all valid events for a given phase
    pub fn valid_events(&self, phase: ManagerPhase) -> Vec<ManagerEvent> {
        self.transitions
            .iter()
            .filter(|t| t.from == phase)
            .map(|t| t.event)
            .collect()
    }
}
