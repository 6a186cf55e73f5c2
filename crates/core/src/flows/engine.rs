use thiserror::Error;

use crate::flows::states::{FlowAction, FlowContext, FlowEvent, FlowState, TransitionOutcome};

pub trait FlowDefinition {
    fn initial_state(&self) -> FlowState;
    fn transition(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

/// Guest-facing recommendation session flow.
#[derive(Clone, Debug, Default)]
pub struct SessionFlow;

impl FlowDefinition for SessionFlow {
    fn initial_state(&self) -> FlowState {
        FlowState::Created
    }

    fn transition(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_session(current, event, context)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn initial_state(&self) -> FlowState {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &FlowState,
        event: &FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }
}

impl Default for FlowEngine<SessionFlow> {
    fn default() -> Self {
        Self::new(SessionFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: FlowState, event: FlowEvent },
    #[error("feedback already recorded, transition from {state:?} rejected")]
    FeedbackAlreadyRecorded { state: FlowState },
}

fn transition_session(
    current: &FlowState,
    event: &FlowEvent,
    context: &FlowContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use FlowAction::{AppendInitialContextTurn, InvokeGeneration, RecordFeedback, SendClosingMessage};
    use FlowEvent::{
        CloseRequested, ContextDeclared, CustomerMessage, FeedbackSubmitted, InactivityExpired,
    };
    use FlowState::{Active, Created, Ended};

    let (to, actions) = match (current, event) {
        // The setup handshake is the one activation path that does not start
        // from literal guest typing.
        (Created, ContextDeclared) => (Active, vec![AppendInitialContextTurn, InvokeGeneration]),
        (Created, CustomerMessage) | (Active, CustomerMessage) => (Active, vec![InvokeGeneration]),
        (Active, ContextDeclared) => (Active, vec![AppendInitialContextTurn, InvokeGeneration]),
        (Created, FeedbackSubmitted) | (Active, FeedbackSubmitted) => {
            if context.feedback_recorded {
                return Err(FlowTransitionError::FeedbackAlreadyRecorded { state: *current });
            }
            (Ended, vec![RecordFeedback, SendClosingMessage])
        }
        (Created, CloseRequested) | (Active, CloseRequested) => (Ended, vec![SendClosingMessage]),
        (Created, InactivityExpired) | (Active, InactivityExpired) => (Ended, Vec::new()),
        (Ended, _) => {
            return Err(FlowTransitionError::InvalidTransition {
                state: *current,
                event: event.clone(),
            });
        }
    };

    Ok(TransitionOutcome { from: *current, to, event: event.clone(), actions })
}
