//! Request/reply ordering
//!
//! Requestor and Responsor sockets strictly alternate their two operations.
//! Calling one out of turn poisons the socket; the owner must rebuild it.

use crate::error::{Result, TransportError};
use parking_lot::Mutex;
use std::fmt;

/// Position of a request/reply socket in its exchange cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    /// Ready for the opening operation (send for a Requestor, receive for a Responsor)
    Idle,
    /// Opening operation done; the closing operation must come next
    AwaitingReply,
    /// An operation was called out of turn
    Poisoned,
}

impl fmt::Display for ExchangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExchangeState::Idle => write!(f, "idle"),
            ExchangeState::AwaitingReply => write!(f, "awaiting reply"),
            ExchangeState::Poisoned => write!(f, "poisoned"),
        }
    }
}

pub(crate) struct Exchange {
    role: &'static str,
    state: Mutex<ExchangeState>,
}

impl Exchange {
    pub(crate) fn new(role: &'static str) -> Self {
        Self {
            role,
            state: Mutex::new(ExchangeState::Idle),
        }
    }

    pub(crate) fn state(&self) -> ExchangeState {
        *self.state.lock()
    }

    /// Fail unless the socket is in `expected`; poisons on mismatch
    pub(crate) fn check(&self, operation: &'static str, expected: ExchangeState) -> Result<()> {
        let mut state = self.state.lock();
        if *state == expected {
            Ok(())
        } else {
            Err(self.poison(&mut state, operation))
        }
    }

    /// Move `from` -> `to`; poisons on mismatch
    pub(crate) fn transition(
        &self,
        operation: &'static str,
        from: ExchangeState,
        to: ExchangeState,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if *state == from {
            *state = to;
            Ok(())
        } else {
            Err(self.poison(&mut state, operation))
        }
    }

    fn poison(&self, state: &mut ExchangeState, operation: &'static str) -> TransportError {
        let observed = *state;
        *state = ExchangeState::Poisoned;
        tracing::warn!(
            role = self.role,
            operation,
            state = %observed,
            "Request/reply order violated, socket poisoned"
        );
        TransportError::ProtocolViolation {
            role: self.role,
            operation,
            state: observed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alternation() {
        let exchange = Exchange::new("Requestor");
        exchange
            .transition("send_request", ExchangeState::Idle, ExchangeState::AwaitingReply)
            .unwrap();
        exchange
            .check("receive_response", ExchangeState::AwaitingReply)
            .unwrap();
        exchange
            .transition("receive_response", ExchangeState::AwaitingReply, ExchangeState::Idle)
            .unwrap();
        assert_eq!(exchange.state(), ExchangeState::Idle);
    }

    #[test]
    fn test_out_of_turn_poisons_permanently() {
        let exchange = Exchange::new("Responsor");
        let err = exchange
            .transition("send_response", ExchangeState::AwaitingReply, ExchangeState::Idle)
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(exchange.state(), ExchangeState::Poisoned);

        // Every later call keeps failing and reports the poisoned state
        let err = exchange.check("receive_request", ExchangeState::Idle).unwrap_err();
        assert!(matches!(
            err,
            TransportError::ProtocolViolation {
                state: ExchangeState::Poisoned,
                ..
            }
        ));
    }
}
