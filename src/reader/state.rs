//! Operation state machine for the tag access orchestrator.
//!
//! A read walks `Idle -> AcquiringHardware -> TagDetected -> Decoding ->
//! (Verifying) -> AnalyzingBehavior -> Decided -> Idle`. A write walks
//! `Idle -> Signing -> AcquiringHardware -> TagDetected -> Writing -> Decided -> Idle`.

/// Where the in-flight operation currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    /// No operation in flight.
    Idle,
    /// Waiting for the radio to find a tag.
    AcquiringHardware,
    /// Handle acquired, reading the tag contents.
    TagDetected,
    /// Parsing NDEF records.
    Decoding,
    /// Checking a signed payload.
    Verifying,
    /// Recording the access and running behavioral rules.
    AnalyzingBehavior,
    /// Building a signed payload for a write.
    Signing,
    /// Writing encoded bytes to the tag.
    Writing,
    /// Decision made; logs being written.
    Decided,
}

impl OperationState {
    pub fn label(&self) -> &'static str {
        match self {
            OperationState::Idle => "Idle",
            OperationState::AcquiringHardware => "Waiting for tag...",
            OperationState::TagDetected => "Tag detected",
            OperationState::Decoding => "Decoding...",
            OperationState::Verifying => "Verifying signature...",
            OperationState::AnalyzingBehavior => "Analyzing access pattern...",
            OperationState::Signing => "Signing...",
            OperationState::Writing => "Writing...",
            OperationState::Decided => "Decided",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels() {
        assert_eq!(OperationState::Idle.label(), "Idle");
        assert_eq!(OperationState::AcquiringHardware.label(), "Waiting for tag...");
        assert_eq!(OperationState::Verifying.label(), "Verifying signature...");
        assert_eq!(OperationState::Decided.label(), "Decided");
    }
}
