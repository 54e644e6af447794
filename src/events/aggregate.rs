use uuid::Uuid;

// ============================================================================
// Aggregate Root Pattern
// ============================================================================
//
// Key Principles:
// 1. Commands are validated against current state before anything changes
// 2. A valid command yields events; events are facts that already happened
// 3. State only changes by applying events
// 4. The stored row is a snapshot of the aggregate after the last event
//
// ============================================================================

/// Generic Aggregate trait
///
/// Type Parameters:
/// - `Event`: The domain event type for this aggregate
/// - `Command`: The command type for this aggregate
/// - `Error`: The error type for business rule violations
pub trait Aggregate: Sized + Send + Sync {
    type Event;
    type Command;
    type Error;

    /// Create new aggregate from first event
    fn apply_first_event(event: &Self::Event) -> Result<Self, Self::Error>;

    /// Apply subsequent events to update state
    fn apply_event(&mut self, event: &Self::Event) -> Result<(), Self::Error>;

    /// Handle command and emit events (business logic)
    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;

    /// Get aggregate ID
    fn aggregate_id(&self) -> Uuid;

    /// Get current version (sequence number of the last applied event)
    fn version(&self) -> i64;

    /// Handle a command and apply the resulting events in one step.
    ///
    /// Nothing is applied when the command is rejected.
    fn execute(&mut self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        let events = self.handle_command(command)?;
        for event in &events {
            self.apply_event(event)?;
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Counter {
        id: Uuid,
        version: i64,
        value: i64,
    }

    enum CounterCommand {
        Add(i64),
    }

    enum CounterEvent {
        Started,
        Added(i64),
    }

    impl Aggregate for Counter {
        type Event = CounterEvent;
        type Command = CounterCommand;
        type Error = String;

        fn apply_first_event(event: &Self::Event) -> Result<Self, Self::Error> {
            match event {
                CounterEvent::Started => Ok(Self { id: Uuid::new_v4(), version: 1, value: 0 }),
                _ => Err("not started".to_string()),
            }
        }

        fn apply_event(&mut self, event: &Self::Event) -> Result<(), Self::Error> {
            if let CounterEvent::Added(n) = event {
                self.value += n;
            }
            self.version += 1;
            Ok(())
        }

        fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
            match command {
                CounterCommand::Add(n) if *n < 0 => Err("negative".to_string()),
                CounterCommand::Add(n) => Ok(vec![CounterEvent::Added(*n)]),
            }
        }

        fn aggregate_id(&self) -> Uuid {
            self.id
        }

        fn version(&self) -> i64 {
            self.version
        }
    }

    #[test]
    fn test_execute_applies_emitted_events() {
        let mut counter = Counter::apply_first_event(&CounterEvent::Started).unwrap();
        let events = counter.execute(&CounterCommand::Add(3)).unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(counter.value, 3);
        assert_eq!(counter.version(), 2);
    }

    #[test]
    fn test_rejected_command_leaves_state_untouched() {
        let mut counter = Counter::apply_first_event(&CounterEvent::Started).unwrap();
        let result = counter.execute(&CounterCommand::Add(-1));

        assert!(result.is_err());
        assert_eq!(counter.value, 0);
        assert_eq!(counter.version(), 1);
    }
}
