//! Routines: fixed, timed gesture sequences.
//!
//! A routine is data. Playing it issues each step through the serial writer
//! and then waits that step's delay; steps are never skipped or reordered and
//! a fired routine always runs to completion.

use crate::command::GestureCommand;
use crate::writer::CommandWriter;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutineStep {
    pub command: GestureCommand,
    /// Pause after the command before the next step.
    pub delay: Duration,
}

impl RoutineStep {
    pub fn new(command: GestureCommand, delay: Duration) -> Self {
        Self { command, delay }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routine {
    name: String,
    steps: Vec<RoutineStep>,
}

impl Routine {
    pub fn new(name: impl Into<String>, steps: Vec<RoutineStep>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }

    /// Same delay after every command.
    pub fn evenly_spaced(name: impl Into<String>, commands: &[GestureCommand], delay: Duration) -> Self {
        let steps = commands.iter().map(|c| RoutineStep::new(*c, delay)).collect();
        Self::new(name, steps)
    }

    /// A cheerful hello: nod, shake, surprise.
    pub fn greeting() -> Self {
        Self::evenly_spaced(
            "greeting",
            &[GestureCommand::Nod, GestureCommand::Shake, GestureCommand::Surprise],
            Duration::from_millis(2500),
        )
    }

    /// "Good luck on your coding journey."
    pub fn good_luck() -> Self {
        Self::evenly_spaced(
            "good_luck",
            &[
                GestureCommand::Nod,
                GestureCommand::LookUp,
                GestureCommand::LookDown,
                GestureCommand::Dance,
                GestureCommand::Surprise,
                GestureCommand::DanceAgain,
            ],
            Duration::from_millis(3000),
        )
    }

    /// Single nod after the assistant finishes a sentence.
    pub fn acknowledgement() -> Self {
        Self::new(
            "acknowledgement",
            vec![RoutineStep::new(GestureCommand::Nod, Duration::ZERO)],
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[RoutineStep] {
        &self.steps
    }

    pub fn commands(&self) -> Vec<GestureCommand> {
        self.steps.iter().map(|s| s.command).collect()
    }

    pub fn total_duration(&self) -> Duration {
        self.steps.iter().map(|s| s.delay).sum()
    }

    /// Play every step in order. Send failures are logged and the routine
    /// carries on; with no hardware each step is a fast no-op.
    /// Returns the number of steps the duck actually received.
    pub async fn play(&self, writer: &CommandWriter) -> usize {
        info!(target: "devduck::hardware", routine = %self.name, steps = self.steps.len(), "routine started");
        let mut delivered = 0;
        for step in &self.steps {
            match writer.send(step.command).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    debug!(target: "devduck::hardware", routine = %self.name, command = %step.command, error = %e, "routine step not delivered");
                }
            }
            if !step.delay.is_zero() {
                tokio::time::sleep(step.delay).await;
            }
        }
        info!(target: "devduck::hardware", routine = %self.name, delivered, "routine finished");
        delivered
    }
}

/// The routines the scheduler reacts with. Swap in faster variants for tests
/// or demos without touching the scheduler.
#[derive(Debug, Clone)]
pub struct RoutineBook {
    pub greeting: Routine,
    pub good_luck: Routine,
    pub acknowledgement: Routine,
}

impl Default for RoutineBook {
    fn default() -> Self {
        Self {
            greeting: Routine::greeting(),
            good_luck: Routine::good_luck(),
            acknowledgement: Routine::acknowledgement(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::SerialChannel;
    use crate::config::HardwareConfig;
    use crate::sim::SimulatedPorts;
    use std::sync::Arc;

    #[test]
    fn test_canonical_routines() {
        let greeting = Routine::greeting();
        assert_eq!(
            greeting.commands(),
            vec![GestureCommand::Nod, GestureCommand::Shake, GestureCommand::Surprise]
        );
        assert_eq!(greeting.total_duration(), Duration::from_millis(7500));

        let good_luck = Routine::good_luck();
        assert_eq!(good_luck.steps().len(), 6);
        assert_eq!(good_luck.steps()[5].command, GestureCommand::DanceAgain);
        assert_eq!(good_luck.total_duration(), Duration::from_secs(18));
    }

    #[tokio::test]
    async fn test_play_preserves_order() {
        let sim = Arc::new(SimulatedPorts::with_duck());
        let config = HardwareConfig {
            settle_delay_ms: 0,
            ..Default::default()
        };
        let channel = Arc::new(SerialChannel::new(config, sim.clone()));
        let writer = CommandWriter::spawn(channel, 4).unwrap();

        let routine = Routine::evenly_spaced(
            "quick_good_luck",
            &Routine::good_luck().commands(),
            Duration::from_millis(1),
        );
        let delivered = routine.play(&writer).await;
        assert_eq!(delivered, 6);
        assert_eq!(sim.wire().commands(), routine.commands());
        writer.shutdown().await;
    }
}
