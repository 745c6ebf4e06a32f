// src/exec/classify.rs

use std::fmt;

use regex::Regex;

use crate::config::ConfigSection;
use crate::errors::{PkgmakeError, Result};
use crate::exec::action::BuildOutput;

/// Scheduling-relevant result of one build attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    Success,
    /// Nothing to do; satisfies dependents like a success.
    Skipped,
    Failed,
    Interrupted,
}

impl fmt::Display for BuildOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BuildOutcome::Success => "PASS",
            BuildOutcome::Skipped => "SKIP",
            BuildOutcome::Failed => "FAIL",
            BuildOutcome::Interrupted => "INTERRUPTED",
        };
        f.write_str(s)
    }
}

/// Maps exit code + output onto a [`BuildOutcome`].
///
/// A build the action killed on cancellation is always interrupted.
/// Patterns only apply to non-zero exits: a "no rule for target" message
/// is a skip, the build tool's own interrupt line is an interruption,
/// anything else is a failure.
#[derive(Debug, Clone)]
pub struct OutputClassifier {
    skip: Regex,
    interrupt: Regex,
}

impl OutputClassifier {
    pub fn new(skip_pattern: &str, interrupt_pattern: &str) -> Result<Self> {
        let compile = |key: &str, pattern: &str| {
            Regex::new(pattern).map_err(|e| {
                PkgmakeError::ConfigError(format!("invalid {key} regex {pattern:?}: {e}"))
            })
        };
        Ok(Self {
            skip: compile("skip_pattern", skip_pattern)?,
            interrupt: compile("interrupt_pattern", interrupt_pattern)?,
        })
    }

    pub fn from_config(cfg: &ConfigSection) -> Result<Self> {
        Self::new(&cfg.skip_pattern, &cfg.interrupt_pattern)
    }

    pub fn classify(&self, out: &BuildOutput) -> BuildOutcome {
        if out.interrupted {
            BuildOutcome::Interrupted
        } else if out.success() {
            BuildOutcome::Success
        } else if self.skip.is_match(&out.output) {
            BuildOutcome::Skipped
        } else if self.interrupt.is_match(&out.output) {
            BuildOutcome::Interrupted
        } else {
            BuildOutcome::Failed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> OutputClassifier {
        OutputClassifier::from_config(&ConfigSection::default()).unwrap()
    }

    #[test]
    fn zero_exit_is_success_regardless_of_output() {
        let c = classifier();
        assert_eq!(
            c.classify(&BuildOutput::new(0, "make: *** No rule to make target 'test'")),
            BuildOutcome::Success
        );
    }

    #[test]
    fn no_rule_for_target_is_a_skip() {
        let c = classifier();
        let out = BuildOutput::new(2, "make: *** No rule to make target 'test'.  Stop.");
        assert_eq!(c.classify(&out), BuildOutcome::Skipped);
    }

    #[test]
    fn interrupt_message_is_an_interruption() {
        let c = classifier();
        let out = BuildOutput::new(130, "make: *** [all] Interrupt");
        assert_eq!(c.classify(&out), BuildOutcome::Interrupted);
    }

    #[test]
    fn nested_make_interrupt_is_an_interruption() {
        let c = classifier();
        let out = BuildOutput::new(2, "cc -c x.c\nmake[2]: *** [Makefile:4: x.o] Interrupt\n");
        assert_eq!(c.classify(&out), BuildOutcome::Interrupted);
    }

    #[test]
    fn killed_build_is_interrupted_whatever_its_output() {
        let c = classifier();
        assert_eq!(
            c.classify(&BuildOutput::interrupted("half a line")),
            BuildOutcome::Interrupted
        );
    }

    #[test]
    fn error_mentioning_interrupt_in_a_path_is_a_failure() {
        let c = classifier();
        let out = BuildOutput::new(
            2,
            "src/irq/interrupt_table.c:12: error: expected ';' before '}' token\nmake: *** [all] Error 2\n",
        );
        assert_eq!(c.classify(&out), BuildOutcome::Failed);
    }

    #[test]
    fn other_nonzero_exit_is_a_failure() {
        let c = classifier();
        let out = BuildOutput::new(1, "main.c:3: error: expected ';'");
        assert_eq!(c.classify(&out), BuildOutcome::Failed);
    }

    #[test]
    fn bad_pattern_is_a_config_error() {
        assert!(matches!(
            OutputClassifier::new("(", "x"),
            Err(PkgmakeError::ConfigError(_))
        ));
    }
}
