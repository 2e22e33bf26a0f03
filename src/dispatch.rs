//! Concurrent fan-out of one name to many checkers, with every failure
//! contained to the checker that produced it.

use std::any::Any;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread;

use tracing::{debug, warn};

use crate::probe::ProbeError;

/// Something that can tell whether a name exists in one registry.
///
/// Implemented for any `Fn(&str) -> Result<bool, ProbeError>` closure, so a
/// checker can be built from a plain function.
pub trait Probe: Send + Sync {
    /// Return `true` if `name` is already registered.
    ///
    /// # Errors
    ///
    /// Any [`ProbeError`]; the dispatcher reports it as [`Outcome::Failed`].
    fn probe(&self, name: &str) -> Result<bool, ProbeError>;
}

impl<F> Probe for F
where
    F: Fn(&str) -> Result<bool, ProbeError> + Send + Sync,
{
    fn probe(&self, name: &str) -> Result<bool, ProbeError> {
        self(name)
    }
}

/// A named probe. Checker names key the [`ResultSet`] and should be unique.
pub struct Checker<'a> {
    name: String,
    probe: Box<dyn Probe + 'a>,
}

impl<'a> Checker<'a> {
    /// Create a checker from a probe function.
    pub fn new<F>(name: impl Into<String>, probe: F) -> Self
    where
        F: Fn(&str) -> Result<bool, ProbeError> + Send + Sync + 'a,
    {
        Self::with_probe(name, probe)
    }

    /// Create a checker from any [`Probe`] implementation.
    pub fn with_probe(name: impl Into<String>, probe: impl Probe + 'a) -> Self {
        Self {
            name: name.into(),
            probe: Box::new(probe),
        }
    }

    /// The name this checker reports under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, candidate: &str) -> Outcome {
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.probe.probe(candidate)))
            .unwrap_or_else(|payload| Err(ProbeError::Panicked(panic_message(payload.as_ref()))));
        match &result {
            Ok(exists) => debug!(checker = %self.name, exists, "probe finished"),
            Err(ProbeError::Panicked(msg)) => warn!(checker = %self.name, %msg, "probe panicked"),
            Err(err) => debug!(checker = %self.name, error = %err, "probe failed"),
        }
        Outcome::from_result(result)
    }
}

impl fmt::Debug for Checker<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Checker")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

// `thread::Builder::name` panics on interior NUL bytes.
fn thread_name(checker: &str) -> String {
    format!("probe-{}", checker.replace('\0', "?"))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

/// The classified result of one checker.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[must_use]
pub enum Outcome {
    /// The name is free in this registry.
    Available,
    /// The name is already registered.
    Taken,
    /// The check could not be completed; holds a human-readable reason.
    Failed(String),
}

impl Outcome {
    /// Classify a probe result.
    pub fn from_result(result: Result<bool, ProbeError>) -> Self {
        match result {
            Ok(true) => Self::Taken,
            Ok(false) => Self::Available,
            Err(err) => err.into(),
        }
    }

    /// `true` only for [`Outcome::Available`].
    #[must_use]
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }

    /// `true` only for [`Outcome::Failed`].
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl From<ProbeError> for Outcome {
    fn from(err: ProbeError) -> Self {
        Self::Failed(err.to_string())
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available => f.write_str("Available"),
            Self::Taken => f.write_str("Taken"),
            Self::Failed(reason) => f.write_str(reason),
        }
    }
}

/// Outcome per checker name for one dispatch. Iteration order is
/// unspecified.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    outcomes: HashMap<String, Outcome>,
}

impl ResultSet {
    /// The outcome recorded for `checker`, if it took part.
    #[must_use]
    pub fn get(&self, checker: &str) -> Option<&Outcome> {
        self.outcomes.get(checker)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Iterate over `(checker name, outcome)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Outcome)> {
        self.outcomes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Take the underlying map.
    #[must_use]
    pub fn into_map(self) -> HashMap<String, Outcome> {
        self.outcomes
    }
}

/// Run every checker against `name` concurrently and collect one
/// [`Outcome`] per checker.
///
/// Each checker gets its own scoped thread and reports over a channel; the
/// calling thread is the only writer of the [`ResultSet`]. Blocks until
/// every checker has reported. Errors, panics and failed thread spawns all
/// become [`Outcome::Failed`] for that checker alone, so the result always
/// has one entry per distinct checker name. When two checkers share a name,
/// the first one listed wins.
///
/// `name` is passed to every probe untouched; callers should reject empty
/// names beforehand.
///
/// ```
/// use name_avail::dispatch::{Checker, Outcome, dispatch};
/// use name_avail::probe::ProbeError;
///
/// let checkers = vec![
///     Checker::new("always-free", |_: &str| Ok(false)),
///     Checker::new("broken", |_: &str| Err(ProbeError::MalformedResponse("eof".into()))),
/// ];
/// let results = dispatch("demo", &checkers);
/// assert_eq!(results.get("always-free"), Some(&Outcome::Available));
/// assert!(results.get("broken").is_some_and(Outcome::is_failed));
/// ```
pub fn dispatch(name: &str, checkers: &[Checker<'_>]) -> ResultSet {
    debug!(name, checkers = checkers.len(), "dispatching");
    let mut reported: Vec<Option<Outcome>> = vec![None; checkers.len()];
    let (tx, rx) = mpsc::channel::<(usize, Outcome)>();

    thread::scope(|s| {
        for (index, checker) in checkers.iter().enumerate() {
            let tx = tx.clone();
            let spawned = thread::Builder::new()
                .name(thread_name(checker.name()))
                .spawn_scoped(s, move || {
                    // The receiver outlives the scope, so this cannot fail.
                    let _ = tx.send((index, checker.run(name)));
                });
            if let Err(err) = spawned {
                warn!(checker = checker.name(), error = %err, "could not spawn probe thread");
                reported[index] = Some(ProbeError::Spawn(err).into());
            }
        }
        drop(tx);

        for (index, outcome) in rx {
            reported[index] = Some(outcome);
        }
    });

    let mut results = ResultSet::default();
    for (checker, outcome) in checkers.iter().zip(reported) {
        match results.outcomes.entry(checker.name().to_owned()) {
            Entry::Occupied(_) => {
                warn!(checker = checker.name(), "duplicate checker name, keeping the first result");
            }
            Entry::Vacant(slot) => {
                slot.insert(outcome.unwrap_or_else(|| {
                    Outcome::Failed("probe exited without reporting".to_owned())
                }));
            }
        }
    }
    results
}
