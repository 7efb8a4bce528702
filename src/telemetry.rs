//! Structured reporting for invariant failures and operational alerts.
//!
//! The engine never silently repairs a broken ring. When it refuses an operation because the
//! ring or the kill log is inconsistent, or because it could not get the transaction lock in
//! time, it reports an [`EngineViolation`] to a [`ViolationObserver`] before returning the error.
//! Violations are structured data that can be:
//!
//! - Logged via tracing (the default, [`TracingObserver`])
//! - Collected programmatically for testing ([`CollectingObserver`])
//! - Forwarded to an operator alert channel (your own observer)
//!
//! # Example
//!
//! ```
//! use sockwars_ring::telemetry::{CollectingObserver, ViolationKind};
//! use std::sync::Arc;
//!
//! let observer = Arc::new(CollectingObserver::new());
//! assert!(!observer.has_violation(ViolationKind::Ring));
//! ```

use crate::KillId;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Severity of a violation. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    /// The operation was refused but state is intact; retrying may succeed.
    ///
    /// Example: lock contention past the configured timeout.
    Warning,
    /// The operation failed for a reason an operator should look at.
    ///
    /// Example: the storage layer returned an I/O error.
    Error,
    /// Persisted state is inconsistent. Further mutations will keep failing until an operator
    /// intervenes.
    ///
    /// Example: the ring splits into two cycles.
    Critical,
}

impl ViolationSeverity {
    /// Stable lowercase label used in log fields and JSON.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The subsystem a violation was detected in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ViolationKind {
    /// The assignment ring is not a single cycle over the active set, or an edge needed for a
    /// mutation is missing.
    Ring,
    /// The kill log disagrees with the ring (for example the tail entry's victim still has an
    /// outgoing edge).
    KillLog,
    /// A participant referenced by the ring or the log is missing from the roster.
    Roster,
    /// The backing store failed.
    Storage,
    /// A transaction lock could not be acquired within its timeout.
    Contention,
    /// An [`EngineConfig`](crate::EngineConfig) was rejected by the builder.
    Configuration,
    /// A checked type's invariants were broken (see [`InvariantChecker`]).
    Invariant,
}

impl ViolationKind {
    /// Stable snake_case label, matching the serialized form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ring => "ring",
            Self::KillLog => "kill_log",
            Self::Roster => "roster",
            Self::Storage => "storage",
            Self::Contention => "contention",
            Self::Configuration => "configuration",
            Self::Invariant => "invariant",
        }
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded violation with enough context to diagnose it.
///
/// # Example
///
/// ```
/// use sockwars_ring::telemetry::{EngineViolation, ViolationKind, ViolationSeverity};
/// use sockwars_ring::KillId;
///
/// let violation = EngineViolation::new(
///     ViolationSeverity::Critical,
///     ViolationKind::KillLog,
///     "victim of tail entry is still active",
///     "engine.rs:10",
/// )
/// .with_kill(KillId::new(7))
/// .with_context("eliminated", "bo");
///
/// let json = violation.to_json().unwrap();
/// assert!(json.contains(r#""kind":"kill_log""#));
/// assert!(json.contains(r#""kill_id":7"#));
/// ```
#[derive(Debug, Clone, serde::Serialize)]
pub struct EngineViolation {
    /// How urgently an operator needs to act.
    pub severity: ViolationSeverity,
    /// The subsystem that noticed the problem.
    pub kind: ViolationKind,
    /// What went wrong, in one line.
    pub message: String,
    /// `file:line` of the report.
    pub location: &'static str,
    /// The kill-log entry involved, if any.
    pub kill_id: Option<KillId>,
    /// Extra key-value pairs (participant ids, lock mode...).
    pub context: BTreeMap<String, String>,
}

impl EngineViolation {
    /// Creates a new violation.
    #[must_use]
    pub fn new(
        severity: ViolationSeverity,
        kind: ViolationKind,
        message: impl Into<String>,
        location: &'static str,
    ) -> Self {
        Self {
            severity,
            kind,
            message: message.into(),
            location,
            kill_id: None,
            context: BTreeMap::new(),
        }
    }

    /// Sets the kill-log entry involved.
    #[must_use]
    pub fn with_kill(mut self, kill_id: KillId) -> Self {
        self.kill_id = Some(kill_id);
        self
    }

    /// Attaches one key-value pair of context. A repeated key keeps the last value.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let (key, value) = (key.into(), value.into());
        self.context.insert(key, value);
        self
    }

    /// Serializes this violation to a JSON string. Returns `None` if serialization fails.
    #[must_use]
    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }

    /// Like [`to_json`](Self::to_json), but pretty-printed.
    #[must_use]
    pub fn to_json_pretty(&self) -> Option<String> {
        serde_json::to_string_pretty(self).ok()
    }
}

impl std::fmt::Display for EngineViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Self {
            severity,
            kind,
            message,
            location,
            kill_id,
            context,
        } = self;
        write!(f, "[{severity}/{kind}] {message} (at {location}")?;
        if let Some(kill_id) = kill_id {
            write!(f, ", kill_id={kill_id}")?;
        }
        for (key, value) in context {
            write!(f, ", {key}={value}")?;
        }
        f.write_str(")")
    }
}

/// Observes violations as they are reported.
///
/// Observers are shared with the engine, which may be called from many threads at once.
///
/// ```
/// use sockwars_ring::telemetry::{EngineViolation, ViolationObserver};
///
/// struct PageTheOperator;
///
/// impl ViolationObserver for PageTheOperator {
///     fn on_violation(&self, violation: &EngineViolation) {
///         // push to an alert channel
///         let _ = violation.to_json();
///     }
/// }
/// ```
pub trait ViolationObserver: Send + Sync {
    /// Called when a violation is detected. Keep it quick: it runs inside the failing operation.
    fn on_violation(&self, violation: &EngineViolation);
}

/// Default observer: logs via `tracing` with structured fields.
///
/// - `Warning` → `tracing::warn!`
/// - `Error` and `Critical` → `tracing::error!`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl TracingObserver {
    /// The tracing observer. It has no state; `TracingObserver` itself works too.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn format_kill(kill_id: Option<KillId>) -> String {
        kill_id.map_or_else(|| "null".to_owned(), |id| id.to_string())
    }

    fn format_context(context: &BTreeMap<String, String>) -> String {
        if context.is_empty() {
            return "{}".to_owned();
        }
        let pairs: Vec<String> = context.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        format!("{{{}}}", pairs.join(", "))
    }
}

impl ViolationObserver for TracingObserver {
    fn on_violation(&self, violation: &EngineViolation) {
        let EngineViolation {
            severity,
            kind,
            location,
            ..
        } = violation;
        let (severity, kind) = (severity.as_str(), kind.as_str());
        let kill_id = Self::format_kill(violation.kill_id);
        let context = Self::format_context(&violation.context);

        match violation.severity {
            ViolationSeverity::Warning => {
                tracing::warn!(
                    severity,
                    kind,
                    location,
                    kill_id = %kill_id,
                    context = %context,
                    "{}",
                    violation.message
                );
            }
            ViolationSeverity::Error | ViolationSeverity::Critical => {
                tracing::error!(
                    severity,
                    kind,
                    location,
                    kill_id = %kill_id,
                    context = %context,
                    "{}",
                    violation.message
                );
            }
        }
    }
}

/// Observer that stores every violation, for assertions in tests.
///
/// ```
/// use sockwars_ring::telemetry::{
///     CollectingObserver, EngineViolation, ViolationKind, ViolationObserver, ViolationSeverity,
/// };
///
/// let observer = CollectingObserver::new();
/// observer.on_violation(&EngineViolation::new(
///     ViolationSeverity::Warning,
///     ViolationKind::Contention,
///     "write lock timed out",
///     "test.rs:1",
/// ));
/// assert_eq!(observer.len(), 1);
/// assert!(observer.has_violation(ViolationKind::Contention));
/// ```
#[derive(Debug, Default)]
pub struct CollectingObserver {
    violations: Mutex<Vec<EngineViolation>>,
}

impl CollectingObserver {
    /// An observer that has seen nothing yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything reported so far, oldest first.
    #[must_use]
    pub fn violations(&self) -> Vec<EngineViolation> {
        self.violations.lock().clone()
    }

    /// How many violations were reported.
    #[must_use]
    pub fn len(&self) -> usize {
        self.violations.lock().len()
    }

    /// `true` until the first report.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.violations.lock().is_empty()
    }

    /// Whether any report had this kind.
    #[must_use]
    pub fn has_violation(&self, kind: ViolationKind) -> bool {
        self.any(|reported| reported.kind == kind)
    }

    /// Whether any report had this severity.
    #[must_use]
    pub fn has_severity(&self, severity: ViolationSeverity) -> bool {
        self.any(|reported| reported.severity == severity)
    }

    /// The reports of one kind, oldest first.
    #[must_use]
    pub fn violations_of_kind(&self, kind: ViolationKind) -> Vec<EngineViolation> {
        let reported = self.violations.lock();
        reported.iter().filter(|v| v.kind == kind).cloned().collect()
    }

    /// Forgets everything reported so far.
    pub fn clear(&self) {
        self.violations.lock().clear();
    }

    fn any(&self, predicate: impl Fn(&EngineViolation) -> bool) -> bool {
        self.violations.lock().iter().any(predicate)
    }
}

impl ViolationObserver for CollectingObserver {
    fn on_violation(&self, violation: &EngineViolation) {
        let mut reported = self.violations.lock();
        reported.push(violation.clone());
    }
}

/// Forwards violations to several observers, e.g. tracing plus an alert channel.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn ViolationObserver>>,
}

impl CompositeObserver {
    /// A composite that forwards nowhere until observers are added with [`with`](Self::with).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one more destination.
    #[must_use]
    pub fn with(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Number of destinations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// `true` if reports go nowhere.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl FromIterator<Arc<dyn ViolationObserver>> for CompositeObserver {
    fn from_iter<I: IntoIterator<Item = Arc<dyn ViolationObserver>>>(iter: I) -> Self {
        Self {
            observers: iter.into_iter().collect(),
        }
    }
}

impl ViolationObserver for CompositeObserver {
    fn on_violation(&self, violation: &EngineViolation) {
        self.observers
            .iter()
            .for_each(|destination| destination.on_violation(violation));
    }
}

impl std::fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CompositeObserver({} destinations)", self.observers.len())
    }
}

/// Sends `violation` to `observer`, or to [`TracingObserver`] when there is none.
pub fn report_to_observer(
    observer: Option<&Arc<dyn ViolationObserver>>,
    violation: &EngineViolation,
) {
    if let Some(observer) = observer {
        observer.on_violation(violation);
    } else {
        TracingObserver.on_violation(violation);
    }
}

/// Reports a violation through [`TracingObserver`], capturing the call site.
///
/// ```
/// use sockwars_ring::{report_violation, telemetry::{ViolationKind, ViolationSeverity}};
///
/// report_violation!(ViolationSeverity::Warning, ViolationKind::Ring,
///     "ring has {} nodes", 3);
/// ```
#[macro_export]
macro_rules! report_violation {
    ($severity:expr, $kind:expr, $($message:tt)+) => {
        $crate::telemetry::report_to_observer(
            None,
            &$crate::telemetry::EngineViolation::new(
                $severity,
                $kind,
                format!($($message)+),
                concat!(file!(), ":", line!()),
            ),
        )
    };
}

/// Reports a violation through an `Option<Arc<dyn ViolationObserver>>`, falling back to
/// [`TracingObserver`].
#[macro_export]
macro_rules! report_violation_to {
    ($observer:expr, $severity:expr, $kind:expr, $($message:tt)+) => {
        $crate::telemetry::report_to_observer(
            $observer.as_ref(),
            &$crate::telemetry::EngineViolation::new(
                $severity,
                $kind,
                format!($($message)+),
                concat!(file!(), ":", line!()),
            ),
        )
    };
}

/// Fails the test if the collecting observer saw anything.
#[macro_export]
macro_rules! assert_no_violations {
    ($observer:expr) => {{
        let seen = $observer.violations();
        assert!(seen.is_empty(), "{} unexpected violation(s): {:#?}", seen.len(), seen);
    }};
}

/// Fails the test unless the collecting observer saw a violation of `kind`.
#[macro_export]
macro_rules! assert_violation {
    ($observer:expr, $kind:expr) => {{
        let kind = $kind;
        assert!(
            $observer.has_violation(kind),
            "no {} violation among {:#?}",
            kind,
            $observer.violations()
        );
    }};
}

/// Description of a broken invariant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize)]
pub struct InvariantViolation {
    /// The structure that is broken: `Ring`, `KillLog`, `Roster` or a store name.
    pub type_name: &'static str,
    /// The rule that does not hold.
    pub invariant: String,
    /// Ids and edges involved, for the operator.
    pub details: Option<String>,
}

impl InvariantViolation {
    /// A violation of `invariant` in `type_name`, without details yet.
    #[must_use]
    pub fn new(type_name: &'static str, invariant: impl Into<String>) -> Self {
        Self {
            type_name,
            invariant: invariant.into(),
            details: None,
        }
    }

    /// Replaces the details.
    #[must_use]
    pub fn with_details(self, details: impl Into<String>) -> Self {
        Self {
            details: Some(details.into()),
            ..self
        }
    }

    /// JSON form for alert payloads. `None` only if serialization fails.
    #[must_use]
    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.details {
            Some(details) => write!(f, "{}: {} ({})", self.type_name, self.invariant, details),
            None => write!(f, "{}: {}", self.type_name, self.invariant),
        }
    }
}

/// Types that maintain internal invariants checkable at runtime.
///
/// ```
/// use sockwars_ring::telemetry::{InvariantChecker, InvariantViolation};
///
/// struct Survivors(usize);
///
/// impl InvariantChecker for Survivors {
///     fn check_invariants(&self) -> Result<(), InvariantViolation> {
///         if self.0 == 0 {
///             return Err(InvariantViolation::new("Survivors", "a game always has a survivor"));
///         }
///         Ok(())
///     }
/// }
/// ```
pub trait InvariantChecker {
    /// Returns `Ok(())` if all invariants hold, or the first broken one.
    fn check_invariants(&self) -> Result<(), InvariantViolation>;
}

/// Checks invariants in debug builds (or with the `paranoid` feature) and reports failures at
/// `Critical` through an `Option<Arc<dyn ViolationObserver>>`. Compiles to nothing otherwise.
///
/// The check only reports. It never turns a result into an error.
#[macro_export]
#[cfg(any(debug_assertions, feature = "paranoid"))]
macro_rules! debug_check_invariants {
    ($observer:expr, $checked:expr, $stage:expr) => {
        if let Err(broken) = $crate::telemetry::InvariantChecker::check_invariants(&$checked) {
            $crate::report_violation_to!(
                $observer,
                $crate::telemetry::ViolationSeverity::Critical,
                $crate::telemetry::ViolationKind::Invariant,
                "{} ({})",
                broken,
                $stage
            );
        }
    };
}

/// Release builds without `paranoid`: the check is skipped entirely.
#[macro_export]
#[cfg(not(any(debug_assertions, feature = "paranoid")))]
macro_rules! debug_check_invariants {
    ($observer:expr, $checked:expr, $stage:expr) => {};
}
