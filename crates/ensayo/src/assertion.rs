//! Assertions against observed page state.
//!
//! An [`Assertion`] is evaluated exactly once against one snapshot. Retrying
//! is opt-in and lives in [`AssertionEngine::check_within`], which composes
//! the evaluation with the wait loop and reports the last failure seen.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::dom::{normalize_whitespace, Document, NodeId};
use crate::driver::PageDriver;
use crate::locator::{Locator, Resolver};
use crate::result::{EnsayoError, EnsayoResult};
use crate::wait::{Probe, Waiter};

/// Predicate family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssertionKind {
    /// Subtree text contains a substring
    ContainsText,
    /// Value or trimmed text equals exactly
    EqualsExact,
    /// Element is visible now
    IsVisible,
}

impl fmt::Display for AssertionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ContainsText => "contains_text",
            Self::EqualsExact => "equals_exact",
            Self::IsVisible => "is_visible",
        })
    }
}

/// Whether the predicate must hold or must not hold
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    /// Must hold
    #[default]
    Positive,
    /// Must not hold
    Negated,
}

impl Polarity {
    /// Flip
    #[must_use]
    pub const fn negate(self) -> Self {
        match self {
            Self::Positive => Self::Negated,
            Self::Negated => Self::Positive,
        }
    }

    const fn accepts(self, holds: bool) -> bool {
        match self {
            Self::Positive => holds,
            Self::Negated => !holds,
        }
    }
}

/// Condition to check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Case-sensitive, whitespace-normalised substring of the subtree text
    ContainsText(String),
    /// Strict equality with the form value, or the trimmed text otherwise
    EqualsExact(String),
    /// Resolves and is visible at the instant of the check
    IsVisible,
}

impl Predicate {
    /// Family of this predicate
    #[must_use]
    pub const fn kind(&self) -> AssertionKind {
        match self {
            Self::ContainsText(_) => AssertionKind::ContainsText,
            Self::EqualsExact(_) => AssertionKind::EqualsExact,
            Self::IsVisible => AssertionKind::IsVisible,
        }
    }

    fn expected(&self) -> String {
        match self {
            Self::ContainsText(s) | Self::EqualsExact(s) => s.clone(),
            Self::IsVisible => "visible".to_string(),
        }
    }
}

/// What the predicate is evaluated against
#[derive(Debug, Clone)]
pub enum AssertionTarget {
    /// Resolve on every evaluation
    Locator(Locator),
    /// A value read earlier
    Value {
        /// Name shown in failures
        label: String,
        /// The value
        value: String,
    },
}

impl fmt::Display for AssertionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Locator(loc) => write!(f, "{loc}"),
            Self::Value { label, .. } => write!(f, "value `{label}`"),
        }
    }
}

/// Structured assertion failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionFailure {
    /// Predicate family
    pub kind: AssertionKind,
    /// Target description
    pub target: String,
    /// Expected value or substring
    pub expected: String,
    /// What was observed, when it could be read
    pub actual: Option<String>,
    /// Polarity of the failed assertion
    pub polarity: Polarity,
}

impl fmt::Display for AssertionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let not = if self.polarity == Polarity::Negated {
            "not "
        } else {
            ""
        };
        let expectation = match self.kind {
            AssertionKind::ContainsText => format!("{not}to contain text {:?}", self.expected),
            AssertionKind::EqualsExact => format!("{not}to equal {:?}", self.expected),
            AssertionKind::IsVisible => format!("{not}to be visible"),
        };
        write!(f, "expected `{}` {expectation}", self.target)?;
        match &self.actual {
            Some(actual) => write!(f, ", actual {actual:?}"),
            None => Ok(()),
        }
    }
}

/// Target, predicate, and polarity
#[derive(Debug, Clone)]
pub struct Assertion {
    /// What is checked
    pub target: AssertionTarget,
    /// How
    pub predicate: Predicate,
    /// Must or must not hold
    pub polarity: Polarity,
}

impl Assertion {
    /// Positive assertion on a locator
    #[must_use]
    pub fn on(locator: &Locator, predicate: Predicate) -> Self {
        Self {
            target: AssertionTarget::Locator(locator.clone()),
            predicate,
            polarity: Polarity::Positive,
        }
    }

    /// Positive assertion on a value read earlier
    #[must_use]
    pub fn on_value(
        label: impl Into<String>,
        value: impl Into<String>,
        predicate: Predicate,
    ) -> Self {
        Self {
            target: AssertionTarget::Value {
                label: label.into(),
                value: value.into(),
            },
            predicate,
            polarity: Polarity::Positive,
        }
    }

    /// Flip the polarity
    #[must_use]
    pub const fn negated(mut self) -> Self {
        self.polarity = self.polarity.negate();
        self
    }

    /// Whether a snapshot is needed to evaluate
    #[must_use]
    pub const fn needs_document(&self) -> bool {
        matches!(self.target, AssertionTarget::Locator(_))
    }

    /// Evaluate against a snapshot
    ///
    /// Resolution problems surface as [`EnsayoError::Resolution`] whatever the
    /// polarity; only a resolved target can pass or fail.
    pub fn evaluate(&self, resolver: &Resolver<'_>) -> EnsayoResult<()> {
        let (holds, actual) = match (&self.target, &self.predicate) {
            (AssertionTarget::Locator(loc), Predicate::IsVisible) => {
                let doc = resolver.document();
                match resolver.optional(loc)? {
                    Some(node) if doc.is_visible(node) => (true, "visible".to_string()),
                    Some(_) => (false, "hidden".to_string()),
                    None => (false, "not attached".to_string()),
                }
            }
            (AssertionTarget::Value { .. }, Predicate::IsVisible) => {
                return Err(EnsayoError::scenario(format!(
                    "visibility cannot be asserted on {}",
                    self.target
                )));
            }
            (AssertionTarget::Locator(loc), Predicate::ContainsText(needle)) => {
                let node = resolver.one(loc)?;
                let text = resolver.text_of(node);
                (contains_normalized(&text, needle), text)
            }
            (AssertionTarget::Value { value, .. }, Predicate::ContainsText(needle)) => {
                let text = normalize_whitespace(value);
                (contains_normalized(&text, needle), text)
            }
            (AssertionTarget::Locator(loc), Predicate::EqualsExact(expected)) => {
                let node = resolver.one(loc)?;
                let actual = observed_value(resolver.document(), node, resolver.excluded());
                (actual == *expected, actual)
            }
            (AssertionTarget::Value { value, .. }, Predicate::EqualsExact(expected)) => {
                (value == expected, value.clone())
            }
        };

        if self.polarity.accepts(holds) {
            return Ok(());
        }
        Err(AssertionFailure {
            kind: self.predicate.kind(),
            target: self.target.to_string(),
            expected: self.predicate.expected(),
            actual: Some(actual),
            polarity: self.polarity,
        }
        .into())
    }
}

fn contains_normalized(text: &str, needle: &str) -> bool {
    text.contains(normalize_whitespace(needle).as_str())
}

/// Form value for controls, trimmed text otherwise
///
/// Text inside the `exclude` subtree is not part of an ancestor's value.
#[must_use]
pub fn observed_value(doc: &Document, node: NodeId, exclude: Option<NodeId>) -> String {
    match doc.element(node) {
        Some(el) if el.value.is_some() || is_form_control(&el.tag) => {
            el.value.clone().unwrap_or_default()
        }
        _ => doc.text_content_excluding(node, exclude).trim().to_string(),
    }
}

fn is_form_control(tag: &str) -> bool {
    matches!(tag, "input" | "textarea" | "select")
}

/// Evaluates assertions against a driver
#[derive(Debug)]
pub struct AssertionEngine<'a, D: PageDriver + ?Sized> {
    driver: &'a D,
    exclude_id: Option<String>,
}

impl<'a, D: PageDriver + ?Sized> AssertionEngine<'a, D> {
    /// Engine over `driver`
    #[must_use]
    pub const fn new(driver: &'a D) -> Self {
        Self {
            driver,
            exclude_id: None,
        }
    }

    /// Hide the subtree with this id from resolution
    #[must_use]
    pub fn excluding_id(mut self, html_id: impl Into<String>) -> Self {
        self.exclude_id = Some(html_id.into());
        self
    }

    /// Evaluate once, now
    pub async fn check(&self, assertion: &Assertion) -> EnsayoResult<()> {
        let result = if assertion.needs_document() {
            let doc = self.driver.snapshot().await?;
            let mut resolver = Resolver::new(&doc);
            if let Some(id) = &self.exclude_id {
                resolver = resolver.excluding_id(id);
            }
            assertion.evaluate(&resolver)
        } else {
            let empty = Document::new();
            assertion.evaluate(&Resolver::new(&empty))
        };
        match &result {
            Ok(()) => tracing::debug!(
                target = %assertion.target,
                kind = %assertion.predicate.kind(),
                "assertion passed"
            ),
            Err(err) => {
                tracing::debug!(target = %assertion.target, error = %err, "assertion failed");
            }
        }
        result
    }

    /// Re-evaluate until it passes; at the deadline raise the last failure
    ///
    /// Only assertion and resolution failures are retried. Anything else
    /// (a closed page, a bad selector) aborts immediately.
    pub async fn check_within(&self, assertion: &Assertion, waiter: &Waiter) -> EnsayoResult<()> {
        let target = assertion.target.to_string();
        let condition = assertion.predicate.kind().to_string();
        waiter
            .poll(&condition, &target, || async move {
                match self.check(assertion).await {
                    Ok(()) => Ok(Probe::Ready(())),
                    Err(err @ (EnsayoError::Assertion(_) | EnsayoError::Resolution { .. })) => {
                        Ok(Probe::Retry(err))
                    }
                    Err(err) => Err(err),
                }
            })
            .await
            .map(|_| ())
    }
}
