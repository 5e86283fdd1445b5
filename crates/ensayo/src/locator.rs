//! Locators and the resolver.
//!
//! A [`Locator`] is an immutable description: a parsed selector plus an
//! optional parent scope. Nothing is cached; every use re-resolves against the
//! snapshot at hand, so results never outlive the step that asked for them.
//!
//! # Strictness
//!
//! [`Resolver::one`] fails when a selector matches several elements. Tests are
//! expected to narrow with a scope (the product card that contains "Carrot")
//! rather than pick by position.

use std::fmt;
use std::sync::Arc;

use crate::dom::{Document, NodeId};
use crate::result::{EnsayoError, EnsayoResult, MatchCount};
use crate::selector::Selector;

/// Lazy, scoped element description
#[derive(Debug, Clone)]
pub struct Locator {
    selector: Arc<Selector>,
    scope: Option<Arc<Locator>>,
}

impl Locator {
    /// Create a root-level locator
    pub fn new(expression: &str) -> EnsayoResult<Self> {
        Ok(Self::from_selector(Selector::parse(expression)?))
    }

    /// Create a root-level locator from a parsed selector
    #[must_use]
    pub fn from_selector(selector: Selector) -> Self {
        Self {
            selector: Arc::new(selector),
            scope: None,
        }
    }

    /// Create a locator that searches inside this one's matches
    pub fn locator(&self, expression: &str) -> EnsayoResult<Self> {
        Ok(self.scoped(Selector::parse(expression)?))
    }

    /// Scoped child from a parsed selector
    #[must_use]
    pub fn scoped(&self, selector: Selector) -> Self {
        Self {
            selector: Arc::new(selector),
            scope: Some(Arc::new(self.clone())),
        }
    }

    /// Own selector
    #[must_use]
    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Parent scope
    #[must_use]
    pub fn scope(&self) -> Option<&Self> {
        self.scope.as_deref()
    }

    /// Number of scopes above this locator
    #[must_use]
    pub fn depth(&self) -> usize {
        self.scope().map_or(0, |s| s.depth() + 1)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(scope) = self.scope() {
            write!(f, "{scope} >> ")?;
        }
        write!(f, "{}", self.selector)
    }
}

/// Resolves locators against one snapshot
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    doc: &'a Document,
    exclude: Option<NodeId>,
}

impl<'a> Resolver<'a> {
    /// Resolver over the whole document
    #[must_use]
    pub const fn new(doc: &'a Document) -> Self {
        Self { doc, exclude: None }
    }

    /// Hide the subtree of the element with this `id` from every query
    #[must_use]
    pub fn excluding_id(mut self, html_id: &str) -> Self {
        self.exclude = self.doc.find_by_id(html_id);
        self
    }

    /// Snapshot being resolved against
    #[must_use]
    pub const fn document(&self) -> &'a Document {
        self.doc
    }

    /// Root of the hidden subtree, when it exists in this snapshot
    #[must_use]
    pub const fn excluded(&self) -> Option<NodeId> {
        self.exclude
    }

    /// Normalised text of `node` without the hidden subtree
    #[must_use]
    pub fn text_of(&self, node: NodeId) -> String {
        self.doc.normalized_text_excluding(node, self.exclude)
    }

    /// Every match in document order; empty when the scope itself matches nothing
    #[must_use]
    pub fn all(&self, locator: &Locator) -> Vec<NodeId> {
        let roots = match locator.scope() {
            Some(scope) => self.all(scope),
            None => vec![self.doc.root()],
        };
        if roots.is_empty() {
            return roots;
        }
        locator.selector().query(self.doc, &roots, self.exclude)
    }

    /// Exactly one match
    pub fn one(&self, locator: &Locator) -> EnsayoResult<NodeId> {
        let found = self.all(locator);
        match found.as_slice() {
            [node] => Ok(*node),
            [] => Err(EnsayoError::Resolution {
                target: locator.to_string(),
                matched: MatchCount::Zero,
            }),
            many => Err(EnsayoError::Resolution {
                target: locator.to_string(),
                matched: MatchCount::Many(many.len()),
            }),
        }
    }

    /// Zero or one match; more than one is an error
    pub fn optional(&self, locator: &Locator) -> EnsayoResult<Option<NodeId>> {
        let found = self.all(locator);
        match found.as_slice() {
            [] => Ok(None),
            [node] => Ok(Some(*node)),
            many => Err(EnsayoError::Resolution {
                target: locator.to_string(),
                matched: MatchCount::Many(many.len()),
            }),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::dom::el;

    fn storefront() -> Document {
        let mut doc = Document::new();
        let body = doc.body();
        for name in ["Carrot - 1 Kg", "Mushroom - 1 Kg"] {
            doc.append(
                body,
                el("div")
                    .class("product")
                    .child(el("h4").class("product-name").text(name))
                    .child(el("input").class("quantity").value("1")),
            );
        }
        doc.append(body, el("div").id("ensayo-test-log").text("Carrot - 1 Kg"));
        doc
    }

    mod locator_tests {
        use super::*;

        #[test]
        fn test_scoped_display() {
            let card = Locator::new(".product:has-text(\"Carrot\")").unwrap();
            let qty = card.locator("input.quantity").unwrap();
            assert_eq!(
                qty.to_string(),
                ".product:has-text(\"Carrot\") >> input.quantity"
            );
            assert_eq!(qty.depth(), 1);
            assert_eq!(card.depth(), 0);
        }

        #[test]
        fn test_invalid_expression_is_rejected() {
            assert!(Locator::new("div[").is_err());
            let card = Locator::new(".product").unwrap();
            assert!(card.locator(":nope").is_err());
        }
    }

    mod resolver_tests {
        use super::*;

        #[test]
        fn test_scope_disambiguates() {
            let doc = storefront();
            let resolver = Resolver::new(&doc);
            let all_qty = Locator::new("input.quantity").unwrap();
            let err = resolver.one(&all_qty).unwrap_err();
            assert!(matches!(
                err,
                EnsayoError::Resolution {
                    matched: MatchCount::Many(2),
                    ..
                }
            ));

            let card = Locator::new(".product:has-text(\"Mushroom\")").unwrap();
            let qty = card.locator("input.quantity").unwrap();
            let node = resolver.one(&qty).unwrap();
            let card_node = resolver.one(&card).unwrap();
            assert!(doc.is_inclusive_ancestor(card_node, node));
        }

        #[test]
        fn test_zero_matches_is_resolution_error() {
            let doc = storefront();
            let loc = Locator::new(".cart-items").unwrap();
            let err = Resolver::new(&doc).one(&loc).unwrap_err();
            assert!(matches!(
                err,
                EnsayoError::Resolution {
                    matched: MatchCount::Zero,
                    ..
                }
            ));
        }

        #[test]
        fn test_missing_scope_yields_nothing() {
            let doc = storefront();
            let scope = Locator::new(".cart-preview").unwrap();
            let inner = scope.locator("li").unwrap();
            assert!(Resolver::new(&doc).all(&inner).is_empty());
        }

        #[test]
        fn test_overlay_is_excluded() {
            let doc = storefront();
            let loc = Locator::new("text=Carrot").unwrap();
            assert_eq!(Resolver::new(&doc).all(&loc).len(), 2);
            let resolver = Resolver::new(&doc).excluding_id("ensayo-test-log");
            assert_eq!(resolver.all(&loc).len(), 1);
        }

        #[test]
        fn test_optional() {
            let doc = storefront();
            let resolver = Resolver::new(&doc);
            assert!(resolver
                .optional(&Locator::new(".cart").unwrap())
                .unwrap()
                .is_none());
            assert!(resolver
                .optional(&Locator::new(".product:has-text(Carrot)").unwrap())
                .unwrap()
                .is_some());
            assert!(resolver
                .optional(&Locator::new(".product").unwrap())
                .is_err());
        }
    }
}
