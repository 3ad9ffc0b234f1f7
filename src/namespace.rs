/*
** This file is a part of Iksom (lazy streaming XML object model)
** Copyright (C) 2025 Gurer Ozen
**
** Iksom is free software: you can redistribute it and/or modify it
** under the terms of the GNU Lesser General Public License as
** published by the Free Software Foundation, either version 3 of
** the License, or (at your option) any later version.
*/

use crate::event::Namespace;

pub const XML_PREFIX: &str = "xml";
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";
pub const XMLNS_PREFIX: &str = "xmlns";

/// Scoped prefix to namespace URI bindings.
///
/// Sinks keep one of these to track which declarations are visible at
/// the current output position. The `xml` prefix is always bound.
#[derive(Clone, Debug, Default)]
pub struct NamespaceContext {
    bindings: Vec<Namespace>,
    scopes: Vec<usize>,
}

impl NamespaceContext {
    pub fn new() -> NamespaceContext {
        NamespaceContext::default()
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(self.bindings.len());
    }

    /// Drops the bindings of the innermost scope.
    pub fn pop_scope(&mut self) {
        if let Some(len) = self.scopes.pop() {
            self.bindings.truncate(len);
        }
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    pub fn bind(&mut self, prefix: &str, uri: &str) {
        self.bindings.push(Namespace::new(prefix, uri));
    }

    /// Returns the URI bound to the prefix, the empty prefix being the
    /// default namespace.
    pub fn namespace_uri(&self, prefix: &str) -> Option<&str> {
        if prefix == XML_PREFIX {
            return Some(XML_NAMESPACE);
        }
        self.bindings
            .iter()
            .rev()
            .find(|ns| ns.prefix == prefix)
            .map(|ns| ns.uri.as_str())
    }

    /// Returns a non-empty prefix currently bound to the URI.
    pub fn prefix<'a>(&'a self, uri: &'a str) -> Option<&'a str> {
        if uri == XML_NAMESPACE {
            return Some(XML_PREFIX);
        }
        self.prefixes(uri).next()
    }

    /// Iterates over the non-empty prefixes bound to the URI and not
    /// shadowed by an inner declaration.
    pub fn prefixes<'a>(&'a self, uri: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.bindings
            .iter()
            .rev()
            .filter(move |ns| !ns.prefix.is_empty() && ns.uri == uri)
            .map(|ns| ns.prefix.as_str())
            .filter(move |prefix| self.namespace_uri(prefix) == Some(uri))
    }

    /// Checks if the prefix is bound to the URI.
    ///
    /// An unbound default namespace is the same as the empty URI.
    pub fn is_bound(&self, prefix: &str, uri: &str) -> bool {
        match self.namespace_uri(prefix) {
            Some(bound) => bound == uri,
            None => prefix.is_empty() && uri.is_empty(),
        }
    }
}

/// Generates a fresh `nsN` prefix, skipping the taken ones.
pub fn generate_prefix(seq: &mut u32, is_taken: impl Fn(&str) -> bool) -> String {
    loop {
        let prefix = format!("ns{}", *seq);
        *seq += 1;
        if !is_taken(&prefix) {
            return prefix;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes() {
        let mut ctx = NamespaceContext::new();
        assert!(ctx.is_bound("", ""));
        assert_eq!(ctx.namespace_uri(XML_PREFIX), Some(XML_NAMESPACE));

        ctx.push_scope();
        ctx.bind("a", "urn:a");
        ctx.bind("", "urn:d");
        assert!(ctx.is_bound("a", "urn:a"));
        assert!(!ctx.is_bound("", ""));
        assert_eq!(ctx.prefix("urn:a"), Some("a"));

        ctx.push_scope();
        ctx.bind("a", "urn:other");
        ctx.bind("b", "urn:a");
        assert_eq!(ctx.namespace_uri("a"), Some("urn:other"));
        assert_eq!(ctx.prefix("urn:a"), Some("b"));
        assert_eq!(ctx.prefixes("urn:a").count(), 1);
        assert_eq!(ctx.depth(), 2);

        ctx.pop_scope();
        assert_eq!(ctx.namespace_uri("a"), Some("urn:a"));
        assert_eq!(ctx.namespace_uri("b"), None);

        ctx.pop_scope();
        assert_eq!(ctx.namespace_uri("a"), None);
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn prefix_of_computed_uri() {
        let mut ctx = NamespaceContext::new();
        ctx.push_scope();
        ctx.bind("p", "urn:p");
        let uri = format!("urn:{}", "p");
        assert_eq!(ctx.prefix(&uri), Some("p"));
        assert_eq!(ctx.prefix(&XML_NAMESPACE.to_string()), Some(XML_PREFIX));
        assert_eq!(ctx.prefix(&String::from("urn:q")), None);
    }

    #[test]
    fn prefix_generation() {
        let mut seq = 0;
        assert_eq!(generate_prefix(&mut seq, |_| false), "ns0");
        assert_eq!(generate_prefix(&mut seq, |p| p == "ns1" || p == "ns2"), "ns3");
        assert_eq!(seq, 4);
    }
}
