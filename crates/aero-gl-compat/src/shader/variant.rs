//! Data-driven shader variant selection.
//!
//! Variant names are a base followed by `_`-separated attribute tokens, e.g. `position_tex_color`.
//! A [`VariantTable`] lists the bases, the tokens with the vertex capabilities each one implies and
//! requires, and name prefixes that are always passed through untouched.

use crate::vertex::VertexFormatCaps;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantToken {
    pub name: String,
    /// Capability that makes the token worth adding to a bare base name.
    pub implies: VertexFormatCaps,
    /// Capabilities the vertex format must provide for the token to stay in a qualified name.
    pub requires: VertexFormatCaps,
    /// Whether the token is appended when expanding a bare base name.
    pub expandable: bool,
}

impl VariantToken {
    pub fn new(name: &str, implies: VertexFormatCaps, requires: VertexFormatCaps, expandable: bool) -> Self {
        Self {
            name: name.to_string(),
            implies,
            requires,
            expandable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantTable {
    bases: Vec<String>,
    /// Table order is the order tokens are appended in.
    tokens: Vec<VariantToken>,
    passthrough_prefixes: Vec<String>,
}

impl Default for VariantTable {
    fn default() -> Self {
        use VertexFormatCaps as C;
        Self {
            bases: vec!["position".to_string()],
            tokens: vec![
                VariantToken::new("tex", C::UV0, C::UV0, true),
                // A constant color can stand in for a missing color attribute.
                VariantToken::new("color", C::COLOR, C::empty(), true),
                VariantToken::new("normal", C::NORMAL, C::NORMAL, true),
                VariantToken::new("lightmap", C::UV2, C::UV2, false),
                VariantToken::new("overlay", C::UV1, C::UV1, false),
            ],
            passthrough_prefixes: vec!["rendertype_".to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariantDecision {
    /// Name matched a pass-through prefix.
    Passthrough,
    /// Name is not built from known bases/tokens; used unchanged.
    Opaque,
    /// Name already matches the capabilities (or asks for less than they provide).
    Exact,
    /// Bare base name extended with tokens for the available attributes.
    Expanded,
    /// Tokens whose required attributes are missing were dropped.
    Downgraded { dropped: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVariant {
    pub key: String,
    pub decision: VariantDecision,
}

impl VariantTable {
    /// A table with no bases, tokens or prefixes: every name is opaque.
    pub fn empty() -> Self {
        Self {
            bases: Vec::new(),
            tokens: Vec::new(),
            passthrough_prefixes: Vec::new(),
        }
    }

    pub fn with_base(mut self, base: &str) -> Self {
        self.bases.push(base.to_string());
        self
    }

    pub fn with_token(mut self, token: VariantToken) -> Self {
        self.tokens.push(token);
        self
    }

    pub fn with_passthrough_prefix(mut self, prefix: &str) -> Self {
        self.passthrough_prefixes.push(prefix.to_string());
        self
    }

    pub fn token(&self, name: &str) -> Option<&VariantToken> {
        self.tokens.iter().find(|t| t.name == name)
    }

    /// Longest base that `name` is built on, plus the remaining token string.
    fn split_base<'a>(&self, name: &'a str) -> Option<(&'a str, &'a str)> {
        self.bases
            .iter()
            .filter_map(|base| {
                let rest = name.strip_prefix(base.as_str())?;
                if rest.is_empty() {
                    Some((&name[..base.len()], ""))
                } else {
                    rest.strip_prefix('_').map(|tokens| (&name[..base.len()], tokens))
                }
            })
            .max_by_key(|(base, _)| base.len())
    }

    /// Deterministically maps a requested name and the available vertex capabilities to a variant key.
    pub fn resolve(&self, name: &str, caps: VertexFormatCaps) -> ResolvedVariant {
        if self
            .passthrough_prefixes
            .iter()
            .any(|prefix| name.starts_with(prefix.as_str()))
        {
            return ResolvedVariant {
                key: name.to_string(),
                decision: VariantDecision::Passthrough,
            };
        }

        let opaque = || ResolvedVariant {
            key: name.to_string(),
            decision: VariantDecision::Opaque,
        };
        let Some((base, rest)) = self.split_base(name) else {
            return opaque();
        };

        if rest.is_empty() {
            let mut key = base.to_string();
            let base_parts: Vec<&str> = base.split('_').collect();
            for token in self.tokens.iter().filter(|t| t.expandable) {
                if base_parts.contains(&token.name.as_str()) {
                    continue;
                }
                if !token.implies.is_empty() && caps.contains(token.implies) {
                    key.push('_');
                    key.push_str(&token.name);
                }
            }
            let decision = if key.len() == base.len() {
                VariantDecision::Exact
            } else {
                VariantDecision::Expanded
            };
            return ResolvedVariant { key, decision };
        }

        let mut tokens = Vec::new();
        for part in rest.split('_') {
            match self.token(part) {
                Some(token) => tokens.push(token),
                None => return opaque(),
            }
        }

        let mut key = base.to_string();
        let mut dropped = Vec::new();
        for token in tokens {
            if caps.contains(token.requires) {
                key.push('_');
                key.push_str(&token.name);
            } else {
                dropped.push(token.name.clone());
            }
        }
        let decision = if dropped.is_empty() {
            VariantDecision::Exact
        } else {
            VariantDecision::Downgraded { dropped }
        };
        ResolvedVariant { key, decision }
    }
}
