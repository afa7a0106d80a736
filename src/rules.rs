//! Ordered match rules that decide exclusion and permission overrides for
//! each entry visited during a copy or install.
//!
//! Evaluation is pure: a [`MatchRuleSet`] is built once from parsed
//! arguments and then queried with full source paths.
use globset::{GlobBuilder, GlobMatcher};
use regex::{Regex, RegexBuilder};

use crate::error::{DeployError, Result};
use crate::permissions::Mode;
use crate::platform::Platform;

#[derive(Debug, Clone)]
enum Matcher {
    /// `PATTERN`: a glob that must match a trailing run of whole path
    /// components.
    Glob(GlobMatcher),
    /// `REGEX`: searched anywhere in the full path.
    Regex(Regex),
}

/// A compiled pattern with its exclude flag and permission override.
#[derive(Debug, Clone)]
pub struct MatchRule {
    matcher: Matcher,
    expression: String,
    exclude: bool,
    permissions: Mode,
}

impl MatchRule {
    /// Compile a `PATTERN` glob.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Argument`] if the glob is malformed.
    pub fn pattern(glob: &str, platform: &Platform) -> Result<Self> {
        let matcher = GlobBuilder::new(&format!("**/{glob}"))
            .literal_separator(true)
            .case_insensitive(platform.case_insensitive_paths)
            .build()
            .map_err(|e| {
                DeployError::argument(format!("could not compile PATTERN \"{glob}\": {e}"))
            })?
            .compile_matcher();
        Ok(Self::new(Matcher::Glob(matcher), glob))
    }

    /// Compile a `REGEX` expression.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError::Argument`] if the expression is malformed.
    pub fn regex(expression: &str, platform: &Platform) -> Result<Self> {
        let regex = RegexBuilder::new(expression)
            .case_insensitive(platform.case_insensitive_paths)
            .build()
            .map_err(|e| {
                DeployError::argument(format!("could not compile REGEX \"{expression}\": {e}"))
            })?;
        Ok(Self::new(Matcher::Regex(regex), expression))
    }

    fn new(matcher: Matcher, expression: &str) -> Self {
        Self {
            matcher,
            expression: expression.to_string(),
            exclude: false,
            permissions: Mode::NONE,
        }
    }

    /// Mark matching entries as excluded.
    #[must_use]
    pub const fn excluding(mut self) -> Self {
        self.exclude = true;
        self
    }

    /// Add permission bits granted to matching entries.
    #[must_use]
    pub fn with_permissions(mut self, mode: Mode) -> Self {
        self.permissions |= mode;
        self
    }

    /// The expression as written by the caller.
    #[must_use]
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Whether matching entries are excluded.
    #[must_use]
    pub const fn is_exclude(&self) -> bool {
        self.exclude
    }

    /// Permission override for matching entries.
    #[must_use]
    pub const fn permissions(&self) -> Mode {
        self.permissions
    }

    /// Test the rule against a full, forward-slash source path.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        match &self.matcher {
            Matcher::Glob(glob) => glob.is_match(path),
            Matcher::Regex(regex) => regex.is_match(path),
        }
    }
}

/// Result of evaluating a [`MatchRuleSet`] against one path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchProperties {
    /// The entry is skipped.
    pub exclude: bool,
    /// Union of permission overrides of every matching rule.
    pub permissions: Mode,
}

/// Ordered, immutable collection of [`MatchRule`]s.
#[derive(Debug, Clone, Default)]
pub struct MatchRuleSet {
    rules: Vec<MatchRule>,
    matchless_excluded: bool,
}

impl MatchRuleSet {
    /// Build a rule set. With `matchless_excluded` (`FILES_MATCHING`), a
    /// non-directory entry matching no rule is excluded.
    #[must_use]
    pub const fn new(rules: Vec<MatchRule>, matchless_excluded: bool) -> Self {
        Self {
            rules,
            matchless_excluded,
        }
    }

    /// Rules in declaration order.
    #[must_use]
    pub fn rules(&self) -> &[MatchRule] {
        &self.rules
    }

    /// Whether unmatched files are excluded.
    #[must_use]
    pub const fn matchless_excluded(&self) -> bool {
        self.matchless_excluded
    }

    /// Collect exclusion and permission overrides for `path`.
    #[must_use]
    pub fn evaluate(&self, path: &str, is_dir: bool) -> MatchProperties {
        let mut matched = false;
        let mut props = MatchProperties::default();
        for rule in self.rules.iter().filter(|r| r.matches(path)) {
            matched = true;
            props.exclude |= rule.exclude;
            props.permissions |= rule.permissions;
        }
        if !matched && self.matchless_excluded {
            props.exclude = !is_dir;
        }
        props
    }
}
