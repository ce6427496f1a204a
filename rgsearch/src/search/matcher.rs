use regex::{Regex, RegexBuilder};
use regex_syntax::hir::Hir;
use regex_syntax::ParserBuilder;
use tracing::debug;

use crate::errors::{SearchError, SearchResult};

/// Upper bound on the compiled size of the combined expression
const REGEX_SIZE_LIMIT: usize = 64 * 1024 * 1024;

/// Options that shape how patterns are compiled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MatchOptions {
    /// Fold case before matching
    pub case_insensitive: bool,
    /// Escape every pattern so it matches literally
    pub fixed_strings: bool,
    /// Whether callers want grep-style output with line numbers. Matching
    /// is unaffected.
    pub line_number: bool,
}

/// All search patterns compiled into one alternation.
///
/// A line matches when any pattern matches. Matches are found with
/// leftmost-first semantics, so at each position the earliest listed
/// alternative that matches wins and reported spans never overlap. The
/// matcher is immutable and cheap to clone; clones share the compiled
/// program and can be used from many threads at once.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    regex: Regex,
}

impl PatternMatcher {
    /// Compiles `patterns`. Each pattern is parsed on its own, so a syntax
    /// error names the pattern that caused it and inline flags or comments
    /// in one pattern never leak into another.
    pub fn compile(patterns: &[String], options: MatchOptions) -> SearchResult<Self> {
        if patterns.is_empty() {
            return Err(SearchError::EmptyPatterns);
        }

        let mut alternatives = Vec::with_capacity(patterns.len());
        for pattern in patterns {
            let source = if options.fixed_strings {
                regex::escape(pattern)
            } else {
                pattern.clone()
            };
            let hir = ParserBuilder::new()
                .case_insensitive(options.case_insensitive)
                .build()
                .parse(&source)
                .map_err(|e| SearchError::invalid_pattern(pattern, e))?;
            alternatives.push(hir);
        }

        // Printing an Hir yields an equivalent pattern with every flag and
        // group made explicit.
        let combined = Hir::alternation(alternatives).to_string();
        debug!("Compiled {} patterns into: {}", patterns.len(), combined);

        let regex = RegexBuilder::new(&combined)
            .size_limit(REGEX_SIZE_LIMIT)
            .build()
            .map_err(|e| SearchError::invalid_pattern(patterns.join(" | "), e))?;

        Ok(Self { regex })
    }

    pub fn is_match(&self, line: &str) -> bool {
        self.regex.is_match(line)
    }

    /// Finds all matches in `line` as `(start, end)` byte ranges, sorted by
    /// start and non-overlapping
    pub fn find_matches(&self, line: &str) -> Vec<(usize, usize)> {
        self.regex
            .find_iter(line)
            .map(|m| (m.start(), m.end()))
            .collect()
    }
}
