//! Side channel for recoverable markup problems.
//!
//! Malformed markup never fails a call. The matcher reports it here once per
//! position and carries on.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IssueKind {
    /// `<...>` accepted by no start-tag grammar.
    UnregisteredStartTag,
    /// `</...>` accepted by no end-tag grammar.
    UnregisteredEndTag,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Issue {
    pub pos: usize,
    pub kind: IssueKind,
    pub message: String,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(p{}) {}", self.pos, self.message)
    }
}

pub trait IssueSink {
    fn report(&mut self, issue: Issue);
}

/// Default sink: one `info` record per issue on target `markup.issue`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogIssueSink;

impl IssueSink for LogIssueSink {
    fn report(&mut self, issue: Issue) {
        log::info!(target: "markup.issue", "{issue}");
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DiscardIssues;

impl IssueSink for DiscardIssues {
    fn report(&mut self, _issue: Issue) {}
}

impl IssueSink for Vec<Issue> {
    fn report(&mut self, issue: Issue) {
        self.push(issue);
    }
}

/// Shareable collecting sink: hand a clone to a source, read the issues
/// back through the original.
#[derive(Clone, Debug, Default)]
pub struct IssueCollector {
    issues: Rc<RefCell<Vec<Issue>>>,
}

impl IssueCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issues(&self) -> Vec<Issue> {
        self.issues.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.issues.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.issues.borrow().is_empty()
    }
}

impl IssueSink for IssueCollector {
    fn report(&mut self, issue: Issue) {
        self.issues.borrow_mut().push(issue);
    }
}
