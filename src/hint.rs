use regex::Regex;

use crate::schema::Relationship;

/// A relationship the resolver is considering, with its possible target models.
#[derive(Clone, Copy, Debug)]
pub struct Candidate<'a> {
    pub from: &'a str,
    pub relationship: &'a Relationship,
    /// The target model, or every observed runtime model for a polymorphic relationship.
    pub targets: &'a [String],
}

pub trait Hint {
    fn applicable(&self, candidate: &Candidate<'_>) -> bool;
    fn allowed(&self) -> bool;
}

#[derive(Clone, Debug)]
pub enum NameMatcher {
    Names(Vec<String>),
    Pattern(Regex),
}

impl NameMatcher {
    pub fn matches(&self, name: &str) -> bool {
        match self {
            NameMatcher::Names(names) => names.iter().any(|n| n == name),
            NameMatcher::Pattern(pattern) => pattern.is_match(name),
        }
    }
}

/// Hint built from optional clauses; an omitted clause matches everything.
#[derive(Clone, Debug)]
pub struct BasicHint {
    from: Option<Vec<String>>,
    relationship: Option<NameMatcher>,
    to: Option<Vec<String>>,
    allowed: bool,
}

impl BasicHint {
    pub fn allow() -> Self {
        Self {
            from: None,
            relationship: None,
            to: None,
            allowed: true,
        }
    }

    pub fn deny() -> Self {
        Self {
            allowed: false,
            ..Self::allow()
        }
    }

    pub fn from_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.from = Some(models.into_iter().map(Into::into).collect());
        self
    }

    pub fn named<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.relationship = Some(NameMatcher::Names(
            names.into_iter().map(Into::into).collect(),
        ));
        self
    }

    pub fn matching(mut self, pattern: Regex) -> Self {
        self.relationship = Some(NameMatcher::Pattern(pattern));
        self
    }

    pub fn to_models<I, S>(mut self, models: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.to = Some(models.into_iter().map(Into::into).collect());
        self
    }

    fn evaluate_from(&self, candidate: &Candidate<'_>) -> bool {
        self.from
            .as_ref()
            .is_none_or(|models| models.iter().any(|m| m == candidate.from))
    }

    fn evaluate_relationship(&self, candidate: &Candidate<'_>) -> bool {
        self.relationship
            .as_ref()
            .is_none_or(|matcher| matcher.matches(&candidate.relationship.name))
    }

    fn evaluate_to(&self, candidate: &Candidate<'_>) -> bool {
        let Some(models) = &self.to else {
            return true;
        };
        // Polymorphic candidates match on any overlap with their observed targets.
        candidate
            .targets
            .iter()
            .any(|target| models.iter().any(|m| m == target))
    }
}

impl Hint for BasicHint {
    fn applicable(&self, candidate: &Candidate<'_>) -> bool {
        self.evaluate_from(candidate)
            && self.evaluate_relationship(candidate)
            && self.evaluate_to(candidate)
    }

    fn allowed(&self) -> bool {
        self.allowed
    }
}

#[derive(Default)]
pub struct HintPolicy {
    hints: Vec<Box<dyn Hint>>,
}

impl HintPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<H: Hint + 'static>(mut self, hint: H) -> Self {
        self.hints.push(Box::new(hint));
        self
    }

    pub fn push<H: Hint + 'static>(&mut self, hint: H) {
        self.hints.push(Box::new(hint));
    }

    pub fn len(&self) -> usize {
        self.hints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hints.is_empty()
    }

    pub fn allows(&self, candidate: &Candidate<'_>) -> bool {
        self.hints
            .iter()
            .find(|hint| hint.applicable(candidate))
            .is_none_or(|hint| hint.allowed())
    }
}

impl From<Vec<BasicHint>> for HintPolicy {
    fn from(hints: Vec<BasicHint>) -> Self {
        let mut policy = HintPolicy::new();
        for hint in hints {
            policy.push(hint);
        }
        policy
    }
}
