use ahash::AHashMap;

pub type RelationshipId = u32;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum AssociationTarget {
    Standard(String),
    /// Every runtime model observed for a polymorphic relationship.
    Polymorphic(Vec<String>),
}

impl AssociationTarget {
    pub fn models(&self) -> &[String] {
        match self {
            AssociationTarget::Standard(model) => std::slice::from_ref(model),
            AssociationTarget::Polymorphic(models) => models,
        }
    }

    pub fn contains(&self, model: &str) -> bool {
        self.models().iter().any(|m| m == model)
    }

    pub fn is_polymorphic(&self) -> bool {
        matches!(self, AssociationTarget::Polymorphic(_))
    }
}

#[derive(Clone, Debug)]
pub struct Association {
    pub from: String,
    pub name: String,
    pub target: AssociationTarget,
    pub relationship: RelationshipId,
    pub parents: Vec<RelationshipId>,
    pub traversed: bool,
}

impl Association {
    pub fn new(
        from: impl Into<String>,
        name: impl Into<String>,
        target: AssociationTarget,
        relationship: RelationshipId,
        parents: Vec<RelationshipId>,
    ) -> Self {
        Self {
            from: from.into(),
            name: name.into(),
            target,
            relationship,
            parents,
            traversed: false,
        }
    }

    /// `self` points back along `other`: each one's targets contain the other's source,
    /// and `self` sits on the same parent path as `other` or directly below it.
    pub fn is_inverse_of(&self, other: &Association) -> bool {
        other.target.contains(&self.from)
            && self.target.contains(&other.from)
            && (self.parents == other.parents
                || self
                    .parents
                    .split_last()
                    .is_some_and(|(_, above)| above == other.parents.as_slice()))
    }

    /// The last relationship on the path already occurs earlier on it.
    pub fn is_circular(&self) -> bool {
        match self.parents.split_last() {
            Some((last, earlier)) => earlier.contains(last),
            None => false,
        }
    }

    /// Parent path for edges discovered below this one.
    pub fn child_parents(&self) -> Vec<RelationshipId> {
        let mut parents = Vec::with_capacity(self.parents.len() + 1);
        parents.extend_from_slice(&self.parents);
        parents.push(self.relationship);
        parents
    }
}

impl PartialEq for Association {
    fn eq(&self, other: &Self) -> bool {
        self.from == other.from
            && self.target == other.target
            && self.name == other.name
            && self.parents == other.parents
    }
}

impl Eq for Association {}

/// Hands out stable ids for `(from, name, targets)` triples.
#[derive(Debug, Default)]
pub struct RelationshipInterner {
    ids: AHashMap<(String, String, AssociationTarget), RelationshipId>,
}

impl RelationshipInterner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, from: &str, name: &str, target: &AssociationTarget) -> RelationshipId {
        let next = self.ids.len() as RelationshipId;
        *self
            .ids
            .entry((from.to_string(), name.to_string(), target.clone()))
            .or_insert(next)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
