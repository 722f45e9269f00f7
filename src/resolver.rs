//! Breadth-first association graph resolver.

use std::collections::{BTreeMap, VecDeque};

use ahash::AHashSet;
use tracing::debug;

use crate::{
    association::{Association, AssociationTarget, RelationshipId, RelationshipInterner},
    descriptor::Descriptor,
    errors::SyncError,
    hint::{Candidate, HintPolicy},
    schema::SchemaProvider,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum NodeState {
    Pending,
    Pruned,
    Leaf,
    Expanded,
}

struct Node {
    edge: Association,
    state: NodeState,
    /// Child node ids, tagged with the runtime model they hang under for polymorphic edges.
    children: Vec<(Option<String>, usize)>,
}

struct Resolver<'a> {
    provider: &'a dyn SchemaProvider,
    hints: &'a HintPolicy,
    interner: RelationshipInterner,
    nodes: Vec<Node>,
    registered: AHashSet<(RelationshipId, Vec<RelationshipId>)>,
    worklist: VecDeque<usize>,
}

/// Computes the traversal descriptor reachable from `root`.
///
/// Returns `None` when `root` has no eligible relationships. A single relationship without
/// nesting comes back as a bare [`Descriptor::Name`] rather than a one-element list.
pub fn identify_associations(
    provider: &dyn SchemaProvider,
    root: &str,
    hints: &HintPolicy,
) -> Result<Option<Descriptor>, SyncError> {
    let mut resolver = Resolver {
        provider,
        hints,
        interner: RelationshipInterner::new(),
        nodes: Vec::new(),
        registered: AHashSet::new(),
        worklist: VecDeque::new(),
    };
    let roots = resolver.discover(root, Vec::new())?;
    resolver.traverse()?;
    debug!(
        root,
        edges = resolver.nodes.len(),
        relationships = resolver.interner.len(),
        "association graph resolved"
    );
    Ok(resolver.collapse_forest(&roots))
}

impl Resolver<'_> {
    /// Registers the eligible edges leaving `model`, returning the new node ids.
    fn discover(
        &mut self,
        model: &str,
        parents: Vec<RelationshipId>,
    ) -> Result<Vec<usize>, SyncError> {
        let provider = self.provider;
        let mut discovered = Vec::new();
        for relationship in provider.relationships_of(model)? {
            if relationship.is_through() {
                continue;
            }
            let targets = provider.observed_target_types(model, relationship)?;
            let candidate = Candidate {
                from: model,
                relationship,
                targets: &targets,
            };
            if !self.hints.allows(&candidate) {
                debug!(from = model, name = %relationship.name, "relationship denied by hint");
                continue;
            }
            let target = if relationship.is_polymorphic() {
                AssociationTarget::Polymorphic(targets)
            } else {
                match targets.into_iter().next() {
                    Some(target) => AssociationTarget::Standard(target),
                    None => continue,
                }
            };
            let id = self.interner.intern(model, &relationship.name, &target);
            if !self.registered.insert((id, parents.clone())) {
                continue;
            }
            let idx = self.nodes.len();
            self.nodes.push(Node {
                edge: Association::new(model, relationship.name.clone(), target, id, parents.clone()),
                state: NodeState::Pending,
                children: Vec::new(),
            });
            self.worklist.push_back(idx);
            discovered.push(idx);
        }
        Ok(discovered)
    }

    fn traverse(&mut self) -> Result<(), SyncError> {
        while let Some(idx) = self.worklist.pop_front() {
            self.nodes[idx].edge.traversed = true;

            if self.is_inverse(idx) {
                debug!(
                    from = %self.nodes[idx].edge.from,
                    name = %self.nodes[idx].edge.name,
                    "pruning inverse edge"
                );
                self.nodes[idx].state = NodeState::Pruned;
                continue;
            }
            if self.nodes[idx].edge.is_circular() {
                self.nodes[idx].state = NodeState::Leaf;
                continue;
            }

            let parents = self.nodes[idx].edge.child_parents();
            let target = self.nodes[idx].edge.target.clone();
            let mut children = Vec::new();
            for model in target.models() {
                let branch = target.is_polymorphic().then(|| model.clone());
                for child in self.discover(model, parents.clone())? {
                    children.push((branch.clone(), child));
                }
            }
            let node = &mut self.nodes[idx];
            node.children = children;
            node.state = NodeState::Expanded;
        }
        Ok(())
    }

    fn is_inverse(&self, idx: usize) -> bool {
        let edge = &self.nodes[idx].edge;
        self.nodes.iter().enumerate().any(|(other_idx, other)| {
            other_idx != idx
                && other.edge.traversed
                && other.state != NodeState::Pruned
                && edge.is_inverse_of(&other.edge)
        })
    }

    fn collapse_forest(&self, ids: &[usize]) -> Option<Descriptor> {
        let mut items: Vec<Descriptor> = ids.iter().filter_map(|&id| self.collapse_node(id)).collect();
        match items.len() {
            0 => None,
            1 => items.pop(),
            _ => Some(Descriptor::List(items)),
        }
    }

    fn collapse_node(&self, idx: usize) -> Option<Descriptor> {
        let node = &self.nodes[idx];
        let name = node.edge.name.clone();
        match node.state {
            NodeState::Pruned => None,
            NodeState::Pending | NodeState::Leaf => Some(Descriptor::Name(name)),
            NodeState::Expanded => match &node.edge.target {
                AssociationTarget::Polymorphic(models) if models.is_empty() => {
                    Some(Descriptor::Name(name))
                }
                AssociationTarget::Polymorphic(models) => {
                    let branches: BTreeMap<String, Option<Descriptor>> = models
                        .iter()
                        .map(|model| {
                            let ids: Vec<usize> = node
                                .children
                                .iter()
                                .filter(|(branch, _)| branch.as_deref() == Some(model.as_str()))
                                .map(|&(_, id)| id)
                                .collect();
                            (model.clone(), self.collapse_forest(&ids))
                        })
                        .collect();
                    Some(Descriptor::nested(name, Descriptor::ByType(branches)))
                }
                AssociationTarget::Standard(_) => {
                    let ids: Vec<usize> = node.children.iter().map(|&(_, id)| id).collect();
                    Some(match self.collapse_forest(&ids) {
                        Some(nested) => Descriptor::nested(name, nested),
                        None => Descriptor::Name(name),
                    })
                }
            },
        }
    }
}
