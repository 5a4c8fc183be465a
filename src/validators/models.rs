//! XSD Content Model automaton
//!
//! A particle tree is compiled into an arena of nodes stored in pre-order.
//! Matching keeps one repetition counter and one cursor per node, so
//! occurrence bounds are enforced without unrolling the tree. A compiled
//! model is deterministic: [`ContentModel::compile`] rejects particle trees
//! that violate Unique Particle Attribution.
//!
//! Reference: https://www.w3.org/TR/xmlschema-1/#cos-nonambig

use std::fmt;
use std::sync::Arc;

use log::trace;

use crate::error::{ParseError, Result};
use crate::namespaces::QName;

use super::particles::{Compositor, Occurs, Particle, Term};
use super::schemas::ElementId;
use super::wildcards::Wildcard;

/// What a leaf of the model matches
#[derive(Debug, Clone, PartialEq)]
enum LeafTest {
    /// An element declaration with the names it answers to: its own name
    /// followed by the members of its substitution group
    Element {
        declared: ElementId,
        names: Vec<(QName, ElementId)>,
    },
    Any(Wildcard),
}

impl LeafTest {
    fn matches(&self, name: &QName) -> Option<ParticleMatch> {
        match self {
            Self::Element { names, .. } => names
                .iter()
                .find(|(candidate, _)| candidate == name)
                .map(|(_, element)| ParticleMatch::Element(*element)),
            Self::Any(wildcard) if wildcard.allows(name) => {
                Some(ParticleMatch::Any(wildcard.clone()))
            }
            Self::Any(_) => None,
        }
    }

    fn overlaps(&self, other: &LeafTest) -> bool {
        match (self, other) {
            (Self::Element { names: a, .. }, Self::Element { names: b, .. }) => {
                a.iter().any(|(x, _)| b.iter().any(|(y, _)| x == y))
            }
            (Self::Element { names, .. }, Self::Any(wildcard))
            | (Self::Any(wildcard), Self::Element { names, .. }) => {
                names.iter().any(|(name, _)| wildcard.allows(name))
            }
            (Self::Any(a), Self::Any(b)) => a.overlaps(b),
        }
    }
}

impl fmt::Display for LeafTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Element { names, .. } => match names.first() {
                Some((name, _)) => write!(f, "element {}", name),
                None => write!(f, "element"),
            },
            Self::Any(wildcard) => write!(f, "any {}", wildcard),
        }
    }
}

#[derive(Debug, Clone)]
enum NodeKind {
    Leaf(usize),
    Group(Compositor, Vec<usize>),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    occurs: Occurs,
    /// One past the last node of this subtree
    end: usize,
    /// Whether one occurrence of the body can be empty
    nullable_body: bool,
    /// Leaves that can start an occurrence
    first: Vec<usize>,
}

impl Node {
    fn nullable(&self) -> bool {
        self.occurs.min == 0 || self.nullable_body
    }
}

/// Result of matching a child element name
#[derive(Debug, Clone, PartialEq)]
pub enum ParticleMatch {
    /// Matched an element declaration (possibly a substitution group member)
    Element(ElementId),
    /// Matched a wildcard
    Any(Wildcard),
}

/// An item the model would accept next
#[derive(Debug, Clone, PartialEq)]
pub enum Expected {
    /// An element name with the declaration it resolves to
    Element {
        /// Accepted name
        name: QName,
        /// Declaration matched by that name
        element: ElementId,
    },
    /// Any name allowed by the wildcard
    Any(Wildcard),
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Element { name, .. } => write!(f, "{}", name),
            Self::Any(wildcard) => write!(f, "{}", wildcard),
        }
    }
}

/// Outcome of [`ModelState::advance`]
#[derive(Debug, Clone)]
pub enum Advance {
    /// The name was accepted; the new state and the matched particle
    Matched(ModelState, ParticleMatch),
    /// No particle accepts the name in the current state
    NoMatch,
}

/// A compiled, deterministic content model
#[derive(Debug, Clone, Default)]
pub struct ContentModel {
    nodes: Vec<Node>,
    leaves: Vec<LeafTest>,
}

impl ContentModel {
    /// The model of empty content: rejects every child and is final at once
    pub fn empty() -> Self {
        Self::default()
    }

    /// Compile a particle tree.
    ///
    /// `alternatives` maps an element particle to the names it matches with
    /// the declaration each name resolves to (the element itself first, then
    /// non-blocked substitution group members).
    pub fn compile<F>(particle: &Particle, alternatives: F) -> Result<Self>
    where
        F: Fn(ElementId) -> Vec<(QName, ElementId)>,
    {
        if let Some(bad) = particle.iter().find(|p| !p.occurs.is_consistent()) {
            return Err(ParseError::new(format!(
                "minOccurs greater than maxOccurs in particle {}",
                bad.occurs
            ))
            .into());
        }
        let mut model = Self::default();
        model.push(particle, &alternatives);
        model.check_upa()?;
        Ok(model)
    }

    /// Whether the model accepts no children at all
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Initial matching state
    pub fn start(self: &Arc<Self>) -> ModelState {
        ModelState {
            nodes: vec![NodeState::default(); self.nodes.len()],
            model: Arc::clone(self),
        }
    }

    fn push<F>(&mut self, particle: &Particle, alternatives: &F) -> usize
    where
        F: Fn(ElementId) -> Vec<(QName, ElementId)>,
    {
        let index = self.nodes.len();
        self.nodes.push(Node {
            kind: NodeKind::Leaf(0),
            occurs: particle.occurs,
            end: index + 1,
            nullable_body: false,
            first: Vec::new(),
        });

        let kind = match &particle.term {
            Term::Element(element) => {
                self.leaves.push(LeafTest::Element {
                    declared: *element,
                    names: alternatives(*element),
                });
                NodeKind::Leaf(self.leaves.len() - 1)
            }
            Term::Any(wildcard) => {
                self.leaves.push(LeafTest::Any(wildcard.clone()));
                NodeKind::Leaf(self.leaves.len() - 1)
            }
            Term::Group(compositor, children) => {
                let ids = children
                    .iter()
                    .map(|child| self.push(child, alternatives))
                    .collect();
                NodeKind::Group(*compositor, ids)
            }
        };

        let (nullable_body, mut first) = match &kind {
            NodeKind::Leaf(leaf) => (false, vec![*leaf]),
            NodeKind::Group(Compositor::Sequence, ids) => {
                let mut first = Vec::new();
                for &id in ids {
                    first.extend_from_slice(&self.nodes[id].first);
                    if !self.nodes[id].nullable() {
                        break;
                    }
                }
                (ids.iter().all(|&id| self.nodes[id].nullable()), first)
            }
            NodeKind::Group(Compositor::Choice, ids) => (
                ids.iter().any(|&id| self.nodes[id].nullable()),
                ids.iter()
                    .flat_map(|&id| self.nodes[id].first.iter().copied())
                    .collect(),
            ),
            NodeKind::Group(Compositor::All, ids) => (
                ids.iter().all(|&id| self.nodes[id].nullable()),
                ids.iter()
                    .flat_map(|&id| self.nodes[id].first.iter().copied())
                    .collect(),
            ),
        };
        if particle.occurs.is_empty() {
            first.clear();
        }

        let end = self.nodes.len();
        let node = &mut self.nodes[index];
        node.kind = kind;
        node.end = end;
        node.nullable_body = nullable_body;
        node.first = first;
        index
    }

    /// Glushkov determinism check: no two distinct leaves may compete for
    /// the same name from the start position or after any leaf.
    fn check_upa(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Ok(());
        }
        let mut follow = vec![Vec::new(); self.leaves.len()];
        self.last_and_follow(0, &mut follow);

        self.check_competition(&self.nodes[0].first)?;
        for set in &follow {
            self.check_competition(set)?;
        }
        Ok(())
    }

    fn last_and_follow(&self, n: usize, follow: &mut [Vec<usize>]) -> Vec<usize> {
        let node = &self.nodes[n];
        if node.occurs.is_empty() {
            return Vec::new();
        }
        let last = match &node.kind {
            NodeKind::Leaf(leaf) => vec![*leaf],
            NodeKind::Group(compositor, ids) => {
                let lasts: Vec<Vec<usize>> = ids
                    .iter()
                    .map(|&id| self.last_and_follow(id, follow))
                    .collect();
                match compositor {
                    Compositor::Sequence => {
                        for i in 0..ids.len() {
                            for &next in &ids[i + 1..] {
                                for &leaf in &lasts[i] {
                                    follow[leaf].extend_from_slice(&self.nodes[next].first);
                                }
                                if !self.nodes[next].nullable() {
                                    break;
                                }
                            }
                        }
                        let mut last = Vec::new();
                        for i in (0..ids.len()).rev() {
                            last.extend_from_slice(&lasts[i]);
                            if !self.nodes[ids[i]].nullable() {
                                break;
                            }
                        }
                        last
                    }
                    Compositor::Choice => lasts.concat(),
                    Compositor::All => {
                        for (i, leaves) in lasts.iter().enumerate() {
                            for (j, &other) in ids.iter().enumerate() {
                                if i != j {
                                    for &leaf in leaves {
                                        follow[leaf].extend_from_slice(&self.nodes[other].first);
                                    }
                                }
                            }
                        }
                        lasts.concat()
                    }
                }
            }
        };
        // With min == max the counter decides between repeating and leaving.
        if node.occurs.is_multiple() && node.occurs.is_ambiguous() {
            for &leaf in &last {
                follow[leaf].extend_from_slice(&node.first);
            }
        }
        last
    }

    fn check_competition(&self, set: &[usize]) -> Result<()> {
        let mut set = set.to_vec();
        set.sort_unstable();
        set.dedup();
        for (i, &a) in set.iter().enumerate() {
            for &b in &set[i + 1..] {
                if self.leaves[a].overlaps(&self.leaves[b]) {
                    return Err(ParseError::new(format!(
                        "ambiguous content model: {} and {} can match the same child",
                        self.leaves[a], self.leaves[b]
                    ))
                    .into());
                }
            }
        }
        Ok(())
    }

    fn satisfied(&self, st: &[NodeState], n: usize) -> bool {
        let node = &self.nodes[n];
        let count = st[n].count;
        if count == 0 {
            return node.nullable();
        }
        self.occurrence_final(st, n) && (count >= node.occurs.min || node.nullable_body)
    }

    fn occurrence_final(&self, st: &[NodeState], n: usize) -> bool {
        match &self.nodes[n].kind {
            NodeKind::Leaf(_) => true,
            NodeKind::Group(Compositor::Sequence, ids) => {
                ids[st[n].cursor..].iter().all(|&id| self.satisfied(st, id))
            }
            NodeKind::Group(Compositor::Choice, ids) => match st[n].chosen {
                Some(i) => self.satisfied(st, ids[i]),
                None => self.nodes[n].nullable_body,
            },
            NodeKind::Group(Compositor::All, ids) => ids.iter().all(|&id| self.satisfied(st, id)),
        }
    }

    fn can_repeat(&self, st: &[NodeState], n: usize) -> bool {
        let count = st[n].count;
        !self.nodes[n].occurs.is_over(count) && (count == 0 || self.occurrence_final(st, n))
    }

    fn starts_with(&self, n: usize, name: &QName) -> bool {
        self.nodes[n]
            .first
            .iter()
            .any(|&leaf| self.leaves[leaf].matches(name).is_some())
    }

    fn accepts(&self, st: &[NodeState], n: usize, name: &QName) -> bool {
        let node = &self.nodes[n];
        match &node.kind {
            NodeKind::Leaf(leaf) => {
                !node.occurs.is_over(st[n].count) && self.leaves[*leaf].matches(name).is_some()
            }
            NodeKind::Group(..) => {
                (st[n].count > 0 && self.continues(st, n, name))
                    || (self.can_repeat(st, n) && self.starts_with(n, name))
            }
        }
    }

    /// Whether the current occurrence of group `n` can take `name`
    fn continues(&self, st: &[NodeState], n: usize, name: &QName) -> bool {
        match &self.nodes[n].kind {
            NodeKind::Leaf(_) => false,
            NodeKind::Group(Compositor::Sequence, ids) => {
                for &id in &ids[st[n].cursor..] {
                    if self.accepts(st, id, name) {
                        return true;
                    }
                    if !self.satisfied(st, id) {
                        return false;
                    }
                }
                false
            }
            NodeKind::Group(Compositor::Choice, ids) => st[n]
                .chosen
                .map_or(false, |i| self.accepts(st, ids[i], name)),
            NodeKind::Group(Compositor::All, ids) => {
                ids.iter().any(|&id| self.accepts(st, id, name))
            }
        }
    }

    /// Consume `name`; must only be called after `accepts` returned true
    fn apply(&self, st: &mut [NodeState], n: usize, name: &QName) -> Option<usize> {
        let node = &self.nodes[n];
        match &node.kind {
            NodeKind::Leaf(leaf) => {
                st[n].count += 1;
                Some(*leaf)
            }
            NodeKind::Group(compositor, ids) => {
                if st[n].count == 0 || !self.continues(st, n, name) {
                    for state in &mut st[n + 1..node.end] {
                        *state = NodeState::default();
                    }
                    st[n].cursor = 0;
                    st[n].chosen = None;
                    st[n].count += 1;
                }
                let child = match compositor {
                    Compositor::Sequence => {
                        let start = st[n].cursor;
                        let offset = ids[start..]
                            .iter()
                            .position(|&id| self.accepts(st, id, name))?;
                        st[n].cursor = start + offset;
                        ids[start + offset]
                    }
                    Compositor::Choice => match st[n].chosen {
                        Some(i) => ids[i],
                        None => {
                            let i = ids.iter().position(|&id| self.accepts(st, id, name))?;
                            st[n].chosen = Some(i);
                            ids[i]
                        }
                    },
                    Compositor::All => *ids.iter().find(|&&id| self.accepts(st, id, name))?,
                };
                self.apply(st, child, name)
            }
        }
    }

    fn collect_expected(&self, st: &[NodeState], n: usize, out: &mut Vec<usize>) {
        let node = &self.nodes[n];
        match &node.kind {
            NodeKind::Leaf(leaf) => {
                if !node.occurs.is_over(st[n].count) {
                    out.push(*leaf);
                }
            }
            NodeKind::Group(compositor, ids) => {
                if st[n].count > 0 {
                    match compositor {
                        Compositor::Sequence => {
                            for &id in &ids[st[n].cursor..] {
                                self.collect_expected(st, id, out);
                                if !self.satisfied(st, id) {
                                    break;
                                }
                            }
                        }
                        Compositor::Choice => {
                            if let Some(i) = st[n].chosen {
                                self.collect_expected(st, ids[i], out);
                            }
                        }
                        Compositor::All => {
                            for &id in ids {
                                self.collect_expected(st, id, out);
                            }
                        }
                    }
                }
                if self.can_repeat(st, n) {
                    out.extend_from_slice(&node.first);
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct NodeState {
    count: u32,
    cursor: usize,
    chosen: Option<usize>,
}

/// Matching state over a compiled [`ContentModel`]
#[derive(Debug, Clone)]
pub struct ModelState {
    model: Arc<ContentModel>,
    nodes: Vec<NodeState>,
}

impl ModelState {
    /// Try to accept `name`, returning the successor state. `self` is left
    /// untouched.
    pub fn advance(&self, name: &QName) -> Advance {
        let mut next = self.clone();
        match next.advance_in_place(name) {
            Some(matched) => Advance::Matched(next, matched),
            None => Advance::NoMatch,
        }
    }

    /// Accept `name` in place. On `None` the state is unchanged.
    pub fn advance_in_place(&mut self, name: &QName) -> Option<ParticleMatch> {
        let model = Arc::clone(&self.model);
        if model.nodes.is_empty() || !model.accepts(&self.nodes, 0, name) {
            trace!("content model rejects {}", name);
            return None;
        }
        let leaf = model.apply(&mut self.nodes, 0, name)?;
        trace!("content model matched {} against {}", name, model.leaves[leaf]);
        model.leaves[leaf].matches(name)
    }

    /// Whether the children seen so far form complete content
    pub fn is_final(&self) -> bool {
        self.model.nodes.is_empty() || self.model.satisfied(&self.nodes, 0)
    }

    /// Element names and wildcards acceptable in the current state
    pub fn expected(&self) -> Vec<Expected> {
        if self.model.nodes.is_empty() {
            return Vec::new();
        }
        let mut leaves = Vec::new();
        self.model.collect_expected(&self.nodes, 0, &mut leaves);

        let mut expected: Vec<Expected> = Vec::new();
        let mut seen = Vec::new();
        for leaf in leaves {
            if seen.contains(&leaf) {
                continue;
            }
            seen.push(leaf);
            match &self.model.leaves[leaf] {
                LeafTest::Element { names, declared } => {
                    for (name, element) in names {
                        let item = Expected::Element {
                            name: name.clone(),
                            element: *element,
                        };
                        if !expected.contains(&item) {
                            expected.push(item);
                        }
                    }
                    if names.is_empty() {
                        trace!("element particle {:?} has no matching names", declared);
                    }
                }
                LeafTest::Any(wildcard) => expected.push(Expected::Any(wildcard.clone())),
            }
        }
        expected
    }
}
