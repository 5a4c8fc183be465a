//! XSD Particle Schema Components
//!
//! Occurrence bounds and the particle tree a complex type's content is
//! declared with. Particle trees are compiled into a
//! [`ContentModel`](super::models::ContentModel) when the schema is built.
//!
//! Reference: https://www.w3.org/TR/xmlschema-1/#cParticles

use std::fmt;

use super::schemas::ElementId;
use super::wildcards::Wildcard;

/// Occurrence bounds for a particle (minOccurs, maxOccurs)
/// None for max means unbounded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurs {
    /// Minimum number of occurrences (default 1)
    pub min: u32,
    /// Maximum number of occurrences (None = unbounded, default 1)
    pub max: Option<u32>,
}

impl Occurs {
    /// Create new occurrence bounds
    pub fn new(min: u32, max: Option<u32>) -> Self {
        Self { min, max }
    }

    /// Default occurrence (1, 1)
    pub fn once() -> Self {
        Self { min: 1, max: Some(1) }
    }

    /// Optional occurrence (0, 1)
    pub fn optional() -> Self {
        Self { min: 0, max: Some(1) }
    }

    /// Zero or more (0, unbounded)
    pub fn zero_or_more() -> Self {
        Self { min: 0, max: None }
    }

    /// One or more (1, unbounded)
    pub fn one_or_more() -> Self {
        Self { min: 1, max: None }
    }

    /// Check if this particle can be empty (minOccurs == 0)
    pub fn is_emptiable(&self) -> bool {
        self.min == 0
    }

    /// Check if this particle is empty (maxOccurs == 0)
    pub fn is_empty(&self) -> bool {
        self.max == Some(0)
    }

    /// Check if particle can have multiple occurrences
    pub fn is_multiple(&self) -> bool {
        self.max.map_or(true, |max| max > 1)
    }

    /// Check if minOccurs != maxOccurs
    pub fn is_ambiguous(&self) -> bool {
        match self.max {
            Some(max) => self.min != max,
            None => true,
        }
    }

    /// Check if occurrence count is at or over the maximum
    pub fn is_over(&self, count: u32) -> bool {
        match self.max {
            Some(max) => count >= max,
            None => false,
        }
    }

    /// Check that min does not exceed max
    pub fn is_consistent(&self) -> bool {
        self.max.map_or(true, |max| self.min <= max)
    }
}

impl Default for Occurs {
    fn default() -> Self {
        Self::once()
    }
}

impl fmt::Display for Occurs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) => write!(f, "[{}..{}]", self.min, max),
            None => write!(f, "[{}..unbounded]", self.min),
        }
    }
}

/// Compositor of a model group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compositor {
    /// xs:sequence
    Sequence,
    /// xs:choice
    Choice,
    /// xs:all
    All,
}

impl fmt::Display for Compositor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequence => write!(f, "sequence"),
            Self::Choice => write!(f, "choice"),
            Self::All => write!(f, "all"),
        }
    }
}

/// Term of a particle
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    /// Element declaration (local or a reference to a global)
    Element(ElementId),
    /// Element wildcard
    Any(Wildcard),
    /// Model group
    Group(Compositor, Vec<Particle>),
}

/// A particle: a term with occurrence bounds
#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    /// The term
    pub term: Term,
    /// Occurrence bounds
    pub occurs: Occurs,
}

impl Particle {
    /// Element particle occurring once
    pub fn element(element: ElementId) -> Self {
        Self {
            term: Term::Element(element),
            occurs: Occurs::once(),
        }
    }

    /// Wildcard particle occurring once
    pub fn any(wildcard: Wildcard) -> Self {
        Self {
            term: Term::Any(wildcard),
            occurs: Occurs::once(),
        }
    }

    /// xs:sequence of particles
    pub fn sequence(particles: Vec<Particle>) -> Self {
        Self::group(Compositor::Sequence, particles)
    }

    /// xs:choice of particles
    pub fn choice(particles: Vec<Particle>) -> Self {
        Self::group(Compositor::Choice, particles)
    }

    /// xs:all of particles
    pub fn all(particles: Vec<Particle>) -> Self {
        Self::group(Compositor::All, particles)
    }

    fn group(compositor: Compositor, particles: Vec<Particle>) -> Self {
        Self {
            term: Term::Group(compositor, particles),
            occurs: Occurs::once(),
        }
    }

    /// Replace the occurrence bounds
    pub fn with_occurs(mut self, min: u32, max: Option<u32>) -> Self {
        self.occurs = Occurs::new(min, max);
        self
    }

    /// Shorthand for `with_occurs(0, Some(1))`
    pub fn optional(self) -> Self {
        self.with_occurs(0, Some(1))
    }

    /// Iterate over this particle and all nested particles, depth first
    pub fn iter(&self) -> ParticleIter<'_> {
        ParticleIter { stack: vec![self] }
    }
}

/// Depth-first iterator over a particle tree
pub struct ParticleIter<'a> {
    stack: Vec<&'a Particle>,
}

impl<'a> Iterator for ParticleIter<'a> {
    type Item = &'a Particle;

    fn next(&mut self) -> Option<Self::Item> {
        let particle = self.stack.pop()?;
        if let Term::Group(_, children) = &particle.term {
            self.stack.extend(children.iter().rev());
        }
        Some(particle)
    }
}
