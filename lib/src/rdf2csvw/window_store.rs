//! A bounded store holding the most recent quads of an RDF stream.

use anyhow::Result;
use log::trace;
use oxigraph::model::{NamedOrBlankNode, Quad};
use oxigraph::store::Store;
use std::collections::{HashSet, VecDeque};

pub type QuadSource = Box<dyn Iterator<Item = Result<Quad>> + Send>;

/// Quads touched by one [`WindowStore::move_window`] call.
#[derive(Debug, Default)]
pub struct WindowMove {
    pub added: Vec<Quad>,
    pub removed: Vec<Quad>,
    /// What the previous move added.
    pub prev_added: Vec<Quad>,
}

pub struct WindowStore {
    store: Store,
    input: QuadSource,
    window: VecDeque<Quad>,
    size: usize,
    step: usize,
    prev_added: Vec<Quad>,
    done: bool,
}

impl WindowStore {
    pub fn new(input: QuadSource, size: usize, step: usize) -> Result<Self> {
        let size = size.max(1);
        Ok(Self {
            store: Store::new()?,
            input,
            window: VecDeque::new(),
            size,
            step: step.clamp(1, size),
            prev_added: vec![],
            done: false,
        })
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// True once the input is exhausted.
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Pulls up to `step` quads from the input, then evicts the oldest subjects until at most
    /// `size` quads stay resident.
    ///
    /// A subject leaves the window with all of its quads. Subjects that received quads in this
    /// move are never evicted, so the window may briefly hold more than `size` quads while a
    /// description is still being read.
    pub fn move_window(&mut self) -> Result<WindowMove> {
        let mut added = vec![];
        while added.len() < self.step {
            match self.input.next() {
                Some(quad) => {
                    let quad = quad?;
                    // duplicates are already represented in the window
                    if !self.store.contains(&quad)? {
                        self.store.insert(&quad)?;
                        self.window.push_back(quad.clone());
                        added.push(quad);
                    }
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }
        let fresh: HashSet<&NamedOrBlankNode> = added.iter().map(|q| &q.subject).collect();
        let mut removed = vec![];
        let mut kept = VecDeque::new();
        while self.window.len() + kept.len() > self.size {
            let Some(quad) = self.window.pop_front() else {
                break;
            };
            if fresh.contains(&quad.subject) {
                kept.push_back(quad);
                continue;
            }
            let (gone, rest): (VecDeque<Quad>, VecDeque<Quad>) = self
                .window
                .drain(..)
                .partition(|q| q.subject == quad.subject);
            self.window = rest;
            for quad in std::iter::once(quad).chain(gone) {
                self.store.remove(&quad)?;
                removed.push(quad);
            }
        }
        while let Some(quad) = kept.pop_back() {
            self.window.push_front(quad);
        }
        trace!(
            "Window moved: {} added, {} removed, {} resident",
            added.len(),
            removed.len(),
            self.window.len()
        );
        let prev_added = std::mem::replace(&mut self.prev_added, added.clone());
        Ok(WindowMove {
            added,
            removed,
            prev_added,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxigraph::model::{GraphName, Literal, NamedNode};

    fn quads(n: usize) -> QuadSource {
        let items: Vec<Result<Quad>> = (0..n)
            .map(|i| {
                Ok(Quad::new(
                    NamedNode::new(format!("http://ex.org/s{i}")).unwrap(),
                    NamedNode::new("http://ex.org/p").unwrap(),
                    Literal::from(i as i64),
                    GraphName::DefaultGraph,
                ))
            })
            .collect();
        Box::new(items.into_iter())
    }

    #[test]
    fn test_window_is_bounded() {
        let mut window = WindowStore::new(quads(10), 4, 3).unwrap();
        let first = window.move_window().unwrap();
        assert_eq!(first.added.len(), 3);
        assert!(first.removed.is_empty());
        let second = window.move_window().unwrap();
        assert_eq!(second.added.len(), 3);
        assert_eq!(second.removed.len(), 2);
        assert_eq!(second.prev_added, first.added);
        assert_eq!(window.len(), 4);
        assert_eq!(window.store().len().unwrap(), 4);
        assert!(!window.is_done());
        window.move_window().unwrap();
        let last = window.move_window().unwrap();
        assert_eq!(last.added.len(), 1);
        assert!(window.is_done());
    }

    fn described(subjects: &[(&str, usize)]) -> QuadSource {
        let mut items: Vec<Result<Quad>> = vec![];
        for (subject, count) in subjects {
            for i in 0..*count {
                items.push(Ok(Quad::new(
                    NamedNode::new(format!("http://ex.org/{subject}")).unwrap(),
                    NamedNode::new(format!("http://ex.org/p{i}")).unwrap(),
                    Literal::from(i as i64),
                    GraphName::DefaultGraph,
                )));
            }
        }
        Box::new(items.into_iter())
    }

    #[test]
    fn test_subjects_leave_together() {
        let mut window = WindowStore::new(described(&[("a", 3), ("b", 2)]), 3, 2).unwrap();
        window.move_window().unwrap();
        // `a` is still receiving quads, so nothing is evicted yet
        let second = window.move_window().unwrap();
        assert!(second.removed.is_empty());
        assert_eq!(window.len(), 4);
        let third = window.move_window().unwrap();
        assert_eq!(third.removed.len(), 3);
        assert!(third
            .removed
            .iter()
            .all(|q| q.subject.to_string() == "<http://ex.org/a>"));
        assert_eq!(window.len(), 2);
        assert!(window.is_done());
    }

    #[test]
    fn test_step_is_capped_by_size() {
        let mut window = WindowStore::new(quads(10), 2, 5).unwrap();
        let moved = window.move_window().unwrap();
        assert_eq!(moved.added.len(), 2);
        assert!(moved.removed.is_empty());
    }
}
