use rand::rngs::StdRng;
use rand::{SeedableRng, seq::index};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

use crate::model::block::{Block, BlockDraft, BlockError};

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CatalogError {
    #[error("course has no blocks")]
    EmptyCourse,

    #[error("final test has no questions")]
    EmptyFinalTest,

    #[error("duplicate block id `{0}`")]
    DuplicateId(String),

    #[error("final test block `{0}` is not a quiz")]
    FinalTestNotQuiz(String),

    #[error("final test size must be between 1 and {available}, got {requested}")]
    InvalidFinalTestSize { requested: usize, available: usize },

    #[error(transparent)]
    Block(#[from] BlockError),
}

/// Which block sequence a cursor indexes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sequence {
    Course,
    FinalTest,
}

//
// ─── CATALOG ───────────────────────────────────────────────────────────────────
//

/// Immutable course content: the course sequence plus the final test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    presentation: Option<String>,
    final_test_intro: Option<String>,
    blocks: Vec<Block>,
    final_test: Vec<Block>,
}

impl Catalog {
    #[must_use]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    #[must_use]
    pub fn final_test(&self) -> &[Block] {
        &self.final_test
    }

    #[must_use]
    pub fn sequence(&self, which: Sequence) -> &[Block] {
        match which {
            Sequence::Course => &self.blocks,
            Sequence::FinalTest => &self.final_test,
        }
    }

    #[must_use]
    pub fn block(&self, which: Sequence, index: usize) -> Option<&Block> {
        self.sequence(which).get(index)
    }

    /// Number of quiz blocks in the main course.
    #[must_use]
    pub fn course_quiz_count(&self) -> usize {
        self.blocks.iter().filter(|b| b.is_quiz()).count()
    }

    #[must_use]
    pub fn presentation(&self) -> Option<&str> {
        self.presentation.as_deref()
    }

    #[must_use]
    pub fn final_test_intro(&self) -> Option<&str> {
        self.final_test_intro.as_deref()
    }
}

//
// ─── DRAFT (catalog file) ──────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogDraft {
    #[serde(default)]
    pub presentation: Option<String>,
    #[serde(default)]
    pub final_test_intro: Option<String>,
    pub blocks: Vec<BlockDraft>,
    pub final_test: Vec<BlockDraft>,
    /// Number of final-test questions to keep; the whole list when absent.
    #[serde(default)]
    pub final_test_size: Option<usize>,
    #[serde(default)]
    pub final_test_seed: Option<u64>,
}

impl CatalogDraft {
    #[must_use]
    pub fn new(blocks: Vec<BlockDraft>, final_test: Vec<BlockDraft>) -> Self {
        Self {
            blocks,
            final_test,
            ..Self::default()
        }
    }

    /// Validate every block and assemble the immutable catalog.
    ///
    /// When `final_test_size` is smaller than the final-test list, a subset of
    /// that many questions is chosen once here, keeping catalog order.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` for empty sequences, duplicate ids, non-quiz
    /// final-test blocks, an invalid subset size, or any invalid block.
    pub fn validate(self, base_dir: Option<&Path>) -> Result<Catalog, CatalogError> {
        if self.blocks.is_empty() {
            return Err(CatalogError::EmptyCourse);
        }
        if self.final_test.is_empty() {
            return Err(CatalogError::EmptyFinalTest);
        }

        let blocks = validate_sequence(self.blocks, base_dir)?;
        let mut final_test = validate_sequence(self.final_test, base_dir)?;

        if let Some(bad) = final_test.iter().find(|b| !b.is_quiz()) {
            return Err(CatalogError::FinalTestNotQuiz(bad.id().to_string()));
        }

        if let Some(size) = self.final_test_size {
            let available = final_test.len();
            if size == 0 || size > available {
                return Err(CatalogError::InvalidFinalTestSize {
                    requested: size,
                    available,
                });
            }
            if size < available {
                let mut rng = match self.final_test_seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_os_rng(),
                };
                let mut keep = index::sample(&mut rng, available, size).into_vec();
                keep.sort_unstable();
                final_test = keep.into_iter().map(|i| final_test[i].clone()).collect();
            }
        }

        Ok(Catalog {
            presentation: self.presentation.filter(|p| !p.trim().is_empty()),
            final_test_intro: self.final_test_intro.filter(|p| !p.trim().is_empty()),
            blocks,
            final_test,
        })
    }
}

fn validate_sequence(
    drafts: Vec<BlockDraft>,
    base_dir: Option<&Path>,
) -> Result<Vec<Block>, CatalogError> {
    let mut seen = HashSet::with_capacity(drafts.len());
    let mut out = Vec::with_capacity(drafts.len());
    for draft in drafts {
        let block = draft.validate(base_dir)?;
        if !seen.insert(block.id().clone()) {
            return Err(CatalogError::DuplicateId(block.id().to_string()));
        }
        out.push(block);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finals(n: usize) -> Vec<BlockDraft> {
        (0..n)
            .map(|i| BlockDraft::quiz(format!("f{i}"), format!("Q{i}"), &["a", "b"], 0))
            .collect()
    }

    #[test]
    fn empty_course_is_rejected() {
        let err = CatalogDraft::new(Vec::new(), finals(1))
            .validate(None)
            .unwrap_err();
        assert_eq!(err, CatalogError::EmptyCourse);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = CatalogDraft::new(
            vec![
                BlockDraft::knowledge("k0", "a"),
                BlockDraft::knowledge("k0", "b"),
            ],
            finals(1),
        )
        .validate(None)
        .unwrap_err();
        assert_eq!(err, CatalogError::DuplicateId("k0".into()));
    }

    #[test]
    fn final_test_must_be_quizzes() {
        let err = CatalogDraft::new(
            vec![BlockDraft::knowledge("k0", "a")],
            vec![BlockDraft::knowledge("f0", "not a question")],
        )
        .validate(None)
        .unwrap_err();
        assert_eq!(err, CatalogError::FinalTestNotQuiz("f0".into()));
    }

    #[test]
    fn final_test_subset_is_fixed_length_and_ordered() {
        let mut draft = CatalogDraft::new(vec![BlockDraft::knowledge("k0", "a")], finals(6));
        draft.final_test_size = Some(3);
        draft.final_test_seed = Some(7);
        let catalog = draft.validate(None).unwrap();

        assert_eq!(catalog.final_test().len(), 3);
        let positions: Vec<usize> = catalog
            .final_test()
            .iter()
            .map(|b| b.id().as_str()[1..].parse().unwrap())
            .collect();
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        assert_eq!(positions, sorted);
    }

    #[test]
    fn oversized_subset_is_rejected() {
        let mut draft = CatalogDraft::new(vec![BlockDraft::knowledge("k0", "a")], finals(2));
        draft.final_test_size = Some(5);
        let err = draft.validate(None).unwrap_err();
        assert_eq!(
            err,
            CatalogError::InvalidFinalTestSize {
                requested: 5,
                available: 2
            }
        );
    }

    #[test]
    fn counts_course_quizzes() {
        let catalog = CatalogDraft::new(
            vec![
                BlockDraft::knowledge("k0", "a"),
                BlockDraft::quiz("q1", "?", &["a", "b"], 1),
            ],
            finals(2),
        )
        .validate(None)
        .unwrap();
        assert_eq!(catalog.course_quiz_count(), 1);
        assert_eq!(catalog.sequence(Sequence::FinalTest).len(), 2);
        assert!(catalog.block(Sequence::Course, 2).is_none());
    }
}
