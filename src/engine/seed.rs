// src/engine/seed.rs

use std::sync::{Mutex, PoisonError};

use rand::{Rng, SeedableRng, rngs::StdRng, seq::SliceRandom};

use crate::models::module_version::Question;

/// Seeds stored on a module progress record. `None` keeps the authored order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttemptSeeds {
    pub question: Option<i64>,
    pub answer: Option<i64>,
}

/// Source of per-attempt seeds. Inject [`SeedGenerator::seeded`] in tests.
#[derive(Debug)]
pub struct SeedGenerator {
    rng: Mutex<StdRng>,
}

impl SeedGenerator {
    pub fn from_os_rng() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Draws two independent seeds, each only if requested.
    pub fn generate(&self, randomize_questions: bool, randomize_answers: bool) -> AttemptSeeds {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        let question = if randomize_questions {
            Some(rng.random::<i64>())
        } else {
            None
        };
        let answer = if randomize_answers {
            Some(rng.random::<i64>())
        } else {
            None
        };
        AttemptSeeds { question, answer }
    }
}

/// Deterministic Fisher-Yates permutation of `items` driven by `seed`.
pub fn order_for<T: Clone>(seed: Option<i64>, items: &[T]) -> Vec<T> {
    let mut ordered = items.to_vec();
    if let Some(seed) = seed {
        let mut rng = StdRng::seed_from_u64(seed as u64);
        ordered.shuffle(&mut rng);
    }
    ordered
}

/// Questions in the order this attempt sees them, answers shuffled per question.
pub fn arrange(questions: &[Question], seeds: AttemptSeeds) -> Vec<Question> {
    let mut arranged = order_for(seeds.question, questions);
    if let Some(answer_seed) = seeds.answer {
        for q in &mut arranged {
            // Mixing in the question id gives every question its own order.
            q.answers = order_for(Some(answer_seed.wrapping_add(q.id)), &q.answers);
        }
    }
    arranged
}
