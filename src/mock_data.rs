use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use std::time::Instant;
use tracing::info;

use crate::store::{BookFilter, BookStore, NewBook, StoreError};

// ─── Constants ───────────────────────────────────────────────────

/// Books inserted into an empty store at startup.
pub const SEED_BOOKS: usize = 25;

// ─── Name pools ──────────────────────────────────────────────────

static FIRST: &[&str] = &[
    "Emma", "Liam", "Olivia", "Noah", "Ava", "Ethan", "Sophia", "Mason", "Isabella", "William",
    "Mia", "James", "Charlotte", "Benjamin", "Amelia",
];

static LAST: &[&str] = &[
    "Smith", "Johnson", "Williams", "Brown", "Jones", "Garcia", "Miller", "Davis", "Rodriguez",
    "Martinez", "Hernandez", "Lopez", "Gonzalez", "Wilson", "Anderson",
];

static ADJ: &[&str] = &[
    "Silent", "Hidden", "Last", "Broken", "Golden", "Distant", "Forgotten", "Burning", "Quiet",
    "Endless", "Northern", "Paper",
];

static NOUN: &[&str] = &[
    "Garden", "River", "Kingdom", "Letter", "Harbor", "Orchard", "Lantern", "Mountain", "Library",
    "Voyage", "Winter", "Clockmaker",
];

pub static STATUSES: &[&str] = &["Reading", "Completed", "Want to Read"];

// ─── Public entry points ─────────────────────────────────────────

/// Deterministic sample book; the same `rng` seed yields the same books.
pub fn random_book(rng: &mut StdRng) -> NewBook {
    let adj = ADJ[rng.gen_range(0..ADJ.len())];
    let noun = NOUN[rng.gen_range(0..NOUN.len())];
    let first = FIRST[rng.gen_range(0..FIRST.len())];
    let last = LAST[rng.gen_range(0..LAST.len())];
    let status = STATUSES[rng.gen_range(0..STATUSES.len())];

    NewBook {
        title: format!("The {adj} {noun}"),
        author: format!("{first} {last}"),
        description: format!(
            "A {} story about a {} and the people who keep its secrets.",
            adj.to_lowercase(),
            noun.to_lowercase(),
        ),
        status: status.into(),
    }
}

/// Inserts `count` sample books, but only into an empty store.
/// Returns how many were inserted.
pub async fn seed(store: &dyn BookStore, count: usize) -> Result<usize, StoreError> {
    let existing = store.count(&BookFilter::default()).await?;
    if existing > 0 {
        info!(existing, "store already populated; skipping seed");
        return Ok(0);
    }

    let start = Instant::now();
    // Deterministic RNG so re-runs produce the same data.
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..count {
        store.insert(random_book(&mut rng)).await?;
    }

    info!(
        count,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "seeded sample books"
    );
    Ok(count)
}
