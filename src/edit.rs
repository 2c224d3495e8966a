// src/edit.rs

//! Edit (Levenshtein) distance, computed two ways.
//!
//! [`distance_cached`] is the recursive formulation memoized in a persistent
//! [`Cache`] keyed by [`EditKey`], so a second run over the same strings is a
//! single lookup. [`distance_graph`] expresses the same recursion as a graph
//! of tasks, one per cell `dist(i,j)`, and lets the engine pull only the
//! cells the final answer depends on.
//!
//! Strings are compared by `char`, not by byte.

use serde::{Deserialize, Serialize};

use crate::cache::Cache;
use crate::errors::GraphError;
use crate::graph::{Fetch, Resource, ResourceKey, System, Task};

/// Cache key for one cell of one `(a, b)` problem.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EditKey {
    pub a: String,
    pub b: String,
    pub i: usize,
    pub j: usize,
}

/// Edit distance between `a` and `b`, memoizing every visited cell in
/// `cache`.
pub fn distance_cached(a: &str, b: &str, cache: &mut Cache<EditKey, usize>) -> usize {
    let ac: Vec<char> = a.chars().collect();
    let bc: Vec<char> = b.chars().collect();
    let problem = Problem { a, b, ac: &ac, bc: &bc };
    problem.cell(ac.len(), bc.len(), cache)
}

struct Problem<'a> {
    a: &'a str,
    b: &'a str,
    ac: &'a [char],
    bc: &'a [char],
}

impl Problem<'_> {
    fn cell(&self, i: usize, j: usize, cache: &mut Cache<EditKey, usize>) -> usize {
        let key = EditKey {
            a: self.a.to_string(),
            b: self.b.to_string(),
            i,
            j,
        };

        cache.get_or_eval(key, |cache| {
            if j == 0 {
                return i;
            }
            if i == 0 {
                return j;
            }

            let replace = self.cell(i - 1, j - 1, cache);
            if self.ac[i - 1] == self.bc[j - 1] {
                return replace;
            }
            let insert = self.cell(i, j - 1, cache) + 1;
            let delete = self.cell(i - 1, j, cache) + 1;
            (replace + 1).min(insert).min(delete)
        })
    }
}

pub fn cell_key(i: usize, j: usize) -> ResourceKey {
    ResourceKey::new("dist").int(i as i64).int(j as i64)
}

fn char_key(side: &str, index: usize) -> ResourceKey {
    ResourceKey::new(side).int(index as i64)
}

fn cell_task_name(i: usize, j: usize) -> String {
    format!("dist({i},{j})")
}

/// A [`System`] with the characters of `a` and `b` seeded as `a(i)` / `b(j)`
/// (1-based) and one task per cell `dist(i,j)`, `0 <= i <= |a|`,
/// `0 <= j <= |b|`.
pub fn edit_distance_system(a: &str, b: &str) -> Result<System, GraphError> {
    let n = a.chars().count();
    let m = b.chars().count();

    let seeds = a
        .chars()
        .enumerate()
        .map(|(i, c)| (char_key("a", i + 1), Resource::Str(c.to_string())))
        .chain(
            b.chars()
                .enumerate()
                .map(|(j, c)| (char_key("b", j + 1), Resource::Str(c.to_string()))),
        );
    let mut system = System::with_resources(seeds);

    for i in 0..=n {
        for j in 0..=m {
            let task = Task::single(cell_key(i, j), move |fetch: &mut dyn Fetch| {
                Ok(Resource::Int(cell_value(fetch, i, j)?))
            });
            system.register(cell_task_name(i, j), task)?;
        }
    }

    Ok(system)
}

fn cell_value(fetch: &mut dyn Fetch, i: usize, j: usize) -> Result<i64, GraphError> {
    if j == 0 {
        return Ok(i as i64);
    }
    if i == 0 {
        return Ok(j as i64);
    }

    let ac = fetch.string(&char_key("a", i))?;
    let bc = fetch.string(&char_key("b", j))?;

    let replace = fetch.int(&cell_key(i - 1, j - 1))?;
    if ac == bc {
        return Ok(replace);
    }
    let insert = fetch.int(&cell_key(i, j - 1))? + 1;
    let delete = fetch.int(&cell_key(i - 1, j))? + 1;
    Ok((replace + 1).min(insert).min(delete))
}

/// Edit distance through the graph engine.
///
/// Returns the system as well so callers can inspect how many cells were
/// actually evaluated ([`System::invocations`]).
pub fn distance_graph(a: &str, b: &str) -> Result<(usize, System), GraphError> {
    let mut system = edit_distance_system(a, b)?;
    let key = cell_key(a.chars().count(), b.chars().count());
    let distance = system.int(&key)?;
    Ok((distance as usize, system))
}
