use std::collections::HashMap;

use tracing::debug;

use crate::models::Movie;

/// Title-keyed movie collection that keeps first-occurrence order.
///
/// The first record seen for a title owns the metadata; later records with the
/// same title only contribute screenings the owner does not list yet.
#[derive(Debug, Default)]
pub struct MovieMap {
    movies: Vec<Movie>,
    index: HashMap<String, usize>,
}

impl MovieMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopts `movie` or folds its screenings into the record already held
    /// under the same title. Returns `true` when the title was new.
    pub fn insert(&mut self, mut movie: Movie) -> bool {
        if let Some(&pos) = self.index.get(&movie.title) {
            let existing = &mut self.movies[pos];
            for screening in movie.screenings {
                existing.add_screening(screening);
            }
            return false;
        }

        // The incoming record may itself repeat a slot.
        let screenings = std::mem::take(&mut movie.screenings);
        for screening in screenings {
            movie.add_screening(screening);
        }
        self.index.insert(movie.title.clone(), self.movies.len());
        self.movies.push(movie);
        true
    }

    pub fn get(&self, title: &str) -> Option<&Movie> {
        self.index.get(title).map(|&pos| &self.movies[pos])
    }

    pub fn len(&self) -> usize {
        self.movies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.movies.is_empty()
    }

    pub fn into_movies(self) -> Vec<Movie> {
        self.movies
    }
}

/// Flattens per-date results and merges movies sharing a title.
///
/// Output keeps the encounter order of each title's first occurrence.
pub fn merge_movies<I, M>(results: I) -> Vec<Movie>
where
    I: IntoIterator<Item = M>,
    M: IntoIterator<Item = Movie>,
{
    let mut map = MovieMap::new();
    let mut seen = 0usize;
    for movie in results.into_iter().flatten() {
        seen += 1;
        map.insert(movie);
    }
    debug!(records = seen, unique = map.len(), "merged movie records");
    map.into_movies()
}
