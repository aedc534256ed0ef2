//! MovieLens-style ratings ingestion.
//!
//! Reads `ratings.csv` (`userId,movieId,rating[,timestamp]`) and optionally
//! `movies.csv` (`movieId,title,genres` with `|`-separated genres), densely
//! re-indexes the raw ids, and binarizes ratings against a threshold so the
//! supervised edges carry `{0, 1}` labels suitable for a BCE objective.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::graph::{HeteroGraph, NodeType, Relation};

#[derive(Debug, Deserialize)]
struct RatingRow {
    #[serde(rename = "userId")]
    user_id: u64,
    #[serde(rename = "movieId")]
    movie_id: u64,
    rating: f32,
}

#[derive(Debug, Deserialize)]
struct MovieRow {
    #[serde(rename = "movieId")]
    movie_id: u64,
    #[allow(dead_code)]
    title: String,
    genres: String,
}

/// Dense re-indexing of one raw id space.
///
/// Ids are assigned in first-seen order, so the mapping is stable for a
/// given input file.
#[derive(Debug, Clone, Default)]
pub struct IdMap {
    to_dense: HashMap<u64, u32>,
    to_raw: Vec<u64>,
}

impl IdMap {
    pub fn get_or_insert(&mut self, raw: u64) -> u32 {
        if let Some(&d) = self.to_dense.get(&raw) {
            return d;
        }
        let d = self.to_raw.len() as u32;
        self.to_dense.insert(raw, d);
        self.to_raw.push(raw);
        d
    }

    pub fn dense(&self, raw: u64) -> Option<u32> {
        self.to_dense.get(&raw).copied()
    }

    pub fn raw(&self, dense: u32) -> Option<u64> {
        self.to_raw.get(dense as usize).copied()
    }

    pub fn len(&self) -> u32 {
        self.to_raw.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.to_raw.is_empty()
    }
}

/// The ingested rating table plus id mappings, before graph assembly.
#[derive(Debug, Clone)]
pub struct RatingTable {
    pub users: IdMap,
    pub movies: IdMap,
    pub genres: Vec<String>,
    /// `(movie, user, label)` with dense ids and binarized labels.
    pub ratings: Vec<(u32, u32, f32)>,
    /// `(movie, genre)` membership edges with dense ids.
    pub movie_genres: Vec<(u32, u32)>,
}

impl RatingTable {
    /// Read ratings (and optional movie/genre metadata) from CSV files.
    ///
    /// Ratings at or above `binarize_threshold` become label 1.0, the rest
    /// 0.0. Movies that appear only in `movies.csv` are still registered so
    /// genre edges stay within bounds.
    pub fn from_csv(
        ratings_path: &Path,
        movies_path: Option<&Path>,
        binarize_threshold: f32,
    ) -> Result<Self> {
        let mut users = IdMap::default();
        let mut movies = IdMap::default();
        let mut ratings = Vec::new();

        let mut reader = csv::Reader::from_path(ratings_path)?;
        for (i, row) in reader.deserialize::<RatingRow>().enumerate() {
            let row = row.map_err(|e| Error::MalformedRecord {
                line: i as u64 + 2, // header is line 1
                reason: e.to_string(),
            })?;
            if !row.rating.is_finite() {
                return Err(Error::MalformedRecord {
                    line: i as u64 + 2,
                    reason: format!("non-finite rating {}", row.rating),
                });
            }
            let m = movies.get_or_insert(row.movie_id);
            let u = users.get_or_insert(row.user_id);
            let label = if row.rating >= binarize_threshold { 1.0 } else { 0.0 };
            ratings.push((m, u, label));
        }
        if ratings.is_empty() {
            return Err(Error::Dataset(format!(
                "no ratings found in {}",
                ratings_path.display()
            )));
        }

        let mut genres: Vec<String> = Vec::new();
        let mut genre_ids: HashMap<String, u32> = HashMap::new();
        let mut movie_genres = Vec::new();

        if let Some(path) = movies_path {
            let mut reader = csv::Reader::from_path(path)?;
            for (i, row) in reader.deserialize::<MovieRow>().enumerate() {
                let row = row.map_err(|e| Error::MalformedRecord {
                    line: i as u64 + 2,
                    reason: e.to_string(),
                })?;
                let m = movies.get_or_insert(row.movie_id);
                for genre in row.genres.split('|') {
                    let genre = genre.trim();
                    if genre.is_empty() || genre == "(no genres listed)" {
                        continue;
                    }
                    let g = *genre_ids.entry(genre.to_string()).or_insert_with(|| {
                        genres.push(genre.to_string());
                        genres.len() as u32 - 1
                    });
                    movie_genres.push((m, g));
                }
            }
        }

        Ok(Self {
            users,
            movies,
            genres,
            ratings,
            movie_genres,
        })
    }

    /// Assemble the heterogeneous graph from the ingested table.
    pub fn into_graph(self) -> Result<HeteroGraph> {
        let mut graph = HeteroGraph::new();
        graph.set_node_count(NodeType::User, self.users.len());
        graph.set_node_count(NodeType::Movie, self.movies.len());
        graph.set_node_count(NodeType::Genre, self.genres.len() as u32);

        let (src, (dst, labels)): (Vec<u32>, (Vec<u32>, Vec<f32>)) = self
            .ratings
            .iter()
            .map(|&(m, u, l)| (m, (u, l)))
            .unzip();
        graph.insert_edges(Relation::RATED_BY, src, dst, Some(labels))?;

        if !self.movie_genres.is_empty() {
            let (src, dst): (Vec<u32>, Vec<u32>) = self.movie_genres.iter().copied().unzip();
            graph.insert_edges(Relation::HAS_GENRE, src, dst, None)?;
        }

        Ok(graph)
    }
}

/// Scale `x` from `[min_val, max_val]` to `[0, 1]`.
pub fn min_max_scale(x: f32, min_val: f32, max_val: f32) -> f32 {
    (x - min_val) / (max_val - min_val)
}
