//! Entity catalog
//!
//! A closed world of entities indexed by `(namespace, name)`. Records come
//! from JSON: a string holding one record or an array of records, or a
//! directory with one record per `.json` file.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{debug, warn};
use rayon::prelude::*;
use serde::Deserialize;

use crate::error::{ProjectionError, Result};
use crate::model::{Entity, TypeKey};

#[derive(Deserialize)]
#[serde(untagged)]
enum Records {
    Many(Vec<Entity>),
    One(Box<Entity>),
}

impl Records {
    fn into_vec(self) -> Vec<Entity> {
        match self {
            Self::Many(entities) => entities,
            Self::One(entity) => vec![*entity],
        }
    }
}

fn parse_records(text: &str, origin: &str) -> Result<Vec<Entity>> {
    serde_json::from_str::<Records>(text)
        .map(Records::into_vec)
        .map_err(|source| ProjectionError::Json {
            origin: origin.to_string(),
            source,
        })
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ProjectionError {
    let path = path.to_path_buf();
    move |source| ProjectionError::Io { path, source }
}

#[derive(Debug, Default, Clone)]
pub struct Catalog {
    entities: Vec<Entity>,
    index: HashMap<TypeKey, usize>,
}

impl Catalog {
    /// Index `entities`. For duplicate keys the first record wins.
    #[must_use]
    pub fn new(entities: Vec<Entity>) -> Self {
        let mut kept = Vec::with_capacity(entities.len());
        let mut index = HashMap::with_capacity(entities.len());
        for entity in entities {
            let key = entity.key();
            if index.contains_key(&key) {
                warn!("duplicate catalog entry {key}, keeping the first record");
                continue;
            }
            index.insert(key, kept.len());
            kept.push(entity);
        }
        debug!("catalog holds {} entities", kept.len());
        Self {
            entities: kept,
            index,
        }
    }

    /// Parse a single record or an array of records.
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(Self::new(parse_records(text, "<inline>")?))
    }

    /// Parse several JSON documents, each a record or an array of records.
    pub fn from_json_records(records: &[&str]) -> Result<Self> {
        let mut entities = Vec::new();
        for (i, text) in records.iter().enumerate() {
            entities.extend(parse_records(text, &format!("<record {i}>"))?);
        }
        Ok(Self::new(entities))
    }

    /// Load every `.json` file of `dir`, reading and parsing in parallel.
    ///
    /// Files are indexed in file-name order so duplicate resolution does not
    /// depend on scheduling.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();

        let mut paths: Vec<PathBuf> = Vec::new();
        for entry in fs::read_dir(dir).map_err(io_error(dir))? {
            let path = entry.map_err(io_error(dir))?.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let loaded: Mutex<Vec<(usize, Vec<Entity>)>> = Mutex::new(Vec::with_capacity(paths.len()));
        paths.par_iter().enumerate().try_for_each(|(i, path)| {
            let text = fs::read_to_string(path).map_err(io_error(path))?;
            let entities = parse_records(&text, &path.display().to_string())?;
            loaded
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push((i, entities));
            Ok::<_, ProjectionError>(())
        })?;

        let mut loaded = loaded
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        loaded.sort_by_key(|(i, _)| *i);
        debug!("loaded {} catalog files from {}", loaded.len(), dir.display());
        Ok(Self::new(loaded.into_iter().flat_map(|(_, e)| e).collect()))
    }

    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    #[must_use]
    pub fn get(&self, namespace: &str, name: &str) -> Option<&Entity> {
        self.get_key(&TypeKey::new(namespace, name))
    }

    #[must_use]
    pub fn get_key(&self, key: &TypeKey) -> Option<&Entity> {
        self.index.get(key).map(|&i| &self.entities[i])
    }
}
