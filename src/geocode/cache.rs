use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info};

use super::postcodes_io::lookup_candidates;
use super::{GeocodeError, Geocoder};
use crate::geo::Coordinates;
use crate::shipment::normalize_postcode;

/// Known postcode coordinates, keyed by normalized postcode.
///
/// Stored on disk as a JSON object:
/// ```json
/// {
///   "B112AB": { "latitude": 52.46, "longitude": -1.86 },
///   "SW1A1AA": { "latitude": 51.501, "longitude": -0.141 }
/// }
/// ```
///
/// Populated lazily by [`super::PostcodesIo`]; the host decides when to
/// [`save`](Self::save) it. Matching and estimation only ever read it.
#[derive(Debug, Clone, Default)]
pub struct PostcodeCache {
    entries: BTreeMap<String, Coordinates>,
    dirty: bool,
}

impl PostcodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the cache from `path`. A missing file gives an empty cache.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "No postcode cache on disk, starting empty");
            return Ok(Self::new());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read postcode cache {}", path.display()))?;
        let raw: BTreeMap<String, Coordinates> = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse postcode cache {}", path.display()))?;

        let entries: BTreeMap<String, Coordinates> = raw
            .into_iter()
            .map(|(k, v)| (normalize_postcode(&k), v))
            .collect();

        info!(path = %path.display(), entries = entries.len(), "Loaded postcode cache");
        Ok(Self {
            entries,
            dirty: false,
        })
    }

    /// Writes the cache as pretty JSON and clears the dirty flag.
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(path, content)
            .with_context(|| format!("failed to write postcode cache {}", path.display()))?;
        self.dirty = false;

        info!(path = %path.display(), entries = self.entries.len(), "Saved postcode cache");
        Ok(())
    }

    pub fn get(&self, postcode: &str) -> Option<Coordinates> {
        self.entries.get(&normalize_postcode(postcode)).copied()
    }

    pub fn insert(&mut self, postcode: &str, coordinates: Coordinates) {
        let key = normalize_postcode(postcode);
        if self.entries.insert(key, coordinates) != Some(coordinates) {
            self.dirty = true;
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `true` once an entry was added since the last load or save.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Builds a coordinate to postcode index with coordinates rounded to `rounding_dp` places.
    ///
    /// When several postcodes round to the same cell the lexicographically first wins.
    pub fn reverse_index(&self, rounding_dp: u32) -> ReverseIndex {
        let mut cells = HashMap::new();
        for (postcode, coordinates) in &self.entries {
            cells
                .entry(ReverseIndex::cell(coordinates, rounding_dp))
                .or_insert_with(|| postcode.clone());
        }
        ReverseIndex { rounding_dp, cells }
    }
}

/// Cache-only resolution, trying the same full postcode and outcode keys as the online lookup.
#[async_trait]
impl Geocoder for PostcodeCache {
    async fn resolve(&self, postcode: &str) -> Result<Coordinates, GeocodeError> {
        let key = normalize_postcode(postcode);
        if key.is_empty() {
            return Err(GeocodeError::EmptyPostcode);
        }
        if let Some(hit) = self.get(&key) {
            return Ok(hit);
        }

        lookup_candidates(&key)
            .iter()
            .find_map(|target| self.get(target.code()))
            .ok_or(GeocodeError::NotFound { postcode: key })
    }
}

/// Rounded-coordinate lookup of postcodes, used to fill missing dataset postcodes.
#[derive(Debug, Clone)]
pub struct ReverseIndex {
    rounding_dp: u32,
    cells: HashMap<(i64, i64), String>,
}

impl ReverseIndex {
    fn cell(coordinates: &Coordinates, rounding_dp: u32) -> (i64, i64) {
        let scale = 10f64.powi(rounding_dp as i32);
        (
            (coordinates.latitude * scale).round() as i64,
            (coordinates.longitude * scale).round() as i64,
        )
    }

    pub fn lookup(&self, coordinates: &Coordinates) -> Option<&str> {
        self.cells
            .get(&Self::cell(coordinates, self.rounding_dp))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;

    fn temp_path(name: &str) -> String {
        format!("{}/{}", env::temp_dir().display(), name)
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let cache = PostcodeCache::load(temp_path("lane_pricer_no_such_cache.json")).unwrap();
        assert!(cache.is_empty());
        assert!(!cache.is_dirty());
    }

    #[test]
    fn test_insert_normalizes_and_marks_dirty() {
        let mut cache = PostcodeCache::new();
        cache.insert("sw1a 1aa", Coordinates::new(51.501, -0.141));
        assert!(cache.is_dirty());
        assert_eq!(cache.get("SW1A1AA"), Some(Coordinates::new(51.501, -0.141)));
        assert_eq!(cache.get(" Sw1A 1aA"), Some(Coordinates::new(51.501, -0.141)));
    }

    #[test]
    fn test_save_then_load() {
        let path = temp_path("lane_pricer_test_cache.json");
        let _ = fs::remove_file(&path);

        let mut cache = PostcodeCache::new();
        cache.insert("B11 2AB", Coordinates::new(52.46, -1.86));
        cache.save(&path).unwrap();
        assert!(!cache.is_dirty());

        let loaded = PostcodeCache::load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.get("b112ab"), Some(Coordinates::new(52.46, -1.86)));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_reverse_index_rounds() {
        let mut cache = PostcodeCache::new();
        cache.insert("LS1 4AP", Coordinates::new(53.7960, -1.5490));
        let index = cache.reverse_index(2);
        assert_eq!(index.lookup(&Coordinates::new(53.7981, -1.5512)), Some("LS14AP"));
        assert_eq!(index.lookup(&Coordinates::new(53.81, -1.55)), None);
    }

    #[tokio::test]
    async fn test_cache_only_resolution_falls_back_to_outcode() {
        let mut cache = PostcodeCache::new();
        cache.insert("SW1A", Coordinates::new(51.50, -0.14));
        let resolved = cache.resolve("sw1a 2zz").await.unwrap();
        assert_eq!(resolved, Coordinates::new(51.50, -0.14));
    }

    #[tokio::test]
    async fn test_cache_only_resolution_errors() {
        let cache = PostcodeCache::new();
        assert!(matches!(
            cache.resolve("  ").await,
            Err(GeocodeError::EmptyPostcode)
        ));
        assert!(matches!(
            cache.resolve("ZZ9 9ZZ").await,
            Err(GeocodeError::NotFound { .. })
        ));
    }
}
