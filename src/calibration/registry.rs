use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::model::Calibration;
use super::record::RECORD_EXTENSION;
use crate::error::{Error, Result};

/// Callback invoked after the registry has been (re)loaded
pub type Observer = Box<dyn Fn(&CalibrationRegistry) + Send>;

/// Ordered collection of calibrations keyed by their id,
/// loaded in bulk from a folder of `.json` records.
#[derive(Default)]
pub struct CalibrationRegistry {
    calibrations: Vec<Calibration>,
    source_dir: Option<PathBuf>,
    observers: Vec<Observer>,
}

impl CalibrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from every calibration record in `dir`
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let mut registry = Self::new();
        registry.load_dir(dir)?;
        Ok(registry)
    }

    /// Replace the contents with the calibrations found in `dir`.
    ///
    /// Files that fail to load are skipped with a warning; only a missing
    /// directory fails the whole load. Returns the number loaded.
    pub fn load_dir(&mut self, dir: &Path) -> Result<usize> {
        if !dir.is_dir() {
            return Err(Error::NotFound(dir.to_path_buf()));
        }

        let mut loaded: Vec<Calibration> = Vec::new();
        let mut skipped = 0usize;

        for entry in WalkDir::new(dir)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            match path.extension() {
                Some(ext) if ext.to_string_lossy().eq_ignore_ascii_case(RECORD_EXTENSION) => {}
                _ => continue,
            }

            match Calibration::load_json(path) {
                Ok(cal) => {
                    if let Some(existing) = loaded.iter_mut().find(|c| c.id() == cal.id()) {
                        log::warn!(
                            "duplicate calibration id '{}' in {}, keeping the later file",
                            cal.id(),
                            path.display()
                        );
                        *existing = cal;
                    } else {
                        loaded.push(cal);
                    }
                }
                Err(e) => {
                    skipped += 1;
                    log::warn!("⚠️  Skipping calibration {}: {}", path.display(), e);
                }
            }
        }

        log::info!(
            "📁 Loaded {} calibrations from {} ({} skipped)",
            loaded.len(),
            dir.display(),
            skipped
        );

        self.calibrations = loaded;
        self.source_dir = Some(dir.to_path_buf());
        self.notify();
        Ok(self.calibrations.len())
    }

    /// Load again from the last directory
    pub fn reload(&mut self) -> Result<usize> {
        let dir = self
            .source_dir
            .clone()
            .ok_or_else(|| crate::error::precondition("registry was never loaded from a directory"))?;
        self.load_dir(&dir)
    }

    /// Register a callback run after every (re)load
    pub fn subscribe(&mut self, observer: Observer) {
        self.observers.push(observer);
    }

    fn notify(&self) {
        for observer in &self.observers {
            observer(self);
        }
    }

    pub fn source_dir(&self) -> Option<&Path> {
        self.source_dir.as_deref()
    }

    pub fn get(&self, id: &str) -> Option<&Calibration> {
        self.calibrations.iter().find(|c| c.id() == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Insert or replace by id, keeping the original position on replace
    pub fn insert(&mut self, calibration: Calibration) {
        match self
            .calibrations
            .iter_mut()
            .find(|c| c.id() == calibration.id())
        {
            Some(existing) => *existing = calibration,
            None => self.calibrations.push(calibration),
        }
    }

    pub fn remove(&mut self, id: &str) -> Result<Calibration> {
        let index = self
            .calibrations
            .iter()
            .position(|c| c.id() == id)
            .ok_or_else(|| Error::UnknownKey(id.to_string()))?;
        Ok(self.calibrations.remove(index))
    }

    pub fn ids(&self) -> Vec<&str> {
        self.calibrations.iter().map(|c| c.id()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Calibration> {
        self.calibrations.iter()
    }

    pub fn len(&self) -> usize {
        self.calibrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calibrations.is_empty()
    }
}

impl std::fmt::Debug for CalibrationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CalibrationRegistry")
            .field("ids", &self.ids())
            .field("source_dir", &self.source_dir)
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn calibration(id: &str, scale: f64) -> Calibration {
        let mut cal = Calibration::with_id(id);
        cal.set_params(scale, scale, 0.0, 0.0, 0.0, None).unwrap();
        cal
    }

    #[test]
    fn test_load_dir_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        calibration("obj_10x", 10.0)
            .save_json(&dir.path().join("a.json"))
            .unwrap();
        calibration("obj_50x", 50.0)
            .save_json(&dir.path().join("b.json"))
            .unwrap();
        fs::write(dir.path().join("c.json"), "{ broken").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let registry = CalibrationRegistry::from_dir(dir.path()).unwrap();
        assert_eq!(registry.ids(), vec!["obj_10x", "obj_50x"]);
        assert_eq!(registry.get("obj_50x").unwrap().scale_x(), Some(50.0));
    }

    #[test]
    fn test_missing_dir_fails() {
        let mut registry = CalibrationRegistry::new();
        assert!(matches!(
            registry.load_dir(Path::new("/nonexistent/calibrations")),
            Err(Error::NotFound(_))
        ));
        assert!(registry.reload().is_err());
    }

    #[test]
    fn test_observers_run_on_reload() {
        let dir = tempfile::tempdir().unwrap();
        calibration("obj_10x", 10.0)
            .save_json(&dir.path().join("a.json"))
            .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let mut registry = CalibrationRegistry::new();
        registry.subscribe(Box::new(move |r| {
            assert!(!r.is_empty());
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        registry.load_dir(dir.path()).unwrap();
        calibration("obj_20x", 20.0)
            .save_json(&dir.path().join("b.json"))
            .unwrap();
        assert_eq!(registry.reload().unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_insert_and_remove() {
        let mut registry = CalibrationRegistry::new();
        registry.insert(calibration("a", 1.0));
        registry.insert(calibration("b", 2.0));
        registry.insert(calibration("a", 3.0));
        assert_eq!(registry.ids(), vec!["a", "b"]);
        assert_eq!(registry.get("a").unwrap().scale_x(), Some(3.0));

        registry.remove("a").unwrap();
        assert!(!registry.contains("a"));
        assert!(matches!(registry.remove("a"), Err(Error::UnknownKey(_))));
    }
}
