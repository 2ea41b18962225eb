use std::collections::HashMap;

use super::unit::CaptureUnit;
use crate::error::{Error, Result};

/// Ordered collection of capture units with a one-to-one id <-> name mapping
#[derive(Debug, Default)]
pub struct CaptureRegistry {
    units: Vec<CaptureUnit>,
    id_to_name: HashMap<String, String>,
    name_to_id: HashMap<String, String>,
}

impl CaptureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a unit; both its id and its name must be unused
    pub fn append(&mut self, unit: CaptureUnit) -> Result<()> {
        if self.id_to_name.contains_key(unit.id()) {
            return Err(Error::DuplicateKey(format!("unit id '{}'", unit.id())));
        }
        if self.name_to_id.contains_key(unit.name()) {
            return Err(Error::DuplicateKey(format!("unit name '{}'", unit.name())));
        }
        self.id_to_name
            .insert(unit.id().to_string(), unit.name().to_string());
        self.name_to_id
            .insert(unit.name().to_string(), unit.id().to_string());
        log::debug!("registered capture unit '{}' ({})", unit.name(), unit.id());
        self.units.push(unit);
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Result<CaptureUnit> {
        let index = self.position(id)?;
        let unit = self.units.remove(index);
        self.id_to_name.remove(unit.id());
        self.name_to_id.remove(unit.name());
        Ok(unit)
    }

    /// Rename a unit, keeping the name mapping and the unit's metadata in sync
    pub fn rename(&mut self, id: &str, new_name: &str) -> Result<()> {
        let index = self.position(id)?;
        if let Some(owner) = self.name_to_id.get(new_name) {
            if owner != id {
                return Err(Error::DuplicateKey(format!("unit name '{new_name}'")));
            }
            return Ok(());
        }
        let unit = &mut self.units[index];
        self.name_to_id.remove(unit.name());
        unit.set_name(new_name);
        self.name_to_id.insert(new_name.to_string(), id.to_string());
        self.id_to_name.insert(id.to_string(), new_name.to_string());
        Ok(())
    }

    fn position(&self, id: &str) -> Result<usize> {
        self.units
            .iter()
            .position(|u| u.id() == id)
            .ok_or_else(|| Error::UnknownKey(id.to_string()))
    }

    pub fn get(&self, id: &str) -> Option<&CaptureUnit> {
        self.units.iter().find(|u| u.id() == id)
    }

    /// Mutable access; renaming through this bypasses the name mapping, use `rename`
    pub fn get_mut(&mut self, id: &str) -> Option<&mut CaptureUnit> {
        self.units.iter_mut().find(|u| u.id() == id)
    }

    pub fn get_by_name(&self, name: &str) -> Option<&CaptureUnit> {
        self.id_for_name(name).and_then(|id| self.get(id))
    }

    pub fn id_for_name(&self, name: &str) -> Option<&str> {
        self.name_to_id.get(name).map(String::as_str)
    }

    pub fn name_for_id(&self, id: &str) -> Option<&str> {
        self.id_to_name.get(id).map(String::as_str)
    }

    pub fn ids(&self) -> Vec<&str> {
        self.units.iter().map(|u| u.id()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CaptureUnit> {
        self.units.iter()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::Calibration;

    fn unit(id: &str, name: &str) -> CaptureUnit {
        let mut cal = Calibration::with_id("cal");
        cal.set_params(10.0, 10.0, 0.0, 0.0, 0.0, None).unwrap();
        CaptureUnit::reconstruct(id, name, cal)
    }

    #[test]
    fn test_bijection_enforced() {
        let mut registry = CaptureRegistry::new();
        registry.append(unit("u1", "first")).unwrap();
        registry.append(unit("u2", "second")).unwrap();

        assert!(matches!(
            registry.append(unit("u1", "other")),
            Err(Error::DuplicateKey(_))
        ));
        assert!(matches!(
            registry.append(unit("u3", "first")),
            Err(Error::DuplicateKey(_))
        ));
        assert_eq!(registry.ids(), vec!["u1", "u2"]);
        assert_eq!(registry.id_for_name("second"), Some("u2"));
        assert_eq!(registry.name_for_id("u1"), Some("first"));
        assert_eq!(registry.get_by_name("first").unwrap().id(), "u1");
    }

    #[test]
    fn test_rename_updates_both_directions() {
        let mut registry = CaptureRegistry::new();
        registry.append(unit("u1", "first")).unwrap();
        registry.append(unit("u2", "second")).unwrap();

        assert!(registry.rename("u1", "second").is_err());
        registry.rename("u1", "renamed").unwrap();
        assert_eq!(registry.id_for_name("renamed"), Some("u1"));
        assert_eq!(registry.id_for_name("first"), None);
        assert_eq!(registry.get("u1").unwrap().metadata().name, "renamed");
        assert!(matches!(
            registry.rename("missing", "x"),
            Err(Error::UnknownKey(_))
        ));
    }

    #[test]
    fn test_remove_frees_keys() {
        let mut registry = CaptureRegistry::new();
        registry.append(unit("u1", "first")).unwrap();
        let removed = registry.remove("u1").unwrap();
        assert_eq!(removed.name(), "first");
        assert!(registry.is_empty());
        registry.append(unit("u1", "first")).unwrap();
        assert_eq!(registry.len(), 1);
    }
}
