use std::collections::HashMap;
use std::path::Path;

use tracing::debug;

use crate::error::ValidatorError;

/// A resource declaration from the catalog's `<Resources>` section.
#[derive(Debug, Clone)]
pub struct ResourceDecl {
    pub id: String,
    pub file_name: String,
    pub file_path: String,
}

/// A fixture document: the subject bytes of a test case.
#[derive(Debug, Clone)]
pub struct Resource {
    pub id: String,
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Read-only fixture store. All files are loaded eagerly so a missing or
/// unreadable fixture aborts the run before any request is issued.
#[derive(Debug)]
pub struct ResourceManager {
    resources: HashMap<String, Resource>,
}

impl ResourceManager {
    pub fn load(declared: &[ResourceDecl], base_dir: &Path) -> Result<Self, ValidatorError> {
        let mut resources = HashMap::new();
        for decl in declared {
            if !decl.file_name.contains('.') {
                return Err(ValidatorError::Configuration(format!(
                    "resource '{}' filename '{}' has no extension",
                    decl.id, decl.file_name
                )));
            }
            let path = base_dir.join(&decl.file_path);
            let bytes = std::fs::read(&path).map_err(|e| {
                ValidatorError::Configuration(format!(
                    "resource '{}' could not be read from {}: {}",
                    decl.id,
                    path.display(),
                    e
                ))
            })?;
            debug!(
                "Loaded resource '{}' ({}, {} bytes)",
                decl.id,
                decl.file_name,
                bytes.len()
            );
            if resources
                .insert(
                    decl.id.clone(),
                    Resource {
                        id: decl.id.clone(),
                        file_name: decl.file_name.clone(),
                        bytes,
                    },
                )
                .is_some()
            {
                return Err(ValidatorError::Configuration(format!(
                    "duplicate resource id '{}'",
                    decl.id
                )));
            }
        }
        Ok(ResourceManager { resources })
    }

    /// Build a manager from in-memory resources. Test seam; production code
    /// goes through `load`.
    pub fn from_resources(resources: Vec<Resource>) -> Self {
        ResourceManager {
            resources: resources.into_iter().map(|r| (r.id.clone(), r)).collect(),
        }
    }

    pub fn contents(&self, id: &str) -> Result<&[u8], ValidatorError> {
        self.resources
            .get(id)
            .map(|r| r.bytes.as_slice())
            .ok_or_else(|| ValidatorError::UnknownResource(id.to_string()))
    }

    pub fn file_name(&self, id: &str) -> Result<&str, ValidatorError> {
        self.resources
            .get(id)
            .map(|r| r.file_name.as_str())
            .ok_or_else(|| ValidatorError::UnknownResource(id.to_string()))
    }
}
