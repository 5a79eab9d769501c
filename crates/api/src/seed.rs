//! Reference data file loaded at startup.

use std::path::Path;

use domain::CatalogSeed;
use serde::Deserialize;
use store::StoreSeed;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("failed to read seed file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse seed file {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

/// One JSON document holding customers, products and delivery defaults for the
/// catalog alongside suppliers and stock for the store.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SeedFile {
    #[serde(flatten)]
    pub catalog: CatalogSeed,
    #[serde(flatten)]
    pub store: StoreSeed,
}

impl SeedFile {
    pub fn load(path: &Path) -> Result<Self, SeedError> {
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| SeedError::Io {
            path: display.clone(),
            source,
        })?;
        Self::parse(&raw).map_err(|source| SeedError::Parse {
            path: display,
            source,
        })
    }

    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_one_document_into_both_seeds() {
        let seed = SeedFile::parse(
            r#"{
                "customers": [{ "id": "CUST-001", "name": "Acme", "email": "a@acme.test" }],
                "products": [{ "id": "P-100", "name": "Widget", "unitPrice": 25.0 }],
                "suppliers": [{ "id": "SUP-001", "name": "Main", "email": "s@sup.test", "products": ["P-100"] }],
                "inventory": [{ "productId": "P-100", "quantityOnHand": 50, "reorderLevel": 5 }]
            }"#,
        )
        .unwrap();

        assert_eq!(seed.catalog.customers.len(), 1);
        assert_eq!(seed.catalog.products.len(), 1);
        assert_eq!(seed.store.suppliers.len(), 1);
        assert_eq!(seed.store.inventory[0].quantity_on_hand, 50);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = SeedFile::load(Path::new("/nonexistent/catalog.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/catalog.json"));
    }
}
