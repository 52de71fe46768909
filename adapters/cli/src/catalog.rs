//! Loading of unit catalogs from versioned TOML manifests.

use std::{collections::BTreeMap, fs, path::Path};

use anyhow::{bail, Context, Result};
use warband_core::{UnitCatalog, UnitStats};

const SUPPORTED_CATALOG_VERSION: u32 = 1;

#[derive(Debug, serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct Manifest {
    version: u32,
    units: BTreeMap<String, UnitStats>,
}

/// Reads and validates the catalog manifest at `path`.
pub(crate) fn load_catalog(path: &Path) -> Result<UnitCatalog> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read unit catalog at {}", path.display()))?;
    parse_catalog(&contents)
        .with_context(|| format!("invalid unit catalog at {}", path.display()))
}

fn parse_catalog(contents: &str) -> Result<UnitCatalog> {
    let manifest: Manifest =
        toml::from_str(contents).context("failed to parse unit catalog toml contents")?;
    if manifest.version != SUPPORTED_CATALOG_VERSION {
        bail!(
            "unsupported unit catalog version {}; expected {}",
            manifest.version,
            SUPPORTED_CATALOG_VERSION
        );
    }
    if manifest.units.is_empty() {
        bail!("unit catalog defines no units");
    }

    let mut catalog = UnitCatalog::new();
    for (name, stats) in manifest.units {
        if name.trim().is_empty() {
            bail!("unit catalog contains an entry without a name");
        }
        if !(stats.size.x > 0.0 && stats.size.y > 0.0) {
            bail!("unit `{name}` must have a positive size, got {}", stats.size);
        }
        if !(stats.speed.is_finite() && stats.speed >= 0.0) {
            bail!("unit `{name}` has invalid speed {}", stats.speed);
        }
        catalog.insert(name, stats);
    }
    Ok(catalog)
}
