//! Complex-block coverage report.

use crate::catalog::{BlockCatalog, ComplexBlock};
use crate::structure::PromptStructure;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoverageEntry {
    pub block: ComplexBlock,
    /// Occurrences in the structure. Exactly one is expected.
    pub count: usize,
    #[serde(skip)]
    pub definition: &'static str,
}

/// Which complex blocks of a catalog a structure uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoverageReport {
    pub entries: Vec<CoverageEntry>,
}

impl CoverageReport {
    pub fn analyze(structure: &PromptStructure, catalog: &BlockCatalog) -> Self {
        Self {
            entries: catalog
                .complex_defs()
                .iter()
                .map(|def| CoverageEntry {
                    block: def.block,
                    count: structure.count_complex(def.block),
                    definition: def.definition,
                })
                .collect(),
        }
    }

    pub fn found(&self) -> impl Iterator<Item = ComplexBlock> + '_ {
        self.entries.iter().filter(|e| e.count > 0).map(|e| e.block)
    }

    pub fn missing(&self) -> impl Iterator<Item = ComplexBlock> + '_ {
        self.entries.iter().filter(|e| e.count == 0).map(|e| e.block)
    }

    pub fn duplicated(&self) -> impl Iterator<Item = (ComplexBlock, usize)> + '_ {
        self.entries
            .iter()
            .filter(|e| e.count > 1)
            .map(|e| (e.block, e.count))
    }

    pub fn percent(&self) -> f64 {
        if self.entries.is_empty() {
            return 100.0;
        }
        self.found().count() as f64 * 100.0 / self.entries.len() as f64
    }

    /// Every block present exactly once.
    pub fn is_complete(&self) -> bool {
        self.entries.iter().all(|e| e.count == 1)
    }
}

impl fmt::Display for CoverageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== COMPLEX BLOCK COVERAGE ===")?;
        for entry in &self.entries {
            match entry.count {
                0 => writeln!(f, "❌ MISSING: {}", entry.block)?,
                1 => writeln!(f, "✅ FOUND: {}", entry.block)?,
                n => writeln!(f, "✅ FOUND: {} (x{n})", entry.block)?,
            }
        }
        write!(
            f,
            "Coverage: {}/{} complex blocks ({:.1}%)",
            self.found().count(),
            self.entries.len(),
            self.percent()
        )?;
        let missing: Vec<&CoverageEntry> = self.entries.iter().filter(|e| e.count == 0).collect();
        if !missing.is_empty() {
            write!(f, "\nMissing blocks ({}):", missing.len())?;
            for entry in missing {
                write!(f, "\n  - {}\n    Definition: {}", entry.block, entry.definition)?;
            }
        }
        Ok(())
    }
}
