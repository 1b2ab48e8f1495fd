use tq_cover::Profile;
use tq_error::{Result, TqError};
use tq_locator::FunctionLocator;
use tq_types::CoverageResult;
use tracing::info;

use crate::packages::PackageIndex;

/// Attribute every block of the aggregate profile to its enclosing
/// function.
///
/// Unlike the per-test path, a profile entry whose source cannot be found,
/// read or scanned fails the whole collection.
pub fn collect_coverage(
    profiles: &[Profile],
    packages: &PackageIndex,
    locator: &FunctionLocator,
) -> Result<Vec<CoverageResult>> {
    let mut rows = Vec::with_capacity(profiles.iter().map(|p| p.blocks.len()).sum());
    for profile in profiles {
        let source = packages
            .source_path(&profile.file_name)
            .ok_or_else(|| TqError::SourceNotFound {
                file: profile.file_name.clone(),
            })?;
        let index = locator.index(&source)?;
        for block in &profile.blocks {
            let function = index.function_at(block.start.line).unwrap_or_default();
            rows.push(CoverageResult::from_block(
                profile.package(),
                profile.base_name(),
                block,
                function,
            ));
        }
    }
    info!(
        files = profiles.len(),
        blocks = rows.len(),
        uncovered = rows.iter().filter(|r| r.count == 0).count(),
        "collected aggregate coverage"
    );
    Ok(rows)
}
