use anyhow::{Context as _, Result};
use std::path::Path;

use crate::Context;
use crate::config::UserConfig;
use crate::deployment::{Dependencies, Preparer};
use crate::ui;

pub fn run(ctx: &Context, cpi_release: &Path, stemcell: &Path) -> Result<()> {
    let config = UserConfig::load()?;
    let manifest_path = super::target(&config)?;
    log::info!("Deploying {}", manifest_path.display());

    let deps = Dependencies::production(&manifest_path, &config)?;
    Preparer::new(deps)
        .deploy(&manifest_path, cpi_release, stemcell)
        .with_context(|| format!("Deploying '{}'", manifest_path.display()))?;

    if !ctx.quiet {
        ui::success("Deployed");
    }
    Ok(())
}
