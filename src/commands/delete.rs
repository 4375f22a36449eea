use anyhow::{Context as _, Result};
use std::path::Path;

use crate::Context;
use crate::config::UserConfig;
use crate::deployment::{Deleter, Dependencies};
use crate::ui;

pub fn run(ctx: &Context, cpi_release: &Path) -> Result<()> {
    let config = UserConfig::load()?;
    let manifest_path = super::target(&config)?;
    log::info!("Deleting {}", manifest_path.display());

    let deps = Dependencies::production(&manifest_path, &config)?;
    Deleter::new(deps)
        .delete(&manifest_path, cpi_release)
        .with_context(|| format!("Deleting '{}'", manifest_path.display()))?;

    if !ctx.quiet {
        ui::success("Deleted");
    }
    Ok(())
}
