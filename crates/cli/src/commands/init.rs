use crate::error::Result;

use std::path::Path;

use nodelet::AssetBundle;
use tracing::info;

pub fn init() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let bundle = AssetBundle::default();
    info!("extracting {}", bundle.path().display());
    bundle.extract(Path::new("/"))?;

    Ok(())
}
