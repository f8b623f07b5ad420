//! Fire-and-forget link-out to a spool's profile page.

use anyhow::{bail, Context, Result};
use log::info;

/// Opens `url` with the configured browser, or the system handler when none is set.
/// Returns once the browser is launched; it is never waited on.
pub fn open_profile(url: &str, browser: Option<&str>) -> Result<()> {
    if !is_web_link(url) {
        bail!("{url} is not a web link");
    }

    match browser {
        Some(app) => open::with_detached(url, app)
            .with_context(|| format!("failed to open {url} with {app}"))?,
        None => open::that_detached(url).with_context(|| format!("failed to open {url}"))?,
    }

    info!("Opened profile page {url}");
    Ok(())
}

pub fn is_web_link(value: &str) -> bool {
    value.starts_with("https://") || value.starts_with("http://")
}
