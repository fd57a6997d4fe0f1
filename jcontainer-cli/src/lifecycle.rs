//! `jcontainer list|stop|logs|rm` — thin wrappers over [`jcontainer::lifecycle`].

use anyhow::Result;
use jcontainer::lifecycle;
use jcontainer::state::Registry;

pub fn list() -> Result<()> {
    let registry = Registry::open();
    lifecycle::list(&registry, &mut std::io::stdout())?;
    Ok(())
}

pub fn stop(id: &str) -> Result<()> {
    let registry = Registry::open();
    lifecycle::stop(&registry, id, &mut std::io::stderr())?;
    Ok(())
}

pub fn logs(id: &str) -> Result<()> {
    let registry = Registry::open();
    lifecycle::logs(&registry, id, &mut std::io::stdout(), &mut std::io::stderr())?;
    Ok(())
}

pub fn rm(id: &str) -> Result<()> {
    let registry = Registry::open();
    lifecycle::rm(&registry, id)?;
    eprintln!("Removed: {id}");
    Ok(())
}
