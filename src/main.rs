use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cfg = bass_cube::config::Config::parse();
    if cfg.list_devices {
        bass_cube::transport::list_output_devices()?;
        return Ok(());
    }

    bass_cube::app::run(cfg)
}
