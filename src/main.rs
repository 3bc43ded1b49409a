use postedit::core::{config, logging};

fn main() -> anyhow::Result<()> {
    let level = std::env::current_dir()
        .ok()
        .and_then(|dir| config::load_config(&dir).ok())
        .map(|c| c.log_level)
        .unwrap_or_else(|| "info".to_string());
    logging::init(&level);

    postedit::run()?;
    Ok(())
}
