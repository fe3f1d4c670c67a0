//! `wannabe onboard`: first-time setup.

use wannabe_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");
    let projects_dir = AppConfig::projects_dir();

    println!("✍️  Wannabe: First-Time Setup");
    println!("==============================\n");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir)?;
        println!("✅ Created config directory: {}", config_dir.display());
    } else {
        println!("  Config directory exists: {}", config_dir.display());
    }

    if !projects_dir.exists() {
        std::fs::create_dir_all(&projects_dir)?;
        println!("✅ Created projects directory: {}", projects_dir.display());
    }

    if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())?;
        println!("✅ Created config.toml at: {}", config_path.display());
        println!("\n📝 Next steps:");
        println!("   1. Start KoboldCpp and set [server] base_url in {}", config_path.display());
        println!("   2. Run: wannabe doctor");
        println!("   3. Run: wannabe generate <project.json>\n");
    }

    Ok(())
}
