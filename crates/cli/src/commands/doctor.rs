//! `wannabe doctor`: diagnose config and server health.

use wannabe_config::AppConfig;
use wannabe_core::TokenOracle;
use wannabe_providers::KoboldClient;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 Wannabe Doctor");
    println!("=================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_dir().join("config.toml");
    if !config_path.exists() {
        println!("  ⚠️  No config file, using defaults. Run `wannabe onboard`");
        issues += 1;
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  Fix the config before checking the server.");
            return Ok(());
        }
    };

    match KoboldClient::from_config(&config) {
        Ok(client) => match client.true_max_context_length().await {
            Some(context) => {
                println!("  ✅ Server reachable at {} (context {context} tokens)", client.base_url());
                if client.count_tokens("テスト").await.is_some() {
                    println!("  ✅ Token counting available");
                } else {
                    println!("  ⚠️  Token counting failed, prompts will use estimates");
                    issues += 1;
                }
            }
            None => {
                println!(
                    "  ❌ Server not reachable at {}, fitting falls back to {} tokens",
                    client.base_url(),
                    config.compression.fallback_context_length
                );
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ Server not configured: {e}");
            issues += 1;
        }
    }

    if AppConfig::projects_dir().exists() {
        println!("  ✅ Projects directory exists");
    } else {
        println!("  ⚠️  No projects directory. Run `wannabe onboard`");
        issues += 1;
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
