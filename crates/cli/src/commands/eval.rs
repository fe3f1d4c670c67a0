//! `wannabe eval`: evaluate a template and print the active text.

use std::io::Read;
use std::path::PathBuf;
use wannabe_prompt::template::strip_directives;
use wannabe_prompt::{evaluate_template, is_position_in_active_region};

pub async fn run(
    text: Option<String>,
    file: Option<PathBuf>,
    position: Option<usize>,
    strip: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let source = match (text, file) {
        (Some(text), _) => text,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read {}: {e}", path.display()))?,
        (None, None) => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    if let Some(offset) = position {
        let active = is_position_in_active_region(&source, offset);
        println!("{}", if active { "active" } else { "inactive" });
        return Ok(());
    }

    let output = if strip {
        strip_directives(&source)
    } else {
        evaluate_template(&source)
    };
    print!("{output}");
    if !output.ends_with('\n') {
        println!();
    }

    Ok(())
}
