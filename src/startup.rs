// Startup module - displays banner and module loading status

use crate::config::{Config, VERSION};

/// ANSI color codes for terminal output
mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GREEN: &str = "\x1b[32m";
    pub const MAGENTA: &str = "\x1b[35m";
}

/// Module loading result for display
struct ModuleStatus {
    name: &'static str,
    enabled: bool,
    description: String,
}

/// Print the startup banner and module loading status
pub fn print_startup(config: &Config) {
    use colors::*;

    println!();
    println!("  {BOLD}{CYAN}Persona{RESET} {DIM}v{VERSION}{RESET}");
    println!("  {DIM}Behavioral profiling pipeline and adaptive prompt service{RESET}");
    println!();

    // Config file status
    if let Some(path) = Config::config_path() {
        if path.exists() {
            println!("  {DIM}Config:{RESET} {GREEN}✓{RESET} {}", path.display());
        } else {
            println!("  {DIM}Config:{RESET} {DIM}(using defaults){RESET}");
        }
    }
    println!();

    println!("  {DIM}Loading modules...{RESET}");
    for module in get_module_status(config) {
        let icon = if module.enabled {
            format!("{GREEN}✓{RESET}")
        } else {
            format!("{DIM}○{RESET}")
        };
        println!(
            "    {icon} {:<12} {DIM}{}{RESET}",
            module.name, module.description
        );
    }
    println!();

    println!(
        "  {MAGENTA}▸{RESET} Service listening on {BOLD}{}{RESET}",
        config.bind_addr
    );
    println!();
}

fn get_module_status(config: &Config) -> Vec<ModuleStatus> {
    vec![
        ModuleStatus {
            name: "store",
            enabled: true, // Core, always on
            description: format!("SQLite at {}", config.db_path.display()),
        },
        ModuleStatus {
            name: "ingest",
            enabled: true,
            description: format!("chunk size {}", config.ingest.chunk_size),
        },
        ModuleStatus {
            name: "scoring",
            enabled: true,
            description: format!(
                "sample {} msgs via {}",
                config.ingest.sample_limit, config.llm.model
            ),
        },
        ModuleStatus {
            name: "agent",
            enabled: true,
            description: "adaptive prompt composition".to_string(),
        },
        ModuleStatus {
            name: "file-logs",
            enabled: config.logging.file_enabled,
            description: format!("{} rotation", config.logging.file_rotation.as_str()),
        },
    ]
}
