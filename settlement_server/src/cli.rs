use std::{env, env::VarError};

/// There's no real CLI for the server, so just do quick 'n dirty
pub fn handle_command_line_args() -> bool {
    let has_cli_args = env::args().count() > 1;
    if has_cli_args {
        // We don't expect any CLI args, so always print the help
        display_readme();
        display_envs();
    }
    has_cli_args
}

fn display_readme() {
    const README: &str = include_str!("./cli-help.txt");
    println!("\n{README}\n");
}

fn display_envs() {
    // Be explicit about which envars to print, so as to avoid accidentally exposing secrets. MKT_DATABASE_URL may
    // carry credentials, so it is left out.
    const DISPLAY_ENVS: [&str; 16] = [
        "RUST_LOG",
        "MKT_HOST",
        "MKT_PORT",
        "MKT_CURRENCY",
        "MKT_SERVICE_FEE_BPS",
        "MKT_FIXED_FEE",
        "MKT_SHIPPING_COST",
        "MKT_TAX_BPS",
        "MKT_MAX_PRICE",
        "MKT_AMOUNT_TOLERANCE",
        "MKT_MINIMUM_PAYOUT",
        "MKT_PAYOUT_HOLD_DAYS",
        "MKT_STORAGE_TIMEOUT_MS",
        "MKT_SETTLE_MAX_ATTEMPTS",
        "MKT_WORKER_INTERVAL_SECS",
        "MKT_AUTO_PAYOUTS",
    ];

    println!("Current environment values (EXCLUDING variables that contain secrets):");
    DISPLAY_ENVS.iter().for_each(|&name| {
        let val = match env::var(name) {
            Ok(s) => s,
            Err(VarError::NotPresent) => "Not set".into(),
            Err(VarError::NotUnicode(s)) => format!("Invalid value: {}", s.to_string_lossy()),
        };
        println!("  {name:<35} {val:<15}");
    })
}
