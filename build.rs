fn main() {
    // Secrets come from the environment or a .env file
    load_env_config();

    linker_be_nice();
    // make sure linkall.x is the last linker script (otherwise might cause problems with flip-link)
    println!("cargo:rustc-link-arg=-Tlinkall.x");
}

/// Compile-time configuration. Environment variables win over `.env` values.
const CONFIG_VARS: &[(&str, bool)] = &[
    ("WIFI_SSID", false),
    ("WIFI_PASSWORD", true),
    ("SPOTIFY_CLIENT_ID", false),
    ("SPOTIFY_CLIENT_SECRET", true),
    ("SPOTIFY_REFRESH_TOKEN", true),
    ("SPOTIFY_DEVICE_NAME", false),
];

fn load_env_config() {
    use std::env;
    use std::path::Path;

    println!("cargo:rerun-if-changed=.env");
    for (name, _) in CONFIG_VARS {
        println!("cargo:rerun-if-env-changed={}", name);
    }

    if Path::new(".env").exists() {
        match dotenvy::dotenv() {
            Ok(_) => println!("cargo:warning=Loaded .env file"),
            Err(e) => println!("cargo:warning=Failed to load .env file: {}", e),
        }
    }

    for (name, secret) in CONFIG_VARS {
        // Empty strings count as unset
        let value = env::var(name).unwrap_or_default().trim().to_string();
        println!("cargo:rustc-env={}={}", name, value);

        if value.is_empty() {
            println!("cargo:warning={} is empty - feature will stay unconfigured", name);
        } else if *secret {
            println!("cargo:warning={} configured (length: {})", name, value.len());
        } else {
            println!("cargo:warning={} configured: {}", name, value);
        }
    }
}

fn linker_be_nice() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 {
        let kind = &args[1];
        let what = &args[2];

        match kind.as_str() {
            "undefined-symbol" => match what.as_str() {
                "_defmt_timestamp" => {
                    eprintln!();
                    eprintln!("💡 `defmt` not found - make sure `defmt.x` is added as a linker script and you have included `use defmt_rtt as _;`");
                    eprintln!();
                }
                "_stack_start" => {
                    eprintln!();
                    eprintln!("💡 Is the linker script `linkall.x` missing?");
                    eprintln!();
                }
                "esp_wifi_preempt_enable"
                | "esp_wifi_preempt_yield_task"
                | "esp_wifi_preempt_task_create" => {
                    eprintln!();
                    eprintln!("💡 `esp-wifi` has no scheduler enabled. Make sure you have the `builtin-scheduler` feature enabled, or that you provide an external scheduler.");
                    eprintln!();
                }
                _ => (),
            },
            // we don't have anything helpful for "missing-lib" yet
            _ => {
                std::process::exit(1);
            }
        }

        std::process::exit(0);
    }

    println!(
        "cargo:rustc-link-arg=--error-handling-script={}",
        std::env::current_exe().unwrap().display()
    );
}
