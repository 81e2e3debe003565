use std::env;
use std::path::PathBuf;

fn print_usage() {
    eprintln!("Usage: hydra [OPTIONS] <manifest.json> [dest-dir]");
    eprintln!();
    eprintln!("Downloads every segment of a package manifest into dest-dir");
    eprintln!("(default: current directory).");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --parallel <N>      Maximum concurrent segment transfers (default: 30)");
    eprintln!("  --timeout <SECS>    Per-request timeout in seconds (default: none)");
    eprintln!("  --config <FILE>     Load engine settings from a TOML file");
    eprintln!("  -q, --quiet         Suppress progress rendering");
    eprintln!("  -h, --help          Show this help");
    eprintln!();
    eprintln!("Set RUST_LOG=debug for engine logs.");
}

#[tokio::main]
async fn main() -> hydra_dl::Result<()> {
    env_logger::init();

    let mut parallel = None;
    let mut timeout_secs = None;
    let mut config_path = None;
    let mut quiet = false;
    let mut positional: Vec<String> = Vec::new();

    let args: Vec<String> = env::args().skip(1).collect();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_usage();
                std::process::exit(0);
            }
            "-q" | "--quiet" => quiet = true,
            "--parallel" => {
                i += 1;
                match args.get(i).and_then(|v| v.parse::<usize>().ok()) {
                    Some(n) if n > 0 => parallel = Some(n),
                    _ => {
                        eprintln!("Error: --parallel requires a positive number");
                        std::process::exit(1);
                    }
                }
            }
            "--timeout" => {
                i += 1;
                match args.get(i).and_then(|v| v.parse::<u64>().ok()) {
                    Some(secs) => timeout_secs = Some(secs),
                    None => {
                        eprintln!("Error: --timeout requires a number of seconds");
                        std::process::exit(1);
                    }
                }
            }
            "--config" => {
                i += 1;
                if i < args.len() {
                    config_path = Some(PathBuf::from(&args[i]));
                } else {
                    eprintln!("Error: --config requires a file path");
                    std::process::exit(1);
                }
            }
            other if other.starts_with('-') => {
                eprintln!("Error: unknown option {other}");
                eprintln!();
                print_usage();
                std::process::exit(1);
            }
            other => positional.push(other.to_string()),
        }
        i += 1;
    }

    if positional.is_empty() {
        print_usage();
        std::process::exit(i32::from(!args.is_empty()));
    }

    let manifest_path = PathBuf::from(&positional[0]);
    let dest_dir = positional
        .get(1)
        .map_or_else(|| PathBuf::from("."), PathBuf::from);

    #[cfg(feature = "cli")]
    {
        let options = hydra_dl::cli::CliOptions {
            manifest_path,
            dest_dir,
            parallel,
            timeout_secs,
            config_path,
            quiet,
        };
        let report = hydra_dl::cli::run_download(options).await?;
        if report.outcome != hydra_dl::SessionOutcome::Completed {
            std::process::exit(1);
        }
        Ok(())
    }
    #[cfg(not(feature = "cli"))]
    {
        let _ = (manifest_path, dest_dir, parallel, timeout_secs, config_path, quiet);
        eprintln!("CLI support not compiled in");
        std::process::exit(1);
    }
}
