//! src/main.rs

use anyhow::Result;
use std::{ env, path::PathBuf, sync::Arc };

use sonar_match::logger::{ LogLevel, Logger };
use sonar_match::mods::matcher::MatchConfig;
use sonar_match::mods::offline::{ self, OfflineJob };

#[derive(Clone, Debug)]
pub struct Config {
    // inputs
    pub pattern_path: String,
    pub search_path: String,

    // matching
    pub sample_rate_hz: u32,
    pub threshold: f32,
    pub min_distance: Option<usize>,
    pub max_memory_mb: usize,

    // outputs
    pub csv_path: String,
    pub log_path: String,
    pub log_level: LogLevel,
    pub echo: bool,
}

impl Default for Config {
    fn default() -> Self {
        let defaults = MatchConfig::default();
        let default_log = env
            ::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join("Match.log")
            .to_string_lossy()
            .into_owned();

        Self {
            pattern_path: String::new(),
            search_path: String::new(),

            sample_rate_hz: defaults.target_sample_rate,
            threshold: defaults.threshold,
            min_distance: defaults.min_distance,
            max_memory_mb: defaults.max_memory_bytes >> 20,

            csv_path: String::new(),
            log_path: default_log,
            log_level: LogLevel::Info,
            echo: false,
        }
    }
}

impl Config {
    fn to_job(&self) -> OfflineJob {
        OfflineJob {
            pattern_path: PathBuf::from(&self.pattern_path),
            search_path: PathBuf::from(&self.search_path),
            csv_path: if self.csv_path.is_empty() {
                None
            } else {
                Some(PathBuf::from(&self.csv_path))
            },
            config: MatchConfig {
                target_sample_rate: self.sample_rate_hz,
                threshold: self.threshold,
                min_distance: self.min_distance,
                max_memory_bytes: self.max_memory_mb << 20,
            },
        }
    }
}

fn print_usage(cfg: &Config) {
    println!("Usage: sonar-match --pattern <PATH> --search <PATH> [OPTIONS]\n");
    println!("Inputs (WAV is read directly; MP3/MP4/M4A/FLAC/OGG go through the decoder):");
    println!("  --pattern <PATH>              Short reference clip to look for");
    println!("  --search <PATH>               Longer recording to search in");
    println!();
    println!("Matching:");
    println!(
        "  --sr <HZ>                     Matching sample rate (default: {})",
        cfg.sample_rate_hz
    );
    println!(
        "  --threshold <0..1>            Minimum similarity for a match (default: {:.2})",
        cfg.threshold
    );
    println!(
        "  --min-distance <SAMPLES>      Minimum spacing between matches (default: 25% of pattern)"
    );
    println!(
        "  --max-memory-mb <MB>          Cap on FFT working memory (default: {})",
        cfg.max_memory_mb
    );
    println!();
    println!("Output:");
    println!("  --csv-path <PATH>             Append matches to this CSV file");
    println!("  --log-path <PATH>             Path to Match.log, or - for stderr only (default: {})", cfg.log_path);
    println!(
        "  --log-level <LEVEL>           Log level: debug, info, warning, error (default: info)"
    );
    println!("  --echo                        Also print log lines to stderr");
    println!("  -h, --help                    Show this help");
}

fn parse_arguments() -> std::result::Result<Config, String> {
    let args: Vec<String> = env::args().collect();
    parse_from(&args[1..])
}

fn parse_from(args: &[String]) -> std::result::Result<Config, String> {
    let mut config = Config::default();

    let value = |i: usize, flag: &str| -> std::result::Result<&String, String> {
        args.get(i + 1).ok_or_else(|| format!("Missing value for {}", flag))
    };

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-p" | "--pattern" => {
                config.pattern_path = value(i, "--pattern")?.to_string();
                i += 2;
            }
            "-s" | "--search" => {
                config.search_path = value(i, "--search")?.to_string();
                i += 2;
            }
            "--sr" => {
                let v: u32 = value(i, "--sr")?
                    .parse()
                    .map_err(|_| "Invalid sr value".to_string())?;
                if v == 0 {
                    return Err("--sr must be positive".to_string());
                }
                config.sample_rate_hz = v;
                i += 2;
            }
            "-t" | "--threshold" => {
                config.threshold = value(i, "--threshold")?
                    .parse::<f32>()
                    .map_err(|_| "Invalid threshold value".to_string())?
                    .clamp(-1.0, 1.0);
                i += 2;
            }
            "--min-distance" => {
                let v: usize = value(i, "--min-distance")?
                    .parse()
                    .map_err(|_| "Invalid min-distance value".to_string())?;
                config.min_distance = Some(v);
                i += 2;
            }
            "--max-memory-mb" => {
                let v: usize = value(i, "--max-memory-mb")?
                    .parse()
                    .map_err(|_| "Invalid max-memory-mb value".to_string())?;
                config.max_memory_mb = v.max(1);
                i += 2;
            }
            "--csv-path" => {
                config.csv_path = value(i, "--csv-path")?.to_string();
                i += 2;
            }
            "--log-path" => {
                config.log_path = value(i, "--log-path")?.to_string();
                i += 2;
            }
            "--log-level" => {
                config.log_level = value(i, "--log-level")?.parse()?;
                i += 2;
            }
            "--echo" => {
                config.echo = true;
                i += 1;
            }
            "-h" | "--help" => {
                print_usage(&Config::default());
                std::process::exit(0);
            }
            _ => {
                return Err(format!("Unknown option: {}", args[i]));
            }
        }
    }

    if config.pattern_path.is_empty() || config.search_path.is_empty() {
        return Err("--pattern <PATH> and --search <PATH> are required".to_string());
    }
    Ok(config)
}

/// `-` logs to stderr only; anything else is a file, echoed to stderr on request.
fn build_logger(cli: &Config) -> std::io::Result<Logger> {
    if cli.log_path == "-" {
        Ok(Logger::console(cli.log_level))
    } else {
        Ok(Logger::new(&cli.log_path, cli.log_level)?.with_echo(cli.echo))
    }
}

fn main() -> Result<()> {
    let cli = match parse_arguments() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {}\n", e);
            print_usage(&Config::default());
            std::process::exit(1);
        }
    };

    let logger = Arc::new(build_logger(&cli)?);

    if let Err(e) = offline::run_offline(&cli.to_job(), logger.clone()) {
        logger.error(&format!("Matching failed: {:#}", e))?;
        return Err(e);
    }
    Ok(())
}
