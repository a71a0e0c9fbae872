//! src/mods/offline.rs
//! File mode: read a pattern and a search file from disk, print matches, optionally append CSV rows.

use anyhow::Result;
use std::{ fs::OpenOptions, io::Write, path::{ Path, PathBuf }, sync::Arc };

use crate::logger::Logger;
use crate::mods::matcher::{ MatchConfig, MatchReport, Matcher };

#[derive(Clone, Debug)]
pub struct OfflineJob {
    pub pattern_path: PathBuf,
    pub search_path: PathBuf,
    /// Append one row per match here; created with a header when empty.
    pub csv_path: Option<PathBuf>,
    pub config: MatchConfig,
}

fn extension(path: &Path) -> Option<&str> {
    path.extension().and_then(|e| e.to_str())
}

fn read_input(path: &Path, what: &str) -> Result<Vec<u8>> {
    if !path.exists() {
        anyhow::bail!("{} file not found: {}", what, path.display());
    }
    Ok(std::fs::read(path)?)
}

pub fn run_offline(job: &OfflineJob, logger: Arc<Logger>) -> Result<MatchReport> {
    logger.info(
        &format!(
            "sonar-match starting…  pattern={} search={} sr={} threshold={:.2}",
            job.pattern_path.display(),
            job.search_path.display(),
            job.config.target_sample_rate,
            job.config.threshold
        )
    )?;

    let pattern_bytes = read_input(&job.pattern_path, "Pattern")?;
    let search_bytes = read_input(&job.search_path, "Search")?;

    let mut matcher = Matcher::open(job.config.clone(), logger.clone())?;
    let report = matcher.find_matches_with_hints(
        &pattern_bytes,
        extension(&job.pattern_path),
        &search_bytes,
        extension(&job.search_path)
    )?;
    let threshold = matcher.config().threshold;
    matcher.close()?;

    if report.matches.is_empty() {
        println!("No matches found with similarity >= {:.2}", threshold);
        logger.warn(
            &format!(
                "No matches in {} for {} at threshold {:.2}",
                job.search_path.display(),
                job.pattern_path.display(),
                threshold
            )
        )?;
    }
    for (i, m) in report.matches.iter().enumerate() {
        println!(
            "Match {}:\n  Start: {:.2}s\n  End:   {:.2}s\n  Sim:   {:.2}\n  RMS:   {:.3}\n",
            i + 1,
            m.start_s,
            m.end_s,
            m.similarity,
            m.rms
        );
    }

    if let Some(csv_path) = &job.csv_path {
        write_csv(csv_path, job, &report)?;
        logger.info(
            &format!("Wrote {} match(es) to {}", report.matches.len(), csv_path.display())
        )?;
    }

    logger.info(
        &format!(
            "Done: {} match(es) in {:.1} ms (pattern {}, search {})",
            report.matches.len(),
            report.metrics.total.as_secs_f64() * 1000.0,
            report.metrics.pattern.method.as_str(),
            report.metrics.search.method.as_str()
        )
    )?;
    Ok(report)
}

fn write_csv(csv_path: &Path, job: &OfflineJob, report: &MatchReport) -> Result<()> {
    let mut csv_file = OpenOptions::new().create(true).append(true).open(csv_path)?;
    if csv_file.metadata()?.len() == 0 {
        writeln!(csv_file, "pattern,search,start_s,end_s,similarity,rms,sample_rate_hz,threshold")?;
    }
    for m in &report.matches {
        writeln!(
            csv_file,
            "{},{},{:.3},{:.3},{:.4},{:.4},{},{:.2}",
            job.pattern_path.display(),
            job.search_path.display(),
            m.start_s,
            m.end_s,
            m.similarity,
            m.rms,
            job.config.target_sample_rate,
            job.config.threshold
        )?;
    }
    csv_file.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mods::wav::encode_pcm16;

    #[test]
    fn writes_csv_rows_for_matches() {
        let dir = std::env::temp_dir().join(format!("sonar-match-offline-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let sr = 2000u32;
        let pattern: Vec<f32> = (0..400)
            .map(|i| {
                let t = (i as f32) / (sr as f32);
                (2.0 * std::f32::consts::PI * (100.0 + 800.0 * t) * t).sin()
            })
            .collect();
        let mut search = vec![0.0f32; 4000];
        search[1000..1400].copy_from_slice(&pattern);

        let pattern_path = dir.join("pattern.wav");
        let search_path = dir.join("search.wav");
        let csv_path = dir.join("matches.csv");
        let _ = std::fs::remove_file(&csv_path);
        std::fs::write(&pattern_path, encode_pcm16(&pattern, sr, 1)).unwrap();
        std::fs::write(&search_path, encode_pcm16(&search, sr, 1)).unwrap();

        let job = OfflineJob {
            pattern_path,
            search_path,
            csv_path: Some(csv_path.clone()),
            config: MatchConfig::default(),
        };
        let report = run_offline(&job, Arc::new(Logger::disabled())).unwrap();
        assert_eq!(report.matches.len(), 1);

        let csv = std::fs::read_to_string(&csv_path).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("pattern,search,start_s"));
        assert!(lines[1].contains(",0.500,0.700,"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn no_match_is_logged_as_a_warning() {
        let dir = std::env::temp_dir().join(format!("sonar-match-nomatch-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let sr = 2000u32;
        let pattern: Vec<f32> = (0..200)
            .map(|i| ((i as f32) * 0.3).sin())
            .collect();
        let pattern_path = dir.join("pattern.wav");
        let search_path = dir.join("search.wav");
        let log_path = dir.join("Match.log");
        std::fs::write(&pattern_path, encode_pcm16(&pattern, sr, 1)).unwrap();
        std::fs::write(&search_path, encode_pcm16(&[0.0; 2000], sr, 1)).unwrap();

        let logger = Logger::new(&log_path.to_string_lossy(), crate::logger::LogLevel::Warning).unwrap();
        let job = OfflineJob {
            pattern_path,
            search_path,
            csv_path: None,
            config: MatchConfig { threshold: 0.8, ..MatchConfig::default() },
        };
        let report = run_offline(&job, Arc::new(logger)).unwrap();
        assert!(report.matches.is_empty());

        let log = std::fs::read_to_string(&log_path).unwrap();
        assert!(log.contains("[WARN] No matches in"));
        assert!(log.contains("threshold 0.80"));
        assert!(!log.contains("[INFO]"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_file_is_reported() {
        let job = OfflineJob {
            pattern_path: PathBuf::from("/nonexistent/pattern.wav"),
            search_path: PathBuf::from("/nonexistent/search.wav"),
            csv_path: None,
            config: MatchConfig::default(),
        };
        let err = run_offline(&job, Arc::new(Logger::disabled())).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
