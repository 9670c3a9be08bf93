// Command-line settings for the Gradeq worker
use anyhow::Result;
use clap::Parser;
use gradeq_common::config::DispatcherConfig;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "gradeq-worker")]
#[command(about = "Gradeq Worker - grade short answers in the background", long_about = None)]
pub struct Args {
    /// Dispatcher config file (JSON); defaults apply when omitted
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// JSON-lines file of grading requests; reads stdin when omitted
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Override max_concurrent
    #[arg(long)]
    pub max_concurrent: Option<usize>,

    /// Override tick_interval_ms
    #[arg(long)]
    pub tick_ms: Option<u64>,

    /// Override grade_timeout_ms
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Override retry.max_attempts
    #[arg(long)]
    pub max_attempts: Option<u32>,

    /// Seconds between status log lines
    #[arg(long, default_value = "10")]
    pub status_every: u64,

    /// Emit logs as JSON
    #[arg(long, default_value = "false")]
    pub log_json: bool,
}

impl Args {
    /// Load the config file (if any) and apply command-line overrides.
    pub fn resolve_config(&self) -> Result<DispatcherConfig> {
        let mut config = match &self.config {
            Some(path) => DispatcherConfig::load(path)?,
            None => DispatcherConfig::default(),
        };

        if let Some(max_concurrent) = self.max_concurrent {
            config.max_concurrent = max_concurrent;
        }
        if let Some(tick_ms) = self.tick_ms {
            config.tick_interval_ms = tick_ms;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.grade_timeout_ms = Some(timeout_ms);
        }
        if let Some(max_attempts) = self.max_attempts {
            config.retry.max_attempts = max_attempts;
        }

        config.validate()?;
        Ok(config)
    }
}
