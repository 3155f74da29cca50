use std::path::PathBuf;

use clap::Parser;

use crate::config::{AppConfig, Result};

/// Inhaler flow-rate logger
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Serial port of the flow sensor (e.g. COM7, /dev/ttyUSB0)
    #[arg(short, long)]
    pub port: Option<String>,

    /// Baud rate
    #[arg(short, long)]
    pub baud: Option<u32>,

    /// Inhaler model from the catalog (e.g. "Inhaler A")
    #[arg(short, long)]
    pub inhaler: Option<String>,

    /// CSV file written on exit
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Log level (off, error, warn, info, debug, trace)
    #[arg(long)]
    pub log_level: Option<String>,

    /// List serial ports and exit
    #[arg(long)]
    pub list_ports: bool,

    /// List catalog inhalers and exit
    #[arg(long)]
    pub list_inhalers: bool,

    #[arg(long)]
    pub location_id: Option<String>,

    #[arg(long)]
    pub patient_id: Option<String>,

    #[arg(long)]
    pub sex: Option<String>,

    #[arg(long)]
    pub birth_date: Option<String>,

    #[arg(long)]
    pub height: Option<String>,

    #[arg(long)]
    pub weight: Option<String>,
}

impl Cli {
    /// Load the config file (or defaults) and apply command-line overrides.
    pub fn resolve_config(&self) -> Result<AppConfig> {
        let base = match &self.config {
            Some(path) => AppConfig::load(path)?,
            None => AppConfig::default(),
        };
        Ok(self.apply(base))
    }

    pub fn apply(&self, mut config: AppConfig) -> AppConfig {
        fn set<T: Clone>(target: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *target = v.clone();
            }
        }

        set(&mut config.port, &self.port);
        set(&mut config.baud_rate, &self.baud);
        set(&mut config.inhaler, &self.inhaler);
        set(&mut config.output_path, &self.output);
        set(&mut config.log_level, &self.log_level);

        let session = &mut config.session;
        set(&mut session.location_id, &self.location_id);
        set(&mut session.patient_id, &self.patient_id);
        set(&mut session.sex, &self.sex);
        set(&mut session.birth_date, &self.birth_date);
        set(&mut session.height, &self.height);
        set(&mut session.weight, &self.weight);

        config
    }
}
