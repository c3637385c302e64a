use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Result, anyhow, bail};

use crate::inspect::classify::DEFECT_CLASS_COUNT;

pub(crate) const INSPECT_USAGE: &str = "Usage: linewatch inspect [--camera <uri>] \
[--model <path>] [--influx-url <url>] [--influx-token <token>] [--influx-org <org>] \
[--influx-bucket <bucket>] [--sensor-port <path>] [--control-url <url>] \
[--critical-defect <code>] [--report-interval <secs>] [--tick-interval <secs>] \
[--reconnect-backoff <secs>] [--connect-timeout <secs>] [--verbose]\n\nPositional form \
is also supported: inspect <camera-uri> <model-path> [...flags...]";

/// Runtime settings for the inspection node.
#[derive(Clone, Debug)]
pub struct InspectConfig {
    pub camera_uri: String,
    pub model_path: PathBuf,
    pub influx_url: String,
    pub influx_token: String,
    pub influx_org: String,
    pub influx_bucket: String,
    pub sensor_port: PathBuf,
    pub control_url: String,
    pub defect_value_id: String,
    pub status_value_id: String,
    pub stop_value_id: String,
    pub critical_defect: i64,
    pub report_interval: Duration,
    pub tick_interval: Duration,
    pub reconnect_backoff: Duration,
    pub connect_timeout: Duration,
    pub verbose: bool,
}

impl Default for InspectConfig {
    fn default() -> Self {
        Self {
            camera_uri: "/dev/video0".to_string(),
            model_path: PathBuf::from("models/defect.ot"),
            influx_url: "http://127.0.0.1:8086".to_string(),
            influx_token: String::new(),
            influx_org: "my-org".to_string(),
            influx_bucket: "industrial-ai-system".to_string(),
            sensor_port: PathBuf::from("/dev/ttyACM0"),
            control_url: "http://127.0.0.1:4840".to_string(),
            defect_value_id: "defect-code".to_string(),
            status_value_id: "machine-status".to_string(),
            stop_value_id: "line-stop".to_string(),
            critical_defect: 5,
            report_interval: Duration::from_secs(5),
            tick_interval: Duration::from_secs(1),
            reconnect_backoff: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(4),
            verbose: false,
        }
    }
}

impl InspectConfig {
    pub fn from_args(args: &[String]) -> Result<Self> {
        let mut config = Self::default();
        let mut positional: Vec<String> = Vec::new();

        let mut idx = 2;
        while idx < args.len() {
            match args[idx].as_str() {
                "--camera" => {
                    idx += 1;
                    config.camera_uri = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--camera requires a value"))?
                        .clone();
                    idx += 1;
                }
                "--model" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--model requires a value"))?;
                    config.model_path = PathBuf::from(value);
                    idx += 1;
                }
                "--influx-url" => {
                    idx += 1;
                    config.influx_url = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--influx-url requires a value"))?
                        .clone();
                    idx += 1;
                }
                "--influx-token" => {
                    idx += 1;
                    config.influx_token = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--influx-token requires a value"))?
                        .clone();
                    idx += 1;
                }
                "--influx-org" => {
                    idx += 1;
                    config.influx_org = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--influx-org requires a value"))?
                        .clone();
                    idx += 1;
                }
                "--influx-bucket" => {
                    idx += 1;
                    config.influx_bucket = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--influx-bucket requires a value"))?
                        .clone();
                    idx += 1;
                }
                "--sensor-port" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--sensor-port requires a value"))?;
                    config.sensor_port = PathBuf::from(value);
                    idx += 1;
                }
                "--control-url" => {
                    idx += 1;
                    config.control_url = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--control-url requires a value"))?
                        .clone();
                    idx += 1;
                }
                "--defect-value" => {
                    idx += 1;
                    config.defect_value_id = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--defect-value requires a value"))?
                        .clone();
                    idx += 1;
                }
                "--status-value" => {
                    idx += 1;
                    config.status_value_id = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--status-value requires a value"))?
                        .clone();
                    idx += 1;
                }
                "--stop-value" => {
                    idx += 1;
                    config.stop_value_id = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--stop-value requires a value"))?
                        .clone();
                    idx += 1;
                }
                "--critical-defect" => {
                    idx += 1;
                    let value = args
                        .get(idx)
                        .ok_or_else(|| anyhow!("--critical-defect requires a value"))?
                        .parse::<i64>()
                        .with_context(|| "--critical-defect must be an integer".to_string())?;
                    if !(1..DEFECT_CLASS_COUNT).contains(&value) {
                        bail!(
                            "--critical-defect must be a defect code in 1..{DEFECT_CLASS_COUNT}"
                        );
                    }
                    config.critical_defect = value;
                    idx += 1;
                }
                "--report-interval" => {
                    config.report_interval = parse_seconds(args, &mut idx, "--report-interval")?;
                }
                "--tick-interval" => {
                    config.tick_interval = parse_seconds(args, &mut idx, "--tick-interval")?;
                }
                "--reconnect-backoff" => {
                    config.reconnect_backoff =
                        parse_seconds(args, &mut idx, "--reconnect-backoff")?;
                }
                "--connect-timeout" => {
                    config.connect_timeout = parse_seconds(args, &mut idx, "--connect-timeout")?;
                }
                "--verbose" => {
                    config.verbose = true;
                    idx += 1;
                }
                arg if arg.starts_with('-') => {
                    bail!("Unrecognised flag: {arg}\n\n{INSPECT_USAGE}");
                }
                other => {
                    positional.push(other.to_string());
                    idx += 1;
                }
            }
        }

        let mut positional = positional.into_iter();
        if let Some(uri) = positional.next() {
            config.camera_uri = uri;
        }
        if let Some(path) = positional.next() {
            config.model_path = PathBuf::from(path);
        }

        Ok(config)
    }
}

fn parse_seconds(args: &[String], idx: &mut usize, flag: &str) -> Result<Duration> {
    *idx += 1;
    let value = args
        .get(*idx)
        .ok_or_else(|| anyhow!("{flag} requires a value"))?
        .parse::<u64>()
        .with_context(|| format!("{flag} must be a whole number of seconds"))?;
    if value == 0 {
        bail!("{flag} must be at least 1 second");
    }
    *idx += 1;
    Ok(Duration::from_secs(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Vec<String> {
        let mut out = vec!["linewatch".to_string(), "inspect".to_string()];
        out.extend(extra.iter().map(|s| s.to_string()));
        out
    }

    #[test]
    fn defaults_match_the_fixed_cadences() {
        let config = InspectConfig::from_args(&args(&[])).unwrap();
        assert_eq!(config.report_interval, Duration::from_secs(5));
        assert_eq!(config.tick_interval, Duration::from_secs(1));
        assert_eq!(config.reconnect_backoff, Duration::from_secs(5));
        assert_eq!(config.connect_timeout, Duration::from_secs(4));
        assert_eq!(config.critical_defect, 5);
    }

    #[test]
    fn flags_override_defaults() {
        let config = InspectConfig::from_args(&args(&[
            "--camera",
            "/dev/video2",
            "--critical-defect",
            "7",
            "--report-interval",
            "10",
        ]))
        .unwrap();
        assert_eq!(config.camera_uri, "/dev/video2");
        assert_eq!(config.critical_defect, 7);
        assert_eq!(config.report_interval, Duration::from_secs(10));
    }

    #[test]
    fn positional_camera_and_model() {
        let config =
            InspectConfig::from_args(&args(&["/dev/video1", "defect.ot", "--verbose"])).unwrap();
        assert_eq!(config.camera_uri, "/dev/video1");
        assert_eq!(config.model_path, PathBuf::from("defect.ot"));
        assert!(config.verbose);
    }

    #[test]
    fn rejects_unknown_flags_and_bad_values() {
        assert!(InspectConfig::from_args(&args(&["--bogus"])).is_err());
        assert!(InspectConfig::from_args(&args(&["--tick-interval", "zero"])).is_err());
        assert!(InspectConfig::from_args(&args(&["--tick-interval", "0"])).is_err());
        assert!(InspectConfig::from_args(&args(&["--critical-defect", "-1"])).is_err());
        assert!(InspectConfig::from_args(&args(&["--critical-defect", "99"])).is_err());
    }
}
