use crate::common::cli::Cli;
use crate::service::priority::PriorityScheme;
use crate::service::process::{CoreSet, Priority};
use crate::service::target::{DesiredProfile, ImageName, Platform, Tier};
use crate::service::tracker::TargetGroup;
use log::{debug, error, info};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Name of our own executable; deprioritized by default since we aren't time sensitive.
pub const SELF_NAME: &str = env!("CARGO_PKG_NAME");

pub const DEFAULT_INTERVAL_SECS: u64 = 60;

const CONFIG_FILE_NAME: &str = "procprio.toml";
const DEFAULT_GOOD: &[&str] = &["csgo", "hl2"];
const DEFAULT_BAD: &[&str] = &[SELF_NAME, "steamwebhelper"];
const DEFAULT_BAD_CORES: &[usize] = &[0];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("can't use --{0} and --append-{0} at the same time")]
    Conflict(Tier),
    #[error("'{0}' is listed as both a good and a bad app")]
    DuplicateTarget(String),
    #[error("malformed app name '{name}': {reason}")]
    MalformedName { name: String, reason: &'static str },
    #[error("{0} app affinity needs at least one CPU core")]
    EmptyAffinity(Tier),
    #[error("CPU core {core} does not exist (host has {count} cores)")]
    CoreOutOfRange { core: usize, count: usize },
    #[error("poll interval must be at least one second")]
    InvalidInterval,
}

/// Contents of the optional TOML configuration file.
#[derive(Deserialize, Debug, Default)]
pub struct Config {
    pub interval_secs: Option<u64>,

    #[serde(default)]
    pub targets: TargetsConfig,

    #[serde(default)]
    pub profiles: ProfilesConfig,
}

/// Replacements for the built-in app lists.
#[derive(Deserialize, Debug, Default)]
pub struct TargetsConfig {
    pub good: Option<Vec<String>>,
    pub bad: Option<Vec<String>>,
}

#[derive(Deserialize, Debug, Default)]
pub struct ProfilesConfig {
    #[serde(default)]
    pub good: ProfileConfig,

    #[serde(default)]
    pub bad: ProfileConfig,
}

#[derive(Deserialize, Debug, Clone)]
pub struct ProfileConfig {
    pub priority: Option<i32>,
    pub cores: Option<Vec<usize>>,

    #[serde(default = "enabled")]
    pub enforce_priority: bool,

    #[serde(default = "enabled")]
    pub enforce_affinity: bool,
}

fn enabled() -> bool {
    true
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            priority: None,
            cores: None,
            enforce_priority: true,
            enforce_affinity: true,
        }
    }
}

impl Config {
    /// Load the configuration file. An explicit path must exist; the default
    /// location is optional.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (config_path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match Self::default_path() {
                Some(path) => (path, false),
                None => {
                    debug!("Could not find config directory, using built-in defaults");
                    return Ok(Self::default());
                }
            },
        };

        if !required && !config_path.exists() {
            debug!(
                "No configuration at {}, using built-in defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }

        info!("Loading configuration from: {}", config_path.display());

        let config_str = std::fs::read_to_string(&config_path).map_err(|e| {
            error!(
                "Failed to read config file '{}': {}",
                config_path.display(),
                e
            );
            e
        })?;

        debug!("Configuration file size: {} bytes", config_str.len());
        Self::parse(&config_str)
    }

    pub fn parse(config_str: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(config_str).map_err(|e| {
            error!("Failed to parse TOML configuration: {}", e);
            e
        })?;

        debug!("Configuration parsed successfully");
        if let Some(ref good) = config.targets.good {
            debug!("  Good apps: {:?}", good);
        }
        if let Some(ref bad) = config.targets.bad {
            debug!("  Bad apps: {:?}", bad);
        }
        if let Some(interval) = config.interval_secs {
            debug!("  Poll interval: {}s", interval);
        }

        Ok(config)
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
    }
}

/// Everything the controller needs, resolved from the command line, the
/// configuration file and the built-in defaults.
#[derive(Debug)]
pub struct Settings {
    pub targets: Vec<(ImageName, Tier)>,
    pub good: DesiredProfile,
    pub bad: DesiredProfile,
    pub interval: Duration,
}

impl Settings {
    /// Command line flags win over the configuration file, which wins over
    /// the built-in defaults.
    pub fn resolve(
        cli: &Cli,
        config: &Config,
        platform: Platform,
        scheme: PriorityScheme,
        core_count: usize,
    ) -> Result<Self, ConfigError> {
        let good_defaults = defaults_or(config.targets.good.as_ref(), DEFAULT_GOOD);
        let bad_defaults = defaults_or(config.targets.bad.as_ref(), DEFAULT_BAD);

        let good = tier_names(
            Tier::Good,
            cli.good.as_deref(),
            cli.append_good.as_deref(),
            &good_defaults,
        )?;
        let bad = tier_names(
            Tier::Bad,
            cli.bad.as_deref(),
            cli.append_bad.as_deref(),
            &bad_defaults,
        )?;
        let targets = merge_tiers(platform, &good, &bad)?;

        let (good, bad) = resolve_profiles(&config.profiles, scheme, core_count)?;

        let interval_secs = cli
            .interval
            .or(config.interval_secs)
            .unwrap_or(DEFAULT_INTERVAL_SECS);
        if interval_secs == 0 {
            return Err(ConfigError::InvalidInterval);
        }

        Ok(Self {
            targets,
            good,
            bad,
            interval: Duration::from_secs(interval_secs),
        })
    }

    /// Create one target group per resolved app, in resolution order.
    pub fn groups(
        &self,
        platform: Platform,
        scheme: PriorityScheme,
    ) -> Result<Vec<TargetGroup>, ConfigError> {
        self.targets
            .iter()
            .map(|(name, tier)| {
                let profile = match tier {
                    Tier::Good => self.good.clone(),
                    Tier::Bad => self.bad.clone(),
                };
                TargetGroup::new(name.as_str(), profile, platform, scheme)
            })
            .collect()
    }
}

fn defaults_or(configured: Option<&Vec<String>>, builtin: &[&str]) -> Vec<String> {
    match configured {
        Some(names) => names.clone(),
        None => builtin.iter().map(|name| name.to_string()).collect(),
    }
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Custom names come first, followed by the defaults unless they were replaced.
fn tier_names(
    tier: Tier,
    replace: Option<&str>,
    append: Option<&str>,
    defaults: &[String],
) -> Result<Vec<String>, ConfigError> {
    match (replace, append) {
        (Some(_), Some(_)) => Err(ConfigError::Conflict(tier)),
        (Some(list), None) => {
            debug!("Setting custom {} apps", tier);
            Ok(split_list(list))
        }
        (None, Some(list)) => {
            debug!("Appending custom {} apps to defaults", tier);
            let mut names = split_list(list);
            names.extend(defaults.iter().cloned());
            Ok(names)
        }
        (None, None) => {
            debug!("Setting default {} apps", tier);
            Ok(defaults.to_vec())
        }
    }
}

/// Normalize and deduplicate names. Repeats within a tier collapse into the
/// first occurrence; a name in both tiers is an error.
fn merge_tiers(
    platform: Platform,
    good: &[String],
    bad: &[String],
) -> Result<Vec<(ImageName, Tier)>, ConfigError> {
    let mut seen: HashMap<ImageName, Tier> = HashMap::new();
    let mut targets = Vec::new();

    let named = good
        .iter()
        .map(|name| (name, Tier::Good))
        .chain(bad.iter().map(|name| (name, Tier::Bad)));

    for (raw, tier) in named {
        let name = platform.normalize(raw)?;
        match seen.get(&name) {
            Some(existing) if *existing == tier => {
                debug!("Ignoring repeated {} app '{}'", tier, name);
            }
            Some(_) => return Err(ConfigError::DuplicateTarget(name.to_string())),
            None => {
                seen.insert(name.clone(), tier);
                targets.push((name, tier));
            }
        }
    }

    Ok(targets)
}

fn resolve_profiles(
    profiles: &ProfilesConfig,
    scheme: PriorityScheme,
    core_count: usize,
) -> Result<(DesiredProfile, DesiredProfile), ConfigError> {
    let bad_cores: CoreSet = match profiles.bad.cores {
        Some(ref cores) => cores.iter().copied().collect(),
        None => DEFAULT_BAD_CORES.iter().copied().collect(),
    };
    let bad_affinity = profiles
        .bad
        .enforce_affinity
        .then(|| validate_cores(Tier::Bad, bad_cores, core_count))
        .transpose()?;

    // Default good cores: everything the bad apps don't get.
    let good_cores: CoreSet = match profiles.good.cores {
        Some(ref cores) => cores.iter().copied().collect(),
        None => (0..core_count)
            .filter(|core| !bad_affinity.as_ref().is_some_and(|bad| bad.contains(*core)))
            .collect(),
    };
    let good_affinity = profiles
        .good
        .enforce_affinity
        .then(|| validate_cores(Tier::Good, good_cores, core_count))
        .transpose()?;

    let good_priority = profiles
        .good
        .enforce_priority
        .then(|| Priority(profiles.good.priority.unwrap_or(scheme.favored().0)));
    let bad_priority = profiles
        .bad
        .enforce_priority
        .then(|| Priority(profiles.bad.priority.unwrap_or(scheme.demoted().0)));

    Ok((
        DesiredProfile::new(Tier::Good, good_priority, good_affinity),
        DesiredProfile::new(Tier::Bad, bad_priority, bad_affinity),
    ))
}

fn validate_cores(tier: Tier, cores: CoreSet, count: usize) -> Result<CoreSet, ConfigError> {
    if cores.is_empty() {
        return Err(ConfigError::EmptyAffinity(tier));
    }
    if let Some(core) = cores.max().filter(|&core| core >= count) {
        return Err(ConfigError::CoreOutOfRange { core, count });
    }
    Ok(cores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn cli(args: &[&str]) -> Cli {
        use clap::Parser;
        let mut argv = vec!["procprio"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    fn resolve(args: &[&str], config: &Config) -> Result<Settings, ConfigError> {
        Settings::resolve(
            &cli(args),
            config,
            Platform::UNIX,
            PriorityScheme::NiceLevel,
            4,
        )
    }

    fn names(settings: &Settings) -> Vec<(&str, Tier)> {
        settings
            .targets
            .iter()
            .map(|(name, tier)| (name.as_str(), *tier))
            .collect()
    }

    #[test]
    fn test_defaults() {
        let settings = resolve(&[], &Config::default()).unwrap();
        assert_eq!(
            names(&settings),
            vec![
                ("csgo", Tier::Good),
                ("hl2", Tier::Good),
                ("procprio", Tier::Bad),
                ("steamwebhelper", Tier::Bad),
            ]
        );
        assert_eq!(settings.interval, Duration::from_secs(60));
        assert_eq!(settings.good.priority, Some(Priority(-15)));
        assert_eq!(settings.bad.priority, Some(Priority(15)));
        assert_eq!(settings.bad.affinity, Some([0].into_iter().collect()));
        assert_eq!(settings.good.affinity, Some([1, 2, 3].into_iter().collect()));
    }

    #[test]
    fn test_replace_and_append() {
        let settings = resolve(&["-g", "game, other,game", "-B", "discord"], &Config::default()).unwrap();
        assert_eq!(
            names(&settings),
            vec![
                ("game", Tier::Good),
                ("other", Tier::Good),
                ("discord", Tier::Bad),
                ("procprio", Tier::Bad),
                ("steamwebhelper", Tier::Bad),
            ]
        );
    }

    #[test]
    fn test_appending_a_default_does_not_duplicate_it() {
        let settings = resolve(&["-G", "hl2"], &Config::default()).unwrap();
        assert_eq!(
            names(&settings)
                .iter()
                .filter(|(name, _)| *name == "hl2")
                .count(),
            1
        );
    }

    #[test]
    fn test_replace_with_append_conflicts() {
        let err = resolve(&["-g", "a", "-G", "b"], &Config::default()).unwrap_err();
        assert_eq!(err, ConfigError::Conflict(Tier::Good));
        assert_eq!(err.to_string(), "can't use --good and --append-good at the same time");

        let err = resolve(&["--bad", "a", "--append-bad", "b"], &Config::default()).unwrap_err();
        assert_eq!(err, ConfigError::Conflict(Tier::Bad));
    }

    #[test]
    fn test_same_name_in_both_tiers_is_rejected() {
        let err = resolve(&["-G", "steamwebhelper"], &Config::default()).unwrap_err();
        assert_eq!(err, ConfigError::DuplicateTarget("steamwebhelper".to_string()));
    }

    #[test]
    fn test_malformed_name_is_rejected() {
        let err = resolve(&["-G", "game.exe"], &Config::default()).unwrap_err();
        assert!(matches!(err, ConfigError::MalformedName { .. }));
    }

    #[test]
    fn test_interval_precedence_and_validation() {
        let config = Config::parse("interval_secs = 30").unwrap();
        assert_eq!(resolve(&[], &config).unwrap().interval, Duration::from_secs(30));
        assert_eq!(
            resolve(&["-i", "5"], &config).unwrap().interval,
            Duration::from_secs(5)
        );
        assert_eq!(
            resolve(&["-i", "0"], &config).unwrap_err(),
            ConfigError::InvalidInterval
        );
    }

    #[test]
    fn test_config_file_overrides() {
        let config = Config::parse(
            r#"
            [targets]
            good = ["factorio"]
            bad = ["spotify"]

            [profiles.good]
            priority = -5
            enforce_affinity = false

            [profiles.bad]
            cores = [3]
            enforce_priority = false
            "#,
        )
        .unwrap();

        let settings = resolve(&["-G", "minecraft"], &config).unwrap();
        assert_eq!(
            names(&settings),
            vec![
                ("minecraft", Tier::Good),
                ("factorio", Tier::Good),
                ("spotify", Tier::Bad),
            ]
        );
        assert_eq!(settings.good.priority, Some(Priority(-5)));
        assert_eq!(settings.good.affinity, None);
        assert_eq!(settings.bad.priority, None);
        assert_eq!(settings.bad.affinity, Some([3].into_iter().collect()));
    }

    #[test]
    fn test_core_validation() {
        let config = Config::parse("[profiles.bad]\ncores = [9]").unwrap();
        assert_eq!(
            resolve(&[], &config).unwrap_err(),
            ConfigError::CoreOutOfRange { core: 9, count: 4 }
        );

        let config = Config::parse("[profiles.good]\ncores = []").unwrap();
        assert_eq!(
            resolve(&[], &config).unwrap_err(),
            ConfigError::EmptyAffinity(Tier::Good)
        );
    }

    #[test]
    fn test_single_core_host_leaves_nothing_for_good_apps() {
        let err = Settings::resolve(
            &Cli::default(),
            &Config::default(),
            Platform::UNIX,
            PriorityScheme::NiceLevel,
            1,
        )
        .unwrap_err();
        assert_eq!(err, ConfigError::EmptyAffinity(Tier::Good));
    }

    #[test]
    fn test_groups_follow_resolution_order() {
        let settings = resolve(&["-g", "a", "-b", "b"], &Config::default()).unwrap();
        let groups = settings
            .groups(Platform::UNIX, PriorityScheme::NiceLevel)
            .unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name().as_str(), "a");
        assert_eq!(groups[0].profile().tier, Tier::Good);
        assert_eq!(groups[1].profile().tier, Tier::Bad);
    }

    #[test]
    fn test_load_explicit_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "interval_secs = 15").unwrap();
        writeln!(file, "[targets]").unwrap();
        writeln!(file, "good = [\"quake\"]").unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.interval_secs, Some(15));
        assert_eq!(config.targets.good, Some(vec!["quake".to_string()]));
        assert!(config.targets.bad.is_none());
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn test_load_invalid_toml_fails() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "interval_secs = \"often\"").unwrap();
        assert!(Config::load(Some(file.path())).is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    #[serial]
    fn test_missing_default_file_uses_builtins() {
        let dir = tempfile::tempdir().unwrap();
        let previous = std::env::var_os("XDG_CONFIG_HOME");
        unsafe {
            std::env::set_var("XDG_CONFIG_HOME", dir.path());
        }

        let config = Config::load(None).unwrap();
        assert!(config.targets.good.is_none());
        assert!(config.interval_secs.is_none());

        unsafe {
            match previous {
                Some(value) => std::env::set_var("XDG_CONFIG_HOME", value),
                None => std::env::remove_var("XDG_CONFIG_HOME"),
            }
        }
    }
}
