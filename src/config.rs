use std::{collections::HashMap, path::PathBuf, time::Duration};

pub const DEFAULT_KEY: &str = "stories";
pub const DEFAULT_TTL: Duration = Duration::from_millis(24 * 60 * 60 * 1000);
pub const DEFAULT_DWELL: Duration = Duration::from_millis(3000);
pub const DEFAULT_SWEEP: Duration = Duration::from_millis(60_000);
/// Longest accepted TTL (100 years), far below where `now + ttl` overflows
pub const MAX_TTL: Duration = Duration::from_millis(100 * 365 * 24 * 60 * 60 * 1000);

#[derive(Debug, Default)]
pub struct Config(pub HashMap<Parameter, String>);

#[derive(Debug, Hash, PartialEq, Eq, Clone, Copy)]
pub enum Parameter {
    Dir,
    Key,
    Ttl,
    Dwell,
    Sweep,
    Unknown,
}

impl Parameter {
    pub fn deserialize(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "dir" => Ok(Parameter::Dir),
            "key" => Ok(Parameter::Key),
            "ttl" => Ok(Parameter::Ttl),
            "dwell" => Ok(Parameter::Dwell),
            "sweep" => Ok(Parameter::Sweep),
            _ => Ok(Parameter::Unknown),
        }
    }

    pub fn serialize(&self) -> &'static str {
        match self {
            Parameter::Dir => "dir",
            Parameter::Key => "key",
            Parameter::Ttl => "ttl",
            Parameter::Dwell => "dwell",
            Parameter::Sweep => "sweep",
            Parameter::Unknown => unreachable!(),
        }
    }
}

impl Config {
    /// Load config from `--name value` pairs. The first item (program name) must already be skipped.
    pub fn from_args<I>(args: I) -> anyhow::Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = Config::default();
        let mut current_key = None;
        for arg in args {
            if let Some(current_key) = current_key.take() {
                if current_key != Parameter::Unknown {
                    config.0.insert(current_key, arg);
                }
            } else if let Some(name) = arg.strip_prefix("--") {
                current_key = Some(Parameter::deserialize(name)?);
            } else {
                anyhow::bail!("invalid argument {:?}", arg)
            }
        }
        if let Some(key) = current_key {
            if key != Parameter::Unknown {
                anyhow::bail!("missing value for --{}", key.serialize());
            }
        }

        // Surface bad numbers at startup rather than on first use
        config.ttl()?;
        config.dwell()?;
        config.sweep()?;

        Ok(config)
    }

    /// Storage directory; `None` keeps stories in memory only.
    pub fn dir(&self) -> Option<PathBuf> {
        self.0.get(&Parameter::Dir).map(PathBuf::from)
    }

    pub fn key(&self) -> &str {
        self.0
            .get(&Parameter::Key)
            .map(String::as_str)
            .unwrap_or(DEFAULT_KEY)
    }

    pub fn ttl(&self) -> anyhow::Result<Duration> {
        let ttl = self.millis(Parameter::Ttl, DEFAULT_TTL)?;
        if ttl > MAX_TTL {
            anyhow::bail!(
                "--ttl must be at most {} milliseconds",
                MAX_TTL.as_millis()
            );
        }
        Ok(ttl)
    }

    pub fn dwell(&self) -> anyhow::Result<Duration> {
        self.millis(Parameter::Dwell, DEFAULT_DWELL)
    }

    pub fn sweep(&self) -> anyhow::Result<Duration> {
        self.millis(Parameter::Sweep, DEFAULT_SWEEP)
    }

    fn millis(&self, parameter: Parameter, default: Duration) -> anyhow::Result<Duration> {
        match self.0.get(&parameter) {
            Some(value) => {
                let millis = value.parse::<u64>().map_err(|_| {
                    anyhow::format_err!(
                        "invalid value {:?} for --{}",
                        value,
                        parameter.serialize()
                    )
                })?;
                if millis == 0 {
                    anyhow::bail!("--{} must be greater than zero", parameter.serialize());
                }
                Ok(Duration::from_millis(millis))
            }
            None => Ok(default),
        }
    }
}
