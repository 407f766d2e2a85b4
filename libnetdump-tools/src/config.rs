use std::io;
use std::str::FromStr;

/// Tunables loaded from a TOML file
pub struct Config {
    value: toml::Value,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            value: toml::Value::Table(toml::map::Map::new()),
        }
    }
}

impl Config {
    fn lookup<T: AsRef<str>>(&self, k: T) -> Option<&toml::Value> {
        let mut item = &self.value;
        for key in k.as_ref().split('.') {
            item = item.get(key)?;
        }
        Some(item)
    }

    /// Get an entry by path. If the input argument contains dots, the path is split
    /// into keys, each key being requested recursively.
    pub fn get<T: AsRef<str>>(&self, k: T) -> Option<&str> {
        self.lookup(k)?.as_str()
    }

    /// Get an entry of type integer by path
    pub fn get_usize<T: AsRef<str>>(&self, k: T) -> Option<usize> {
        self.lookup(k)?
            .as_integer()
            .and_then(|i| if i >= 0 { Some(i as usize) } else { None })
    }

    /// Get an entry of type boolean by path
    pub fn get_bool<T: AsRef<str>>(&self, k: T) -> Option<bool> {
        self.lookup(k)?.as_bool()
    }

    /// Load configuration from input object. If keys are already present, they are overwritten
    pub fn load_config<R: io::Read>(&mut self, mut config: R) -> Result<(), io::Error> {
        let mut s = String::new();
        config.read_to_string(&mut s)?;
        match toml::Value::from_str(&s) {
            Ok(value) => {
                self.value = value;
                Ok(())
            }
            Err(e) => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Load configuration failed: {e}"),
            )),
        }
    }
}

/// Settings used when activating a live interface
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LiveOptions {
    pub promisc: bool,
    pub snaplen: i32,
    /// Read timeout in milliseconds
    pub timeout_ms: i32,
    pub immediate: bool,
}

impl Default for LiveOptions {
    fn default() -> Self {
        LiveOptions {
            promisc: true,
            snaplen: 65535,
            timeout_ms: 500,
            immediate: true,
        }
    }
}

impl LiveOptions {
    /// Read the `live.*` keys, using defaults for missing entries
    pub fn from_config(config: &Config) -> LiveOptions {
        let default = LiveOptions::default();
        let clamp = |v: usize| i32::try_from(v).unwrap_or(i32::MAX);
        LiveOptions {
            promisc: config.get_bool("live.promisc").unwrap_or(default.promisc),
            snaplen: config
                .get_usize("live.snaplen")
                .map(clamp)
                .unwrap_or(default.snaplen),
            timeout_ms: config
                .get_usize("live.timeout")
                .map(clamp)
                .unwrap_or(default.timeout_ms),
            immediate: config
                .get_bool("live.immediate")
                .unwrap_or(default.immediate),
        }
    }
}
