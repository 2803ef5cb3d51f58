use std::io;

use crate::error::Error;

/// Layered configuration, backed by a TOML document
///
/// Keys are addressed by dotted paths (`live.promisc`). Values loaded from a
/// file can be overridden afterwards with [`Config::set`], which is how
/// command-line arguments take precedence.
#[derive(Clone, Debug)]
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
    fn lookup(&self, k: &str) -> Option<&toml::Value> {
        let mut item = &self.value;
        for key in k.split('.') {
            item = item.get(key)?;
        }
        Some(item)
    }

    /// Get an entry by path. If the input argument contains dots, the path is split
    /// into keys, each key being requested recursively.
    pub fn get<T: AsRef<str>>(&self, k: T) -> Option<&str> {
        self.lookup(k.as_ref())?.as_str()
    }

    /// Get an entry of type integer by path
    pub fn get_usize<T: AsRef<str>>(&self, k: T) -> Option<usize> {
        self.lookup(k.as_ref())?
            .as_integer()
            .and_then(|i| usize::try_from(i).ok())
    }

    /// Get an entry of type boolean by path
    pub fn get_bool<T: AsRef<str>>(&self, k: T) -> Option<bool> {
        self.lookup(k.as_ref())?.as_bool()
    }

    /// Set an entry by path, creating intermediate tables if needed.
    ///
    /// An intermediate key holding a non-table value is replaced by a table.
    pub fn set<T: AsRef<str>, V: Into<toml::Value>>(&mut self, k: T, v: V) {
        let mut keys: Vec<&str> = k.as_ref().split('.').collect();
        let last = match keys.pop() {
            Some(last) => last,
            None => return,
        };
        let mut item = &mut self.value;
        for key in keys {
            let table = ensure_table(item);
            item = table
                .entry(key.to_owned())
                .or_insert(toml::Value::Table(toml::map::Map::new()));
        }
        ensure_table(item).insert(last.to_owned(), v.into());
    }

    /// Load configuration from input object. If keys are already present, they are overwritten
    pub fn load_config<R: io::Read>(&mut self, mut config: R) -> Result<(), Error> {
        let mut s = String::new();
        config.read_to_string(&mut s)?;
        let table: toml::Table = toml::from_str(&s)
            .map_err(|e| Error::Config(format!("Load configuration failed: {e}")))?;
        for (key, value) in table {
            ensure_table(&mut self.value).insert(key, value);
        }
        Ok(())
    }
}

fn ensure_table(item: &mut toml::Value) -> &mut toml::map::Map<String, toml::Value> {
    if !item.is_table() {
        *item = toml::Value::Table(toml::map::Map::new());
    }
    match item {
        toml::Value::Table(table) => table,
        _ => unreachable!("value was just replaced by a table"),
    }
}
