//! Configuration resolution for the LumenChain node
//!
//! Merges six ordered input sources (URL fragment, URL query, CLI
//! arguments, environment, config file, injected options) under a fixed
//! precedence rule and exposes typed, fallback-aware accessors on top of
//! the merged view. All lookups are keyed on canonical keys: hyphens
//! removed, letters lowercased.
//!
//! Resolution is pure: the home directory, working directory, argument
//! vector and environment are taken as explicit snapshots rather than read
//! from ambient process state.

use crate::error::{NodeError, Result};
use crate::plugin::PluginLoader;
use std::any::Any;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

const MB: u64 = 1024 * 1024;

/// A raw configuration value.
///
/// The five string-based tiers only ever hold `Str`; the injected options
/// tier may hold any variant, including opaque objects and plugin loader
/// functions supplied by the embedder.
#[derive(Clone)]
pub enum Value {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Buf(Vec<u8>),
    Array(Vec<Value>),
    Obj(Arc<dyn Any + Send + Sync>),
    Func(PluginLoader),
}

impl Value {
    /// Wrap an arbitrary object for later retrieval via [`Config::obj`].
    pub fn obj<T: Any + Send + Sync>(value: T) -> Self {
        Value::Obj(Arc::new(value))
    }

    pub fn func(loader: PluginLoader) -> Self {
        Value::Func(loader)
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Str(s) => write!(f, "Str({:?})", s),
            Value::Int(i) => write!(f, "Int({})", i),
            Value::Float(x) => write!(f, "Float({})", x),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Buf(b) => write!(f, "Buf({} bytes)", b.len()),
            Value::Array(a) => f.debug_tuple("Array").field(a).finish(),
            Value::Obj(_) => write!(f, "Obj(..)"),
            Value::Func(_) => write!(f, "Func(..)"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Buf(a), Value::Buf(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            // Opaque values have no useful equality.
            _ => false,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<u32> for Value {
    fn from(i: u32) -> Self {
        Value::Int(i64::from(i))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(a: Vec<Value>) -> Self {
        Value::Array(a)
    }
}

/// Encoding accepted by [`Config::buf_enc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufEncoding {
    Hex,
    Base64,
}

/// Snapshot of the raw inputs handed to [`Config::load`].
///
/// The five fields mirror the five reserved meta keys: they are routed to
/// dedicated parsers instead of being stored verbatim in any tier.
#[derive(Default)]
pub struct ConfigInput {
    /// Injected options, lowest-precedence tier.
    pub options: HashMap<String, Value>,
    /// URL fragment, e.g. `#network=testnet`.
    pub hash: Option<String>,
    /// URL query string, e.g. `?loglevel=debug`.
    pub query: Option<String>,
    /// Environment snapshot.
    pub env: Option<HashMap<String, String>>,
    /// Argument vector including the program token.
    pub argv: Option<Vec<String>>,
    /// Whether to read the default config file after loading.
    pub config: bool,
}

/// The configuration store.
///
/// Tier precedence, highest first: hash, query, CLI args, env, file data,
/// injected options. A caller-supplied fallback is the final resort.
pub struct Config {
    module: String,
    pub network: String,
    pub prefix: PathBuf,
    home: PathBuf,
    cwd: PathBuf,
    options: HashMap<String, Value>,
    data: HashMap<String, String>,
    env: HashMap<String, String>,
    args: HashMap<String, String>,
    argv: Vec<String>,
    pass: Vec<String>,
    query: HashMap<String, String>,
    hash: HashMap<String, String>,
}

impl Config {
    /// Create a store for `module`, snapshotting the process home and
    /// working directories.
    pub fn new(module: &str) -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"));
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::with_roots(module, home, cwd)
    }

    /// Create a store with explicit directory snapshots. Used directly by
    /// tests and embedders that must not touch ambient process state.
    pub fn with_roots(module: &str, home: PathBuf, cwd: PathBuf) -> Self {
        assert!(!module.is_empty(), "module name must be non-empty");

        let prefix = home.join(format!(".{}", module));

        Config {
            module: module.to_string(),
            network: "mainnet".to_string(),
            prefix,
            home,
            cwd,
            options: HashMap::new(),
            data: HashMap::new(),
            env: HashMap::new(),
            args: HashMap::new(),
            argv: Vec::new(),
            pass: Vec::new(),
            query: HashMap::new(),
            hash: HashMap::new(),
        }
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// Positional CLI arguments, in order.
    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// Verbatim tokens following a bare `--` separator.
    pub fn passthrough(&self) -> &[String] {
        &self.pass
    }

    /// Store a value in the lowest-precedence tier under the canonical
    /// form of `key`. The only tier that may be mutated after loading.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.options.insert(canonical(key), value.into());
    }

    /// Merge a caller-supplied mapping into the options tier, skipping the
    /// five reserved meta keys that route to dedicated parse paths.
    pub fn inject(&mut self, options: &HashMap<String, Value>) {
        for (key, value) in options {
            match key.as_str() {
                "hash" | "query" | "env" | "argv" | "config" => continue,
                _ => {}
            }
            self.set(key, value.clone());
        }
    }

    /// Run every parser that has an input present, then recompute the
    /// derived `network` and `prefix`.
    pub fn load(&mut self, input: &ConfigInput) -> Result<()> {
        if let Some(hash) = &input.hash {
            self.parse_hash(hash);
        }

        if let Some(query) = &input.query {
            self.parse_query(query);
        }

        if let Some(env) = &input.env {
            self.parse_env(env);
        }

        if let Some(argv) = &input.argv {
            self.parse_args(argv)?;
        }

        self.recompute()
    }

    /// Best-effort read of the config file. A missing file is a silent
    /// no-op; any other I/O failure propagates.
    pub fn open(&mut self, file: &str) -> Result<()> {
        let path = self.get_file(file)?;

        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => {
                return Err(NodeError::Io(format!(
                    "failed to read {}: {}",
                    path.display(),
                    err
                )))
            }
        };

        self.parse_config(&text)?;
        self.recompute()
    }

    fn recompute(&mut self) -> Result<()> {
        self.network = self.get_network()?;
        self.prefix = self.get_prefix()?;
        Ok(())
    }

    /// Presence check mirroring [`Config::get`].
    pub fn has(&self, key: &str) -> bool {
        let key = canonical(key);

        self.hash.contains_key(&key)
            || self.query.contains_key(&key)
            || self.args.contains_key(&key)
            || self.env.contains_key(&key)
            || self.data.contains_key(&key)
            || self.options.contains_key(&key)
    }

    pub fn has_arg(&self, index: usize) -> bool {
        index < self.argv.len()
    }

    /// Highest-precedence value for the canonical form of `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        let key = canonical(key);

        if let Some(v) = self.hash.get(&key) {
            return Some(Value::Str(v.clone()));
        }

        if let Some(v) = self.query.get(&key) {
            return Some(Value::Str(v.clone()));
        }

        if let Some(v) = self.args.get(&key) {
            return Some(Value::Str(v.clone()));
        }

        if let Some(v) = self.env.get(&key) {
            return Some(Value::Str(v.clone()));
        }

        if let Some(v) = self.data.get(&key) {
            return Some(Value::Str(v.clone()));
        }

        self.options.get(&key).cloned()
    }

    /// First resolved value among an ordered list of candidate keys.
    pub fn get_any(&self, keys: &[&str]) -> Option<Value> {
        keys.iter().find_map(|key| self.get(key))
    }

    /// Positional argument at `index`.
    pub fn get_arg(&self, index: usize) -> Option<&str> {
        self.argv.get(index).map(String::as_str)
    }

    pub fn get_or(&self, key: &str, fallback: impl Into<Value>) -> Value {
        self.get(key).unwrap_or_else(|| fallback.into())
    }

    pub fn str(&self, key: &str) -> Result<Option<String>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s)),
            Some(_) => Err(type_error(key, "a string")),
        }
    }

    pub fn int(&self, key: &str) -> Result<Option<i64>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Int(i)) => Ok(Some(i)),
            Some(Value::Float(x)) => {
                if x.is_finite() && x.fract() == 0.0 && x.abs() <= MAX_SAFE_INTEGER as f64 {
                    Ok(Some(x as i64))
                } else {
                    Err(type_error(key, "an int"))
                }
            }
            Some(Value::Str(s)) => {
                if !is_decimal_int(&s) {
                    return Err(type_error(key, "an int"));
                }
                match s.parse::<i64>() {
                    Ok(i) if (-MAX_SAFE_INTEGER..=MAX_SAFE_INTEGER).contains(&i) => Ok(Some(i)),
                    _ => Err(type_error(key, "an int")),
                }
            }
            Some(_) => Err(type_error(key, "an int")),
        }
    }

    pub fn uint(&self, key: &str) -> Result<Option<u64>> {
        match self.int(key)? {
            None => Ok(None),
            Some(i) if i >= 0 => Ok(Some(i as u64)),
            Some(_) => Err(type_error(key, "a uint")),
        }
    }

    pub fn float(&self, key: &str) -> Result<Option<f64>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Float(x)) if x.is_finite() => Ok(Some(x)),
            Some(Value::Int(i)) => Ok(Some(i as f64)),
            Some(Value::Str(s)) => {
                if !is_decimal_float(&s) {
                    return Err(type_error(key, "a float"));
                }
                match s.parse::<f64>() {
                    Ok(x) if x.is_finite() => Ok(Some(x)),
                    _ => Err(type_error(key, "a float")),
                }
            }
            Some(_) => Err(type_error(key, "a float")),
        }
    }

    pub fn ufloat(&self, key: &str) -> Result<Option<f64>> {
        match self.float(key)? {
            None => Ok(None),
            Some(x) if x >= 0.0 => Ok(Some(x)),
            Some(_) => Err(type_error(key, "a positive float")),
        }
    }

    /// Fixed-point integer with `exp` fractional digits.
    pub fn fixed(&self, key: &str, exp: u32) -> Result<Option<i64>> {
        match self.float(key)? {
            None => Ok(None),
            Some(x) => from_float(x, exp)
                .map(Some)
                .map_err(|_| type_error(key, "a fixed number")),
        }
    }

    pub fn ufixed(&self, key: &str, exp: u32) -> Result<Option<i64>> {
        match self.fixed(key, exp)? {
            None => Ok(None),
            Some(i) if i >= 0 => Ok(Some(i)),
            Some(_) => Err(type_error(key, "a positive fixed number")),
        }
    }

    pub fn bool(&self, key: &str) -> Result<Option<bool>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(b)),
            Some(Value::Int(1)) => Ok(Some(true)),
            Some(Value::Int(0)) => Ok(Some(false)),
            Some(Value::Str(s)) => match s.as_str() {
                "true" | "1" => Ok(Some(true)),
                "false" | "0" => Ok(Some(false)),
                _ => Err(type_error(key, "a boolean")),
            },
            Some(_) => Err(type_error(key, "a boolean")),
        }
    }

    /// Hex-decoded byte buffer.
    pub fn buf(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.buf_enc(key, BufEncoding::Hex)
    }

    pub fn buf_enc(&self, key: &str, enc: BufEncoding) -> Result<Option<Vec<u8>>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Buf(b)) => Ok(Some(b)),
            Some(Value::Str(s)) => match enc {
                BufEncoding::Hex => {
                    hex::decode(&s).map(Some).map_err(|_| type_error(key, "a hex string"))
                }
                BufEncoding::Base64 => {
                    use base64::Engine as _;
                    base64::engine::general_purpose::STANDARD
                        .decode(&s)
                        .map(Some)
                        .map_err(|_| type_error(key, "a base64 string"))
                }
            },
            Some(_) => Err(type_error(key, "a buffer")),
        }
    }

    /// Existing array, or a string split on comma with empty tokens
    /// discarded.
    pub fn array(&self, key: &str) -> Result<Option<Vec<Value>>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Array(a)) => Ok(Some(a)),
            Some(Value::Str(s)) => {
                let parts = s
                    .split(',')
                    .map(str::trim)
                    .filter(|part| !part.is_empty())
                    .map(|part| Value::Str(part.to_string()))
                    .collect();
                Ok(Some(parts))
            }
            Some(_) => Err(type_error(key, "an array")),
        }
    }

    /// Downcast an injected opaque object.
    pub fn obj<T: Any + Send + Sync>(&self, key: &str) -> Result<Option<Arc<T>>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Obj(any)) => any
                .downcast::<T>()
                .map(Some)
                .map_err(|_| type_error(key, "an object of the expected type")),
            Some(_) => Err(type_error(key, "an object")),
        }
    }

    /// An injected plugin loader function.
    pub fn func(&self, key: &str) -> Result<Option<PluginLoader>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Func(f)) => Ok(Some(f)),
            Some(_) => Err(type_error(key, "a function")),
        }
    }

    /// Path with `~` expanded to home, `@` expanded to the prefix
    /// directory, and relative paths resolved against the working
    /// directory. The result is lexically normalized.
    pub fn path(&self, key: &str) -> Result<Option<PathBuf>> {
        let value = match self.str(key)? {
            None => return Ok(None),
            Some(value) => value,
        };

        let path = if let Some(rest) = value.strip_prefix('~') {
            self.home.join(rest.trim_start_matches('/'))
        } else if let Some(rest) = value.strip_prefix('@') {
            self.prefix.join(rest.trim_start_matches('/'))
        } else {
            let raw = PathBuf::from(&value);
            if raw.is_absolute() {
                raw
            } else {
                self.cwd.join(raw)
            }
        };

        Ok(Some(normalize(&path)))
    }

    /// A `uint` scaled to bytes from megabytes.
    pub fn mb(&self, key: &str) -> Result<Option<u64>> {
        match self.uint(key)? {
            None => Ok(None),
            Some(v) => v
                .checked_mul(MB)
                .map(Some)
                .ok_or_else(|| type_error(key, "a uint")),
        }
    }

    fn get_network(&self) -> Result<String> {
        let network = match self.str("network")? {
            Some(network) => network,
            None => return Ok("mainnet".to_string()),
        };

        if !is_lower_key(&network) {
            return Err(NodeError::Validation(format!("bad network: {}", network)));
        }

        Ok(network)
    }

    fn get_prefix(&self) -> Result<PathBuf> {
        if let Some(prefix) = self.str("prefix")? {
            // Explicit prefix wins verbatim, with only `~` expansion.
            if let Some(rest) = prefix.strip_prefix('~') {
                return Ok(self.home.join(rest.trim_start_matches('/')));
            }
            return Ok(PathBuf::from(prefix));
        }

        let mut prefix = self.home.join(format!(".{}", self.module));

        if let Some(network) = self.str("network")? {
            if !is_lower_key(&network) {
                return Err(NodeError::Validation(format!("bad network: {}", network)));
            }
            if network != "mainnet" {
                prefix = prefix.join(network);
            }
        }

        Ok(normalize(&prefix))
    }

    /// Config-file location: an explicit `config` override, else `file`
    /// under the prefix directory.
    pub fn get_file(&self, file: &str) -> Result<PathBuf> {
        if let Some(name) = self.str("config")? {
            return Ok(PathBuf::from(name));
        }

        Ok(self.prefix.join(file))
    }

    /// Create the prefix directory if absent. Idempotent.
    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.prefix)
            .map_err(|err| NodeError::Io(format!("failed to create {}: {}", self.prefix.display(), err)))
    }

    /// Join `file` under the prefix directory.
    pub fn location(&self, file: &str) -> PathBuf {
        self.prefix.join(file)
    }

    /// Persist `text` under the prefix directory.
    pub fn write(&self, file: &str, text: &str) -> Result<()> {
        let path = self.location(file);
        fs::write(&path, text)
            .map_err(|err| NodeError::Io(format!("failed to write {}: {}", path.display(), err)))
    }

    /// Parse the `key: value` / `key=value` config-file dialect.
    ///
    /// The separator style established by the first assignment line must
    /// hold for the rest of the file.
    pub fn parse_config(&mut self, text: &str) -> Result<()> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let text = text.replace("\r\n", "\n").replace('\r', "\n");
        // Join continuation lines before splitting.
        let text = text.replace("\\\n", "");

        let mut colons = true;
        let mut seen = false;

        for (idx, chunk) in text.split('\n').enumerate() {
            let num = idx + 1;
            let line = chunk.trim();

            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let equal = line.find('=');
            let colon = line.find(':');

            let (index, is_colon) = match (colon, equal) {
                (Some(c), Some(e)) if c < e => (c, true),
                (Some(c), None) => (c, true),
                (_, Some(e)) => (e, false),
                (None, None) => {
                    let symbol = if colons { ':' } else { '=' };
                    return Err(NodeError::Validation(format!(
                        "expected '{}' on line {}: \"{}\"",
                        symbol, num, line
                    )));
                }
            };

            if is_colon {
                if seen && !colons {
                    return Err(NodeError::Validation(format!(
                        "expected '=' on line {}: \"{}\"",
                        num, line
                    )));
                }
            } else if seen && colons {
                return Err(NodeError::Validation(format!(
                    "expected ':' on line {}: \"{}\"",
                    num, line
                )));
            }

            seen = true;
            colons = is_colon;

            let key: String = line[..index].trim().chars().filter(|&c| c != '-').collect();

            if !is_lower_key(&key) {
                return Err(NodeError::Validation(format!(
                    "invalid option on line {}: {}",
                    num, key
                )));
            }

            let value = line[index + 1..].trim();

            // An empty value leaves the key unset.
            if value.is_empty() {
                continue;
            }

            let key = resolve_alias(&key);

            self.data.insert(key, value.to_string());
        }

        Ok(())
    }

    /// Parse CLI arguments. `argv[0]` is the program token and is skipped.
    pub fn parse_args(&mut self, argv: &[String]) -> Result<()> {
        let mut last: Option<String> = None;
        let mut pass = false;

        for arg in argv.iter().skip(1) {
            if arg == "--" {
                pass = true;
                continue;
            }

            if pass {
                self.pass.push(arg.clone());
                continue;
            }

            if arg.is_empty() {
                last = None;
                continue;
            }

            if let Some(body) = arg.strip_prefix("--") {
                let (raw_key, value, pending) = match body.split_once('=') {
                    // e.g. --opt=val
                    Some((key, value)) => (key, value.to_string(), false),
                    // e.g. --opt, possibly followed by a bare value
                    None => (body, "true".to_string(), true),
                };

                last = None;

                let key: String = raw_key.chars().filter(|&c| c != '-').collect();

                if !is_key(&key) {
                    return Err(NodeError::Validation(format!("invalid argument: --{}", key)));
                }

                let key = key.to_lowercase();

                if value.is_empty() {
                    continue;
                }

                let key = resolve_alias(&key);

                self.args.insert(key.clone(), value);

                if pending {
                    last = Some(key);
                }

                continue;
            }

            if let Some(cluster) = arg.strip_prefix('-') {
                // e.g. -abc
                last = None;

                for ch in cluster.chars() {
                    if !ch.is_ascii_alphanumeric() && ch != '?' {
                        return Err(NodeError::Validation(format!("invalid argument: -{}", ch)));
                    }

                    // Cluster flags alias even at one character (-n is
                    // shorthand for --network).
                    let key = ch.to_ascii_lowercase().to_string();
                    let key = match alias(&key) {
                        Some(target) => target.to_string(),
                        None => key,
                    };

                    self.args.insert(key.clone(), "true".to_string());
                    last = Some(key);
                }

                continue;
            }

            // Bare token: value for a pending key, else positional.
            match last.take() {
                Some(key) => {
                    self.args.insert(key, arg.clone());
                }
                None => self.argv.push(arg.clone()),
            }
        }

        Ok(())
    }

    /// Filter an environment snapshot for `<MODULE>_` entries. Malformed
    /// residues are silently ignored.
    pub fn parse_env(&mut self, env: &HashMap<String, String>) {
        let mut prefix = self.module.to_uppercase().replace('-', "_");
        prefix.push('_');

        for (key, value) in env {
            let rest = match key.strip_prefix(&prefix) {
                Some(rest) => rest,
                None => continue,
            };

            let rest: String = rest.chars().filter(|&c| c != '_').collect();

            if !is_upper_key(&rest) {
                continue;
            }

            if value.is_empty() {
                continue;
            }

            let key = resolve_alias(&rest.to_lowercase());

            self.env.insert(key, value.clone());
        }
    }

    /// Parse a URL query string into the query tier.
    pub fn parse_query(&mut self, query: &str) {
        parse_form(query, '?', &mut self.query);
    }

    /// Parse a URL fragment into the hash tier.
    pub fn parse_hash(&mut self, hash: &str) {
        parse_form(hash, '#', &mut self.hash);
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("module", &self.module)
            .field("network", &self.network)
            .field("prefix", &self.prefix)
            .finish()
    }
}

/*
 * Helpers
 */

// JS safe-integer bound, kept for parity with numeric inputs that arrive
// as floats.
const MAX_SAFE_INTEGER: i64 = (1i64 << 53) - 1;

fn type_error(key: &str, expected: &str) -> NodeError {
    NodeError::Validation(format!("{} must be {}", key, expected))
}

/// Canonical key form: hyphens removed, letters lowercased.
pub fn canonical(key: &str) -> String {
    key.chars().filter(|&c| c != '-').collect::<String>().to_lowercase()
}

/// Short/alternate spellings accepted on every ingestion path.
fn alias(key: &str) -> Option<&'static str> {
    match key {
        "seed" => Some("seeds"),
        "node" => Some("nodes"),
        "n" => Some("network"),
        _ => None,
    }
}

/// Alias lookup guarded against one-character keys (short CLI clusters
/// resolve aliases themselves).
fn resolve_alias(key: &str) -> String {
    if key.len() > 1 {
        if let Some(target) = alias(key) {
            return target.to_string();
        }
    }
    key.to_string()
}

fn is_key(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric())
}

fn is_lower_key(key: &str) -> bool {
    is_key(key) && !key.chars().any(|c| c.is_ascii_uppercase())
}

fn is_upper_key(key: &str) -> bool {
    is_key(key) && !key.chars().any(|c| c.is_ascii_lowercase())
}

fn is_decimal_int(s: &str) -> bool {
    let digits = s.strip_prefix('-').unwrap_or(s);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

fn is_decimal_float(s: &str) -> bool {
    let body = s.strip_prefix('-').unwrap_or(s);

    let (int_part, frac_part) = match body.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (body, None),
    };

    if !int_part.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }

    if let Some(frac) = frac_part {
        if !frac.chars().all(|c| c.is_ascii_digit()) {
            return false;
        }
    }

    // At least one digit somewhere.
    s.chars().any(|c| c.is_ascii_digit())
}

/// Scale a float to a fixed-point integer with `exp` fractional digits.
fn from_float(value: f64, exp: u32) -> std::result::Result<i64, ()> {
    if exp > 15 || !value.is_finite() {
        return Err(());
    }

    let mult = 10i64.pow(exp) as f64;
    let scaled = (value * mult).round();

    if scaled.abs() > MAX_SAFE_INTEGER as f64 {
        return Err(());
    }

    // Reject values with more fractional digits than the scale holds.
    if (scaled / mult - value).abs() > f64::EPSILON * value.abs().max(1.0) {
        return Err(());
    }

    Ok(scaled as i64)
}

/// Shared form parser for query strings and fragments.
fn parse_form(text: &str, lead: char, map: &mut HashMap<String, String>) {
    if text.is_empty() {
        return;
    }

    let text = text.strip_prefix(lead).unwrap_or(text);

    for pair in text.split('&') {
        let (key, value) = match pair.split_once('=') {
            Some((key, value)) => (key, value),
            None => (pair, "true"),
        };

        let key: String = unescape(key).chars().filter(|&c| c != '-').collect();

        if !is_lower_key(&key) {
            continue;
        }

        let value = unescape(value);

        if value.is_empty() {
            continue;
        }

        let key = resolve_alias(&key);

        map.insert(key, value);
    }
}

/// Tolerant percent-decoding: malformed encodings are left undecoded, NUL
/// bytes are always stripped.
fn unescape(s: &str) -> String {
    let decoded = match percent_decode(s) {
        Some(decoded) => decoded.replace('+', " "),
        None => s.to_string(),
    };
    decoded.replace('\0', "")
}

fn percent_decode(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' {
            if i + 2 >= bytes.len() {
                return None;
            }
            let hi = (bytes[i + 1] as char).to_digit(16)?;
            let lo = (bytes[i + 2] as char).to_digit(16)?;
            out.push((hi * 16 + lo) as u8);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8(out).ok()
}

/// Lexical path normalization: resolves `.` and `..` components without
/// touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(Component::ParentDir);
                }
            }
            other => out.push(other),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Config {
        Config::with_roots("lumen", PathBuf::from("/home/tester"), PathBuf::from("/work"))
    }

    #[test]
    fn canonical_strips_hyphens_and_case() {
        assert_eq!(canonical("Log-Level"), "loglevel");
        assert_eq!(canonical("LOGLEVEL"), "loglevel");
        assert_eq!(canonical("loglevel"), "loglevel");
    }

    #[test]
    fn form_parser_tolerates_bad_escapes() {
        let mut map = HashMap::new();
        parse_form("?good=a%20b&weird=%zz", '?', &mut map);

        assert_eq!(map.get("good").map(String::as_str), Some("a b"));
        // Malformed encoding is kept verbatim, not dropped.
        assert_eq!(map.get("weird").map(String::as_str), Some("%zz"));
    }

    #[test]
    fn form_parser_defaults_value_to_true() {
        let mut map = HashMap::new();
        parse_form("#flag&empty=", '#', &mut map);

        assert_eq!(map.get("flag").map(String::as_str), Some("true"));
        assert!(!map.contains_key("empty"));
    }

    #[test]
    fn form_parser_drops_invalid_keys() {
        let mut map = HashMap::new();
        parse_form("?BadKey=1&ok=1", '?', &mut map);

        assert!(!map.contains_key("badkey"));
        assert!(map.contains_key("ok"));
    }

    #[test]
    fn env_parser_filters_by_prefix() {
        let mut config = store();
        let mut env = HashMap::new();
        env.insert("LUMEN_LOG_LEVEL".to_string(), "debug".to_string());
        env.insert("LUMEN_bad".to_string(), "x".to_string());
        env.insert("OTHER_LOG_LEVEL".to_string(), "info".to_string());
        env.insert("LUMEN_EMPTY".to_string(), String::new());

        config.parse_env(&env);

        assert_eq!(config.str("log-level").unwrap().as_deref(), Some("debug"));
        assert!(!config.has("bad"));
        assert!(!config.has("empty"));
        assert!(!config.has("other"));
    }

    #[test]
    fn env_parser_applies_aliases() {
        let mut config = store();
        let mut env = HashMap::new();
        env.insert("LUMEN_SEED".to_string(), "1.2.3.4".to_string());

        config.parse_env(&env);

        assert_eq!(config.str("seeds").unwrap().as_deref(), Some("1.2.3.4"));
    }

    #[test]
    fn args_parser_handles_clusters_and_lookahead() {
        let mut config = store();
        let argv: Vec<String> = ["lumen-node", "-ab", "fast", "--depth", "9", "pos"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        config.parse_args(&argv).unwrap();

        // Last cluster flag consumes the following bare token.
        assert_eq!(config.str("a").unwrap().as_deref(), Some("true"));
        assert_eq!(config.str("b").unwrap().as_deref(), Some("fast"));
        assert_eq!(config.str("depth").unwrap().as_deref(), Some("9"));
        assert_eq!(config.argv(), &["pos".to_string()]);
    }

    #[test]
    fn args_parser_collects_passthrough() {
        let mut config = store();
        let argv: Vec<String> = ["lumen-node", "--depth=3", "--", "--raw", "x"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        config.parse_args(&argv).unwrap();

        assert_eq!(config.passthrough(), &["--raw".to_string(), "x".to_string()]);
        assert!(!config.has("raw"));
    }

    #[test]
    fn args_parser_rejects_bad_tokens() {
        let mut config = store();
        let argv: Vec<String> = ["lumen-node", "--no~pe"].iter().map(|s| s.to_string()).collect();
        assert!(config.parse_args(&argv).is_err());

        let mut config = store();
        let argv: Vec<String> = ["lumen-node", "-a!"].iter().map(|s| s.to_string()).collect();
        assert!(config.parse_args(&argv).is_err());
    }

    #[test]
    fn short_n_aliases_to_network() {
        let mut config = store();
        let argv: Vec<String> = ["lumen-node", "-n", "testnet"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        config.parse_args(&argv).unwrap();

        assert_eq!(config.str("network").unwrap().as_deref(), Some("testnet"));
    }

    #[test]
    fn config_dialect_joins_continuations() {
        let mut config = store();
        config.parse_config("only-net: one,\\\ntwo\n").unwrap();

        assert_eq!(config.str("onlynet").unwrap().as_deref(), Some("one,two"));
    }

    #[test]
    fn config_dialect_skips_comments_and_empty_values() {
        let mut config = store();
        config
            .parse_config("# header\nlog-level: info\nempty:\n")
            .unwrap();

        assert_eq!(config.str("log-level").unwrap().as_deref(), Some("info"));
        assert!(!config.has("empty"));
    }

    #[test]
    fn config_dialect_rejects_uppercase_keys() {
        let mut config = store();
        let err = config.parse_config("Log-Level: info\n").unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn fixed_scales_and_rejects_excess_precision() {
        let mut config = store();
        config.set("rate", "1.25");

        assert_eq!(config.fixed("rate", 2).unwrap(), Some(125));
        assert!(config.fixed("rate", 1).is_err());
    }

    #[test]
    fn buf_decodes_hex_and_base64() {
        let mut config = store();
        config.set("key", "deadbeef");
        config.set("b64", "3q2+7w==");

        assert_eq!(config.buf("key").unwrap(), Some(vec![0xde, 0xad, 0xbe, 0xef]));
        assert_eq!(
            config.buf_enc("b64", BufEncoding::Base64).unwrap(),
            Some(vec![0xde, 0xad, 0xbe, 0xef])
        );

        config.set("bad", "xyz");
        assert!(config.buf("bad").is_err());
    }

    #[test]
    fn normalize_is_lexical() {
        assert_eq!(
            normalize(Path::new("/a/b/../c/./d")),
            PathBuf::from("/a/c/d")
        );
    }

    #[test]
    fn inject_skips_meta_keys() {
        let mut config = store();
        let mut options = HashMap::new();
        options.insert("argv".to_string(), Value::from("ignored"));
        options.insert("workers".to_string(), Value::from(true));

        config.inject(&options);

        assert!(!config.has("argv"));
        assert_eq!(config.bool("workers").unwrap(), Some(true));
    }
}
